//! Transfer command implementations: get, put, copy.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use xfer::{Context, FileRecord, Request, Transfer};

/// Builds the file list for a source endpoint: the endpoint's path is
/// either a single file or a directory whose contents move.
///
/// The endpoint's directory is rewound to the parent so the leaf itself
/// becomes the transferred entry.
fn split_leaf(request: &mut Request) -> Option<String> {
    let path = request.core.directory.trim_end_matches('/').to_string();
    if path.is_empty() {
        return None;
    }
    let (parent, leaf) = match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path),
    };
    if leaf.is_empty() {
        return None;
    }
    request.core.directory = parent;
    Some(leaf)
}

/// Runs a transfer between two endpoints, with a progress bar and Ctrl-C
/// wired to cancellation.
pub fn run_transfer(source: Request, dest: Request, files: Vec<FileRecord>) -> Result<(), Box<dyn Error>> {
    let mut transfer = Transfer::new(source, dest, files);
    transfer.expand_directories()?;

    let control = transfer.control();
    {
        let control = control.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, cancelling transfer");
            control.cancel();
        })?;
    }

    let stats = transfer.stats();
    let progress = make_progress_bar(stats.total_bytes.max(0) as u64);

    let worker = std::thread::spawn(move || {
        let result = transfer.run();
        (transfer, result)
    });

    loop {
        let snapshot = control.stats();
        progress.set_length(snapshot.total_bytes.max(0) as u64);
        progress.set_position((snapshot.trans_bytes + snapshot.resumed_bytes).max(0) as u64);
        if worker.is_finished() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let (transfer, result) = worker.join().expect("transfer worker panicked");
    match &result {
        Ok(()) => progress.finish_with_message("done"),
        Err(e) => progress.abandon_with_message(format!("failed: {e}")),
    }

    let skipped = transfer
        .files()
        .iter()
        .filter(|f| !f.done && !f.is_dir())
        .count();
    if skipped > 0 {
        log::warn!("{skipped} file(s) were skipped");
    }

    result?;
    Ok(())
}

pub fn get(ctx: Arc<Context>, paths: &[String]) -> Result<(), Box<dyn Error>> {
    let (dest_dir, sources) = paths.split_last().expect("clap enforces two paths");

    let mut dest = Request::from_url(&format!("file://{}", absolute_local(dest_dir)), ctx.clone())?;
    dest.connect()?;

    // All sources must name the same endpoint; the first one wins.
    let mut source = Request::from_url(&sources[0], ctx)?;
    let mut files = Vec::new();
    for raw in sources {
        let mut probe = Request::from_url(raw, source.core.context().clone())?;
        if probe.core.hostname != source.core.hostname {
            return Err("all sources must be on the same host".into());
        }
        if let Some(leaf) = split_leaf(&mut probe) {
            if files.is_empty() {
                source.core.directory = probe.core.directory.clone();
            }
            files.push(record_for(&mut source, &probe.core.directory, &leaf)?);
        }
    }

    run_transfer(source, dest, files)
}

pub fn put(ctx: Arc<Context>, paths: &[String]) -> Result<(), Box<dyn Error>> {
    let (dest_url, sources) = paths.split_last().expect("clap enforces two paths");

    let dest = Request::from_url(dest_url, ctx.clone())?;

    let mut files = Vec::new();
    let mut source = Request::from_url("file:///", ctx)?;
    for raw in sources {
        let abs = absolute_local(raw);
        let mut probe = Request::from_url(&format!("file://{abs}"), source.core.context().clone())?;
        if let Some(leaf) = split_leaf(&mut probe) {
            if files.is_empty() {
                source.core.directory = probe.core.directory.clone();
            }
            files.push(record_for(&mut source, &probe.core.directory, &leaf)?);
        }
    }

    run_transfer(source, dest, files)
}

pub fn copy(ctx: Arc<Context>, source_url: &str, dest_url: &str) -> Result<(), Box<dyn Error>> {
    let mut source = Request::from_url(source_url, ctx.clone())?;
    let dest = Request::from_url(dest_url, ctx)?;

    let leaf = split_leaf(&mut source);
    source.connect()?;

    let files = match leaf {
        Some(leaf) => {
            let dir = source.core.directory.clone();
            vec![record_for(&mut source, &dir, &leaf)?]
        }
        // Root as source: transfer the whole listing.
        None => source.list_dir()?,
    };

    run_transfer(source, dest, files)
}

/// Stats one leaf on a connected (or connectable) source, falling back to
/// a bare record when the protocol cannot stat.
fn record_for(source: &mut Request, _parent: &str, leaf: &str) -> Result<FileRecord, Box<dyn Error>> {
    source.ensure_connected()?;
    match source.stat(leaf) {
        Ok(mut record) => {
            record.name = leaf.to_string();
            Ok(record)
        }
        Err(xfer::Error::Unsupported(_)) => Ok(FileRecord::new(leaf)),
        Err(e) => Err(e.into()),
    }
}

fn absolute_local(path: &str) -> String {
    let p = std::path::Path::new(path);
    if p.is_absolute() {
        path.to_string()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(p).to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string())
    }
}

fn make_progress_bar(len: u64) -> ProgressBar {
    let progress = ProgressBar::new(len);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    progress
}
