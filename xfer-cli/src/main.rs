mod cli;
mod copy;
mod list;

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use cli::{Cli, Commands};
use xfer::{Context, Request};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let ctx = match cli.make_context() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("xfer: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, ctx: Arc<Context>) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Commands::Ls { url } => {
            let mut request = Request::from_url(url, ctx)?;
            request.connect()?;
            for entry in request.list_dir()? {
                println!("{}", list::format_entry(&entry));
            }
            request.disconnect();
            Ok(())
        }

        Commands::Get { paths } => copy::get(ctx, paths),
        Commands::Put { paths } => copy::put(ctx, paths),
        Commands::Copy { source, dest } => copy::copy(ctx, source, dest),

        Commands::Mkdir { url } => with_leaf(url, ctx, |req, leaf| req.mkdir(leaf)),
        Commands::Rmdir { url } => with_leaf(url, ctx, |req, leaf| req.rmdir(leaf)),
        Commands::Rm { url } => with_leaf(url, ctx, |req, leaf| req.remove_file(leaf)),

        Commands::Mv { url, to } => with_leaf(url, ctx, |req, leaf| req.rename(leaf, to)),

        Commands::Chmod { url, mode } => {
            let mode = u32::from_str_radix(mode, 8).map_err(|_| "mode must be octal")?;
            with_leaf(url, ctx, |req, leaf| req.chmod(leaf, mode))
        }

        Commands::Site { url, command } => {
            let mut request = Request::from_url(url, ctx)?;
            request.connect()?;
            let reply = request.site(&command.join(" "))?;
            println!("{reply}");
            request.disconnect();
            Ok(())
        }
    }
}

/// Connects to the parent of the URL's last path component and hands the
/// leaf name to `op`. `mkdir ftp://host/pub/new` connects to `/pub` and
/// creates `new`.
fn with_leaf(
    url: &str,
    ctx: Arc<Context>,
    op: impl FnOnce(&mut Request, &str) -> xfer::Result<()>,
) -> Result<(), Box<dyn Error>> {
    let mut request = Request::from_url(url, ctx)?;

    let path = request.core.directory.trim_end_matches('/').to_string();
    let (parent, leaf) = match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path),
    };
    if leaf.is_empty() {
        return Err("URL must name a file or directory".into());
    }
    request.core.directory = parent;

    request.connect()?;
    op(&mut request, &leaf)?;
    request.disconnect();
    Ok(())
}
