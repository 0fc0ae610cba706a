use clap::{Parser, Subcommand};
use std::sync::Arc;

use xfer::options::Value;
use xfer::Context;

#[derive(Parser)]
#[command(name = "xfer", version, about = "Multi-protocol file transfer client", long_about = None)]
pub struct Cli {
    /// Network timeout in seconds.
    #[arg(short, long)]
    pub timeout: Option<i64>,

    /// Attempts per file; 0 retries forever.
    #[arg(long)]
    pub retries: Option<i64>,

    /// Seconds to wait between retries.
    #[arg(long)]
    pub sleep_time: Option<i64>,

    /// Transfer rate cap in KB/s.
    #[arg(long)]
    pub maxkbs: Option<f64>,

    /// Use FTP active mode instead of trying passive first.
    #[arg(long)]
    pub active: bool,

    /// Default FTP transfers to ASCII mode.
    #[arg(long)]
    pub ascii: bool,

    /// Resolve and prefer IPv6 addresses.
    #[arg(long)]
    pub ipv6: bool,

    /// Bypass the listing cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Extra engine options as name=value, repeatable.
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    pub options: Vec<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lists a remote or local directory.
    Ls {
        /// Endpoint URL, e.g. ftp://user@host/pub
        url: String,
    },
    /// Downloads files: SOURCE-URL... LOCAL-DIR
    Get {
        /// One or more source URLs followed by the local destination
        /// directory.
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Uploads files: LOCAL-PATH... DEST-URL
    Put {
        /// One or more local paths followed by the destination URL.
        #[arg(required = true, num_args = 2..)]
        paths: Vec<String>,
    },
    /// Copies between two endpoints (server-to-server when both are FTP).
    Copy {
        /// Source URL (directory contents or a single file).
        source: String,
        /// Destination URL.
        dest: String,
    },
    /// Creates a directory.
    Mkdir { url: String },
    /// Removes an empty directory.
    Rmdir { url: String },
    /// Removes a file.
    Rm { url: String },
    /// Renames a file or directory on one endpoint.
    Mv {
        url: String,
        /// New name, relative to the endpoint's directory.
        to: String,
    },
    /// Changes permissions, octal mode.
    Chmod {
        url: String,
        /// Octal mode, e.g. 644.
        mode: String,
    },
    /// Sends a raw SITE command (FTP only).
    Site {
        url: String,
        /// Command text after SITE.
        command: Vec<String>,
    },
}

impl Cli {
    /// Applies the command-line switches to a fresh engine context.
    pub fn make_context(&self) -> Result<Arc<Context>, String> {
        let cache_dir = std::env::temp_dir().join("xfer-cache");
        let ctx = Arc::new(Context::new(cache_dir));

        if let Some(timeout) = self.timeout {
            ctx.set_option("network_timeout", Value::Int(timeout));
        }
        if let Some(retries) = self.retries {
            ctx.set_option("retries", Value::Int(retries));
        }
        if let Some(sleep_time) = self.sleep_time {
            ctx.set_option("sleep_time", Value::Int(sleep_time));
        }
        if let Some(maxkbs) = self.maxkbs {
            ctx.set_option("maxkbs", Value::Float(maxkbs));
        }
        if self.active {
            ctx.set_option("passive_transfer", Value::Bool(false));
        }
        if self.ascii {
            ctx.set_option("ascii_transfers", Value::Bool(true));
        }
        if self.ipv6 {
            ctx.set_option("enable_ipv6", Value::Bool(true));
        }
        if self.no_cache {
            ctx.set_option("use_cache", Value::Bool(false));
        }

        for entry in &self.options {
            let Some((name, value)) = entry.split_once('=') else {
                return Err(format!("invalid option {entry:?}, expected NAME=VALUE"));
            };
            if !ctx.set_option_from_str(name, value) {
                return Err(format!("invalid value {value:?} for option {name:?}"));
            }
        }

        Ok(ctx)
    }
}
