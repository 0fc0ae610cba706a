//! A multi-protocol file-transfer client engine.
//!
//! `xfer` speaks FTP (RFC 959), HTTP/1.x (downloads and directory browsing)
//! and SFTP v3 over an `ssh` subprocess, plus the local filesystem, behind
//! one uniform [`Request`] abstraction. On top of the requests sits the
//! [`transfer`] scheduler, which moves file lists between two endpoints with
//! recursive descent, throttling, and retry/resume across transient
//! disconnects.
//!
//! The engine is blocking and single-threaded-cooperative per request: a
//! request, its line buffer and its protocol state form a unit that one flow
//! drives at a time. A transfer may run on a worker thread while another
//! thread watches statistics and flips the cancel flag.

pub mod bookmarks;
pub mod cache;
pub mod context;
pub mod error;
pub mod file;
pub mod ftp;
pub mod http;
pub mod listing;
pub mod local;
pub mod mode;
pub mod options;
pub mod request;
pub mod sftp;
pub mod transfer;
pub mod url;

pub use bookmarks::{BookmarkEntry, Bookmarks};
pub use cache::{CacheKey, ListingCache};
pub use context::Context;
pub use error::{Error, Severity};
pub use file::{FileRecord, TransferAction};
pub use request::{Capabilities, Driver, Protocol, Request, RequestCore};
pub use transfer::{Transfer, TransferControl, TransferState, TransferStats};
pub use crate::url::{compose_url, parse_url, ParsedUrl};

pub use xfer_transport::CancelFlag;

/// Engine result type
pub type Result<T> = std::result::Result<T, Error>;
