//! Blocking network plumbing for the xfer engine.
//!
//! Everything in here is synchronous: reads and writes block for at most the
//! configured network timeout, and every blocking point consults a shared
//! cancellation flag so a UI thread can abort a stuck request. The pushback
//! [`LineReader`] preserves unconsumed bytes between calls, which lets the
//! protocol drivers alternate between line-oriented and raw reads on the
//! same connection.

pub mod cancel;
pub mod connect;
pub mod error;
pub mod io;
pub mod line;
pub mod proxy;

pub use cancel::CancelFlag;
pub use connect::{accept_with_timeout, connect_to, resolve};
pub use error::TransportError;
pub use io::{Channel, SocketChannel};
pub use line::LineReader;
pub use proxy::{needs_proxy, BypassRule};

#[cfg(unix)]
pub use io::PipeChannel;

/// Transport result type
pub type Result<T> = std::result::Result<T, TransportError>;
