use std::io;
use thiserror::Error;

/// Errors surfaced at the reactor's registration and lifecycle boundaries.
///
/// Recoverable, expected failures (a stale descriptor on `cancel`, `EINTR`
/// from a blocking wait) are absorbed internally and logged rather than
/// returned here; see the module docs on [`crate::backend`] for why.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("poll backend registration failed")]
    Backend(#[source] io::Error),

    #[error("signal registration failed for signal {signum}")]
    Signal { signum: i32, #[source] source: io::Error },

    #[error("wake channel could not be created")]
    WakeChannel(#[source] io::Error),

    #[error("event loop is already running on this thread")]
    AlreadyRunning,

    #[error("operation attempted from a thread other than the loop's owner")]
    WrongThread,
}

pub type ReactorResult<T> = Result<T, ReactorError>;
