//! Unified error type.

/// The error type returned by vigil's fallible operations.
///
/// Application-level failures (401, 404, 500) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding to a port, accepting a connection, or
/// configuring the process-wide journaler twice.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("the default journaler has already been initialised")]
    DefaultJournalerAlreadySet,
}
