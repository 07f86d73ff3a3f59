//! Unified error type.

use std::io;

/// The error type returned by sheath's fallible operations.
///
/// Application-level outcomes (404, 422, etc.) are written as HTTP statuses,
/// not returned as `Error`s. This type surfaces failures that abort a request
/// or the server: socket I/O, request bodies that cannot be read, and errors a
/// streaming handler chooses to raise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Binding, accepting, or writing to the client failed.
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The request body could not be read to completion.
    #[error("reading request body: {0}")]
    Body(#[source] io::Error),

    /// A handler gave up on the request.
    #[error("handler: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wraps an application error so a streaming handler can return it with `?`.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn fails() -> Result<(), Error> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "io: gone");
    }

    #[test]
    fn body_error_keeps_source() {
        let err = Error::Body(io::Error::other("reset"));
        assert_eq!(err.to_string(), "reading request body: reset");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn handler_error_from_str() {
        let err = Error::handler("no such user");
        assert_eq!(err.to_string(), "handler: no such user");
    }
}
