use thiserror::Error;

/// Errors a [`crate::StateProvider`] implementation may surface.
///
/// The in-memory reference implementation never fails (its methods are
/// infallible locking operations), but the trait returns `Result` because
/// durable backends (Postgres, Redis, ...) need a place to report I/O and
/// serialization failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to serialize value for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state backend I/O error: {0}")]
    Io(String),
}
