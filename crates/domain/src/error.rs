/// Shared error type used across all Strand crates.
///
/// Variants are behavior categories, not type names: the gateway maps
/// `kind()` to an HTTP status and streaming endpoints map it to an
/// `error` envelope code.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure hiccup that is safe to retry (store contention,
    /// checkpoint read while the runtime holds its connection, KV outage).
    #[error("transient: {0}")]
    Transient(String),

    /// A graph node failed during execution. Delivered to streaming
    /// clients as an `error` envelope rather than an HTTP status.
    #[error("runtime: {0}")]
    Runtime(String),

    #[error("client closed: {0}")]
    ClientClosed(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Stable kind string used in wire error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::Transient(_) => "transient_infra",
            Error::Runtime(_) => "runtime_error",
            Error::ClientClosed(_) => "client_closed",
            Error::Config(_) => "validation",
            Error::Provider { .. } => "runtime_error",
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => "internal",
        }
    }

    /// Whether an internal retry is worthwhile before surfacing.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(Error::NotFound("x".into()).kind(), "not_found");
        assert_eq!(Error::Forbidden("x".into()).kind(), "forbidden");
        assert_eq!(Error::Transient("x".into()).kind(), "transient_infra");
        assert_eq!(Error::ClientClosed("x".into()).kind(), "client_closed");
        assert_eq!(Error::Internal("x".into()).kind(), "internal");
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(Error::Transient("db busy".into()).is_transient());
        assert!(!Error::NotFound("gone".into()).is_transient());
        assert!(!Error::Internal("boom".into()).is_transient());
    }
}
