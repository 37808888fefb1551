/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Structured error document returned by an AWS JSON endpoint.
    #[error("service error {status} ({code}): {message}")]
    Service {
        status: u16,
        /// Exception name, e.g. `ValidationException`.
        code: String,
        message: String,
    },
    /// The warehouse reported a terminal FAILED or ABORTED status.
    #[error("query failed: {message}")]
    QueryExecution {
        query_id: String,
        status: crate::QueryStatus,
        /// Error text reported by the warehouse, unchanged.
        message: String,
    },
    /// Response decoding or shape validation error.
    #[error("decode error: {0}")]
    Decode(String),
    /// The statement did not reach a terminal status within the configured wait.
    #[error("query {query_id} still pending after {waited_ms} ms")]
    PollTimeout { query_id: String, waited_ms: u64 },
    /// The caller cancelled the statement while it was pending.
    #[error("query {query_id} cancelled")]
    Cancelled { query_id: String },
    /// Error from the wire-protocol connection.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// An operation needed a live direct connection and there was none.
    #[error("not connected")]
    NotConnected,
    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Only `.json` and `.parquet` objects are handled.
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("no files found: {0}")]
    NoFilesFound(String),
    /// Path template or parameter validation failure.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// No request-signing keys could be resolved.
    #[error("credential resolution error: {0}")]
    Credentials(String),
    #[error("signing error: {0}")]
    Signing(String),
}
