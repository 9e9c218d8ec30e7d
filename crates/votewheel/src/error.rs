/// Service-level errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("api error: {0}")]
    Api(#[from] crcon::Error),

    #[error("datastore error: {0}")]
    Datastore(#[from] DatastoreError),

    /// Management-command failures, with a message fit for showing to an
    /// operator.
    #[error("{0}")]
    Orchestration(String),

    /// Enabling the votemap processor without weighting parameters.
    #[error("cannot enable votemap processing without configuring weighting parameters")]
    NotConfigured,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn orchestration(message: impl Into<String>) -> Self {
        Error::Orchestration(message.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("a server labelled '{0}' already exists")]
    DuplicateLabel(String),

    #[error("a server with url '{0}' already exists")]
    DuplicateUrl(String),

    #[error("no server labelled '{0}' exists")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
