use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphDbError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("sync error: {0}")]
    Sync(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl GraphDbError {
    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        GraphDbError::InvalidInput(msg.into())
    }

    pub fn invalid_query<T: Into<String>>(msg: T) -> Self {
        GraphDbError::InvalidQuery(msg.into())
    }

    pub fn codec<T: Into<String>>(msg: T) -> Self {
        GraphDbError::Codec(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        GraphDbError::Storage(msg.into())
    }

    pub fn sync<T: Into<String>>(msg: T) -> Self {
        GraphDbError::Sync(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        GraphDbError::NotFound(msg.into())
    }
}
