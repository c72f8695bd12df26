#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("store `{0}`")]
    Store(#[from] agrialert_store::StoreError),
}

impl From<parse_display::ParseError> for AlertError {
    fn from(err: parse_display::ParseError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlertError>;
