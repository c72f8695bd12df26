#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown alert `{0}` while updating")]
    UnknownAlert(i64),

    #[error("unknown subscription `{0}` while updating")]
    UnknownSubscription(i64),

    #[cfg(feature = "pg")]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("serde_json `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("parse `{0}`")]
    Parse(#[from] parse_display::ParseError),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
