use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("end_date {end} must be on or after start_date {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("{date} is outside the supported calendar range")]
    DateOutOfRange { date: NaiveDate },

    #[error("client storage error: {0}")]
    Storage(String),
}
