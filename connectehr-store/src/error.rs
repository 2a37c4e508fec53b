use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
