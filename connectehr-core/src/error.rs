use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown EHR vendor: {0}")]
    UnknownVendor(String),

    #[error("Unknown {kind}: {value}")]
    UnknownCategory { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
