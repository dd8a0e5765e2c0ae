use thiserror::Error;

use crate::sink::SinkError;
use crate::validate::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Malformed Body - {0}")]
    MalformedBody(String),

    #[error("Envelope Error - {0}")]
    Envelope(String),

    #[error("Validation Error - {0}")]
    Validation(#[from] ValidationError),

    #[error("Sink Error - {0}")]
    Sink(#[from] SinkError),

    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}
