use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),
}

pub type Result<T> = std::result::Result<T, Error>;
