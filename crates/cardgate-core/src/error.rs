use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid issuer prefix: {0}")]
    InvalidIssuerPrefix(String),

    #[error("Invalid device identifier: {0}")]
    InvalidDeviceId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
