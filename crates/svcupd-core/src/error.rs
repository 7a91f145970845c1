use std::path::PathBuf;

use svcupd_platform::service::ServiceError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// A required input was missing or empty
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The remote agent could not be reached
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// The remote agent answered with a body we could not interpret
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The remote agent reported a failure; the message is its own
    #[error("{0}")]
    Remote(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("qr code error: {0}")]
    Qr(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
