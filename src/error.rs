use std::io;
use std::time::Duration;

/// Everything that can end an ftclient or ftserver run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `-h` was given; carries the usage text.
    #[error("{0}")]
    Help(String),

    #[error("Usage error. {0}")]
    Usage(String),

    #[error("Cannot connect to {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Data connection failed: nothing connected within {}s", .0.as_secs_f64())]
    DataTimeout(Duration),

    #[error("{server} says {message}")]
    ServerRejection { server: String, message: String },

    #[error("ERROR. Server says \"{0}\".")]
    ServerData(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// 1 for local failures, 2 when the server turned the request down.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Help(_) => 0,
            Error::ServerRejection { .. } | Error::ServerData(_) => 2,
            Error::Usage(_)
            | Error::Connection { .. }
            | Error::DataTimeout(_)
            | Error::Protocol(_)
            | Error::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
