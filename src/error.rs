use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Ledger error in {path} line {line}: {message}")]
    Ledger {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Invalid date '{0}'")]
    DateParse(String),

    #[error("Misaligned puzzle info and stats: expected {expected} responses, got {actual}")]
    Misaligned { expected: usize, actual: usize },

    #[error("Invalid URL: {0}")]
    UrlParse(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => Error::Transport(e.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
