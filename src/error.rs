use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("GET {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GET {url} failed ({status})")]
    HttpStatus { url: String, status: StatusCode },

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("not a valid zip archive: {0}")]
    InvalidArchive(#[from] zip::result::ZipError),

    #[error("Could not find '{label}' link on page")]
    LinkNotFound { label: String },

    #[error("no storage backend for `{scheme}://` destinations")]
    MissingBackend { scheme: String },

    #[error("storage: {0}")]
    Storage(String),

    #[error("browser session: {0}")]
    Browser(String),

    #[error("dataset container `{selector}` not found on {url}")]
    ContainerNotFound { url: String, selector: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
