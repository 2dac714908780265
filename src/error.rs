use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the catalog, resolver, backup and install modules.
#[derive(Debug, Error)]
pub enum HelperError {
    #[error("network request failed for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("no compatible build of {0} on the mod host")]
    NotFound(String),

    #[error("{action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No backups found!")]
    NoBackups,

    #[error("mods directory not found: {0:?}")]
    MissingModsDir(PathBuf),

    #[error("invalid mod catalog: {0}")]
    Catalog(String),
}

pub type HelperResult<T> = Result<T, HelperError>;

impl HelperError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HelperError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Transport failures abort a run; everything else is scoped to one mod.
    pub fn is_network(&self) -> bool {
        matches!(self, HelperError::Network { .. })
    }

    pub(crate) fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, _) => HelperError::Status {
                url: url.to_string(),
                status,
            },
            ureq::Error::Transport(transport) => HelperError::Network {
                url: url.to_string(),
                message: transport.to_string(),
            },
        }
    }
}
