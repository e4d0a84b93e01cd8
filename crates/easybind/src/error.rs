use std::io;
use std::path::PathBuf;
use thiserror::Error;

use dns_types::zones::deserialise;

/// Everything that can go wrong managing a zone.
#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors
    #[error("no nameservers configured, at least one is needed to create a zone")]
    NoNameservers,
    #[error("invalid nameserver '{0}'")]
    InvalidNameserver(String),
    #[error("could not load settings: {0}")]
    Settings(#[from] config::ConfigError),

    // Format errors
    #[error("invalid domain name '{0}'")]
    InvalidDomain(String),
    #[error("could not parse zone file {path:?}: {source}")]
    ZoneFormat {
        path: PathBuf,
        #[source]
        source: deserialise::Error,
    },
    #[error("zone '{0}' has no SOA record")]
    MissingSoa(String),
    #[error("the SOA record can only be set at the apex of zone '{0}'")]
    SoaOutsideApex(String),
    #[error("invalid record '{record}': {source}")]
    InvalidRecord {
        record: String,
        #[source]
        source: deserialise::Error,
    },

    // IO errors
    #[error("could not access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The broad category of an `Error`, for callers which only care
/// whose fault it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Required static configuration is missing or invalid.
    Configuration,
    /// Some input does not have the expected structure.
    Format,
    /// A file is missing, unreadable, or unwritable.
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoNameservers | Error::InvalidNameserver(_) | Error::Settings(_) => {
                ErrorKind::Configuration
            }
            Error::InvalidDomain(_)
            | Error::ZoneFormat { .. }
            | Error::MissingSoa(_)
            | Error::SoaOutsideApex(_)
            | Error::InvalidRecord { .. } => ErrorKind::Format,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }
}
