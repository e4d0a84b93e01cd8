use std::fs;
use std::path::Path;

use dns_types::zones::types::Zone;

use crate::error::Error;

/// Somewhere zone files can be read from and written to.
pub trait ZoneStore {
    /// Check if there is a zone file at this path.
    fn exists(&self, path: &Path) -> bool;

    /// Read and parse a zone file.
    fn load(&self, path: &Path) -> Result<Zone, Error>;

    /// Write a zone file, first bumping the SOA serial if
    /// `auto_serial` is set.
    fn store(&self, zone: &mut Zone, path: &Path, auto_serial: bool) -> Result<(), Error>;

    /// Delete a zone file.  It is an error if there isn't one.
    fn remove(&self, path: &Path) -> Result<(), Error>;
}

/// Zone files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneFiles;

impl ZoneStore for ZoneFiles {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn load(&self, path: &Path) -> Result<Zone, Error> {
        let data = fs::read_to_string(path).map_err(Error::io(path))?;
        let zone = Zone::deserialise(&data).map_err(|source| Error::ZoneFormat {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(?path, apex = %zone.get_apex(), "loaded zone file");
        Ok(zone)
    }

    fn store(&self, zone: &mut Zone, path: &Path, auto_serial: bool) -> Result<(), Error> {
        if auto_serial {
            match zone.bump_serial() {
                Some(serial) => tracing::debug!(?path, %serial, "bumped serial"),
                None => tracing::warn!(?path, "zone has no SOA record, not bumping serial"),
            }
        }

        fs::write(path, zone.serialise()).map_err(Error::io(path))?;

        tracing::debug!(?path, apex = %zone.get_apex(), "wrote zone file");
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), Error> {
        fs::remove_file(path).map_err(Error::io(path))?;

        tracing::debug!(?path, "removed zone file");
        Ok(())
    }
}
