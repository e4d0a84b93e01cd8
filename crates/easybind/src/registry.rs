use std::path::{Path, PathBuf};

use dns_types::protocol::types::*;
use dns_types::zones::types::*;

use crate::error::Error;
use crate::named_conf::{NamedConf, ZoneEntry};
use crate::settings::Settings;
use crate::store::{ZoneFiles, ZoneStore};

/// SOA values for a zone which doesn't have a zone file yet.
pub const DEFAULT_SERIAL: u32 = 2_000_010_100;
pub const DEFAULT_REFRESH: u32 = 10800;
pub const DEFAULT_RETRY: u32 = 3600;
pub const DEFAULT_EXPIRE: u32 = 604_800;
pub const DEFAULT_MINIMUM: u32 = 38400;

/// Keeps zone files, and the list of zones in the BIND configuration
/// file, in step.
#[derive(Debug, Clone)]
pub struct ZoneRegistry<S = ZoneFiles> {
    settings: Settings,
    store: S,
}

impl ZoneRegistry<ZoneFiles> {
    pub fn new(settings: Settings) -> Self {
        Self::with_store(settings, ZoneFiles)
    }
}

impl<S: ZoneStore> ZoneRegistry<S> {
    pub fn with_store(settings: Settings, store: S) -> Self {
        Self { settings, store }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Where the zone file for a domain lives.
    pub fn zone_path(&self, domain: &DomainName) -> PathBuf {
        PathBuf::from(
            self.settings
                .zone_path
                .replace("{domain}", &domain.to_hostname()),
        )
    }

    /// Check if a domain has a zone file.
    pub fn has_zone_file(&self, domain: &DomainName) -> bool {
        self.store.exists(&self.zone_path(domain))
    }

    /// Get a zone, either from its zone file or, if there isn't one,
    /// by creating a new zone with a SOA record and NS records for the
    /// configured nameservers.
    ///
    /// An existing zone file is used as-is, its apex is not checked
    /// against the domain.
    pub fn open(&self, domain: &str) -> Result<ManagedZone, Error> {
        let domain = parse_domain(domain)?;
        let path = self.zone_path(&domain);

        let zone = if self.store.exists(&path) {
            self.store.load(&path)?
        } else {
            tracing::debug!(%domain, ?path, "no zone file, creating new zone");
            self.new_zone(&domain)?
        };

        Ok(ManagedZone { domain, path, zone })
    }

    fn new_zone(&self, domain: &DomainName) -> Result<Zone, Error> {
        let mname = self
            .settings
            .nameserver_names()
            .next()
            .ok_or(Error::NoNameservers)?;
        let rname = DomainName::from_dotted_string(&format!("info.{}", domain.to_dotted_string()))
            .ok_or_else(|| Error::InvalidDomain(domain.to_hostname()))?;

        let mut zone = Zone::with_soa(
            domain.clone(),
            SOA {
                mname: mname.clone(),
                rname,
                serial: DEFAULT_SERIAL,
                refresh: DEFAULT_REFRESH,
                retry: DEFAULT_RETRY,
                expire: DEFAULT_EXPIRE,
                minimum: DEFAULT_MINIMUM,
            },
        );
        for nsdname in self.settings.nameserver_names() {
            zone.insert(
                domain,
                RecordTypeWithData::NS {
                    nsdname: nsdname.clone(),
                },
                self.settings.default_ttl,
            );
        }

        Ok(zone)
    }

    /// Write the zone file and, if `update_config` is set, make sure
    /// the configuration file has an entry for the zone.  An existing
    /// entry is left alone even if it points somewhere else.
    ///
    /// The two files are not updated atomically: if writing the
    /// configuration file fails, the zone file has still been written.
    pub fn save(
        &self,
        zone: &mut ManagedZone,
        auto_serial: bool,
        update_config: bool,
    ) -> Result<(), Error> {
        self.store.store(&mut zone.zone, &zone.path, auto_serial)?;

        if update_config && !self.in_config(zone)? {
            let conf_path = &self.settings.conf_path;
            let mut conf = NamedConf::read(conf_path)?;
            conf.append(ZoneEntry::new(
                &zone.conf_name(),
                &self.settings.zone_type,
                &zone.path.display().to_string(),
            ));
            conf.write(conf_path)?;

            tracing::info!(domain = %zone.domain, ?conf_path, "added zone to configuration");
        }

        Ok(())
    }

    /// Check if the configuration file has an entry for the zone.  A
    /// missing configuration file is an error.
    pub fn in_config(&self, zone: &ManagedZone) -> Result<bool, Error> {
        self.domain_in_config(&zone.domain)
    }

    /// Like `in_config`, but for a domain which hasn't been opened.
    pub fn domain_in_config(&self, domain: &DomainName) -> Result<bool, Error> {
        let conf = NamedConf::read(&self.settings.conf_path)?;
        Ok(conf.contains(&domain.to_hostname()))
    }

    /// Delete the zone file and, if `update_config` is set, every
    /// configuration entry for the zone.  Entries are matched by name
    /// alone.  It is an error if there is no zone file.
    pub fn delete(&self, zone: &ManagedZone, update_config: bool) -> Result<(), Error> {
        self.delete_domain(&zone.domain, update_config)
    }

    /// Like `delete`, but for a domain which hasn't been opened.  The
    /// zone file is not read, so this also works for one which can't
    /// be parsed.
    pub fn delete_domain(&self, domain: &DomainName, update_config: bool) -> Result<(), Error> {
        let path = self.zone_path(domain);
        self.store.remove(&path)?;
        tracing::info!(%domain, ?path, "deleted zone file");

        if update_config {
            let conf_path = &self.settings.conf_path;
            let mut conf = NamedConf::read(conf_path)?;
            let removed = conf.remove(&domain.to_hostname());
            if removed > 0 {
                conf.write(conf_path)?;
                tracing::info!(%domain, ?conf_path, %removed, "removed zone from configuration");
            }
        }

        Ok(())
    }
}

/// Parse a domain name as typed by a user.  The final dot is
/// optional.
pub fn parse_domain(domain: &str) -> Result<DomainName, Error> {
    DomainName::from_hostname(domain)
        .filter(|name| !name.is_root())
        .ok_or_else(|| Error::InvalidDomain(domain.to_string()))
}

/// A zone which has been opened through a `ZoneRegistry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedZone {
    domain: DomainName,
    path: PathBuf,
    zone: Zone,
}

impl ManagedZone {
    /// The domain, with a final dot.
    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    /// The domain as the configuration file writes it, without a final
    /// dot.
    pub fn conf_name(&self) -> String {
        self.domain.to_hostname()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn zone_mut(&mut self) -> &mut Zone {
        &mut self.zone
    }

    pub fn root(&mut self) -> &mut Node {
        self.zone.root_mut()
    }

    pub fn soa(&self) -> Result<SOA, Error> {
        self.zone
            .get_soa()
            .ok_or_else(|| Error::MissingSoa(self.conf_name()))
    }

    /// Get the node for a name in the zone, creating it if need be.
    /// With no name, or an empty one, this is the apex.
    ///
    /// A name ending in `.` is absolute.  Otherwise the name is first
    /// looked up as given, as an absolute name, and then with the
    /// domain appended.  If neither exists, the node is created with
    /// the domain appended.  So `name(Some("www"))` on `example.com.`
    /// gives the node `www.example.com.`, and repeated calls give the
    /// same node.
    pub fn name(&mut self, subdomain: Option<&str>) -> Result<&mut Node, Error> {
        let Some(subdomain) = subdomain.filter(|s| !s.is_empty()) else {
            return Ok(self.zone.root_mut());
        };

        let invalid = || Error::InvalidDomain(subdomain.to_string());

        let name = match DomainName::from_hostname(subdomain) {
            Some(bare) if subdomain.ends_with('.') || self.zone.node(&bare).is_some() => bare,
            _ => DomainName::from_dotted_string(&format!(
                "{subdomain}.{}",
                self.domain.to_dotted_string()
            ))
            .ok_or_else(invalid)?,
        };

        self.zone.node_or_insert(&name).ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::fs;
    use std::io;

    use dns_types::protocol::types::test_util::*;

    use crate::error::ErrorKind;
    use crate::settings::Hostname;

    use super::*;

    /// Zone files held in memory, as their serialised text.
    #[derive(Debug, Default)]
    struct MemoryStore {
        files: RefCell<HashMap<PathBuf, String>>,
    }

    impl ZoneStore for MemoryStore {
        fn exists(&self, path: &Path) -> bool {
            self.files.borrow().contains_key(path)
        }

        fn load(&self, path: &Path) -> Result<Zone, Error> {
            let files = self.files.borrow();
            let data = files
                .get(path)
                .ok_or_else(|| Error::io(path)(io::Error::from(io::ErrorKind::NotFound)))?;
            Zone::deserialise(data).map_err(|source| Error::ZoneFormat {
                path: path.to_path_buf(),
                source,
            })
        }

        fn store(&self, zone: &mut Zone, path: &Path, auto_serial: bool) -> Result<(), Error> {
            if auto_serial {
                zone.bump_serial();
            }
            self.files
                .borrow_mut()
                .insert(path.to_path_buf(), zone.serialise());
            Ok(())
        }

        fn remove(&self, path: &Path) -> Result<(), Error> {
            match self.files.borrow_mut().remove(path) {
                Some(_) => Ok(()),
                None => Err(Error::io(path)(io::Error::from(io::ErrorKind::NotFound))),
            }
        }
    }

    fn settings(conf_path: &Path, nameservers: &[&str]) -> Settings {
        Settings {
            nameservers: nameservers
                .iter()
                .map(|ns| Hostname::parse(ns).unwrap())
                .collect(),
            conf_path: conf_path.to_path_buf(),
            zone_path: "/zones/{domain}.hosts".to_string(),
            ..Settings::default()
        }
    }

    fn registry(conf_path: &Path) -> ZoneRegistry<MemoryStore> {
        ZoneRegistry::with_store(
            settings(conf_path, &["ns1.example.net", "ns2.example.net"]),
            MemoryStore::default(),
        )
    }

    #[test]
    fn zone_path_strips_final_dot() {
        let registry = registry(Path::new("/named.conf.local"));

        assert_eq!(
            PathBuf::from("/zones/foo.com.hosts"),
            registry.zone_path(&domain("foo.com."))
        );
    }

    #[test]
    fn open_new_zone() {
        let registry = registry(Path::new("/named.conf.local"));
        let zone = registry.open("foo.com").unwrap();

        assert_eq!(&domain("foo.com."), zone.domain());
        assert_eq!("foo.com", zone.conf_name());
        assert_eq!(Path::new("/zones/foo.com.hosts"), zone.path());
        assert_eq!(
            SOA {
                mname: domain("ns1.example.net."),
                rname: domain("info.foo.com."),
                serial: 2_000_010_100,
                refresh: 10800,
                retry: 3600,
                expire: 604_800,
                minimum: 38400,
            },
            zone.soa().unwrap()
        );

        let ns = zone.zone().root().records(RecordType::NS).unwrap();
        assert_eq!(86400, ns.ttl);
        assert_eq!(
            vec![
                &RecordTypeWithData::NS {
                    nsdname: domain("ns1.example.net.")
                },
                &RecordTypeWithData::NS {
                    nsdname: domain("ns2.example.net.")
                },
            ],
            ns.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn open_with_final_dot_is_the_same_zone() {
        let registry = registry(Path::new("/named.conf.local"));

        assert_eq!(
            registry.open("foo.com").unwrap(),
            registry.open("foo.com.").unwrap()
        );
    }

    #[test]
    fn open_without_nameservers() {
        let registry = ZoneRegistry::with_store(
            settings(Path::new("/named.conf.local"), &[]),
            MemoryStore::default(),
        );

        let err = registry.open("foo.com").unwrap_err();
        assert!(matches!(err, Error::NoNameservers));
        assert_eq!(ErrorKind::Configuration, err.kind());
    }

    #[test]
    fn open_existing_zone_without_nameservers() {
        let store = MemoryStore::default();
        store.files.borrow_mut().insert(
            PathBuf::from("/zones/foo.com.hosts"),
            "foo.com. 300 IN SOA ns. admin. 1 2 3 4 5\n".to_string(),
        );
        let registry =
            ZoneRegistry::with_store(settings(Path::new("/named.conf.local"), &[]), store);

        assert_eq!(1, registry.open("foo.com").unwrap().soa().unwrap().serial);
    }

    #[test]
    fn open_trusts_existing_zone_file() {
        let store = MemoryStore::default();
        store.files.borrow_mut().insert(
            PathBuf::from("/zones/foo.com.hosts"),
            "bar.org. 300 IN SOA ns. admin. 1 2 3 4 5\n".to_string(),
        );
        let registry = ZoneRegistry::with_store(
            settings(Path::new("/named.conf.local"), &["ns1.example.net"]),
            store,
        );

        let zone = registry.open("foo.com").unwrap();
        assert_eq!(&domain("foo.com."), zone.domain());
        assert_eq!(&domain("bar.org."), zone.zone().get_apex());
    }

    #[test]
    fn open_unparseable_zone_file() {
        let store = MemoryStore::default();
        store.files.borrow_mut().insert(
            PathBuf::from("/zones/foo.com.hosts"),
            "foo.com. 300 IN SOA ns. admin. 1 2 3\n".to_string(),
        );
        let registry = ZoneRegistry::with_store(
            settings(Path::new("/named.conf.local"), &["ns1.example.net"]),
            store,
        );

        assert_eq!(
            ErrorKind::Format,
            registry.open("foo.com").unwrap_err().kind()
        );
    }

    #[test]
    fn open_invalid_domain() {
        let registry = registry(Path::new("/named.conf.local"));

        for bad in ["", ".", "foo..com", "café.com"] {
            assert!(matches!(
                registry.open(bad),
                Err(Error::InvalidDomain(_))
            ));
        }
    }

    #[test]
    fn name_none_is_root() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        assert_eq!(&domain("foo.com."), zone.name(None).unwrap().name());
        assert_eq!(&domain("foo.com."), zone.name(Some("")).unwrap().name());
        assert_eq!(&domain("foo.com."), zone.root().name());
    }

    #[test]
    fn name_is_stable() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        let first = zone.name(Some("www")).unwrap() as *const Node;
        let second = zone.name(Some("www")).unwrap() as *const Node;

        assert_eq!(first, second);
        assert_eq!(
            &domain("www.foo.com."),
            zone.name(Some("www")).unwrap().name()
        );
        assert_eq!(2, zone.zone().nodes().count());
    }

    #[test]
    fn name_finds_fully_qualified_key() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        let www = zone.name(Some("www")).unwrap() as *const Node;

        assert_eq!(www, zone.name(Some("www.foo.com")).unwrap() as *const Node);
        assert_eq!(www, zone.name(Some("www.foo.com.")).unwrap() as *const Node);
        assert_eq!(2, zone.zone().nodes().count());
    }

    #[test]
    fn name_creates_fully_qualified_key() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        let www = zone.name(Some("www.foo.com.")).unwrap() as *const Node;

        assert_eq!(www, zone.name(Some("www")).unwrap() as *const Node);
        assert_eq!(
            &domain("www.foo.com."),
            zone.name(Some("www.foo.com.")).unwrap().name()
        );
        assert_eq!(2, zone.zone().nodes().count());
    }

    #[test]
    fn name_outside_zone() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        assert!(matches!(
            zone.name(Some("www.bar.org.")),
            Err(Error::InvalidDomain(_))
        ));
        assert_eq!(1, zone.zone().nodes().count());
    }

    #[test]
    fn name_records_are_kept() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        zone.name(Some("www"))
            .unwrap()
            .records_mut(RecordType::A, 300)
            .add(RecordTypeWithData::A {
                address: "192.0.2.1".parse().unwrap(),
            });

        assert_eq!(
            1,
            zone.name(Some("www"))
                .unwrap()
                .records(RecordType::A)
                .unwrap()
                .len()
        );
    }

    #[test]
    fn name_invalid() {
        let registry = registry(Path::new("/named.conf.local"));
        let mut zone = registry.open("foo.com").unwrap();

        assert!(matches!(
            zone.name(Some("bad..name")),
            Err(Error::InvalidDomain(_))
        ));
    }

    #[test]
    fn save_then_open_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("named.conf.local");
        fs::write(&conf_path, "").unwrap();
        let registry = registry(&conf_path);

        let mut zone = registry.open("foo.com").unwrap();
        registry.save(&mut zone, false, true).unwrap();

        assert_eq!(zone, registry.open("foo.com").unwrap());
    }

    #[test]
    fn save_with_auto_serial() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("named.conf.local");
        fs::write(&conf_path, "").unwrap();
        let registry = registry(&conf_path);

        let mut zone = registry.open("foo.com").unwrap();
        registry.save(&mut zone, true, false).unwrap();

        let serial = zone.soa().unwrap().serial;
        assert!(serial > DEFAULT_SERIAL);
        assert_eq!(serial, registry.open("foo.com").unwrap().soa().unwrap().serial);
    }

    #[test]
    fn save_without_update_config() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("named.conf.local");
        fs::write(&conf_path, "").unwrap();
        let registry = registry(&conf_path);

        let mut zone = registry.open("foo.com").unwrap();
        registry.save(&mut zone, false, false).unwrap();

        assert!(!registry.in_config(&zone).unwrap());
        assert_eq!("", fs::read_to_string(&conf_path).unwrap());
    }

    #[test]
    fn in_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir.path().join("named.conf.local"));
        let zone = registry.open("foo.com").unwrap();

        assert_eq!(ErrorKind::Io, registry.in_config(&zone).unwrap_err().kind());
    }

    #[test]
    fn delete_missing_zone_file() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("named.conf.local");
        fs::write(&conf_path, "").unwrap();
        let registry = registry(&conf_path);
        let zone = registry.open("foo.com").unwrap();

        assert_eq!(
            ErrorKind::Io,
            registry.delete(&zone, true).unwrap_err().kind()
        );
    }

    #[test]
    fn delete_without_update_config_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let conf_path = dir.path().join("named.conf.local");
        fs::write(&conf_path, "").unwrap();
        let registry = registry(&conf_path);

        let mut zone = registry.open("foo.com").unwrap();
        registry.save(&mut zone, false, true).unwrap();
        registry.delete(&zone, false).unwrap();

        assert!(!registry.has_zone_file(zone.domain()));
        assert!(registry.in_config(&zone).unwrap());
    }
}
