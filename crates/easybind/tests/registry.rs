use std::collections::HashSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use dns_types::protocol::types::test_util::*;
use dns_types::protocol::types::*;

use easybind::settings::Hostname;
use easybind::{ErrorKind, Settings, ZoneRegistry};

struct Fixture {
    dir: TempDir,
    registry: ZoneRegistry,
}

impl Fixture {
    fn new(nameservers: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let zones_dir = dir.path().join("zones");
        fs::create_dir(&zones_dir).unwrap();
        let conf_path = dir.path().join("named.conf.local");
        fs::write(&conf_path, "").unwrap();

        let settings = Settings {
            nameservers: nameservers
                .iter()
                .map(|ns| Hostname::parse(ns).unwrap())
                .collect(),
            conf_path,
            zone_path: format!("{}/{{domain}}.hosts", zones_dir.display()),
            ..Settings::default()
        };

        Self {
            dir,
            registry: ZoneRegistry::new(settings),
        }
    }

    fn conf_path(&self) -> PathBuf {
        self.dir.path().join("named.conf.local")
    }

    fn conf(&self) -> String {
        fs::read_to_string(self.conf_path()).unwrap()
    }

    fn zone_file(&self, domain: &str) -> PathBuf {
        self.dir.path().join("zones").join(format!("{domain}.hosts"))
    }

    fn conf_entry(&self, domain: &str) -> String {
        format!(
            "zone \"{domain}\" {{\n    type master;\n    file \"{}\";\n}};\n",
            self.zone_file(domain).display()
        )
    }
}

fn nameservers(zone: &easybind::ManagedZone) -> HashSet<DomainName> {
    zone.zone()
        .root()
        .records(RecordType::NS)
        .unwrap()
        .iter()
        .filter_map(|rdata| match rdata {
            RecordTypeWithData::NS { nsdname } => Some(nsdname.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn new_zone_uses_configured_nameservers() {
    for names in [
        vec!["ns1.example.net"],
        vec!["ns1.example.net", "ns2.example.net"],
        vec!["b.ns.example.org.", "a.ns.example.org", "c.ns.example.org"],
    ] {
        let fixture = Fixture::new(&names);
        let zone = fixture.registry.open("example.com").unwrap();

        assert_eq!(
            DomainName::from_hostname(names[0]).unwrap(),
            zone.soa().unwrap().mname
        );
        assert_eq!(
            names
                .iter()
                .map(|ns| DomainName::from_hostname(ns).unwrap())
                .collect::<HashSet<_>>(),
            nameservers(&zone)
        );
    }
}

#[test]
fn open_save_open_roundtrips() {
    let fixture = Fixture::new(&["ns1.example.net", "ns2.example.net"]);

    let mut zone = fixture.registry.open("foo.com").unwrap();
    zone.name(Some("www"))
        .unwrap()
        .records_mut(RecordType::A, 300)
        .add(RecordTypeWithData::A {
            address: Ipv4Addr::new(192, 0, 2, 1),
        });
    zone.name(Some("mail"))
        .unwrap()
        .records_mut(RecordType::MX, 300)
        .add(RecordTypeWithData::MX {
            preference: 10,
            exchange: domain("mx.example.net."),
        });
    fixture.registry.save(&mut zone, false, true).unwrap();

    let reopened = fixture.registry.open("foo.com").unwrap();
    assert_eq!(zone.zone(), reopened.zone());
}

#[test]
fn in_config_false_before_save_true_after() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let mut zone = fixture.registry.open("foo.com").unwrap();

    assert!(!fixture.registry.in_config(&zone).unwrap());
    fixture.registry.save(&mut zone, true, true).unwrap();
    assert!(fixture.registry.in_config(&zone).unwrap());
}

#[test]
fn save_twice_adds_one_entry() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let mut zone = fixture.registry.open("foo.com").unwrap();

    fixture.registry.save(&mut zone, true, true).unwrap();
    fixture.registry.save(&mut zone, true, true).unwrap();

    assert_eq!(fixture.conf_entry("foo.com"), fixture.conf());
}

#[test]
fn save_does_not_replace_changed_entry() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let existing = "zone \"foo.com\" {\n    type slave;\n    file \"/somewhere/else\";\n};\n";
    fs::write(fixture.conf_path(), existing).unwrap();

    let mut zone = fixture.registry.open("foo.com").unwrap();
    fixture.registry.save(&mut zone, true, true).unwrap();

    assert_eq!(existing, fixture.conf());
}

#[test]
fn delete_removes_only_its_own_entry() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let preamble = "// managed zones\ninclude \"/etc/bind/zones.rfc1918\";\n\n";
    fs::write(fixture.conf_path(), preamble).unwrap();

    let mut foo = fixture.registry.open("foo.com").unwrap();
    let mut bar = fixture.registry.open("bar.org").unwrap();
    let mut baz = fixture.registry.open("baz.net").unwrap();
    fixture.registry.save(&mut foo, true, true).unwrap();
    fixture.registry.save(&mut bar, true, true).unwrap();
    fixture.registry.save(&mut baz, true, true).unwrap();

    fixture.registry.delete(&bar, true).unwrap();

    assert_eq!(
        format!(
            "{preamble}{}{}",
            fixture.conf_entry("foo.com"),
            fixture.conf_entry("baz.net")
        ),
        fixture.conf()
    );
    assert!(!fixture.zone_file("bar.org").exists());
    assert!(fixture.zone_file("foo.com").exists());
    assert!(fixture.zone_file("baz.net").exists());
}

#[test]
fn delete_matches_name_exactly() {
    let fixture = Fixture::new(&["ns1.example.net"]);

    let mut foo = fixture.registry.open("foo.com").unwrap();
    let mut sub = fixture.registry.open("sub.foo.com").unwrap();
    let mut lookalike = fixture.registry.open("fooxcom").unwrap();
    fixture.registry.save(&mut foo, true, true).unwrap();
    fixture.registry.save(&mut sub, true, true).unwrap();
    fixture.registry.save(&mut lookalike, true, true).unwrap();

    fixture.registry.delete(&foo, true).unwrap();

    assert!(!fixture.registry.in_config(&foo).unwrap());
    assert!(fixture.registry.in_config(&sub).unwrap());
    assert!(fixture.registry.in_config(&lookalike).unwrap());
}

#[test]
fn delete_missing_zone_file_is_io_error() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let zone = fixture.registry.open("foo.com").unwrap();

    assert_eq!(
        ErrorKind::Io,
        fixture.registry.delete(&zone, false).unwrap_err().kind()
    );
}

#[test]
fn delete_corrupt_zone_file() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let mut zone = fixture.registry.open("foo.com").unwrap();
    fixture.registry.save(&mut zone, false, true).unwrap();
    fs::write(fixture.zone_file("foo.com"), "$INCLUDE /etc/passwd\n").unwrap();

    fixture
        .registry
        .delete_domain(&domain("foo.com."), true)
        .unwrap();

    assert!(!fixture.zone_file("foo.com").exists());
    assert_eq!("", fixture.conf());
}

#[test]
fn delete_domain_without_nameservers_or_zone_file_is_io_error() {
    let fixture = Fixture::new(&[]);

    assert_eq!(
        ErrorKind::Io,
        fixture
            .registry
            .delete_domain(&domain("foo.com."), true)
            .unwrap_err()
            .kind()
    );
}

#[test]
fn missing_conf_file_is_io_error() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    fs::remove_file(fixture.conf_path()).unwrap();
    let mut zone = fixture.registry.open("foo.com").unwrap();

    assert_eq!(
        ErrorKind::Io,
        fixture.registry.in_config(&zone).unwrap_err().kind()
    );
    assert_eq!(
        ErrorKind::Io,
        fixture.registry.save(&mut zone, true, true).unwrap_err().kind()
    );
    // the zone file is still written, the two files are not updated together
    assert!(fixture.zone_file("foo.com").exists());
}

#[test]
fn unwritable_zone_path_is_io_error() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    fs::remove_dir(fixture.dir.path().join("zones")).unwrap();
    let mut zone = fixture.registry.open("foo.com").unwrap();

    assert_eq!(
        ErrorKind::Io,
        fixture.registry.save(&mut zone, true, true).unwrap_err().kind()
    );
    assert_eq!("", fixture.conf());
}

#[test]
fn no_nameservers_is_configuration_error() {
    let fixture = Fixture::new(&[]);

    assert_eq!(
        ErrorKind::Configuration,
        fixture.registry.open("foo.com").unwrap_err().kind()
    );
}

#[test]
fn non_ascii_domain_is_format_error() {
    let fixture = Fixture::new(&["ns1.example.net"]);

    assert_eq!(
        ErrorKind::Format,
        fixture.registry.open("café.com").unwrap_err().kind()
    );
    assert_eq!("", fixture.conf());
}

#[test]
fn corrupt_zone_file_is_format_error() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    fs::write(fixture.zone_file("foo.com"), "$INCLUDE /etc/passwd\n").unwrap();

    assert_eq!(
        ErrorKind::Format,
        fixture.registry.open("foo.com").unwrap_err().kind()
    );
}

#[test]
fn name_www_is_the_same_node_twice() {
    let fixture = Fixture::new(&["ns1.example.net"]);
    let mut zone = fixture.registry.open("foo.com").unwrap();

    let first = zone.name(Some("www")).unwrap() as *const _;
    let second = zone.name(Some("www")).unwrap() as *const _;

    assert_eq!(first, second);
}

#[test]
fn foo_com_scenario() {
    let fixture = Fixture::new(&["ns1.example.net", "ns2.example.net"]);

    let mut zone = fixture.registry.open("foo.com").unwrap();
    let soa = zone.soa().unwrap();
    assert_eq!(domain("ns1.example.net."), soa.mname);
    assert_eq!(domain("info.foo.com."), soa.rname);
    assert_eq!(2_000_010_100, soa.serial);
    assert_eq!(10800, soa.refresh);
    assert_eq!(3600, soa.retry);
    assert_eq!(604_800, soa.expire);
    assert_eq!(38400, soa.minimum);
    assert_eq!(
        [domain("ns1.example.net."), domain("ns2.example.net.")]
            .into_iter()
            .collect::<HashSet<_>>(),
        nameservers(&zone)
    );

    fixture.registry.save(&mut zone, true, true).unwrap();
    assert!(fixture.zone_file("foo.com").is_file());
    assert_eq!(
        format!(
            "zone \"foo.com\" {{\n    type master;\n    file \"{}\";\n}};\n",
            fixture.zone_file("foo.com").display()
        ),
        fixture.conf()
    );
    assert!(fixture.registry.in_config(&zone).unwrap());

    fixture.registry.delete(&zone, true).unwrap();
    assert!(!fixture.zone_file("foo.com").exists());
    assert!(!fixture.registry.in_config(&zone).unwrap());
    assert_eq!("", fixture.conf());
}

#[test]
fn zone_file_is_readable_by_bind_conventions() {
    let fixture = Fixture::new(&["ns1.example.net", "ns2.example.net"]);
    let mut zone = fixture.registry.open("foo.com").unwrap();
    fixture.registry.save(&mut zone, false, false).unwrap();

    let written = fs::read_to_string(fixture.zone_file("foo.com")).unwrap();
    assert_eq!(
        "$ORIGIN foo.com.\n\
         \n\
         @ 38400 IN SOA ns1.example.net. info 2000010100 10800 3600 604800 38400\n\
         \n\
         @ 86400 IN NS ns1.example.net.\n\
         @ 86400 IN NS ns2.example.net.\n\
         \n",
        written
    );
}

#[test]
fn default_zone_path() {
    let registry = ZoneRegistry::new(Settings::default());

    assert_eq!(
        Path::new("/etc/bind/zones/foo.com.hosts"),
        registry.zone_path(&domain("foo.com."))
    );
}
