use config::{Config, ConfigError, File};
use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use dns_types::protocol::types::DomainName;

/// Static configuration, fixed before any zone is opened.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize)]
pub struct Settings {
    /// Nameservers for new zones.  The first is the SOA primary, and
    /// every one gets an NS record.
    #[serde(default)]
    pub nameservers: Vec<Hostname>,

    /// The BIND configuration file listing the zones.
    #[serde(default = "default_conf_path")]
    pub conf_path: PathBuf,

    /// Where zone files live.  `{domain}` is replaced with the domain
    /// name, without the final dot.
    #[serde(default = "default_zone_path")]
    pub zone_path: String,

    /// The `type` written into new configuration entries.
    #[serde(default = "default_zone_type")]
    pub zone_type: String,

    /// TTL for the NS records of new zones, and for records added
    /// without one.
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            conf_path: default_conf_path(),
            zone_path: default_zone_path(),
            zone_type: default_zone_type(),
            default_ttl: default_ttl(),
        }
    }
}

fn default_conf_path() -> PathBuf {
    PathBuf::from("/etc/bind/named.conf.local")
}

fn default_zone_path() -> String {
    "/etc/bind/zones/{domain}.hosts".to_string()
}

fn default_zone_type() -> String {
    "master".to_string()
}

fn default_ttl() -> u32 {
    86400
}

/// A hostname, which is always fully-qualified once parsed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Hostname {
    pub domain: DomainName,
}

impl Hostname {
    pub fn parse(s: &str) -> Option<Self> {
        DomainName::from_hostname(s)
            .filter(|domain| !domain.is_root())
            .map(|domain| Self { domain })
    }
}

impl<'de> Deserialize<'de> for Hostname {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct HostnameVisitor;

        impl Visitor<'_> for HostnameVisitor {
            type Value = Hostname;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hostname")
            }

            fn visit_str<E>(self, v: &str) -> Result<Hostname, E>
            where
                E: de::Error,
            {
                Hostname::parse(v).ok_or_else(|| {
                    de::Error::invalid_value(Unexpected::Str(v), &"a valid hostname")
                })
            }
        }

        deserializer.deserialize_str(HostnameVisitor)
    }
}

impl Settings {
    pub fn new(filename: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(filename))
            .build()?
            .try_deserialize()
    }

    /// The nameserver names, in order.
    pub fn nameserver_names(&self) -> impl Iterator<Item = &DomainName> {
        self.nameservers.iter().map(|ns| &ns.domain)
    }
}
