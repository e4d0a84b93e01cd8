use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

use dns_types::protocol::types::*;
use dns_types::zones::deserialise::{self, parse_rdata};
use dns_types::zones::types::SOA;

use easybind::settings::Hostname;
use easybind::{Error, ManagedZone, Settings, ZoneRegistry};

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
/// Manage the zones of a BIND nameserver.
///
/// Each zone has a zone file, and an entry in the BIND configuration
/// file pointing to it.  easybind creates new zones with a SOA record
/// and NS records for your nameservers, edits their records, and
/// keeps the configuration file in step.
struct Args {
    /// Path to a YAML or TOML settings file
    #[clap(short, long, env = "EASYBIND_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Nameserver for new zones, can be specified more than once (the
    /// first is the primary)
    #[clap(
        short = 'n',
        long = "nameserver",
        env = "EASYBIND_NAMESERVERS",
        value_delimiter = ',',
        global = true
    )]
    nameservers: Vec<String>,

    /// Path to the BIND configuration file listing the zones
    #[clap(long, env = "EASYBIND_CONF_PATH", global = true)]
    conf_path: Option<PathBuf>,

    /// Path template for zone files, `{domain}` is replaced with the
    /// zone name
    #[clap(long, env = "EASYBIND_ZONE_PATH", global = true)]
    zone_path: Option<String>,

    /// Log in JSON format
    #[clap(long, global = true)]
    json: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a zone, if it doesn't exist, and save it
    Create {
        domain: String,

        /// Do not add the zone to the BIND configuration file
        #[clap(long)]
        no_update_config: bool,
    },

    /// Add a record to a zone
    Add {
        domain: String,

        /// Name of the record, relative to the zone, or `@` for the
        /// zone itself
        name: String,

        /// Record type, eg `A` or `MX`
        rtype: String,

        /// Record data, in zone file format
        #[clap(required = true, num_args = 1.., allow_hyphen_values = true)]
        rdata: Vec<String>,

        /// TTL, if there are no records of this type at this name yet
        #[clap(long)]
        ttl: Option<u32>,

        /// Do not bump the SOA serial
        #[clap(long)]
        no_autoserial: bool,
    },

    /// Remove a record from a zone, or all records of a type at a name
    Remove {
        domain: String,

        /// Name of the record, relative to the zone, or `@` for the
        /// zone itself
        name: String,

        /// Record type, eg `A` or `MX`
        rtype: String,

        /// Record data, in zone file format, if omitted all records of
        /// this type are removed
        #[clap(num_args = 0.., allow_hyphen_values = true)]
        rdata: Vec<String>,

        /// Do not bump the SOA serial
        #[clap(long)]
        no_autoserial: bool,
    },

    /// Print a zone in zone file format
    Show { domain: String },

    /// Report whether a zone has a zone file and a configuration entry
    Status { domain: String },

    /// Delete a zone file
    Delete {
        domain: String,

        /// Also remove the zone from the BIND configuration file
        #[clap(long)]
        update_config: bool,
    },
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let settings = match settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error loading settings: {err}");
            process::exit(1);
        }
    };

    if let Err(err) = run(&ZoneRegistry::new(settings), args.command) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Build the settings from the settings file, if there is one, and the
/// command-line flags.
fn settings(args: &Args) -> Result<Settings, Error> {
    let mut settings = match &args.config {
        Some(path) => Settings::new(&path.to_string_lossy())?,
        None => Settings::default(),
    };

    if !args.nameservers.is_empty() {
        settings.nameservers = args
            .nameservers
            .iter()
            .map(|ns| Hostname::parse(ns).ok_or_else(|| Error::InvalidNameserver(ns.clone())))
            .collect::<Result<_, _>>()?;
    }
    if let Some(conf_path) = &args.conf_path {
        settings.conf_path.clone_from(conf_path);
    }
    if let Some(zone_path) = &args.zone_path {
        settings.zone_path.clone_from(zone_path);
    }

    Ok(settings)
}

fn run(registry: &ZoneRegistry, command: Command) -> Result<(), Error> {
    match command {
        Command::Create {
            domain,
            no_update_config,
        } => {
            let mut zone = registry.open(&domain)?;
            registry.save(&mut zone, false, !no_update_config)?;
            println!("{}", zone.path().display());
        }
        Command::Add {
            domain,
            name,
            rtype,
            rdata,
            ttl,
            no_autoserial,
        } => {
            let mut zone = registry.open(&domain)?;
            let record = record_text(&rtype, &rdata);
            let rtype_with_data = parse_rdata(zone.domain(), &record)
                .map_err(|source| Error::InvalidRecord { record, source })?;
            let ttl = ttl.unwrap_or(registry.settings().default_ttl);

            add_record(&mut zone, relative_name(&name), rtype_with_data, ttl)?;
            registry.save(&mut zone, !no_autoserial, true)?;
        }
        Command::Remove {
            domain,
            name,
            rtype,
            rdata,
            no_autoserial,
        } => {
            let mut zone = registry.open(&domain)?;
            let parsed_rtype =
                RecordType::from_str(&rtype).map_err(|_| Error::InvalidRecord {
                    record: rtype.clone(),
                    source: deserialise::Error::UnsupportedType {
                        rtype: rtype.clone(),
                    },
                })?;
            let to_remove = if rdata.is_empty() {
                None
            } else {
                let record = record_text(&rtype, &rdata);
                Some(
                    parse_rdata(zone.domain(), &record)
                        .map_err(|source| Error::InvalidRecord { record, source })?,
                )
            };

            let node = zone.name(relative_name(&name))?;
            let removed = match to_remove {
                Some(rtype_with_data) => usize::from(node.delete(&rtype_with_data)),
                None => node.remove_records(parsed_rtype).map_or(0, |rs| rs.len()),
            };

            if removed == 0 {
                tracing::warn!(%domain, %name, %parsed_rtype, "no matching records");
            } else {
                registry.save(&mut zone, !no_autoserial, true)?;
            }
        }
        Command::Show { domain } => {
            let zone = registry.open(&domain)?;
            print!("{}", zone.zone().serialise());
        }
        Command::Status { domain } => {
            let domain = easybind::registry::parse_domain(&domain)?;
            let has_zone_file = registry.has_zone_file(&domain);
            let in_config = registry.domain_in_config(&domain)?;

            println!(
                "zone file:     {} ({})",
                present(has_zone_file),
                registry.zone_path(&domain).display()
            );
            println!(
                "configuration: {} ({})",
                present(in_config),
                registry.settings().conf_path.display()
            );
        }
        Command::Delete {
            domain,
            update_config,
        } => {
            let domain = easybind::registry::parse_domain(&domain)?;
            registry.delete_domain(&domain, update_config)?;
        }
    }

    Ok(())
}

/// Add a record at a name.  A SOA record replaces the existing one,
/// and can only be at the apex.
fn add_record(
    zone: &mut ManagedZone,
    name: Option<&str>,
    rtype_with_data: RecordTypeWithData,
    ttl: u32,
) -> Result<(), Error> {
    if let Some(soa) = SOA::from_rdata(&rtype_with_data) {
        let apex = zone.zone().get_apex().clone();
        if zone.name(name)?.name() != &apex {
            return Err(Error::SoaOutsideApex(zone.conf_name()));
        }
        zone.zone_mut().set_soa(soa);
        return Ok(());
    }

    let node = zone.name(name)?;
    if !node
        .records_mut(rtype_with_data.rtype(), ttl)
        .add(rtype_with_data)
    {
        tracing::warn!(name = %node.name(), "record already exists");
    }
    Ok(())
}

/// `@` means the zone itself.
fn relative_name(name: &str) -> Option<&str> {
    if name == "@" {
        None
    } else {
        Some(name)
    }
}

/// Reassemble the record type and data arguments into zone file
/// syntax, quoting any argument which the shell has already unquoted.
fn record_text(rtype: &str, rdata: &[String]) -> String {
    let mut out = rtype.to_string();
    for arg in rdata {
        out.push(' ');
        if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == ';') {
            out.push('"');
            for c in arg.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        } else {
            out.push_str(arg);
        }
    }
    out
}

fn present(yes: bool) -> &'static str {
    if yes {
        "present"
    } else {
        "absent"
    }
}
