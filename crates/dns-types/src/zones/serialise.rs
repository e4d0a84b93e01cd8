use std::fmt::Write as _;

use crate::protocol::types::*;
use crate::zones::types::*;

impl Zone {
    /// Serialise a zone in the standard zone file format.
    ///
    /// An authoritative zone is written with an `$ORIGIN` line, its SOA
    /// record first, and all other names relative to the apex.  Empty
    /// nodes are not written.
    pub fn serialise(&self) -> String {
        let mut out = String::new();

        if let Some(rs) = self.root().records(RecordType::SOA) {
            if let Some(soa) = rs.iter().next() {
                let show_origin = !self.get_apex().is_root();
                let serialised_apex = serialise_octets(
                    self.get_apex().to_dotted_string().as_bytes(),
                    false,
                );

                if show_origin {
                    _ = writeln!(&mut out, "$ORIGIN {serialised_apex}");
                    out.push('\n');
                }

                _ = writeln!(
                    &mut out,
                    "{} {} IN SOA {}",
                    if show_origin { "@" } else { &serialised_apex },
                    rs.ttl,
                    self.serialise_rdata(soa),
                );
                out.push('\n');
            }
        }

        for node in self.nodes() {
            let mut wrote_any = false;
            for (rtype, rs) in node.rrsets() {
                if rtype == RecordType::SOA {
                    // already handled above, and it's invalid for
                    // a zone to have multiple SOA records
                    continue;
                }

                for rtype_with_data in rs.iter() {
                    _ = writeln!(
                        &mut out,
                        "{} {} IN {} {}",
                        self.serialise_domain(node.name()),
                        rs.ttl,
                        rtype,
                        self.serialise_rdata(rtype_with_data)
                    );
                    wrote_any = true;
                }
            }
            if wrote_any {
                out.push('\n');
            }
        }

        out
    }

    /// Serialise a domain name: dotted string format, with the apex
    /// chopped off if this is an authoritative zone (unless the apex
    /// is the root domain, because that's only a single character
    /// long so we may as well show it).
    fn serialise_domain(&self, name: &DomainName) -> String {
        let domain_str = {
            let apex = self.get_apex();
            if apex.is_root() || !self.is_authoritative() || !name.is_subdomain_of(apex) {
                name.to_dotted_string()
            } else if name == apex {
                "@".to_string()
            } else {
                let labels_to_keep = name.labels.len() - apex.labels.len();
                let relative = &name.labels[..labels_to_keep];
                relative
                    .iter()
                    .map(|label| label.octets().iter().map(|o| *o as char).collect::<String>())
                    .collect::<Vec<_>>()
                    .join(".")
            }
        };

        serialise_octets(domain_str.as_bytes(), false)
    }

    /// Serialise the RDATA, with domains displayed relative to the apex (if
    /// authoritative).
    pub fn serialise_rdata(&self, rtype_with_data: &RecordTypeWithData) -> String {
        match rtype_with_data {
            RecordTypeWithData::A { address } => format!("{address}"),
            RecordTypeWithData::NS { nsdname } => self.serialise_domain(nsdname),
            RecordTypeWithData::CNAME { cname } => self.serialise_domain(cname),
            RecordTypeWithData::SOA {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => format!(
                "{} {} {serial} {refresh} {retry} {expire} {minimum}",
                self.serialise_domain(mname),
                self.serialise_domain(rname),
            ),
            RecordTypeWithData::PTR { ptrdname } => self.serialise_domain(ptrdname),
            RecordTypeWithData::MX {
                preference,
                exchange,
            } => format!("{preference} {}", self.serialise_domain(exchange)),
            RecordTypeWithData::TXT { octets } => serialise_octets(octets, true),
            RecordTypeWithData::AAAA { address } => format!("{address}"),
            RecordTypeWithData::SRV {
                priority,
                weight,
                port,
                target,
            } => format!(
                "{priority} {weight} {port} {}",
                self.serialise_domain(target)
            ),
        }
    }
}

/// Serialise a string of octets to a quoted or unquoted string with
/// the appropriate escaping.
fn serialise_octets(octets: &[u8], quoted: bool) -> String {
    let mut out = String::with_capacity(2 + octets.len());

    if quoted {
        out.push('"');
    }

    for octet in octets {
        if *octet == b'"' || *octet == b'\\' || *octet == b';' || *octet == b'(' || *octet == b')' {
            out.push('\\');
            out.push(*octet as char);
        } else if *octet < 32 || *octet > 126 || (*octet == 32 && !quoted) {
            _ = write!(&mut out, "\\{octet:03}");
        } else {
            out.push(*octet as char);
        }
    }

    if quoted {
        out.push('"');
    }

    out
}
