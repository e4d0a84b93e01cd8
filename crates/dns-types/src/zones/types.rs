use std::collections::BTreeMap;

use crate::protocol::types::*;

/// A zone is a tree of records all belonging to the same apex domain
/// name.
///
/// Each owner name has a `Node`, and each node holds one `RecordSet`
/// per record type.  Nodes may be empty: they exist once they have
/// been asked for, whether or not anything has been put in them yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// The domain name which the records all belong to.
    apex: DomainName,

    /// Nodes, indexed by their fully-qualified name.  The apex node
    /// always exists.
    nodes: BTreeMap<DomainName, Node>,
}

impl Default for Zone {
    fn default() -> Self {
        Self::new(DomainName::root_domain())
    }
}

#[cfg(any(feature = "test-util", test))]
impl<'a> arbitrary::Arbitrary<'a> for Zone {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let apex: DomainName = u.arbitrary()?;
        let mut zone = if apex.is_root() {
            Self::new(apex)
        } else {
            let soa = SOA {
                mname: u.arbitrary()?,
                rname: u.arbitrary()?,
                serial: u.arbitrary()?,
                refresh: u.arbitrary()?,
                retry: u.arbitrary()?,
                expire: u.arbitrary()?,
                minimum: u.arbitrary()?,
            };
            Self::with_soa(apex, soa)
        };

        let apex = zone.get_apex().clone();
        let len = u.int_in_range::<usize>(0..=64)?;
        for _ in 0..len {
            let relative: DomainName = u.arbitrary()?;
            let Some(name) = relative.make_subdomain_of(&apex) else {
                continue;
            };
            let ttl = u.arbitrary()?;
            zone.insert(&name, u.arbitrary()?, ttl);
        }

        Ok(zone)
    }
}

impl Zone {
    /// Construct a new, empty, zone.  This is not authoritative until
    /// a SOA is set.
    pub fn new(apex: DomainName) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(apex.clone(), Node::new(apex.clone()));
        Self { apex, nodes }
    }

    /// Construct a new zone with a SOA record at the apex.  The SOA
    /// record set gets the `minimum` field as its TTL.
    pub fn with_soa(apex: DomainName, soa: SOA) -> Self {
        let mut zone = Self::new(apex);
        zone.set_soa(soa);
        zone
    }

    /// Returns the apex domain.
    pub fn get_apex(&self) -> &DomainName {
        &self.apex
    }

    /// Returns true if the zone has a SOA record.
    pub fn is_authoritative(&self) -> bool {
        self.get_soa().is_some()
    }

    /// Return the SOA, if there is one.
    pub fn get_soa(&self) -> Option<SOA> {
        self.root()
            .records(RecordType::SOA)
            .and_then(|rs| rs.iter().next())
            .and_then(SOA::from_rdata)
    }

    /// Replace the SOA record, keeping the record set's TTL if there
    /// already is one.
    pub fn set_soa(&mut self, soa: SOA) {
        let ttl = soa.minimum;
        let rs = self.root_mut().records_mut(RecordType::SOA, ttl);
        rs.clear();
        rs.add(soa.to_rdata());
    }

    /// The node for the apex.
    #[allow(clippy::missing_panics_doc)]
    pub fn root(&self) -> &Node {
        // safe because the apex node is created in the constructor
        // and `remove_node` refuses to remove it
        self.nodes.get(&self.apex).unwrap()
    }

    /// The node for the apex, mutably.
    #[allow(clippy::missing_panics_doc)]
    pub fn root_mut(&mut self) -> &mut Node {
        // safe for the same reason as `root`
        self.nodes.get_mut(&self.apex).unwrap()
    }

    /// Get the node for a name, if it exists.
    pub fn node(&self, name: &DomainName) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Get the node for a name mutably, if it exists.
    pub fn node_mut(&mut self, name: &DomainName) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    /// Get the node for a name, creating an empty one if needed.
    /// Returns `None` if the name is not a subdomain of the apex.
    pub fn node_or_insert(&mut self, name: &DomainName) -> Option<&mut Node> {
        if !name.is_subdomain_of(&self.apex) {
            return None;
        }

        Some(
            self.nodes
                .entry(name.clone())
                .or_insert_with(|| Node::new(name.clone())),
        )
    }

    /// Remove a node and all its records.  The apex node cannot be
    /// removed, only emptied.
    pub fn remove_node(&mut self, name: &DomainName) -> Option<Node> {
        if name == &self.apex {
            None
        } else {
            self.nodes.remove(name)
        }
    }

    /// Insert a record for a domain.  This domain MUST be a subdomain
    /// of the apex, otherwise the record is dropped and `false`
    /// returned.
    ///
    /// If there is already a record set of this type at the name, its
    /// TTL is kept and the given TTL ignored.
    pub fn insert(&mut self, name: &DomainName, rtype_with_data: RecordTypeWithData, ttl: u32) -> bool {
        if let Some(node) = self.node_or_insert(name) {
            node.records_mut(rtype_with_data.rtype(), ttl)
                .add(rtype_with_data);
            true
        } else {
            false
        }
    }

    /// Iterate over all the nodes in the zone, in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Return all the records in the zone, in name order.
    pub fn all_records(&self) -> Vec<ResourceRecord> {
        let mut rrs = Vec::new();
        for node in self.nodes.values() {
            for rs in node.rrsets.values() {
                for rdata in rs.iter() {
                    rrs.push(ResourceRecord {
                        name: node.name.clone(),
                        rtype_with_data: rdata.clone(),
                        ttl: rs.ttl,
                    });
                }
            }
        }
        rrs
    }

    /// Bump the SOA serial number using today's date.  See
    /// `next_serial` for the policy.  Returns the new serial, or
    /// `None` if the zone has no SOA.
    pub fn bump_serial(&mut self) -> Option<u32> {
        let today = chrono::Local::now().date_naive();
        self.bump_serial_on(today)
    }

    /// Like `bump_serial`, but for a given date.
    pub fn bump_serial_on(&mut self, today: chrono::NaiveDate) -> Option<u32> {
        let mut soa = self.get_soa()?;
        soa.serial = next_serial(soa.serial, today);
        let serial = soa.serial;
        self.set_soa(soa);
        Some(serial)
    }
}

/// Work out the next serial number in the `YYYYMMDDNN` convention:
/// the first serial for today if that is bigger than the current
/// one, otherwise the current one plus one.
///
/// Serials which have already run past today's date (because of
/// lots of edits, or because the zone never used the date convention)
/// just keep counting up.
pub fn next_serial(current: u32, today: chrono::NaiveDate) -> u32 {
    use chrono::Datelike;

    let first_of_today = u32::try_from(today.year())
        .ok()
        .and_then(|year| year.checked_mul(1_000_000))
        .and_then(|n| n.checked_add(today.month() * 10_000 + today.day() * 100));

    match first_of_today {
        Some(serial) if serial > current => serial,
        _ => current.wrapping_add(1),
    }
}

/// All the records for one owner name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The fully-qualified owner name.
    name: DomainName,

    /// Records, one set per type.
    rrsets: BTreeMap<RecordType, RecordSet>,
}

impl Node {
    pub fn new(name: DomainName) -> Self {
        Self {
            name,
            rrsets: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &DomainName {
        &self.name
    }

    /// Returns true if there are no records at this name.
    pub fn is_empty(&self) -> bool {
        self.rrsets.values().all(RecordSet::is_empty)
    }

    /// Get the record set of a type, if there is one.
    pub fn records(&self, rtype: RecordType) -> Option<&RecordSet> {
        self.rrsets.get(&rtype)
    }

    /// Get the record set of a type, creating an empty one with the
    /// given TTL if there is none.
    pub fn records_mut(&mut self, rtype: RecordType, ttl: u32) -> &mut RecordSet {
        self.rrsets
            .entry(rtype)
            .or_insert_with(|| RecordSet::new(ttl))
    }

    /// Delete one record, if it is there.  The record set is kept even
    /// if it becomes empty.
    pub fn delete(&mut self, rtype_with_data: &RecordTypeWithData) -> bool {
        self.rrsets
            .get_mut(&rtype_with_data.rtype())
            .is_some_and(|rs| rs.delete(rtype_with_data))
    }

    /// Remove the whole record set of a type.
    pub fn remove_records(&mut self, rtype: RecordType) -> Option<RecordSet> {
        self.rrsets.remove(&rtype)
    }

    /// Iterate over the non-empty record sets, in type order.
    pub fn rrsets(&self) -> impl Iterator<Item = (RecordType, &RecordSet)> {
        self.rrsets
            .iter()
            .filter(|(_, rs)| !rs.is_empty())
            .map(|(rtype, rs)| (*rtype, rs))
    }
}

/// The records of one type at one name.  They share a TTL and do not
/// contain duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSet {
    pub ttl: u32,
    rdatas: Vec<RecordTypeWithData>,
}

impl RecordSet {
    pub fn new(ttl: u32) -> Self {
        Self {
            ttl,
            rdatas: Vec::new(),
        }
    }

    /// Add a record.  Returns `false` if it was already present.
    pub fn add(&mut self, rtype_with_data: RecordTypeWithData) -> bool {
        if self.rdatas.contains(&rtype_with_data) {
            false
        } else {
            self.rdatas.push(rtype_with_data);
            true
        }
    }

    /// Remove a record.  Returns `false` if it was not present.
    pub fn delete(&mut self, rtype_with_data: &RecordTypeWithData) -> bool {
        let before = self.rdatas.len();
        self.rdatas.retain(|r| r != rtype_with_data);
        self.rdatas.len() != before
    }

    pub fn clear(&mut self) {
        self.rdatas.clear();
    }

    pub fn len(&self) -> usize {
        self.rdatas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdatas.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordTypeWithData> {
        self.rdatas.iter()
    }
}

/// A SOA record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(any(feature = "test-util", test), derive(arbitrary::Arbitrary))]
pub struct SOA {
    pub mname: DomainName,
    pub rname: DomainName,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SOA {
    /// Extract the fields from a SOA RDATA.  Returns `None` for any
    /// other type.
    pub fn from_rdata(rtype_with_data: &RecordTypeWithData) -> Option<Self> {
        if let RecordTypeWithData::SOA {
            mname,
            rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        } = rtype_with_data
        {
            Some(Self {
                mname: mname.clone(),
                rname: rname.clone(),
                serial: *serial,
                refresh: *refresh,
                retry: *retry,
                expire: *expire,
                minimum: *minimum,
            })
        } else {
            None
        }
    }

    /// Convert it into a SOA RDATA
    pub fn to_rdata(&self) -> RecordTypeWithData {
        RecordTypeWithData::SOA {
            mname: self.mname.clone(),
            rname: self.rname.clone(),
            serial: self.serial,
            refresh: self.refresh,
            retry: self.retry,
            expire: self.expire,
            minimum: self.minimum,
        }
    }
}
