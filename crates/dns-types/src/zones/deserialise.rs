use std::iter::Peekable;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::protocol::types::*;
use crate::zones::types::*;

/// A token from a zone file: the string as written, and the octets it
/// stands for once escapes have been processed.
type Token = (String, Vec<u8>);

impl Zone {
    /// Parse a string of zone data
    ///
    /// If there is a SOA record, its owner name becomes the apex, and
    /// every other record must be a subdomain of it.  If there is no
    /// SOA record, the root domain is the apex.
    ///
    /// This implementation does not support `$INCLUDE` entries or
    /// non-`IN` record classes.  These will raise an error.
    ///
    /// # Errors
    ///
    /// If the string cannot be parsed.
    pub fn deserialise(data: &str) -> Result<Self, Error> {
        let mut rrs = Vec::new();
        let mut soa_rr = None;
        let mut state = ParseState::default();
        let mut stream = data.chars().peekable();
        while let Some(entry) = parse_entry(&state, &mut stream)? {
            match entry {
                Entry::Origin { name } => state.origin = Some(name),
                Entry::Ttl { ttl } => state.default_ttl = Some(ttl),
                Entry::Include { path, origin } => {
                    return Err(Error::IncludeNotSupported { path, origin })
                }
                Entry::RR { rr } => {
                    state.previous_domain = Some(rr.name.clone());
                    state.previous_ttl = Some(rr.ttl);

                    if rr.rtype_with_data.rtype() == RecordType::SOA {
                        if soa_rr.is_some() {
                            return Err(Error::MultipleSOA);
                        }
                        soa_rr = Some(rr);
                    } else {
                        rrs.push(rr);
                    }
                }
            }
        }

        let mut zone = if let Some(rr) = soa_rr {
            let mut zone = Zone::new(rr.name.clone());
            zone.insert(&rr.name, rr.rtype_with_data, rr.ttl);
            zone
        } else {
            Zone::default()
        };

        for rr in rrs {
            if !zone.insert(&rr.name, rr.rtype_with_data, rr.ttl) {
                return Err(Error::NotSubdomainOfApex {
                    apex: zone.get_apex().clone(),
                    name: rr.name,
                });
            }
        }

        Ok(zone)
    }
}

/// Parse the RDATA of a single record, given as its type followed by
/// the data in zone file syntax, eg `MX 10 mail`.  Relative names are
/// completed with `origin`.
///
/// # Errors
///
/// If the string cannot be parsed.
pub fn parse_rdata(origin: &DomainName, data: &str) -> Result<RecordTypeWithData, Error> {
    let tokens = tokenise_entry(&mut data.chars().peekable())?;
    if tokens.is_empty() {
        return Err(Error::MissingType { tokens });
    }
    if RecordType::from_str(&tokens[0].0).is_err() {
        return Err(Error::UnsupportedType {
            rtype: tokens[0].0.clone(),
        });
    }

    match try_parse_rtype_with_data(&Some(origin.clone()), &tokens) {
        Some(rtype_with_data) => Ok(rtype_with_data),
        None => Err(Error::BadRecordData { tokens }),
    }
}

/// What the parser needs to remember between entries.
#[derive(Debug, Clone, Default)]
struct ParseState {
    /// Set by `$ORIGIN`.
    origin: Option<DomainName>,

    /// Set by `$TTL`.
    default_ttl: Option<u32>,

    /// The owner name of the last record.
    previous_domain: Option<DomainName>,

    /// The TTL of the last record.
    previous_ttl: Option<u32>,
}

impl ParseState {
    /// The TTL for a record which does not give one: the `$TTL` value,
    /// or the TTL of the previous record.  A SOA record can fall back
    /// to its own `minimum` field.
    fn implied_ttl(&self, rtype_with_data: &RecordTypeWithData) -> Option<u32> {
        self.default_ttl.or(self.previous_ttl).or(match rtype_with_data {
            RecordTypeWithData::SOA { minimum, .. } => Some(*minimum),
            _ => None,
        })
    }
}

/// Parse a single entry, skipping comments and whitespace.  Entries
/// are of the form:
///
/// ```text
/// $ORIGIN <domain-name>
/// $TTL <ttl>
/// $INCLUDE <file-name> [<domain-name>]
/// <rr>
/// ```
///
/// Where `<rr>` is one of these forms:
///
/// ```text
/// <domain-name> <ttl>   <class> <type> <rdata>
/// <domain-name> <class> <ttl>   <type> <rdata>
/// <domain-name> <ttl>           <type> <rdata>
/// <domain-name>         <class> <type> <rdata>
/// <domain-name>                 <type> <rdata>
///               <ttl>   <class> <type> <rdata>
///               <class> <ttl>   <type> <rdata>
///               <ttl>           <type> <rdata>
///                       <class> <type> <rdata>
///                               <type> <rdata>
/// ```
///
/// - If the `<domain-name>` is missing, the previous one is used (so
/// it is an error to omit it in the first RR).
///
/// - If the `<ttl>` is missing, the `$TTL` value is used, or the
/// previous TTL if there has been no `$TTL`.
///
/// - The only supported `<class>` is `IN`, which is also the default.
///
/// - The `<domain-name>` can be an absolute domain, given as a dotted
/// string ending in a `.`; or a relative domain, given as a dotted
/// string not ending in a `.`, in which case the origin is appended;
/// or `@`, in which case it is the origin.  A wildcard is just a name
/// with a `*` label.
///
/// Some special characters are:
///
/// - `;` - the rest of the line is a comment
/// - `" ... "` - a string (used for rdata)
/// - `( ... )` - a group of data which crosses a newline
/// - `\X` - quotes a character, where `X` is a non-digit
/// - `\DDD` - an octet, given as a decimal number
///
/// Returns `None` if the stream is empty.
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_entry<I: Iterator<Item = char>>(
    state: &ParseState,
    stream: &mut Peekable<I>,
) -> Result<Option<Entry>, Error> {
    loop {
        let tokens = tokenise_entry(stream)?;
        if tokens.is_empty() {
            if stream.peek().is_none() {
                return Ok(None);
            }
        } else if tokens[0].0 == "$ORIGIN" {
            return Ok(Some(parse_origin(&state.origin, tokens)?));
        } else if tokens[0].0 == "$TTL" {
            return Ok(Some(parse_ttl_directive(tokens)?));
        } else if tokens[0].0 == "$INCLUDE" {
            return Ok(Some(parse_include(&state.origin, tokens)?));
        } else {
            return Ok(Some(parse_rr(state, tokens)?));
        }
    }
}

/// ```text
/// $ORIGIN <domain-name>
/// ```
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_origin(origin: &Option<DomainName>, tokens: Vec<Token>) -> Result<Entry, Error> {
    if tokens.len() != 2 {
        return Err(Error::WrongLen { tokens });
    }

    let name = parse_domain(origin, &tokens[1].0)?;
    Ok(Entry::Origin { name })
}

/// ```text
/// $TTL <ttl>
/// ```
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_ttl_directive(tokens: Vec<Token>) -> Result<Entry, Error> {
    if tokens.len() != 2 {
        return Err(Error::WrongLen { tokens });
    }

    let ttl = parse_u32(&tokens[1].0)?;
    Ok(Entry::Ttl { ttl })
}

/// ```text
/// $INCLUDE <file-name> [<domain-name>]
/// ```
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_include(origin: &Option<DomainName>, tokens: Vec<Token>) -> Result<Entry, Error> {
    if tokens.len() != 2 && tokens.len() != 3 {
        return Err(Error::WrongLen { tokens });
    }

    let path = tokens[1].0.clone();
    let name = if tokens.len() == 3 {
        Some(parse_domain(origin, &tokens[2].0)?)
    } else {
        None
    };
    Ok(Entry::Include { path, origin: name })
}

/// See `parse_entry` for the accepted forms.  The record type is
/// found by trying each position it could be in, from the longest
/// prefix down.
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_rr(state: &ParseState, tokens: Vec<Token>) -> Result<Entry, Error> {
    if tokens.is_empty() {
        return Err(Error::WrongLen { tokens });
    }

    for prefix_len in (0..=3).rev() {
        if tokens.len() <= prefix_len {
            continue;
        }
        let Some(rtype_with_data) = try_parse_rtype_with_data(&state.origin, &tokens[prefix_len..])
        else {
            continue;
        };

        let prefix = &tokens[..prefix_len];
        let (name, ttl) = parse_rr_prefix(state, prefix, &tokens)?;

        let name = match name {
            Some(name) => name,
            None => match &state.previous_domain {
                Some(name) => name.clone(),
                None => return Err(Error::MissingDomainName { tokens }),
            },
        };
        let ttl = match ttl {
            Some(ttl) => ttl,
            None => match state.implied_ttl(&rtype_with_data) {
                Some(ttl) => ttl,
                None => return Err(Error::MissingTTL { tokens }),
            },
        };

        return Ok(Entry::RR {
            rr: ResourceRecord {
                name,
                rtype_with_data,
                ttl,
            },
        });
    }

    if tokens
        .iter()
        .take(4)
        .any(|(s, _)| RecordType::from_str(s).is_ok())
    {
        Err(Error::BadRecordData { tokens })
    } else {
        Err(Error::MissingType { tokens })
    }
}

/// Split the tokens before the record type into the owner name and
/// TTL, either of which may be absent.
///
/// ```text
/// <domain-name> <ttl>   <class>
/// <domain-name> <class> <ttl>
/// <domain-name> <ttl>
/// <domain-name>         <class>
/// <domain-name>
///               <ttl>   <class>
///               <class> <ttl>
///               <ttl>
///                       <class>
/// ```
///
/// # Errors
///
/// If the tokens do not fit any of these forms.
fn parse_rr_prefix(
    state: &ParseState,
    prefix: &[Token],
    tokens: &[Token],
) -> Result<(Option<DomainName>, Option<u32>), Error> {
    let is_class = |t: &Token| t.0.eq_ignore_ascii_case("IN");
    let is_ttl = |t: &Token| !t.0.is_empty() && t.0.chars().all(|c| c.is_ascii_digit());

    match prefix {
        [] => Ok((None, None)),
        [a] if is_class(a) => Ok((None, None)),
        [a] if is_ttl(a) => Ok((None, Some(parse_u32(&a.0)?))),
        [a] => Ok((Some(parse_domain(&state.origin, &a.0)?), None)),
        [a, b] if is_class(a) && is_ttl(b) => Ok((None, Some(parse_u32(&b.0)?))),
        [a, b] if is_ttl(a) && is_class(b) => Ok((None, Some(parse_u32(&a.0)?))),
        [a, b] if is_class(b) => Ok((Some(parse_domain(&state.origin, &a.0)?), None)),
        [a, b] if is_ttl(b) => Ok((
            Some(parse_domain(&state.origin, &a.0)?),
            Some(parse_u32(&b.0)?),
        )),
        [a, b, c] if is_class(c) => Ok((
            Some(parse_domain(&state.origin, &a.0)?),
            Some(parse_u32(&b.0)?),
        )),
        [a, b, c] if is_class(b) => Ok((
            Some(parse_domain(&state.origin, &a.0)?),
            Some(parse_u32(&c.0)?),
        )),
        _ => Err(Error::Unexpected {
            expected: "IN".to_string(),
            tokens: tokens.to_vec(),
        }),
    }
}

/// Try to parse a record type with data.  Returns `None` if there is
/// no parse, since this does not necessarily indicate a fatal error.
fn try_parse_rtype_with_data(
    origin: &Option<DomainName>,
    tokens: &[Token],
) -> Option<RecordTypeWithData> {
    if tokens.is_empty() {
        return None;
    }

    match RecordType::from_str(tokens[0].0.as_str()) {
        Ok(RecordType::A) if tokens.len() == 2 => match Ipv4Addr::from_str(&tokens[1].0) {
            Ok(address) => Some(RecordTypeWithData::A { address }),
            _ => None,
        },
        Ok(RecordType::NS) if tokens.len() == 2 => match parse_domain(origin, &tokens[1].0) {
            Ok(nsdname) => Some(RecordTypeWithData::NS { nsdname }),
            _ => None,
        },
        Ok(RecordType::CNAME) if tokens.len() == 2 => match parse_domain(origin, &tokens[1].0) {
            Ok(cname) => Some(RecordTypeWithData::CNAME { cname }),
            _ => None,
        },
        Ok(RecordType::SOA) if tokens.len() == 8 => match (
            parse_domain(origin, &tokens[1].0),
            parse_domain(origin, &tokens[2].0),
            u32::from_str(&tokens[3].0),
            u32::from_str(&tokens[4].0),
            u32::from_str(&tokens[5].0),
            u32::from_str(&tokens[6].0),
            u32::from_str(&tokens[7].0),
        ) {
            (Ok(mname), Ok(rname), Ok(serial), Ok(refresh), Ok(retry), Ok(expire), Ok(minimum)) => {
                Some(RecordTypeWithData::SOA {
                    mname,
                    rname,
                    serial,
                    refresh,
                    retry,
                    expire,
                    minimum,
                })
            }
            _ => None,
        },
        Ok(RecordType::PTR) if tokens.len() == 2 => match parse_domain(origin, &tokens[1].0) {
            Ok(ptrdname) => Some(RecordTypeWithData::PTR { ptrdname }),
            _ => None,
        },
        Ok(RecordType::MX) if tokens.len() == 3 => {
            match (
                u16::from_str(&tokens[1].0),
                parse_domain(origin, &tokens[2].0),
            ) {
                (Ok(preference), Ok(exchange)) => Some(RecordTypeWithData::MX {
                    preference,
                    exchange,
                }),
                _ => None,
            }
        }
        Ok(RecordType::TXT) if tokens.len() == 2 => Some(RecordTypeWithData::TXT {
            octets: tokens[1].1.clone().into(),
        }),
        Ok(RecordType::AAAA) if tokens.len() == 2 => match Ipv6Addr::from_str(&tokens[1].0) {
            Ok(address) => Some(RecordTypeWithData::AAAA { address }),
            _ => None,
        },
        Ok(RecordType::SRV) if tokens.len() == 5 => match (
            u16::from_str(&tokens[1].0),
            u16::from_str(&tokens[2].0),
            u16::from_str(&tokens[3].0),
            parse_domain(origin, &tokens[4].0),
        ) {
            (Ok(priority), Ok(weight), Ok(port), Ok(target)) => Some(RecordTypeWithData::SRV {
                priority,
                weight,
                port,
                target,
            }),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a domain name, appending the origin if it's not absolute.
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_domain(origin: &Option<DomainName>, dotted_string: &str) -> Result<DomainName, Error> {
    if dotted_string.is_empty() || !dotted_string.is_ascii() {
        return Err(Error::ExpectedDomainName {
            dotted_string: dotted_string.to_string(),
        });
    }

    if dotted_string == "@" {
        return origin.clone().ok_or(Error::ExpectedOrigin);
    }

    let parsed = if dotted_string.ends_with('.') {
        DomainName::from_dotted_string(dotted_string)
    } else if let Some(name) = origin {
        DomainName::from_relative_dotted_string(name, dotted_string)
    } else {
        return Err(Error::ExpectedOrigin);
    };

    parsed.ok_or_else(|| Error::ExpectedDomainName {
        dotted_string: dotted_string.to_string(),
    })
}

/// Parse a decimal number into a u32.
///
/// # Errors
///
/// If the string cannot be parsed.
fn parse_u32(digits: &str) -> Result<u32, Error> {
    if let Ok(val) = u32::from_str(digits) {
        Ok(val)
    } else {
        Err(Error::ExpectedU32 {
            digits: digits.to_string(),
        })
    }
}

/// Split an entry into tokens: split on whitespace, taking quoting
/// into account, and if there are parentheses or quotes continue to
/// the matched delimiter.
///
/// # Errors
///
/// If the string cannot be parsed.
fn tokenise_entry<I: Iterator<Item = char>>(
    stream: &mut Peekable<I>,
) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut token_string = String::new();
    let mut token_octets = Vec::new();
    let mut state = State::Initial;
    let mut line_continuation = false;

    while let Some(c) = stream.next() {
        state = match (state, c) {
            (State::Initial | State::SkipToEndOfComment, '\n') => {
                if line_continuation {
                    State::Initial
                } else {
                    break;
                }
            }
            (State::SkipToEndOfComment, _) => State::SkipToEndOfComment,
            (State::Initial, ';') => State::SkipToEndOfComment,
            (State::Initial, '(') => {
                if line_continuation {
                    return Err(Error::TokeniserUnexpected { unexpected: '(' });
                }
                line_continuation = true;
                State::Initial
            }
            (State::Initial, ')') => {
                if line_continuation {
                    line_continuation = false;
                    State::Initial
                } else {
                    return Err(Error::TokeniserUnexpected { unexpected: ')' });
                }
            }
            (State::Initial, '"') => State::QuotedString,
            (State::Initial | State::UnquotedString, '\\') => {
                let octet = tokenise_escape(stream)?;
                token_string.push(octet as char);
                token_octets.push(octet);
                State::UnquotedString
            }
            (State::UnquotedString, ';' | '\n') => {
                tokens.push((token_string, token_octets));
                token_string = String::new();
                token_octets = Vec::new();
                if c == ';' {
                    State::SkipToEndOfComment
                } else if line_continuation {
                    State::Initial
                } else {
                    break;
                }
            }
            (State::UnquotedString, ')') if line_continuation => {
                tokens.push((token_string, token_octets));
                token_string = String::new();
                token_octets = Vec::new();
                line_continuation = false;
                State::Initial
            }
            (State::Initial | State::UnquotedString, c) => {
                if c.is_whitespace() {
                    if !token_string.is_empty() {
                        tokens.push((token_string, token_octets));
                        token_string = String::new();
                        token_octets = Vec::new();
                    }
                    State::Initial
                } else if c.is_ascii() {
                    token_string.push(c);
                    token_octets.push(c as u8);
                    State::UnquotedString
                } else {
                    return Err(Error::TokeniserUnexpected { unexpected: c });
                }
            }

            (State::QuotedString, '"') => {
                tokens.push((token_string, token_octets));
                token_string = String::new();
                token_octets = Vec::new();
                State::Initial
            }
            (State::QuotedString, '\\') => {
                let octet = tokenise_escape(stream)?;
                token_string.push(octet as char);
                token_octets.push(octet);
                State::QuotedString
            }
            (State::QuotedString, c) => {
                if c.is_ascii() {
                    token_string.push(c);
                    token_octets.push(c as u8);
                } else {
                    return Err(Error::TokeniserUnexpected { unexpected: c });
                }
                State::QuotedString
            }
        }
    }

    if matches!(state, State::QuotedString) {
        return Err(Error::TokeniserUnterminatedString);
    }
    if line_continuation {
        return Err(Error::TokeniserUnterminatedGroup);
    }
    if !token_string.is_empty() {
        tokens.push((token_string, token_octets));
    }

    Ok(tokens)
}

/// Tokenise an escape sequence
///
/// # Errors
///
/// If the string cannot be parsed.
fn tokenise_escape<I: Iterator<Item = char>>(stream: &mut Peekable<I>) -> Result<u8, Error> {
    let Some(c1) = stream.next() else {
        return Err(Error::TokeniserUnexpectedEscape {
            unexpected: Vec::new(),
        });
    };

    if !c1.is_ascii_digit() {
        return if c1.is_ascii() {
            Ok(c1 as u8)
        } else {
            Err(Error::TokeniserUnexpected { unexpected: c1 })
        };
    }

    let mut digits = vec![c1];
    for _ in 0..2 {
        match stream.next() {
            Some(c) => digits.push(c),
            None => return Err(Error::TokeniserUnexpectedEscape { unexpected: digits }),
        }
    }

    let num = digits
        .iter()
        .try_fold(0u32, |acc, c| c.to_digit(10).map(|d| acc * 10 + d));
    match num.map(u8::try_from) {
        Some(Ok(octet)) => Ok(octet),
        _ => Err(Error::TokeniserUnexpectedEscape { unexpected: digits }),
    }
}

/// States the tokeniser can be in
#[derive(Debug, Clone, Copy)]
enum State {
    Initial,
    SkipToEndOfComment,
    UnquotedString,
    QuotedString,
}

/// An entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Origin {
        name: DomainName,
    },
    Ttl {
        ttl: u32,
    },
    Include {
        path: String,
        origin: Option<DomainName>,
    },
    RR {
        rr: ResourceRecord,
    },
}

/// An error that can occur reading a zone file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    TokeniserUnexpected {
        unexpected: char,
    },
    TokeniserUnexpectedEscape {
        unexpected: Vec<char>,
    },
    TokeniserUnterminatedString,
    TokeniserUnterminatedGroup,
    IncludeNotSupported {
        path: String,
        origin: Option<DomainName>,
    },
    MultipleSOA,
    NotSubdomainOfApex {
        apex: DomainName,
        name: DomainName,
    },
    Unexpected {
        expected: String,
        tokens: Vec<Token>,
    },
    ExpectedU32 {
        digits: String,
    },
    ExpectedOrigin,
    ExpectedDomainName {
        dotted_string: String,
    },
    WrongLen {
        tokens: Vec<Token>,
    },
    UnsupportedType {
        rtype: String,
    },
    BadRecordData {
        tokens: Vec<Token>,
    },
    MissingType {
        tokens: Vec<Token>,
    },
    MissingTTL {
        tokens: Vec<Token>,
    },
    MissingDomainName {
        tokens: Vec<Token>,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::TokeniserUnexpected { unexpected } => write!(f, "unexpected {unexpected:?}"),
            Error::TokeniserUnexpectedEscape { unexpected } => {
                write!(f, "unexpected escape '{unexpected:?}'")
            }
            Error::TokeniserUnterminatedString => write!(f, "unterminated quoted string"),
            Error::TokeniserUnterminatedGroup => write!(f, "unterminated '(' group"),
            Error::IncludeNotSupported { .. } => write!(f, "'$INCLUDE' directive not supported"),
            Error::MultipleSOA => write!(f, "multiple SOA records, expected one or zero"),
            Error::NotSubdomainOfApex { apex, name } => {
                write!(
                    f,
                    "domain name '{name}' not a subdomain of the apex '{apex}'"
                )
            }
            Error::Unexpected { expected, .. } => write!(f, "expected '{expected}'"),
            Error::ExpectedU32 { digits } => write!(f, "expected u32, got '{digits}'"),
            Error::ExpectedOrigin => write!(f, "relative domain name used without origin"),
            Error::ExpectedDomainName { dotted_string } => {
                write!(f, "could not parse domain name '{dotted_string}'")
            }
            Error::WrongLen { .. } => write!(f, "zone file incomplete"),
            Error::UnsupportedType { rtype } => write!(f, "unsupported record type '{rtype}'"),
            Error::BadRecordData { tokens } => write!(
                f,
                "could not parse record data '{}'",
                tokens
                    .iter()
                    .map(|(s, _)| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Error::MissingType { .. } => write!(f, "missing type in record definition"),
            Error::MissingTTL { .. } => write!(f, "missing TTL in record definition"),
            Error::MissingDomainName { .. } => {
                write!(f, "missing domain name in record definition")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
