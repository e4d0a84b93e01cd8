//! Reading and editing the zone list in a BIND configuration file.
//!
//! Only zone statements of this exact shape are understood:
//!
//! ```text
//! zone "<domain>" {
//!     type <type>;
//!     file "<path>";
//! };
//! ```
//!
//! Everything else in the file (options, comments, zone statements
//! with other clauses) is kept as opaque text, so that the file can be
//! written back byte for byte with only the intended edits.

use std::fs;
use std::path::Path;

use crate::error::Error;

/// A configuration file, as a sequence of blocks.  Concatenating the
/// blocks gives back the original text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedConf {
    blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Zone(ZoneEntry),
    Text(String),
}

/// A recognised zone statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneEntry {
    /// The zone name as written, without a final dot.
    pub domain: String,
    pub zone_type: String,
    pub file: String,

    /// The statement exactly as it appears in the file, including any
    /// whitespace after it.
    raw: String,
}

impl ZoneEntry {
    /// A new entry in the standard layout, followed by a newline.
    pub fn new(domain: &str, zone_type: &str, file: &str) -> Self {
        Self {
            domain: domain.to_string(),
            zone_type: zone_type.to_string(),
            file: file.to_string(),
            raw: format!("zone \"{domain}\" {{\n    type {zone_type};\n    file \"{file}\";\n}};\n"),
        }
    }
}

impl NamedConf {
    pub fn parse(text: &str) -> Self {
        let mut blocks = Vec::new();
        let mut text_start = 0;
        let mut pos = 0;

        while pos < text.len() {
            let at_line_start = pos == 0 || text.as_bytes()[pos - 1] == b'\n';
            if at_line_start {
                if let Some(entry) = match_zone_entry(&text[pos..]) {
                    if text_start < pos {
                        blocks.push(Block::Text(text[text_start..pos].to_string()));
                    }
                    pos += entry.raw.len();
                    text_start = pos;
                    blocks.push(Block::Zone(entry));
                    continue;
                }
            }

            pos = match text[pos..].find('\n') {
                Some(i) => pos + i + 1,
                None => text.len(),
            };
        }

        if text_start < text.len() {
            blocks.push(Block::Text(text[text_start..].to_string()));
        }

        Self { blocks }
    }

    pub fn serialise(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Zone(entry) => out.push_str(&entry.raw),
                Block::Text(text) => out.push_str(text),
            }
        }
        out
    }

    /// All the recognised zone entries, in file order.
    pub fn zones(&self) -> impl Iterator<Item = &ZoneEntry> {
        self.blocks.iter().filter_map(|block| match block {
            Block::Zone(entry) => Some(entry),
            Block::Text(_) => None,
        })
    }

    /// Check if there is an entry for a zone.  The name is compared
    /// exactly, so it must not have a final dot.
    pub fn contains(&self, domain: &str) -> bool {
        self.zones().any(|entry| entry.domain == domain)
    }

    /// Add an entry to the end of the file.  If the file does not end
    /// with a newline one is added first, so the entry starts on its
    /// own line.
    pub fn append(&mut self, entry: ZoneEntry) {
        let needs_newline = match self.blocks.last() {
            Some(Block::Text(text)) => !text.ends_with('\n'),
            Some(Block::Zone(entry)) => !entry.raw.ends_with('\n'),
            None => false,
        };
        if needs_newline {
            self.blocks.push(Block::Text("\n".to_string()));
        }
        self.blocks.push(Block::Zone(entry));
    }

    /// Remove every entry for a zone, whatever its type and file.
    /// Returns how many were removed.
    pub fn remove(&mut self, domain: &str) -> usize {
        let before = self.blocks.len();
        self.blocks
            .retain(|block| !matches!(block, Block::Zone(entry) if entry.domain == domain));
        before - self.blocks.len()
    }

    pub fn read(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(Error::io(path))?;
        Ok(Self::parse(&text))
    }

    pub fn write(&self, path: &Path) -> Result<(), Error> {
        fs::write(path, self.serialise()).map_err(Error::io(path))
    }
}

/// Try to match a zone statement at the start of the input.  Each
/// field ends at the earliest terminator on its line which lets the
/// rest of the statement match, and the clauses may be separated by
/// any whitespace, including newlines.
fn match_zone_entry(input: &str) -> Option<ZoneEntry> {
    let rest = input.strip_prefix("zone \"")?;
    let name_end = first_line(rest).find("\" {")?;
    let domain = &rest[..name_end];
    let after_brace = &rest[name_end + 3..];

    clause_starts(after_brace, "type ").find_map(|rest| {
        ends_on_line(rest, ";").find_map(|type_end| {
            let zone_type = &rest[..type_end];
            let rest = skip_whitespace1(&rest[type_end + 1..])?.strip_prefix("file \"")?;

            ends_on_line(rest, "\";").find_map(|file_end| {
                let file = &rest[..file_end];
                let rest = skip_whitespace1(&rest[file_end + 2..])?.strip_prefix("};")?;
                let rest = rest.trim_start();

                Some(ZoneEntry {
                    domain: domain.to_string(),
                    zone_type: zone_type.to_string(),
                    file: file.to_string(),
                    raw: input[..input.len() - rest.len()].to_string(),
                })
            })
        })
    })
}

/// Every way of skipping some text on the current line, then at least
/// one whitespace character, then the clause keyword.  Yields what
/// follows the keyword, shortest skip first.
fn clause_starts<'a>(input: &'a str, keyword: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    let line = first_line(input);
    line.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(line.len()))
        .filter_map(move |i| skip_whitespace1(&input[i..])?.strip_prefix(keyword))
}

/// Positions of a terminator on the current line, in order.
fn ends_on_line<'a>(input: &'a str, terminator: &'a str) -> impl Iterator<Item = usize> + 'a {
    first_line(input).match_indices(terminator).map(|(i, _)| i)
}

/// Skip one or more whitespace characters.
fn skip_whitespace1(input: &str) -> Option<&str> {
    let rest = input.trim_start();
    if rest.len() < input.len() {
        Some(rest)
    } else {
        None
    }
}

fn first_line(input: &str) -> &str {
    match input.find('\n') {
        Some(i) => &input[..i],
        None => input,
    }
}
