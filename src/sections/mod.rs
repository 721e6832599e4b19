//! Section-addressable documents.
//!
//! A document is split into uniquely named regions delimited by HTML comment
//! markers:
//!
//! ```text
//! <!-- START: hero -->
//! <section class="hero">...</section>
//! <!-- END: hero -->
//! ```
//!
//! The marker keyword is case-insensitive and whitespace-tolerant; section
//! names are normalized to lowercase. Everything outside a marker pair is kept
//! as interstitial text, so rendering a parsed [`Document`] reproduces the
//! input byte for byte.

pub mod layout;

use crate::errors::SectionError;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

pub use layout::{
    SECTION_ORDER, SectionMetadata, StructureReport, describe, inspect, related_sections,
    semantic_order,
};

static MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<!--\s*(START|END)\s*:\s*([A-Za-z0-9_-]+)\s*-->").unwrap()
});

/// Returns true if `text` contains anything that looks like a section marker.
pub fn contains_marker(text: &str) -> bool {
    MARKER_REGEX.is_match(text)
}

/// Marker occurrences in document order: `(offset, is_start, lowercase name, raw text)`.
pub(crate) fn scan_markers(text: &str) -> Vec<(usize, bool, String, &str)> {
    MARKER_REGEX
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let is_start = caps[1].eq_ignore_ascii_case("start");
            Some((whole.start(), is_start, caps[2].to_ascii_lowercase(), whole.as_str()))
        })
        .collect()
}

/// A named region of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Lowercase section name, unique within its document
    pub name: String,
    /// Content between the start and end markers, verbatim
    pub body: String,
    /// Zero-based position among the document's sections
    pub order: usize,
    start_marker: String,
    end_marker: String,
}

impl Section {
    /// Render the section including its markers.
    pub fn render(&self) -> String {
        format!("{}{}{}", self.start_marker, self.body, self.end_marker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Section(Section),
}

/// An ordered sequence of sections and the interstitial text around them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    segments: Vec<Segment>,
}

struct OpenMarker<'a> {
    name: String,
    marker: &'a str,
    offset: usize,
    body_start: usize,
}

impl Document {
    /// Parse a document into sections.
    ///
    /// Fails with [`SectionError::MalformedMarkers`] on an END marker without
    /// a matching START, a START left unclosed, an END naming a different
    /// section than the open one, nested sections, or a repeated name.
    pub fn parse(text: &str) -> Result<Self, SectionError> {
        let mut segments = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cursor = 0;
        let mut open: Option<OpenMarker<'_>> = None;

        for caps in MARKER_REGEX.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let is_start = caps[1].eq_ignore_ascii_case("start");
            let name = caps[2].to_ascii_lowercase();

            match (is_start, open.take()) {
                (true, None) => {
                    if seen.contains(&name) {
                        return Err(malformed(
                            whole.start(),
                            format!("duplicate section '{}'", name),
                        ));
                    }
                    if whole.start() > cursor {
                        segments.push(Segment::Text(text[cursor..whole.start()].to_string()));
                    }
                    open = Some(OpenMarker {
                        name,
                        marker: whole.as_str(),
                        offset: whole.start(),
                        body_start: whole.end(),
                    });
                }
                (true, Some(outer)) => {
                    return Err(malformed(
                        whole.start(),
                        format!("section '{}' starts inside section '{}'", name, outer.name),
                    ));
                }
                (false, None) => {
                    return Err(malformed(
                        whole.start(),
                        format!("END marker for '{}' has no matching START", name),
                    ));
                }
                (false, Some(current)) => {
                    if current.name != name {
                        return Err(malformed(
                            whole.start(),
                            format!(
                                "section '{}' is closed by an END marker for '{}'",
                                current.name, name
                            ),
                        ));
                    }
                    seen.insert(name.clone());
                    segments.push(Segment::Section(Section {
                        name,
                        body: text[current.body_start..whole.start()].to_string(),
                        order: seen.len() - 1,
                        start_marker: current.marker.to_string(),
                        end_marker: whole.as_str().to_string(),
                    }));
                    cursor = whole.end();
                }
            }
        }

        if let Some(unclosed) = open {
            return Err(malformed(
                unclosed.offset,
                format!("section '{}' is never closed", unclosed.name),
            ));
        }

        if cursor < text.len() {
            segments.push(Segment::Text(text[cursor..].to_string()));
        }

        Ok(Self { segments })
    }

    /// Reassemble the document text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Section(section) => {
                    out.push_str(&section.start_marker);
                    out.push_str(&section.body);
                    out.push_str(&section.end_marker);
                }
            }
        }
        out
    }

    /// Sections in document order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Section(section) => Some(section),
            Segment::Text(_) => None,
        })
    }

    /// Section names in document order.
    pub fn names(&self) -> Vec<String> {
        self.sections().map(|s| s.name.clone()).collect()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        let name = name.to_ascii_lowercase();
        self.sections().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.section(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.sections().next().is_none()
    }

    /// Bodies of the named sections, keyed by lowercase name.
    pub fn extract<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeMap<String, String>, SectionError> {
        let mut bodies = BTreeMap::new();
        for name in names {
            let section = self
                .section(name.as_ref())
                .ok_or_else(|| self.unknown(name.as_ref()))?;
            bodies.insert(section.name.clone(), section.body.clone());
        }
        Ok(bodies)
    }

    /// Replace the bodies of the named sections and return the new document.
    ///
    /// Total or nothing: an unknown name, a replacement that contains a
    /// marker, or a result that does not re-parse to the same section list
    /// fails the whole merge and leaves `self` untouched.
    pub fn merge(&self, replacements: &BTreeMap<String, String>) -> Result<Document, SectionError> {
        let mut normalized: BTreeMap<String, &str> = BTreeMap::new();
        for (name, body) in replacements {
            let key = name.to_ascii_lowercase();
            if !self.contains(&key) {
                return Err(self.unknown(name));
            }
            if contains_marker(body) {
                return Err(SectionError::MergeInvariantViolation {
                    reason: format!("replacement for '{}' contains a section marker", key),
                });
            }
            if normalized.insert(key.clone(), body.as_str()).is_some() {
                return Err(SectionError::MergeInvariantViolation {
                    reason: format!("section '{}' was supplied more than once", key),
                });
            }
        }

        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Section(section) => match normalized.get(&section.name) {
                    Some(body) => Segment::Section(Section {
                        body: (*body).to_string(),
                        ..section.clone()
                    }),
                    None => segment.clone(),
                },
                Segment::Text(_) => segment.clone(),
            })
            .collect();
        let merged = Document { segments };

        let reparsed = Document::parse(&merged.render()).map_err(|e| {
            SectionError::MergeInvariantViolation {
                reason: format!("merged document no longer parses: {}", e),
            }
        })?;
        if reparsed.names() != self.names() || reparsed != merged {
            return Err(SectionError::MergeInvariantViolation {
                reason: "merged document changed its section structure".to_string(),
            });
        }

        Ok(reparsed)
    }

    /// Names of sections whose bodies differ from `other`, plus sections
    /// present in only one of the two documents.
    pub fn changed_sections(&self, other: &Document) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for section in self.sections() {
            match other.section(&section.name) {
                Some(theirs) if theirs.body == section.body => {}
                _ => {
                    changed.insert(section.name.clone());
                }
            }
        }
        for section in other.sections() {
            if !self.contains(&section.name) {
                changed.insert(section.name.clone());
            }
        }
        changed
    }

    fn unknown(&self, name: &str) -> SectionError {
        SectionError::UnknownSection {
            name: name.to_ascii_lowercase(),
            available: self.names(),
        }
    }
}

fn malformed(offset: usize, reason: String) -> SectionError {
    SectionError::MalformedMarkers { offset, reason }
}
