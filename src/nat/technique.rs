// src/nat/technique.rs
//! Traversal technique decision table.
//!
//! Maps every classified [`NatSituation`] to the techniques known to traverse
//! it. The table is built from a line-oriented resource:
//!
//! ```text
//! # comment
//! [connection_reversal]
//! ENDPOINT_INDEPENDENT ENDPOINT_INDEPENDENT CONNECTION_DEPENDENT CONNECTION_DEPENDENT
//! * NOT_REALIZED|ENDPOINT_INDEPENDENT * *
//! ```
//!
//! A record holds source mapping, source filtering, target mapping and target
//! filtering. `*` stands for every value and `A|B` for alternatives; a record
//! expands to all exact situations it covers. Parsing is all-or-nothing.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::nat::error::TableError;
use crate::nat::situation::{NatFeatureRealization, NatSituation};

/// Embedded default table
const BUILTIN_TABLE: &str = include_str!("../../resources/traversal_table.txt");

static BUILTIN: OnceLock<Result<Arc<TechniqueTable>, TableError>> = OnceLock::new();

/// NAT traversal technique, ordered by preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    /// Source connects straight to the target
    DirectConnection,

    /// Target connects back to the listening source, signalled by the mediator
    ConnectionReversal,

    /// Both sides open mappings simultaneously
    HolePunching,

    /// All data forwarded through a public relay
    Relay,
}

impl Technique {
    /// Every technique, in preference order
    pub const ALL: [Technique; 4] = [
        Self::DirectConnection,
        Self::ConnectionReversal,
        Self::HolePunching,
        Self::Relay,
    ];

    /// Section name used in table resources
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectConnection => "direct_connection",
            Self::ConnectionReversal => "connection_reversal",
            Self::HolePunching => "hole_punching",
            Self::Relay => "relay",
        }
    }

    /// Technique for a section name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Technique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full cartesian product of the feature algebra, independent of any resource
pub fn all_possible_situations() -> HashSet<NatSituation> {
    NatSituation::all().collect()
}

/// Parse a header-less situation list (one technique's resource)
pub fn parse_situations(text: &str) -> Result<HashSet<NatSituation>, TableError> {
    let mut situations = HashSet::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let content = strip_comment(raw);
        if content.is_empty() {
            continue;
        }
        if content.starts_with('[') {
            return Err(TableError::Malformed {
                line,
                reason: "section header in situation list".to_string(),
            });
        }
        situations.extend(parse_record(line, content)?);
    }

    Ok(situations)
}

fn strip_comment(raw: &str) -> &str {
    match raw.find('#') {
        Some(pos) => raw[..pos].trim(),
        None => raw.trim(),
    }
}

fn parse_record(line: usize, content: &str) -> Result<Vec<NatSituation>, TableError> {
    let fields: Vec<&str> = content
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|f| !f.is_empty())
        .collect();

    if fields.len() != 4 {
        return Err(TableError::Malformed {
            line,
            reason: format!("expected 4 fields, found {}", fields.len()),
        });
    }

    let axes = fields
        .iter()
        .map(|field| parse_field(line, field))
        .collect::<Result<Vec<_>, _>>()?;

    let mut situations = Vec::new();
    for &sm in &axes[0] {
        for &sf in &axes[1] {
            for &tm in &axes[2] {
                for &tf in &axes[3] {
                    situations.push(NatSituation::new(sm, sf, tm, tf));
                }
            }
        }
    }
    Ok(situations)
}

fn parse_field(line: usize, field: &str) -> Result<Vec<NatFeatureRealization>, TableError> {
    if field == "*" {
        return Ok(NatFeatureRealization::ALL.to_vec());
    }

    field
        .split('|')
        .map(|name| {
            name.parse::<NatFeatureRealization>()
                .map_err(|_| TableError::UnknownFeature {
                    line,
                    name: name.to_string(),
                })
        })
        .collect()
}

/// Structured table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableEntry {
    situation: NatSituation,
    techniques: Vec<Technique>,
}

/// Read-only mapping from situation to the techniques known to traverse it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TechniqueTable {
    entries: HashMap<NatSituation, BTreeSet<Technique>>,
}

impl TechniqueTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a technique for a situation; repeated registration is a no-op
    pub fn insert(&mut self, situation: NatSituation, technique: Technique) {
        self.entries.entry(situation).or_default().insert(technique);
    }

    /// Parse the sectioned text form
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut table = Self::new();
        let mut section: Option<Technique> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let content = strip_comment(raw);
            if content.is_empty() {
                continue;
            }

            if let Some(header) = content.strip_prefix('[') {
                let name = header.strip_suffix(']').ok_or_else(|| TableError::Malformed {
                    line,
                    reason: "unterminated section header".to_string(),
                })?;
                let technique = Technique::from_name(name.trim()).ok_or_else(|| {
                    TableError::UnknownTechnique {
                        line,
                        name: name.trim().to_string(),
                    }
                })?;
                section = Some(technique);
                continue;
            }

            let technique = section.ok_or(TableError::MissingSection { line })?;
            for situation in parse_record(line, content)? {
                table.insert(situation, technique);
            }
        }

        tracing::debug!("Parsed technique table with {} situations", table.len());
        Ok(table)
    }

    /// Parse the JSON form.
    ///
    /// A later entry for the same situation replaces an earlier one; an entry
    /// with no techniques removes the situation.
    pub fn from_json(text: &str) -> Result<Self, TableError> {
        let entries: Vec<TableEntry> =
            serde_json::from_str(text).map_err(|e| TableError::Json(e.to_string()))?;

        let mut table = Self::new();
        for entry in entries {
            if entry.techniques.is_empty() {
                table.entries.remove(&entry.situation);
            } else {
                table
                    .entries
                    .insert(entry.situation, entry.techniques.into_iter().collect());
            }
        }
        Ok(table)
    }

    /// Process-wide table parsed once from the embedded resource
    pub fn builtin() -> Result<Arc<Self>, TableError> {
        BUILTIN
            .get_or_init(|| {
                let table = Self::parse(BUILTIN_TABLE).map(Arc::new);
                match &table {
                    Ok(t) => tracing::info!("Loaded built-in technique table ({} situations)", t.len()),
                    Err(e) => tracing::error!("Built-in technique table is invalid: {}", e),
                }
                table
            })
            .clone()
    }

    /// Techniques registered for exactly this situation
    pub fn lookup(&self, situation: &NatSituation) -> Option<&BTreeSet<Technique>> {
        self.entries.get(situation).filter(|set| !set.is_empty())
    }

    /// Techniques to attempt in preference order, relay always last resort
    pub fn candidates(&self, situation: &NatSituation) -> Vec<Technique> {
        let mut candidates: Vec<Technique> = self
            .lookup(situation)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        if !candidates.contains(&Technique::Relay) {
            tracing::debug!("No relay entry for {}, appending fallback", situation);
            candidates.push(Technique::Relay);
        }
        candidates
    }

    /// Situations the given technique is registered for
    pub fn supported_by(&self, technique: Technique) -> HashSet<NatSituation> {
        self.entries
            .iter()
            .filter(|(_, set)| set.contains(&technique))
            .map(|(situation, _)| *situation)
            .collect()
    }

    /// Situations with at least one technique
    pub fn situations(&self) -> impl Iterator<Item = &NatSituation> {
        self.entries.keys()
    }

    /// Number of situations with at least one technique
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No situation registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
