//! Dependency requirements and loose version ordering.
//!
//! Requirements look like `name`, `name==1.2.3` or `name (>=1.0)`. Only the
//! first comparison of a requirement is honoured; picking a release is a
//! single linear scan over the index listing.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

use crate::error::RequirementError;

lazy_static! {
    static ref COMPARISON: Regex = Regex::new(r"==|<=|>=|!=|<|>").unwrap();
    static ref VERSION_PART: Regex = Regex::new(r"\d+|[A-Za-z]+").unwrap();
}

/// A version comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    /// Does `candidate <op> target` hold?
    pub fn matches(&self, candidate: &Version, target: &Version) -> bool {
        let ord = candidate.cmp(target);
        match self {
            Comparison::Eq => ord == Ordering::Equal,
            Comparison::Ne => ord != Ordering::Equal,
            Comparison::Lt => ord == Ordering::Less,
            Comparison::Le => ord != Ordering::Greater,
            Comparison::Gt => ord == Ordering::Greater,
            Comparison::Ge => ord != Ordering::Less,
        }
    }

    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => Comparison::Eq,
            "!=" => Comparison::Ne,
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            _ => return None,
        })
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Num(u64),
    Alpha(String),
}

impl Ord for Part {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Part::Num(a), Part::Num(b)) => a.cmp(b),
            (Part::Alpha(a), Part::Alpha(b)) => a.cmp(b),
            // 1.0.1 sorts above 1.0rc1
            (Part::Num(_), Part::Alpha(_)) => Ordering::Greater,
            (Part::Alpha(_), Part::Num(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Part {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A loosely structured version string.
///
/// Any string parses. It is split into numeric and alphabetic runs; runs are
/// compared pairwise and a shorter prefix sorts first.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    parts: Vec<Part>,
}

impl Version {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let parts = VERSION_PART
            .find_iter(raw)
            .map(|m| match m.as_str().parse::<u64>() {
                Ok(n) => Part::Num(n),
                Err(_) => Part::Alpha(m.as_str().to_ascii_lowercase()),
            })
            .collect();
        Version {
            raw: raw.to_string(),
            parts,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A package name with an optional version comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub constraint: Option<(Comparison, Version)>,
}

impl Requirement {
    pub fn any(name: impl Into<String>) -> Self {
        Requirement {
            name: name.into(),
            constraint: None,
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        match &self.constraint {
            Some((op, target)) => op.matches(version, target),
            None => true,
        }
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    /// Parse `name`, `name==1.2` or `name (>=1.0)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '(' && *c != ')')
            .collect();
        if compact.is_empty() {
            return Err(RequirementError::Empty);
        }

        let Some(op) = COMPARISON.find(&compact) else {
            return Ok(Requirement::any(compact));
        };

        let name = &compact[..op.start()];
        if name.is_empty() {
            return Err(RequirementError::MissingName(s.trim().to_string()));
        }

        // the version runs up to a `,` or the next comparison
        let rest = &compact[op.end()..];
        let end = rest
            .find(',')
            .into_iter()
            .chain(COMPARISON.find(rest).map(|m| m.start()))
            .min()
            .unwrap_or(rest.len());
        let version = &rest[..end];
        if version.is_empty() {
            return Err(RequirementError::MissingVersion(s.trim().to_string()));
        }
        if end < rest.len() {
            debug!(requirement = s, "ignoring all but the first comparison");
        }

        let comparison = Comparison::parse(op.as_str())
            .ok_or_else(|| RequirementError::MissingVersion(s.trim().to_string()))?;
        Ok(Requirement {
            name: name.to_string(),
            constraint: Some((comparison, Version::parse(version))),
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.constraint {
            Some((op, version)) => write!(f, "{}{}{}", self.name, op, version),
            None => f.write_str(&self.name),
        }
    }
}

/// Pick a release for `requirement` from an index listing.
///
/// The listing is expected most recent first. Without a constraint the first
/// release is taken; otherwise the first one satisfying the comparison.
pub fn select_release<'a>(available: &'a [String], requirement: &Requirement) -> Option<&'a str> {
    available
        .iter()
        .find(|v| requirement.matches(&Version::parse(v)))
        .map(String::as_str)
}
