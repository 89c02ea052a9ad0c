//! Citation marker tags.
//!
//! Hosts store a marker's meaning as a plain string tag. This module is the
//! only place that knows the string layout:
//!
//! - `cite:<id>` for a single citation
//! - `group:<id>,<id>,...` for a grouped citation (ids in display order,
//!   repeats allowed)

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::library::is_valid_id;

/// Errors that can occur when decoding a marker tag.
#[derive(Error, Debug, PartialEq)]
pub enum MarkerError {
    #[error("Not a citation tag: {0:?}")]
    NotACitation(String),

    #[error("Invalid citation id in tag: {0:?}")]
    InvalidId(String),

    #[error("Group tag contains no valid ids: {0:?}")]
    EmptyGroup(String),
}

/// Decoded marker tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Single { id: String },
    Group { ids: Vec<String> },
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(cite|group):(.*)$").expect("tag regex is valid"))
}

impl Marker {
    pub fn single(id: impl Into<String>) -> Self {
        Marker::Single { id: id.into() }
    }

    pub fn group<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Marker::Group {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Decodes a tag string.
    ///
    /// Group tags silently drop blank or malformed ids; a group left with no
    /// ids at all is an error.
    pub fn decode(tag: &str) -> Result<Marker, MarkerError> {
        let cap = tag_regex()
            .captures(tag)
            .ok_or_else(|| MarkerError::NotACitation(tag.to_string()))?;
        let kind = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
        let body = cap.get(2).map(|m| m.as_str()).unwrap_or_default().trim();

        if kind == "cite" {
            if !is_valid_id(body) {
                return Err(MarkerError::InvalidId(tag.to_string()));
            }
            return Ok(Marker::single(body));
        }

        let ids: Vec<String> = body
            .split(',')
            .map(str::trim)
            .filter(|id| is_valid_id(id))
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Err(MarkerError::EmptyGroup(tag.to_string()));
        }
        Ok(Marker::Group { ids })
    }

    pub fn encode(&self) -> String {
        match self {
            Marker::Single { id } => format!("cite:{}", id),
            Marker::Group { ids } => format!("group:{}", ids.join(",")),
        }
    }

    /// The ids this marker cites, in display order.
    pub fn ids(&self) -> &[String] {
        match self {
            Marker::Single { id } => std::slice::from_ref(id),
            Marker::Group { ids } => ids,
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, Marker::Single { .. })
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
