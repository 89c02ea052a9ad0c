//! Citation style selection.
//!
//! Styles form a small closed set split into two behavioural classes.
//! Numeric-class styles label citations by their first-appearance number and
//! keep the bibliography in citation order; author-year styles label by
//! surname and year and sort the bibliography alphabetically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::warn;

use crate::formatter::{CitationClass, AUTHOR_YEAR, NUMERIC};

/// Errors that can occur when naming a style.
#[derive(Error, Debug, PartialEq)]
pub enum StyleError {
    #[error("Unknown citation style: {0}")]
    Unknown(String),
}

/// A supported citation style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Style {
    #[default]
    Apa,
    Mla,
    Harvard,
    Acs,
    Ieee,
    Numeric,
    Vancouver,
}

/// Single source of truth for style names.
const STYLES: &[(&str, Style)] = &[
    ("apa", Style::Apa),
    ("mla", Style::Mla),
    ("harvard", Style::Harvard),
    ("acs", Style::Acs),
    ("ieee", Style::Ieee),
    ("numeric", Style::Numeric),
    ("vancouver", Style::Vancouver),
];

impl Style {
    pub fn name(self) -> &'static str {
        STYLES
            .iter()
            .find(|(_, s)| *s == self)
            .map(|(n, _)| *n)
            .unwrap_or("apa")
    }

    /// Resolves a style name case-insensitively, falling back to APA when the
    /// name is absent or unrecognized.
    pub fn resolve(name: Option<&str>) -> Style {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Style::default(),
            Some(n) => n.parse().unwrap_or_else(|_| {
                warn!(style = n, "unrecognized citation style, using apa");
                Style::default()
            }),
        }
    }

    /// True for `ieee`, `numeric`, `vancouver` and `acs`.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Style::Ieee | Style::Numeric | Style::Vancouver | Style::Acs
        )
    }

    /// The behaviour shared by every style of this style's class.
    pub fn class(self) -> &'static dyn CitationClass {
        if self.is_numeric() {
            &NUMERIC
        } else {
            &AUTHOR_YEAR
        }
    }
}

impl FromStr for Style {
    type Err = StyleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        STYLES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(wanted))
            .map(|(_, s)| *s)
            .ok_or_else(|| StyleError::Unknown(s.to_string()))
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Style {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Style::resolve(Some(&name)))
    }
}

/// Returns the list of available style names.
pub fn style_names() -> Vec<&'static str> {
    STYLES.iter().map(|(n, _)| *n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("IEEE".parse::<Style>(), Ok(Style::Ieee));
        assert_eq!(" Vancouver ".parse::<Style>(), Ok(Style::Vancouver));
    }

    #[test]
    fn test_parse_unknown_style() {
        let err = "chicago".parse::<Style>().unwrap_err();
        assert_eq!(err, StyleError::Unknown("chicago".to_string()));
    }

    #[test]
    fn test_resolve_defaults_to_apa() {
        assert_eq!(Style::resolve(None), Style::Apa);
        assert_eq!(Style::resolve(Some("")), Style::Apa);
        assert_eq!(Style::resolve(Some("chicago")), Style::Apa);
        assert_eq!(Style::resolve(Some("Harvard")), Style::Harvard);
    }

    #[test]
    fn test_numeric_partition() {
        let numeric: Vec<&str> = style_names()
            .into_iter()
            .filter(|n| n.parse::<Style>().unwrap().is_numeric())
            .collect();
        assert_eq!(numeric, vec!["acs", "ieee", "numeric", "vancouver"]);
    }

    #[test]
    fn test_style_names_all_resolve() {
        // Every listed name must parse back to a style with the same name
        for name in style_names() {
            let style: Style = name.parse().unwrap();
            assert_eq!(style.name(), name);
        }
    }

    #[test]
    fn test_deserialize_lenient() {
        #[derive(Deserialize)]
        struct Holder {
            style: Style,
        }
        let holder: Holder = toml::from_str(r#"style = "MLA""#).unwrap();
        assert_eq!(holder.style, Style::Mla);
        let holder: Holder = toml::from_str(r#"style = "bogus""#).unwrap();
        assert_eq!(holder.style, Style::Apa);
    }
}
