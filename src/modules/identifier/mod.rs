//! Citizen identifier normalization.
//!
//! Every cache and audit key goes through [`Identifier::normalize`], so two
//! spellings of the same ID ("1-2345-6789", " 123456789 ") collapse onto one
//! entry.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier is empty after normalization")]
    Empty,
}

/// Normalized citizen ID: hyphens removed, surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Normalizes raw user input. Idempotent.
    pub fn normalize(raw: &str) -> Result<Self, IdentifierError> {
        let cleaned: String = raw.replace('-', "").trim().to_string();
        if cleaned.is_empty() {
            return Err(IdentifierError::Empty);
        }
        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hyphens_and_whitespace() {
        let a = Identifier::normalize("1-2345-6789").unwrap();
        let b = Identifier::normalize("123456789 ").unwrap();
        let c = Identifier::normalize("  1-2345-6789\t").unwrap();
        assert_eq!(a.as_str(), "123456789");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in ["012345678-9", " 1-0000-0001 ", "123456789", "9-99"] {
            let once = Identifier::normalize(raw).unwrap();
            let twice = Identifier::normalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn rejects_blank_input() {
        assert_eq!(Identifier::normalize("  - - "), Err(IdentifierError::Empty));
        assert_eq!(Identifier::normalize(""), Err(IdentifierError::Empty));
    }
}
