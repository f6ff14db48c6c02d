//! Column constraint clauses.
//!
//! A clause such as `NOT NULL DEFAULT NULL CHECK (column IN (1, 2, 3))` is
//! written as an ordered list of tokens:
//!
//! ```
//! use rust_sqlite_orm::{ConstrainRepr, ConstraintToken};
//!
//! let repr = ConstrainRepr::new([
//!     ConstraintToken::from("NOT NULL"),
//!     ConstraintToken::from(("DEFAULT", "NULL")),
//!     ConstraintToken::from(("CHECK", "(column IN (1, 2, 3))")),
//! ]);
//! assert_eq!(repr.as_str(), "NOT NULL DEFAULT NULL CHECK (column IN (1, 2, 3))");
//! ```
//!
//! The composer is textual; keyword semantics are left to the store.

use std::fmt;

use crate::error::DeclarationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintToken {
    Keyword(String),
    Pair(String, String),
}

impl ConstraintToken {
    pub fn keyword(&self) -> &str {
        match self {
            ConstraintToken::Keyword(keyword) | ConstraintToken::Pair(keyword, _) => keyword,
        }
    }

    fn render(&self) -> String {
        match self {
            ConstraintToken::Keyword(keyword) => keyword.clone(),
            ConstraintToken::Pair(keyword, argument) => format!("{keyword} {argument}"),
        }
    }
}

impl From<&str> for ConstraintToken {
    fn from(keyword: &str) -> Self {
        ConstraintToken::Keyword(keyword.to_string())
    }
}

impl From<String> for ConstraintToken {
    fn from(keyword: String) -> Self {
        ConstraintToken::Keyword(keyword)
    }
}

impl<K: Into<String>, A: Into<String>> From<(K, A)> for ConstraintToken {
    fn from((keyword, argument): (K, A)) -> Self {
        ConstraintToken::Pair(keyword.into(), argument.into())
    }
}

/// A rendered column constraint clause together with the tokens it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstrainRepr {
    tokens: Vec<ConstraintToken>,
    rendered: String,
}

impl ConstrainRepr {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ConstraintToken>,
    {
        let tokens: Vec<ConstraintToken> = tokens.into_iter().map(Into::into).collect();
        let mut rendered = String::new();
        for token in &tokens {
            rendered.push_str(&token.render());
            rendered.push(' ');
        }
        let rendered = rendered.trim().to_string();
        Self { tokens, rendered }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    pub fn is_empty(&self) -> bool {
        self.rendered.is_empty()
    }

    pub fn tokens(&self) -> &[ConstraintToken] {
        &self.tokens
    }

    /// Whether any token starts with `keyword`, ignoring ASCII case.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.tokens.iter().any(|token| {
            let normalized: Vec<&str> = token.keyword().split_whitespace().collect();
            let wanted: Vec<&str> = keyword.split_whitespace().collect();
            normalized.len() >= wanted.len()
                && normalized
                    .iter()
                    .zip(&wanted)
                    .all(|(have, want)| have.eq_ignore_ascii_case(want))
        })
    }

    /// Rejects tokens with a blank keyword, or a blank argument in a pair.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        for token in &self.tokens {
            let malformed = match token {
                ConstraintToken::Keyword(keyword) => keyword.trim().is_empty(),
                ConstraintToken::Pair(keyword, argument) => {
                    keyword.trim().is_empty() || argument.trim().is_empty()
                }
            };
            if malformed {
                return Err(DeclarationError::MalformedConstraint(format!("{token:?}")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConstrainRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}
