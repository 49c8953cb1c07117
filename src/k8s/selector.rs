//! Label selectors (`key=value,key!=value`)

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Equals(String, String),
    NotEquals(String, String),
}

/// A conjunction of label requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    terms: Vec<Term>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key=value`
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push(Term::Equals(key.into(), value.into()));
        self
    }

    /// Require `key!=value` (also matched by objects without the label)
    pub fn ne(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.terms.push(Term::NotEquals(key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match term {
                Term::Equals(key, value) => write!(f, "{}={}", key, value)?,
                Term::NotEquals(key, value) => write!(f, "{}!={}", key, value)?,
            }
        }
        Ok(())
    }
}
