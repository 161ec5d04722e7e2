//! Whitelist/blacklist policy deciding which actions need a nonce.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Written form of [`ActionPattern::Any`].
pub const WILDCARD: &str = "*";

/// A single action pattern: either a literal name or the wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPattern {
    /// Matches every action, including an empty one.
    Any,
    /// Matches exactly this action name (case-sensitive).
    Literal(String),
}

impl ActionPattern {
    #[must_use]
    pub fn matches(&self, action: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(name) => name == action,
        }
    }
}

impl FromStr for ActionPattern {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for ActionPattern {
    fn from(s: &str) -> Self {
        if s == WILDCARD {
            Self::Any
        } else {
            Self::Literal(s.to_owned())
        }
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::Literal(name) => f.write_str(name),
        }
    }
}

/// Immutable action policy. An action requires a nonce when it matches some
/// whitelist pattern and no blacklist pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionFilter {
    whitelist: Vec<ActionPattern>,
    blacklist: Vec<ActionPattern>,
}

impl ActionFilter {
    #[must_use]
    pub const fn new(whitelist: Vec<ActionPattern>, blacklist: Vec<ActionPattern>) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    /// Build a filter from the string form used in configuration.
    #[must_use]
    pub fn from_patterns<S: AsRef<str>>(whitelist: &[S], blacklist: &[S]) -> Self {
        Self::new(
            whitelist.iter().map(|p| ActionPattern::from(p.as_ref())).collect(),
            blacklist.iter().map(|p| ActionPattern::from(p.as_ref())).collect(),
        )
    }

    /// Filter that puts every action in scope.
    #[must_use]
    pub fn match_all() -> Self {
        Self::new(vec![ActionPattern::Any], Vec::new())
    }

    #[must_use]
    pub fn whitelist(&self) -> &[ActionPattern] {
        &self.whitelist
    }

    #[must_use]
    pub fn blacklist(&self) -> &[ActionPattern] {
        &self.blacklist
    }

    /// Whether `action` is subject to nonce checking.
    #[must_use]
    pub fn requires_check(&self, action: &str) -> bool {
        self.whitelist.iter().any(|p| p.matches(action))
            && !self.blacklist.iter().any(|p| p.matches(action))
    }
}
