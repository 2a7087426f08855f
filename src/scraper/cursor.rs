//! Continuation token bookkeeping for one pagination run.

use std::collections::HashSet;
use std::fmt;

/// Independent pagination dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Posts,
    Comments,
    Replies,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Replies => "replies",
        })
    }
}

/// A token admitted for exactly one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationCursor {
    pub token: String,
    pub scope: Scope,
}

/// Tokens already consumed within one scope of one run.
///
/// A token is admitted at most once, so a server that hands back a token
/// it already issued ends the loop instead of cycling.
#[derive(Debug)]
pub struct CursorLedger {
    scope: Scope,
    consumed: HashSet<String>,
}

impl CursorLedger {
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            consumed: HashSet::new(),
        }
    }

    /// Admit `token` for fetching, or `None` if it is empty or was already
    /// consumed.
    pub fn admit(&mut self, token: Option<String>) -> Option<PaginationCursor> {
        let token = token.filter(|t| !t.is_empty())?;
        if !self.consumed.insert(token.clone()) {
            tracing::debug!(scope = %self.scope, "Continuation token already consumed, stopping");
            return None;
        }
        Some(PaginationCursor {
            token,
            scope: self.scope,
        })
    }

    #[must_use]
    pub fn consumed(&self) -> usize {
        self.consumed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_admitted_once() {
        let mut ledger = CursorLedger::new(Scope::Comments);
        let cursor = ledger.admit(Some("T1".to_string())).unwrap();
        assert_eq!(cursor.token, "T1");
        assert_eq!(cursor.scope, Scope::Comments);

        assert!(ledger.admit(Some("T1".to_string())).is_none());
        assert!(ledger.admit(Some("T2".to_string())).is_some());
        assert_eq!(ledger.consumed(), 2);
    }

    #[test]
    fn test_empty_and_missing_tokens_end_pagination() {
        let mut ledger = CursorLedger::new(Scope::Posts);
        assert!(ledger.admit(None).is_none());
        assert!(ledger.admit(Some(String::new())).is_none());
        assert_eq!(ledger.consumed(), 0);
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(Scope::Replies.to_string(), "replies");
    }
}
