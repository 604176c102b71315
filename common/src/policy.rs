use std::collections::HashSet;
use std::fs;

use anyhow::Result;

/// Outcome of classifying one grant against the policy lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Whitelisted,
    Blacklisted,
    Unclassified,
}

/// Whitelist/blacklist string sets, loaded once and immutable for the
/// process lifetime. Whitelist entries match either the client id or the
/// app name; blacklist entries match the client id only.
#[derive(Debug, Clone)]
pub struct PolicyLists {
    whitelist: HashSet<String>,
    blacklist: HashSet<String>,
}

impl PolicyLists {
    pub fn new(whitelist: HashSet<String>, blacklist: HashSet<String>) -> Self {
        PolicyLists {
            whitelist,
            blacklist,
        }
    }

    pub fn load(whitelist_path: &str, blacklist_path: &str) -> Result<Self> {
        let whitelist = parse_list(&fs::read_to_string(whitelist_path)?);
        let blacklist = parse_list(&fs::read_to_string(blacklist_path)?);
        Ok(PolicyLists::new(whitelist, blacklist))
    }

    /// Whitelist wins over blacklist; anything matching neither is
    /// Unclassified. Pure; no mutable state.
    pub fn classify(&self, client_id: &str, app_name: &str) -> Decision {
        if self.whitelist.contains(client_id) || self.whitelist.contains(app_name) {
            Decision::Whitelisted
        } else if self.blacklist.contains(client_id) {
            Decision::Blacklisted
        } else {
            Decision::Unclassified
        }
    }

    pub fn whitelist_len(&self) -> usize {
        self.whitelist.len()
    }

    pub fn blacklist_len(&self) -> usize {
        self.blacklist.len()
    }
}

/// One entry per line; `#` starts a comment, surrounding whitespace is
/// trimmed, blank lines are skipped.
fn parse_list(content: &str) -> HashSet<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists(whitelist: &[&str], blacklist: &[&str]) -> PolicyLists {
        PolicyLists::new(
            whitelist.iter().map(|s| s.to_string()).collect(),
            blacklist.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn whitelist_matches_client_id_or_app_name() {
        let lists = lists(&["abc", "Trusted App"], &[]);
        assert_eq!(lists.classify("abc", "Foo"), Decision::Whitelisted);
        assert_eq!(lists.classify("xyz", "Trusted App"), Decision::Whitelisted);
        assert_eq!(lists.classify("xyz", "Foo"), Decision::Unclassified);
    }

    #[test]
    fn blacklist_matches_client_id_only() {
        let lists = lists(&[], &["bad-client", "Shady App"]);
        assert_eq!(lists.classify("bad-client", "Foo"), Decision::Blacklisted);
        // An app name sitting in the blacklist must not match.
        assert_eq!(lists.classify("xyz", "Shady App"), Decision::Unclassified);
    }

    #[test]
    fn whitelist_wins_over_blacklist() {
        let lists = lists(&["both"], &["both"]);
        assert_eq!(lists.classify("both", "Foo"), Decision::Whitelisted);
    }

    #[test]
    fn parse_strips_comments_and_blanks() {
        let parsed = parse_list("# full comment\nabc\n\n  xyz  # trailing\n   \n");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("abc"));
        assert!(parsed.contains("xyz"));
    }
}
