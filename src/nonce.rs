//! Nonce action list: routing whole families of actions through fragments.
//!
//! Security nonces are the classic cache-buster: they differ per user, so a
//! page embedding one can never be shared. Registering the nonce's action
//! here virtualizes it: the nonce becomes its own fragment with its own
//! policy while the page stays publicly cacheable. The list is built once at
//! startup (seed config plus an optional published list) and is read-only
//! within a request.

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

use crate::control::CacheControl;

#[derive(Debug, Error)]
pub enum NonceFetchError {
    #[error("failed to fetch remote nonce action list: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug)]
enum Matcher {
    Exact,
    Wildcard(Regex),
}

#[derive(Debug)]
struct NonceRule {
    pattern: String,
    matcher: Matcher,
    control: CacheControl,
}

/// Ordered action-pattern → cache-control-override table.
#[derive(Debug, Default)]
pub struct NonceActionList {
    rules: Vec<NonceRule>,
}

impl NonceActionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register from a config line: `"<action-pattern>[ <control>]"`.
    ///
    /// Anything after the first whitespace is the cache-control override for
    /// that pattern; absent means no override.
    pub fn register_line(&mut self, line: &str) {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let Some(pattern) = parts.next().filter(|p| !p.is_empty()) else {
            return;
        };
        let control = parts
            .next()
            .map(|raw| CacheControl::parse(raw.trim()))
            .unwrap_or_default();
        self.register(pattern, control);
    }

    /// Register an action pattern. `*` matches any run of characters; the
    /// matcher is compiled once here, never per lookup. Re-registering an
    /// existing pattern is a no-op, keeping first-registration precedence.
    pub fn register(&mut self, pattern: &str, control: CacheControl) {
        if self.rules.iter().any(|rule| rule.pattern == pattern) {
            return;
        }

        let matcher = if pattern.contains('*') {
            Matcher::Wildcard(glob_to_regex(pattern))
        } else {
            Matcher::Exact
        };

        debug!(pattern, "registered nonce action");
        self.rules.push(NonceRule {
            pattern: pattern.to_string(),
            matcher,
            control,
        });
    }

    /// The cache-control override for `action`, if any pattern matches.
    ///
    /// Exact entries are checked by plain equality before any pattern scan;
    /// within each class the first registration wins.
    pub fn lookup(&self, action: &str) -> Option<&CacheControl> {
        self.rules
            .iter()
            .find(|rule| matches!(rule.matcher, Matcher::Exact) && rule.pattern == action)
            .or_else(|| {
                self.rules.iter().find(|rule| match &rule.matcher {
                    Matcher::Wildcard(regex) => regex.is_match(action),
                    Matcher::Exact => false,
                })
            })
            .map(|rule| &rule.control)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Compile a `*`-glob into an anchored, case-insensitive matcher.
fn glob_to_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    RegexBuilder::new(&format!("^{escaped}$"))
        .case_insensitive(true)
        .build()
        .expect("escaped glob pattern always compiles")
}

/// Download a published action list: one action per line, `#` starts a
/// comment, blank lines are skipped. Best-effort: the caller treats a
/// failure as "no remote list", never retries.
pub async fn fetch_remote_actions(url: &str) -> Result<Vec<String>, NonceFetchError> {
    let body = reqwest::get(url).await?.error_for_status()?.text().await?;
    Ok(parse_action_lines(&body))
}

/// Parse a nonce list document into clean action lines.
pub fn parse_action_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| match line.find('#') {
            Some(idx) => line[..idx].trim(),
            None => line.trim(),
        })
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merge a local seed list with a fetched one, de-duplicating while keeping
/// first-seen order so registration precedence stays stable.
pub fn merge_action_lists(local: &[String], fetched: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(local.len() + fetched.len());
    for action in local.iter().cloned().chain(fetched) {
        if !merged.contains(&action) {
            merged.push(action);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_the_family_only() {
        let mut list = NonceActionList::new();
        list.register("comment_*", CacheControl::none());

        assert!(list.lookup("comment_form_nonce").is_some());
        assert!(list.lookup("COMMENT_reply").is_some());
        assert!(list.lookup("other_nonce").is_none());
        assert!(list.lookup("my_comment_form").is_none());
    }

    #[test]
    fn exact_match_wins_over_an_earlier_wildcard() {
        let mut list = NonceActionList::new();
        list.register("comment_*", CacheControl::parse("private"));
        list.register("comment_form_nonce", CacheControl::none());

        let control = list.lookup("comment_form_nonce").unwrap();
        assert!(!control.has_private());
    }

    #[test]
    fn first_registered_wildcard_wins() {
        let mut list = NonceActionList::new();
        list.register("a_*", CacheControl::parse("private"));
        list.register("a_b*", CacheControl::parse("no-vary"));

        let control = list.lookup("a_b_c").unwrap();
        assert!(control.has_private());
        assert!(!control.has_no_vary());
    }

    #[test]
    fn re_registration_is_a_no_op() {
        let mut list = NonceActionList::new();
        list.register("subscribe", CacheControl::parse("private"));
        list.register("subscribe", CacheControl::none());

        assert_eq!(list.len(), 1);
        assert!(list.lookup("subscribe").unwrap().has_private());
    }

    #[test]
    fn register_line_splits_off_the_control_override() {
        let mut list = NonceActionList::new();
        list.register_line("stats_* private,no-vary");
        list.register_line("plain_nonce");
        list.register_line("");

        assert_eq!(list.len(), 2);
        assert!(list.lookup("stats_daily").unwrap().has_private());
        assert!(list.lookup("plain_nonce").unwrap().is_empty());
    }

    #[test]
    fn glob_escape_neutralizes_regex_metacharacters() {
        let mut list = NonceActionList::new();
        list.register("a.b*", CacheControl::none());

        assert!(list.lookup("a.b_nonce").is_some());
        // `.` must not act as a regex wildcard.
        assert!(list.lookup("aXb_nonce").is_none());
    }

    #[test]
    fn action_lines_drop_comments_and_blanks() {
        let text = "subscribe_nonce\n# full comment line\nstats_* # trailing comment\n\n  \n";
        assert_eq!(
            parse_action_lines(text),
            vec!["subscribe_nonce".to_string(), "stats_*".to_string()]
        );
    }

    #[test]
    fn merge_keeps_first_seen_order() {
        let local = vec!["a".to_string(), "b".to_string()];
        let merged = merge_action_lists(&local, vec!["b".into(), "c".into(), "a".into()]);
        assert_eq!(merged, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    }
}
