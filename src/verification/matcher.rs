//! Checks whether a challenge token has been placed on a Roblox profile

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::challenge::Challenge;
use crate::roblox::ProfileSource;

static TEXT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""description":"([^"]*?)""#,
        r#""aboutMe":"([^"]*?)""#,
        r#""blurb":"([^"]*?)""#,
        r#""status":"([^"]*?)""#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static DIGIT_RUN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d+").ok());

/// Which rule found the token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Exact,
    IgnoringWhitespace,
    AlphanumericOnly,
    CaseInsensitive,
    NumericParts,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchRule::Exact => "exact",
            MatchRule::IgnoringWhitespace => "ignoring whitespace",
            MatchRule::AlphanumericOnly => "alphanumeric only",
            MatchRule::CaseInsensitive => "case-insensitive",
            MatchRule::NumericParts => "numeric parts in order",
        };
        f.write_str(name)
    }
}

/// Pull the free-text field out of a profile document
///
/// A `description` field that is present wins even when empty or null; the
/// pattern scan only runs when neither known shape carries one.
pub fn extract_profile_text(body: &Value) -> String {
    let direct = body
        .get("description")
        .or_else(|| body.get("profile").and_then(|p| p.get("description")));
    if let Some(value) = direct {
        return value.as_str().unwrap_or_default().to_string();
    }

    let raw = body.to_string();
    TEXT_PATTERNS
        .iter()
        .find_map(|re| {
            re.captures(&raw)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_default()
        .to_string()
}

fn digit_runs(s: &str) -> Vec<&str> {
    match DIGIT_RUN.as_ref() {
        Some(re) => re.find_iter(s).map(|m| m.as_str()).collect(),
        None => Vec::new(),
    }
}

/// Whether `token` appears in `text`, trying progressively looser rules
pub fn token_present(text: &str, token: &str) -> Option<MatchRule> {
    if token.is_empty() {
        return None;
    }

    if text.contains(token) {
        return Some(MatchRule::Exact);
    }

    let squash = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    if squash(text).contains(&squash(token)) {
        return Some(MatchRule::IgnoringWhitespace);
    }

    let alnum = |s: &str| {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
    };
    let token_alnum = alnum(token);
    if !token_alnum.is_empty() && alnum(text).contains(&token_alnum) {
        return Some(MatchRule::AlphanumericOnly);
    }

    if text.to_lowercase().contains(&token.to_lowercase()) {
        return Some(MatchRule::CaseInsensitive);
    }

    // Both numeric halves, the second after the end of the first
    let runs = digit_runs(token);
    if runs.len() >= 2 {
        if let Some(start) = text.find(runs[0]) {
            if text[start + runs[0].len()..].contains(runs[1]) {
                return Some(MatchRule::NumericParts);
            }
        }
    }

    None
}

/// Decides whether a challenge's token is on its target's profile
///
/// Fails closed: anything short of finding the token is `false`.
pub struct ProfileMatcher {
    source: Arc<dyn ProfileSource>,
}

impl ProfileMatcher {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self { source }
    }

    pub async fn matches(&self, challenge: &Challenge) -> bool {
        let user_id = &challenge.target.id;

        let response = match self.source.fetch_profile(user_id).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Could not fetch profile for Roblox ID {}: {}", user_id, e);
                return false;
            }
        };
        if !response.is_success() {
            warn!(
                "Profile fetch for Roblox ID {} returned status {}",
                user_id, response.status
            );
            return false;
        }
        let body = match response.json() {
            Ok(body) => body,
            Err(e) => {
                warn!("Profile for Roblox ID {} is not usable: {}", user_id, e);
                return false;
            }
        };

        let mut text = extract_profile_text(&body);
        if text.is_empty() {
            match self.source.fetch_status(user_id).await {
                Ok(Some(status)) => text = status,
                Ok(None) => {}
                Err(e) => debug!("Profile header lookup for {} failed: {}", user_id, e),
            }
        }

        match token_present(&text, &challenge.token) {
            Some(rule) => {
                info!(
                    "Found code for {} on Roblox profile {} ({})",
                    challenge.requester_id, user_id, rule
                );
                true
            }
            None => {
                debug!(
                    "Code {} not found in profile {} text ({} chars)",
                    challenge.token,
                    user_id,
                    text.len()
                );
                false
            }
        }
    }
}
