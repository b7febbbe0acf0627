//! Optional supplementary block patterns from an EasyList-style filter list.
//!
//! Only network rules of the form `||domain^...` are used; each becomes an
//! escaped regex source suitable for
//! [`RuleSetBuilder::supplementary_patterns`](super::RuleSetBuilder::supplementary_patterns).
//! Cosmetic rules, exception rules and comments are ignored.

use std::collections::BTreeSet;

use crate::storage::Storage;

/// Storage key under which parsed patterns are cached between sessions.
pub const BLOCKLIST_KEY: &str = "arxCortexBlockList";

/// Parse filter-list text into regex sources, deduplicated and sorted.
pub fn parse_easylist(text: &str) -> Vec<String> {
    let mut out = BTreeSet::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
            continue;
        }
        if line.starts_with("@@") || line.contains("##") || line.contains("#@#") {
            continue;
        }
        let Some(rest) = line.strip_prefix("||") else {
            continue;
        };

        let domain: String = rest
            .chars()
            .take_while(|c| !matches!(c, '^' | '/' | '$' | '*' | '|' | ':'))
            .collect();
        if domain.is_empty() || !domain.contains('.') {
            continue;
        }
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
        {
            continue;
        }

        out.insert(regex::escape(&domain.to_ascii_lowercase()));
    }

    out.into_iter().collect()
}

/// Load previously cached patterns, if any.
///
/// Unreadable or malformed cache entries are treated as absent.
pub async fn load_cached<S: Storage>(storage: &S) -> Option<Vec<String>> {
    let bytes = match storage.get(BLOCKLIST_KEY).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!("Failed to read cached block list: {e}");
            return None;
        }
    };

    match serde_json::from_slice::<Vec<String>>(&bytes) {
        Ok(patterns) => {
            tracing::info!(count = patterns.len(), "Loaded cached block list");
            Some(patterns)
        }
        Err(e) => {
            tracing::warn!("Discarding malformed cached block list: {e}");
            None
        }
    }
}

/// Cache parsed patterns for the next session.
pub async fn store_cached<S: Storage>(storage: &S, patterns: &[String]) -> crate::Result<()> {
    let body = serde_json::to_vec(patterns)
        .map_err(|e| crate::SentinelError::Storage(Box::new(e)))?;
    storage.put(BLOCKLIST_KEY, &body, "application/json").await
}
