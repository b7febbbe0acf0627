//! Persisted, integrity-checked user corrections.
//!
//! The store is serialized as
//!
//! ```json
//! { "feedback": { "<fingerprint>": { "label": "ad", "timestamp": 0, "tag": "div" } },
//!   "integrityDigest": "<hex sha256>" }
//! ```
//!
//! where the digest covers the JSON of the `feedback` object followed by a
//! shared secret. A store whose digest does not verify is discarded as a
//! whole on load.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::classifier::FeedbackLookup;
use crate::error::{Result, SentinelError};
use crate::fingerprint::Fingerprint;
use crate::storage::Storage;

/// User verdict on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Ad,
    Ok,
}

impl FromStr for Label {
    type Err = FeedbackRejection;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ad" => Ok(Label::Ad),
            "ok" => Ok(Label::Ok),
            other => Err(FeedbackRejection::InvalidLabel(other.to_string())),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Label::Ad => "ad",
            Label::Ok => "ok",
        })
    }
}

/// Why a feedback call was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedbackRejection {
    #[error("label must be \"ad\" or \"ok\", got {0:?}")]
    InvalidLabel(String),

    #[error("rate limited")]
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub label: Label,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SealedStore {
    feedback: BTreeMap<String, FeedbackRecord>,
    integrity_digest: String,
}

/// Retention, capacity and rate-limit settings of a [`FeedbackStore`].
#[derive(Debug, Clone)]
pub struct FeedbackPolicy {
    pub secret: String,
    pub retention: Duration,
    pub max_entries: usize,
    pub cooldown: Duration,
    /// Storage key the sealed store is persisted under.
    pub key: String,
}

impl Default for FeedbackPolicy {
    fn default() -> Self {
        Self {
            secret: "arx-sentinel".to_string(),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            max_entries: 1000,
            cooldown: Duration::from_secs(1),
            key: "arxCortexFeedback".to_string(),
        }
    }
}

/// Feedback records keyed by text fingerprint.
#[derive(Debug, Clone)]
pub struct FeedbackStore {
    policy: FeedbackPolicy,
    records: BTreeMap<Fingerprint, FeedbackRecord>,
    last_accepted: Option<u64>,
}

impl FeedbackStore {
    pub fn new(policy: FeedbackPolicy) -> Self {
        Self {
            policy,
            records: BTreeMap::new(),
            last_accepted: None,
        }
    }

    pub fn policy(&self) -> &FeedbackPolicy {
        &self.policy
    }

    /// Rebuild a store from its sealed form.
    ///
    /// Undecodable input or a digest mismatch yields an empty store. Records
    /// older than the retention window are dropped.
    pub fn restore(policy: FeedbackPolicy, sealed: &[u8], now_ms: u64) -> Self {
        let mut store = Self::new(policy);

        let sealed: SealedStore = match serde_json::from_slice(sealed) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::warn!("Discarding undecodable feedback store: {e}");
                return store;
            }
        };

        let expected = digest(&sealed.feedback, &store.policy.secret);
        if !expected.is_some_and(|d| d == sealed.integrity_digest) {
            tracing::warn!("Feedback store failed integrity check, discarding all records");
            return store;
        }

        for (key, record) in sealed.feedback {
            match key.parse::<Fingerprint>() {
                Ok(fp) => {
                    store.records.insert(fp, record);
                }
                Err(_) => tracing::debug!(key = %key, "Skipping feedback record with bad key"),
            }
        }

        let pruned = store.prune(now_ms);
        tracing::debug!(loaded = store.records.len(), pruned, "Restored feedback store");
        store
    }

    /// Load the store from `storage`. A missing entry or read failure yields
    /// an empty store.
    pub async fn load<S: Storage>(policy: FeedbackPolicy, storage: &S, now_ms: u64) -> Self {
        match storage.get(&policy.key).await {
            Ok(Some(bytes)) => Self::restore(policy, &bytes, now_ms),
            Ok(None) => Self::new(policy),
            Err(e) => {
                tracing::error!("Failed to read feedback store: {e}");
                Self::new(policy)
            }
        }
    }

    /// Accept a user label for the element showing `text`.
    ///
    /// `label` must be `"ad"` or `"ok"`. At most one call is accepted per
    /// cooldown window; rejected calls leave the store untouched.
    pub fn record(
        &mut self,
        text: &str,
        label: &str,
        tag: Option<&str>,
        now_ms: u64,
    ) -> std::result::Result<Fingerprint, FeedbackRejection> {
        let label: Label = label.parse()?;

        let cooldown = self.policy.cooldown.as_millis() as u64;
        if let Some(last) = self.last_accepted {
            if now_ms.saturating_sub(last) < cooldown {
                return Err(FeedbackRejection::RateLimited);
            }
        }
        self.last_accepted = Some(now_ms);

        let fingerprint = Fingerprint::of_text(text);
        self.records.insert(
            fingerprint,
            FeedbackRecord {
                label,
                timestamp: now_ms,
                tag: tag.map(|t| t.to_ascii_lowercase()),
            },
        );
        self.prune(now_ms);
        Ok(fingerprint)
    }

    /// Drop expired records, then evict the oldest until within capacity.
    /// Returns the number of records removed.
    pub fn prune(&mut self, now_ms: u64) -> usize {
        let before = self.records.len();
        let retention = self.policy.retention.as_millis() as u64;
        self.records
            .retain(|_, r| now_ms.saturating_sub(r.timestamp) <= retention);

        while self.records.len() > self.policy.max_entries {
            let oldest = self
                .records
                .iter()
                .min_by_key(|(_, r)| r.timestamp)
                .map(|(fp, _)| *fp);
            match oldest {
                Some(fp) => {
                    self.records.remove(&fp);
                }
                None => break,
            }
        }
        before - self.records.len()
    }

    pub fn get(&self, fingerprint: Fingerprint) -> Option<&FeedbackRecord> {
        self.records.get(&fingerprint)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialize the records with a freshly computed digest.
    pub fn seal(&self) -> Result<Vec<u8>> {
        let feedback: BTreeMap<String, FeedbackRecord> = self
            .records
            .iter()
            .map(|(fp, r)| (fp.to_string(), r.clone()))
            .collect();
        let integrity_digest = digest(&feedback, &self.policy.secret)
            .ok_or_else(|| SentinelError::Storage("feedback records not serializable".into()))?;
        serde_json::to_vec(&SealedStore {
            feedback,
            integrity_digest,
        })
        .map_err(|e| SentinelError::Storage(Box::new(e)))
    }

    pub async fn persist<S: Storage>(&self, storage: &S) -> Result<()> {
        let body = self.seal()?;
        storage.put(&self.policy.key, &body, "application/json").await
    }
}

impl FeedbackLookup for FeedbackStore {
    fn label_for(&self, fingerprint: Fingerprint) -> Option<Label> {
        self.records.get(&fingerprint).map(|r| r.label)
    }
}

fn digest(feedback: &BTreeMap<String, FeedbackRecord>, secret: &str) -> Option<String> {
    let json = serde_json::to_string(feedback).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hasher.update(secret.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    fn policy() -> FeedbackPolicy {
        FeedbackPolicy {
            secret: "s3cret".to_string(),
            ..FeedbackPolicy::default()
        }
    }

    #[test]
    fn rejects_unknown_labels() {
        let mut store = FeedbackStore::new(policy());
        assert_eq!(
            store.record("x", "spam", None, 0),
            Err(FeedbackRejection::InvalidLabel("spam".to_string()))
        );
        assert!(store.is_empty());
        // An invalid label does not consume the cooldown.
        assert!(store.record("x", "ad", None, 1).is_ok());
    }

    #[test]
    fn second_call_within_cooldown_is_rejected() {
        let mut store = FeedbackStore::new(policy());
        let fp = store.record("Compre agora", "ad", Some("DIV"), 10_000).unwrap();
        assert_eq!(
            store.record("Outra coisa", "ok", None, 10_500),
            Err(FeedbackRejection::RateLimited)
        );
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(fp).unwrap().tag.as_deref(), Some("div"));

        assert!(store.record("Outra coisa", "ok", None, 11_000).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn relabel_overwrites() {
        let mut store = FeedbackStore::new(policy());
        let fp = store.record("Compre agora", "ad", None, 0).unwrap();
        store.record("  compre   AGORA ", "ok", None, 5_000).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.label_for(fp), Some(Label::Ok));
    }

    #[test]
    fn evicts_oldest_over_capacity() {
        let mut store = FeedbackStore::new(FeedbackPolicy {
            max_entries: 2,
            ..policy()
        });
        let first = store.record("one", "ad", None, 0).unwrap();
        store.record("two", "ad", None, 2_000).unwrap();
        store.record("three", "ad", None, 4_000).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get(first).is_none());
    }

    #[test]
    fn seal_and_restore() {
        let mut store = FeedbackStore::new(policy());
        let fp = store.record("Compre agora", "ad", Some("aside"), 1_000).unwrap();
        let sealed = store.seal().unwrap();

        let restored = FeedbackStore::restore(policy(), &sealed, 2_000);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get(fp), store.get(fp));
    }

    #[test]
    fn tampered_store_is_discarded_wholesale() {
        let mut store = FeedbackStore::new(policy());
        store.record("one", "ad", None, 0).unwrap();
        store.record("two", "ok", None, 2_000).unwrap();
        let sealed = String::from_utf8(store.seal().unwrap()).unwrap();

        let tampered = sealed.replacen("\"ok\"", "\"ad\"", 1);
        assert_ne!(tampered, sealed);
        assert!(FeedbackStore::restore(policy(), tampered.as_bytes(), 3_000).is_empty());

        let other_secret = FeedbackPolicy {
            secret: "different".to_string(),
            ..policy()
        };
        assert!(FeedbackStore::restore(other_secret, sealed.as_bytes(), 3_000).is_empty());
        assert!(FeedbackStore::restore(policy(), b"not json", 3_000).is_empty());
    }

    #[test]
    fn expired_records_are_pruned_on_load() {
        let mut store = FeedbackStore::new(policy());
        let old = store.record("old", "ad", None, 0).unwrap();
        let fresh = store.record("fresh", "ad", None, 20 * DAY_MS).unwrap();
        let sealed = store.seal().unwrap();

        let restored = FeedbackStore::restore(policy(), &sealed, 35 * DAY_MS);
        assert_eq!(restored.len(), 1);
        assert!(restored.get(old).is_none());
        assert!(restored.get(fresh).is_some());
    }

    #[tokio::test]
    async fn persists_through_storage() {
        let storage = MemoryStorage::new();
        let mut store = FeedbackStore::new(policy());
        let fp = store.record("Compre agora", "ad", None, 0).unwrap();
        store.persist(&storage).await.unwrap();

        let raw = storage.snapshot("arxCortexFeedback").unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(json["feedback"][fp.to_string()]["label"] == "ad");
        assert!(json["integrityDigest"].as_str().unwrap().len() == 64);

        let loaded = FeedbackStore::load(policy(), &storage, 1_000).await;
        assert_eq!(loaded.label_for(fp), Some(Label::Ad));

        let empty = FeedbackStore::load(policy(), &MemoryStorage::new(), 0).await;
        assert!(empty.is_empty());
    }
}
