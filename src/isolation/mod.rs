//! Container-tag registry: one isolation namespace per test case.
//!
//! Owned by a single run and discarded with it; nothing here is persisted or
//! global. Tags are minted once, tracked while the case runs, and retired at
//! case end. A retired tag is never issued again within the run, so leftover
//! memories from a crashed case can never leak into a later one.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{CaseError, CaseResult};
use crate::model::ContainerTag;

#[derive(Debug, Default)]
struct TagEntry {
    document_ids: Vec<String>,
    retired: bool,
}

/// Registry mapping container tags to the document ids created under them
#[derive(Debug)]
pub struct ContainerRegistry {
    run_id: String,
    entries: Mutex<HashMap<String, TagEntry>>,
}

impl ContainerRegistry {
    /// Create a registry for one run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The run id all minted tags are scoped to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Mint a fresh, globally-unique tag for a case.
    ///
    /// Tag reuse is actively rejected rather than assumed away: minting a
    /// tag that already exists in the registry is an error even though the
    /// uuid suffix makes collisions unrealistic.
    pub async fn mint(&self, case_id: &str) -> CaseResult<ContainerTag> {
        let tag = format!(
            "{}-{}-{}",
            self.run_id,
            case_id,
            &Uuid::new_v4().simple().to_string()[..8]
        );

        let mut entries = self.entries.lock().await;
        if entries.contains_key(&tag) {
            return Err(CaseError::TagReuse { tag });
        }
        entries.insert(tag.clone(), TagEntry::default());
        Ok(ContainerTag::new(tag))
    }

    /// Record document ids created under a tag (deduplicated ids included,
    /// so later cleanup covers every id ever associated with the tag).
    pub async fn record(&self, tag: &ContainerTag, ids: &[String]) -> CaseResult<()> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(tag.as_str()) {
            Some(entry) if !entry.retired => {
                entry.document_ids.extend(ids.iter().cloned());
                Ok(())
            }
            Some(_) => Err(CaseError::TagReuse {
                tag: tag.as_str().to_string(),
            }),
            None => Err(CaseError::UnknownTag {
                tag: tag.as_str().to_string(),
            }),
        }
    }

    /// Retire a tag and take its tracked ids for cleanup.
    ///
    /// The tag stays in the registry so it can never be re-minted or
    /// re-recorded within this run.
    pub async fn release(&self, tag: &ContainerTag) -> Vec<String> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(tag.as_str()) {
            Some(entry) => {
                entry.retired = true;
                std::mem::take(&mut entry.document_ids)
            }
            None => Vec::new(),
        }
    }

    /// Number of tags minted but not yet retired
    pub async fn live_count(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.retired).count()
    }

    /// Whether the tag has been retired
    pub async fn is_retired(&self, tag: &ContainerTag) -> bool {
        let entries = self.entries.lock().await;
        entries.get(tag.as_str()).map(|e| e.retired).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minted_tags_are_unique() {
        let registry = ContainerRegistry::new("run-1");
        let a = registry.mint("case-1").await.unwrap();
        let b = registry.mint("case-1").await.unwrap();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("run-1-case-1-"));
        assert_eq!(registry.live_count().await, 2);
    }

    #[tokio::test]
    async fn test_record_and_release() {
        let registry = ContainerRegistry::new("run-1");
        let tag = registry.mint("case-1").await.unwrap();

        registry
            .record(&tag, &["mem-1".to_string(), "mem-2".to_string()])
            .await
            .unwrap();
        registry.record(&tag, &["mem-3".to_string()]).await.unwrap();

        let ids = registry.release(&tag).await;
        assert_eq!(ids, vec!["mem-1", "mem-2", "mem-3"]);
        assert!(registry.is_retired(&tag).await);
        assert_eq!(registry.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_record_on_retired_tag_rejected() {
        let registry = ContainerRegistry::new("run-1");
        let tag = registry.mint("case-1").await.unwrap();
        registry.release(&tag).await;

        let err = registry.record(&tag, &["mem-1".to_string()]).await.unwrap_err();
        assert!(matches!(err, CaseError::TagReuse { .. }));
    }

    #[tokio::test]
    async fn test_record_on_unknown_tag_rejected() {
        let registry = ContainerRegistry::new("run-1");
        let tag = ContainerTag::new("never-minted");

        let err = registry.record(&tag, &["mem-1".to_string()]).await.unwrap_err();
        assert!(matches!(err, CaseError::UnknownTag { .. }));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let registry = ContainerRegistry::new("run-1");
        let tag = registry.mint("case-1").await.unwrap();
        registry.record(&tag, &["mem-1".to_string()]).await.unwrap();

        assert_eq!(registry.release(&tag).await.len(), 1);
        assert!(registry.release(&tag).await.is_empty());
    }
}
