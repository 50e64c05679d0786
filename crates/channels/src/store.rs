use std::{collections::HashMap, sync::Mutex};

use {anyhow::Result, async_trait::async_trait};

/// Metadata key holding the backup blob of `platform`'s registry.
#[must_use]
pub fn backup_key(platform: switchboard_common::Platform) -> String {
    format!("backup:{platform}")
}

/// Small key/value store for gateway metadata such as registry backups.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local store, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, switchboard_common::Platform};

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryMetadataStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[test]
    fn backup_keys() {
        assert_eq!(backup_key(Platform::Messenger), "backup:messenger");
        assert_eq!(backup_key(Platform::WhatsApp), "backup:whatsapp");
    }
}
