//! Slot persistence
//!
//! Every entity lives in one JSON document per `(flow, slot)`. Writes replace
//! the whole document atomically; absence is explicit (`None`), never an
//! empty-object sentinel.

use crate::error::StoreError;
use crate::types::{FlowId, Slot};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Keyed document store shared by both flows
#[async_trait]
pub trait SlotStore: Send + Sync {
    /// Current document, or `None` if the slot is absent
    async fn read(&self, flow: &FlowId, slot: Slot) -> Result<Option<Value>, StoreError>;

    /// Replace the document; readers see the old or the new one, never a mix
    async fn write(&self, flow: &FlowId, slot: Slot, document: &Value) -> Result<(), StoreError>;

    /// Make the slot absent; clearing an absent slot is a no-op
    async fn clear(&self, flow: &FlowId, slot: Slot) -> Result<(), StoreError>;
}

/// Read a slot and decode it
///
/// # Errors
/// - `StoreError::Malformed` if the document does not decode as `T`
pub async fn load<T: DeserializeOwned>(
    store: &dyn SlotStore,
    flow: &FlowId,
    slot: Slot,
) -> Result<Option<T>, StoreError> {
    match store.read(flow, slot).await? {
        Some(document) => serde_json::from_value(document)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                flow: flow.clone(),
                slot,
                source,
            }),
        None => Ok(None),
    }
}

/// Encode a value and write it to a slot
///
/// # Errors
/// - `StoreError::Encode` if `value` cannot be represented as JSON
pub async fn save<T: Serialize + Sync>(
    store: &dyn SlotStore,
    flow: &FlowId,
    slot: Slot,
    value: &T,
) -> Result<(), StoreError> {
    let document =
        serde_json::to_value(value).map_err(|source| StoreError::Encode { slot, source })?;
    store.write(flow, slot, &document).await
}

/// Move `from` into `to` and clear `from`.
///
/// An absent `from` clears `to` as well, so the archive mirrors whatever
/// state existed. Returns the moved document.
///
/// # Errors
/// - Any `StoreError` from the underlying reads and writes
pub async fn archive(
    store: &dyn SlotStore,
    flow: &FlowId,
    from: Slot,
    to: Slot,
) -> Result<Option<Value>, StoreError> {
    let document = store.read(flow, from).await?;
    match &document {
        Some(doc) => store.write(flow, to, doc).await?,
        None => store.clear(flow, to).await?,
    }
    store.clear(flow, from).await?;
    Ok(document)
}

/// JSON files under `<root>/<flow>/<slot>.json`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Create store rooted at `root`; directories are created lazily
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a slot document
    #[must_use]
    pub fn slot_path(&self, flow: &FlowId, slot: Slot) -> PathBuf {
        self.root.join(flow.as_str()).join(slot.file_name())
    }
}

#[async_trait]
impl SlotStore for JsonFileStore {
    async fn read(&self, flow: &FlowId, slot: Slot) -> Result<Option<Value>, StoreError> {
        let path = self.slot_path(flow, slot);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io_error(&path, e)),
        };

        let document: Value =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
                flow: flow.clone(),
                slot,
                source,
            })?;

        // Files written by older deployments use `{}` to mean "cleared".
        if document.as_object().is_some_and(serde_json::Map::is_empty) {
            return Ok(None);
        }
        Ok(Some(document))
    }

    async fn write(&self, flow: &FlowId, slot: Slot, document: &Value) -> Result<(), StoreError> {
        let path = self.slot_path(flow, slot);
        let dir = self.root.join(flow.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io_error(&dir, e))?;

        let payload = serde_json::to_vec_pretty(document)
            .map_err(|source| StoreError::Encode { slot, source })?;

        let temp_path = dir.join(format!(".{}.{}.tmp", slot.name(), uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload)
            .await
            .map_err(|e| StoreError::io_error(&temp_path, e))?;

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StoreError::io_error(&path, e));
        }

        tracing::debug!(flow = %flow, slot = %slot, "slot written");
        Ok(())
    }

    async fn clear(&self, flow: &FlowId, slot: Slot) -> Result<(), StoreError> {
        let path = self.slot_path(flow, slot);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(flow = %flow, slot = %slot, "slot cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io_error(&path, e)),
        }
    }
}

/// In-process store for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: DashMap<(FlowId, Slot), Value>,
}

impl MemorySlotStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots across all flows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if every slot is absent
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn read(&self, flow: &FlowId, slot: Slot) -> Result<Option<Value>, StoreError> {
        Ok(self
            .slots
            .get(&(flow.clone(), slot))
            .map(|entry| entry.value().clone()))
    }

    async fn write(&self, flow: &FlowId, slot: Slot, document: &Value) -> Result<(), StoreError> {
        self.slots.insert((flow.clone(), slot), document.clone());
        Ok(())
    }

    async fn clear(&self, flow: &FlowId, slot: Slot) -> Result<(), StoreError> {
        self.slots.remove(&(flow.clone(), slot));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow() -> FlowId {
        FlowId::default()
    }

    #[tokio::test]
    async fn file_store_roundtrip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        assert!(store.read(&flow(), Slot::CurrentRequest).await.unwrap().is_none());

        let doc = json!({"metadata": {"id": 1}});
        store.write(&flow(), Slot::CurrentRequest, &doc).await.unwrap();
        assert_eq!(
            store.read(&flow(), Slot::CurrentRequest).await.unwrap(),
            Some(doc)
        );
        assert!(store.slot_path(&flow(), Slot::CurrentRequest).exists());

        store.clear(&flow(), Slot::CurrentRequest).await.unwrap();
        assert!(store.read(&flow(), Slot::CurrentRequest).await.unwrap().is_none());
        // Clearing twice is fine.
        store.clear(&flow(), Slot::CurrentRequest).await.unwrap();
    }

    #[tokio::test]
    async fn file_store_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        for i in 0..5 {
            store
                .write(&flow(), Slot::VisualSession, &json!({"n": i}))
                .await
                .unwrap();
        }

        let names: Vec<String> = std::fs::read_dir(dir.path().join("default"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["visual_session.json".to_string()]);
    }

    #[tokio::test]
    async fn file_store_treats_empty_object_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let path = store.slot_path(&flow(), Slot::CurrentApproval);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();

        assert!(store.read(&flow(), Slot::CurrentApproval).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_reports_malformed_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let path = store.slot_path(&flow(), Slot::CurrentRequest);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = store.read(&flow(), Slot::CurrentRequest).await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn flows_do_not_share_slots() {
        let store = MemorySlotStore::new();
        let other = FlowId::new("kiosk-2").unwrap();

        store
            .write(&flow(), Slot::CurrentRequest, &json!({"a": 1}))
            .await
            .unwrap();
        assert!(store.read(&other, Slot::CurrentRequest).await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn archive_moves_or_clears() {
        let store = MemorySlotStore::new();
        store
            .write(&flow(), Slot::PreviousRequest, &json!({"old": true}))
            .await
            .unwrap();

        // Nothing current: the archive is cleared too.
        let moved = archive(&store, &flow(), Slot::CurrentRequest, Slot::PreviousRequest)
            .await
            .unwrap();
        assert!(moved.is_none());
        assert!(store.is_empty());

        store
            .write(&flow(), Slot::CurrentRequest, &json!({"new": true}))
            .await
            .unwrap();
        let moved = archive(&store, &flow(), Slot::CurrentRequest, Slot::PreviousRequest)
            .await
            .unwrap();
        assert_eq!(moved, Some(json!({"new": true})));
        assert!(store.read(&flow(), Slot::CurrentRequest).await.unwrap().is_none());
        assert_eq!(
            store.read(&flow(), Slot::PreviousRequest).await.unwrap(),
            Some(json!({"new": true}))
        );
    }

    #[tokio::test]
    async fn typed_load_and_save() {
        let store = MemorySlotStore::new();
        save(&store, &flow(), Slot::CurrentApproval, &vec![1, 2, 3])
            .await
            .unwrap();
        let back: Option<Vec<u32>> = load(&store, &flow(), Slot::CurrentApproval).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));

        let wrong: Result<Option<String>, _> = load(&store, &flow(), Slot::CurrentApproval).await;
        assert!(wrong.is_err());
    }
}
