//! Grocery item records and the file-backed store that owns them

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

/// Items at or below this quantity count as low stock.
pub const LOW_STOCK_THRESHOLD: i64 = 2;

/// A stored grocery item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroceryItem {
    /// Whether this item sits at or below the low-stock threshold.
    /// Derived on every read, never stored.
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= LOW_STOCK_THRESHOLD
    }
}

/// Fields for a new item; `description` defaults to empty, `quantity` to 0
#[derive(Debug, Clone)]
pub struct NewGroceryItem {
    pub name: String,
    pub description: Option<String>,
    pub quantity: Option<i64>,
}

/// Replacement fields for an existing item; omitted fields keep their
/// stored values
#[derive(Debug, Clone)]
pub struct GroceryItemUpdate {
    pub name: String,
    pub description: Option<String>,
    pub quantity: Option<i64>,
}

/// Grocery store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Name is required")]
    EmptyName,

    #[error("Quantity must be a non-negative integer")]
    NegativeQuantity,

    #[error("no grocery item with id {0}")]
    NotFound(i64),

    #[error("failed to access the data file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid store snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// On-disk layout of the store: the id counter plus every record
#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    next_id: i64,
    items: Vec<GroceryItem>,
}

#[derive(Debug)]
struct StoreInner {
    /// Snapshot path; `None` disables persistence entirely
    data_path: Option<PathBuf>,
    /// Next id to hand out. Monotonic; deleted ids are never reassigned.
    next_id: AtomicI64,
    items: RwLock<HashMap<i64, GroceryItem>>,
}

/// Grocery item store: an in-memory table written through to a JSON
/// snapshot file on every mutation. Mutations only commit to memory once
/// the snapshot write has succeeded, so a failed write leaves the store
/// exactly as it was.
#[derive(Debug, Clone)]
pub struct GroceryStore {
    inner: Arc<StoreInner>,
}

impl GroceryStore {
    /// Open the store backed by the given snapshot file, starting empty if
    /// the file does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let (items, next_id) = match fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
                let max_id = snapshot.items.iter().map(|item| item.id).max().unwrap_or(0);
                // A snapshot whose counter lags its items must not reuse ids.
                let next_id = snapshot.next_id.max(max_id + 1);
                let items: HashMap<i64, GroceryItem> = snapshot
                    .items
                    .into_iter()
                    .map(|item| (item.id, item))
                    .collect();
                (items, next_id)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => (HashMap::new(), 1),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            inner: Arc::new(StoreInner {
                data_path: Some(path),
                next_id: AtomicI64::new(next_id),
                items: RwLock::new(items),
            }),
        })
    }

    /// Create a store with no backing file (for tests).
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                data_path: None,
                next_id: AtomicI64::new(1),
                items: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Store a new item under a freshly allocated id and return it
    pub async fn create(&self, new: NewGroceryItem) -> Result<GroceryItem, StoreError> {
        validate(&new.name, new.quantity)?;

        let now = Utc::now();
        let item = GroceryItem {
            id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
            name: new.name,
            description: new.description.unwrap_or_default(),
            quantity: new.quantity.unwrap_or(0),
            created_at: now,
            updated_at: now,
        };

        let mut items = self.inner.items.write().await;
        let mut next = items.clone();
        next.insert(item.id, item.clone());
        self.persist(&next).await?;
        *items = next;

        debug!(id = item.id, name = %item.name, "created grocery item");
        Ok(item)
    }

    /// Get a single item by id
    pub async fn get_by_id(&self, id: i64) -> Result<GroceryItem, StoreError> {
        let items = self.inner.items.read().await;
        items.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    /// Every stored item, ordered by name (id breaks ties)
    pub async fn list_all(&self) -> Vec<GroceryItem> {
        let items = self.inner.items.read().await;
        let mut all: Vec<GroceryItem> = items.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        all
    }

    /// Items at or below the low-stock threshold, lowest quantity first
    pub async fn list_low_stock(&self) -> Vec<GroceryItem> {
        let items = self.inner.items.read().await;
        let mut low: Vec<GroceryItem> = items
            .values()
            .filter(|item| item.is_low_stock())
            .cloned()
            .collect();
        low.sort_by(|a, b| {
            a.quantity
                .cmp(&b.quantity)
                .then_with(|| a.name.cmp(&b.name))
                .then(a.id.cmp(&b.id))
        });
        low
    }

    /// Replace the mutable fields of an existing item. `id` and
    /// `created_at` never change; `updated_at` is refreshed.
    pub async fn update(
        &self,
        id: i64,
        update: GroceryItemUpdate,
    ) -> Result<GroceryItem, StoreError> {
        validate(&update.name, update.quantity)?;

        let mut items = self.inner.items.write().await;
        let mut item = items.get(&id).ok_or(StoreError::NotFound(id))?.clone();

        item.name = update.name;
        if let Some(description) = update.description {
            item.description = description;
        }
        if let Some(quantity) = update.quantity {
            item.quantity = quantity;
        }
        item.updated_at = Utc::now();

        let mut next = items.clone();
        next.insert(id, item.clone());
        self.persist(&next).await?;
        *items = next;

        Ok(item)
    }

    /// Remove an item. Deleting the same id again reports `NotFound`.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut items = self.inner.items.write().await;
        if !items.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }

        let mut next = items.clone();
        next.remove(&id);
        self.persist(&next).await?;
        *items = next;

        debug!(id, "deleted grocery item");
        Ok(())
    }

    /// Number of stored items
    pub async fn count(&self) -> usize {
        self.inner.items.read().await.len()
    }

    /// Write the snapshot for `items` to the data file. Callers update the
    /// in-memory table only after this returns `Ok`.
    async fn persist(&self, items: &HashMap<i64, GroceryItem>) -> Result<(), StoreError> {
        let Some(path) = &self.inner.data_path else {
            return Ok(());
        };

        let mut records: Vec<GroceryItem> = items.values().cloned().collect();
        records.sort_by_key(|item| item.id);

        let snapshot = StoreSnapshot {
            next_id: self.inner.next_id.load(Ordering::SeqCst),
            items: records,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        // Write then rename so a crash mid-write cannot truncate the snapshot.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn validate(name: &str, quantity: Option<i64>) -> Result<(), StoreError> {
    if name.is_empty() {
        return Err(StoreError::EmptyName);
    }
    if quantity.is_some_and(|q| q < 0) {
        return Err(StoreError::NegativeQuantity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_item(name: &str, quantity: Option<i64>) -> NewGroceryItem {
        NewGroceryItem {
            name: name.to_string(),
            description: None,
            quantity,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_defaults() {
        let store = GroceryStore::in_memory();

        let milk = store.create(new_item("Milk", None)).await.unwrap();
        let bread = store.create(new_item("Bread", Some(5))).await.unwrap();

        assert_eq!(milk.id, 1);
        assert_eq!(bread.id, 2);
        assert_eq!(milk.description, "");
        assert_eq!(milk.quantity, 0);
        assert_eq!(bread.quantity, 5);
    }

    #[tokio::test]
    async fn created_item_round_trips_through_get() {
        let store = GroceryStore::in_memory();
        let created = store
            .create(NewGroceryItem {
                name: "Milk".to_string(),
                description: Some("semi-skimmed".to_string()),
                quantity: Some(3),
            })
            .await
            .unwrap();

        let fetched = store.get_by_id(created.id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn create_rejects_empty_name() {
        let store = GroceryStore::in_memory();

        let err = store.create(new_item("", Some(1))).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyName));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn create_rejects_negative_quantity() {
        let store = GroceryStore::in_memory();

        let err = store.create(new_item("Milk", Some(-1))).await.unwrap_err();
        assert!(matches!(err, StoreError::NegativeQuantity));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn list_all_orders_by_name() {
        let store = GroceryStore::in_memory();
        store.create(new_item("Yoghurt", Some(4))).await.unwrap();
        store.create(new_item("Apples", Some(9))).await.unwrap();
        store.create(new_item("Milk", Some(2))).await.unwrap();

        let names: Vec<String> = store
            .list_all()
            .await
            .into_iter()
            .map(|item| item.name)
            .collect();
        assert_eq!(names, ["Apples", "Milk", "Yoghurt"]);
        assert_eq!(store.count().await, 3);
    }

    #[tokio::test]
    async fn low_stock_includes_threshold_and_excludes_above() {
        let store = GroceryStore::in_memory();
        store.create(new_item("Bread", Some(2))).await.unwrap();
        store.create(new_item("Cheese", Some(3))).await.unwrap();
        store.create(new_item("Milk", Some(1))).await.unwrap();

        let low = store.list_low_stock().await;
        assert!(low.iter().any(|item| item.name == "Milk" && item.quantity == 1));
        assert!(low.iter().any(|item| item.name == "Bread"));
        assert!(!low.iter().any(|item| item.name == "Cheese"));
    }

    #[tokio::test]
    async fn low_stock_orders_by_quantity_then_name() {
        let store = GroceryStore::in_memory();
        store.create(new_item("Bread", Some(2))).await.unwrap();
        store.create(new_item("Milk", Some(1))).await.unwrap();
        store.create(new_item("Apples", Some(2))).await.unwrap();
        store.create(new_item("Cheese", Some(3))).await.unwrap();

        let low = store.list_low_stock().await;
        let names: Vec<&str> = low
            .iter()
            .map(|item| item.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Milk", "Apples", "Bread"]);
    }

    #[tokio::test]
    async fn update_replaces_fields_and_round_trips() {
        let store = GroceryStore::in_memory();
        let item = store.create(new_item("Eggs", Some(2))).await.unwrap();

        let updated = store
            .update(
                item.id,
                GroceryItemUpdate {
                    name: "Eggs".to_string(),
                    description: Some(String::new()),
                    quantity: Some(12),
                },
            )
            .await
            .unwrap();

        let fetched = store.get_by_id(item.id).await.unwrap();
        assert_eq!(fetched, updated);
        assert_eq!(fetched.id, item.id);
        assert_eq!(fetched.name, "Eggs");
        assert_eq!(fetched.description, "");
        assert_eq!(fetched.quantity, 12);
    }

    #[tokio::test]
    async fn update_retains_omitted_fields() {
        let store = GroceryStore::in_memory();
        let item = store
            .create(NewGroceryItem {
                name: "Milk".to_string(),
                description: Some("whole".to_string()),
                quantity: Some(4),
            })
            .await
            .unwrap();

        let updated = store
            .update(
                item.id,
                GroceryItemUpdate {
                    name: "Oat milk".to_string(),
                    description: None,
                    quantity: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Oat milk");
        assert_eq!(updated.description, "whole");
        assert_eq!(updated.quantity, 4);
        assert_eq!(updated.created_at, item.created_at);
    }

    #[tokio::test]
    async fn update_rejects_negative_quantity() {
        let store = GroceryStore::in_memory();
        let item = store.create(new_item("Milk", Some(1))).await.unwrap();

        let err = store
            .update(
                item.id,
                GroceryItemUpdate {
                    name: "Milk".to_string(),
                    description: None,
                    quantity: Some(-3),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NegativeQuantity));
        assert_eq!(store.get_by_id(item.id).await.unwrap().quantity, 1);
    }

    #[tokio::test]
    async fn update_missing_id_is_not_found_and_creates_nothing() {
        let store = GroceryStore::in_memory();

        let err = store
            .update(
                42,
                GroceryItemUpdate {
                    name: "Ghost".to_string(),
                    description: None,
                    quantity: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(42)));
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn delete_is_not_found_the_second_time() {
        let store = GroceryStore::in_memory();
        let item = store.create(new_item("Milk", None)).await.unwrap();

        store.delete(item.id).await.unwrap();
        assert!(matches!(
            store.get_by_id(item.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(item.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groceries.json");

        let store = GroceryStore::open(&path).await.unwrap();
        let milk = store.create(new_item("Milk", Some(1))).await.unwrap();
        store.create(new_item("Bread", Some(5))).await.unwrap();
        store.delete(milk.id).await.unwrap();
        drop(store);

        let reopened = GroceryStore::open(&path).await.unwrap();
        let all = reopened.list_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Bread");

        // The counter survives the restart, so Milk's id is never handed
        // out again.
        let eggs = reopened.create(new_item("Eggs", None)).await.unwrap();
        assert_eq!(eggs.id, 3);
    }

    #[tokio::test]
    async fn failed_persist_leaves_the_store_unchanged() {
        let dir = TempDir::new().unwrap();
        // The parent directory is never created, so snapshot writes fail.
        let path = dir.path().join("missing").join("groceries.json");
        let store = GroceryStore::open(&path).await.unwrap();

        let err = store.create(new_item("Milk", Some(1))).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.count().await, 0);
        assert!(store.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn open_rejects_a_corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groceries.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = GroceryStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Snapshot(_)));
    }
}
