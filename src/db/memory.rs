//! In-process store backends.
//!
//! Back the test suite and local development without a running Redis or
//! Postgres. `MemoryCounterStore` honors TTLs and performs the member
//! toggle under a single lock, giving it the same single-operation
//! atomicity the Redis script provides.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::models::Item;

use super::redis::CounterStore;
use super::repository::ItemRepository;

#[derive(Default)]
struct CounterInner {
    strings: HashMap<String, String>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    expirations: HashMap<String, Instant>,
}

impl CounterInner {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.strings.remove(&key);
            self.sets.remove(&key);
            self.zsets.remove(&key);
            self.expirations.remove(&key);
        }
    }
}

/// Counter store held entirely in process memory
#[derive(Default)]
pub struct MemoryCounterStore {
    inner: Mutex<CounterInner>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Glob match supporting `*` wildcards, enough for the key patterns the
/// reconciliation job scans with
fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait::async_trait]
impl CounterStore for MemoryCounterStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        inner.strings.insert(key.to_string(), value.to_string());
        inner
            .expirations
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn toggle_set_member(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        let set = inner.sets.entry(key.to_string()).or_default();
        let now_member = if set.remove(member) {
            false
        } else {
            set.insert(member.to_string());
            true
        };
        // Like Redis, a set that empties out ceases to exist
        if !now_member && inner.sets.get(key).is_some_and(|s| s.is_empty()) {
            inner.sets.remove(key);
        }
        Ok(now_member)
    }

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_size(&self, key: &str) -> AppResult<i64> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner.sets.get(key).map(|set| set.len() as i64).unwrap_or(0))
    }

    async fn set_is_member(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    async fn set_add(&self, key: &str, member: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        let emptied = match inner.sets.get_mut(key) {
            Some(set) => {
                set.remove(member);
                set.is_empty()
            }
            None => false,
        };
        if emptied {
            inner.sets.remove(key);
        }
        Ok(())
    }

    async fn sorted_set_incr(&self, key: &str, member: &str, delta: f64) -> AppResult<f64> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        let zset = inner.zsets.entry(key.to_string()).or_default();
        let score = zset.entry(member.to_string()).or_insert(0.0);
        *score += delta;
        Ok(*score)
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> AppResult<Option<f64>> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner
            .zsets
            .get(key)
            .and_then(|zset| zset.get(member).copied()))
    }

    async fn sorted_set_reverse_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<(&String, f64)> =
            zset.iter().map(|(member, score)| (member, *score)).collect();
        // Descending score; ties in reverse lexical order, matching ZREVRANGE
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(a.0))
        });

        let len = entries.len() as isize;
        let resolve = |index: isize| -> isize {
            if index < 0 {
                (len + index).max(0)
            } else {
                index.min(len)
            }
        };
        let from = resolve(start);
        let to = (resolve(stop) + 1).min(len);
        if from >= to {
            return Ok(Vec::new());
        }

        Ok(entries[from as usize..to as usize]
            .iter()
            .map(|(member, _)| (*member).clone())
            .collect())
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        if let Some(zset) = inner.zsets.get_mut(key) {
            zset.remove(member);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        Ok(inner.strings.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        inner.strings.insert(key.to_string(), value.to_string());
        inner
            .expirations
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired();
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .chain(inner.sets.keys())
            .chain(inner.zsets.keys())
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        for key in keys {
            inner.strings.remove(key);
            inner.sets.remove(key);
            inner.zsets.remove(key);
            inner.expirations.remove(key);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .expirations
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }
}

#[derive(Default)]
struct RepositoryInner {
    items: HashMap<i64, Item>,
    members: HashSet<i64>,
    likes: HashSet<(i64, i64)>,
}

/// Item repository held entirely in process memory
#[derive(Default)]
pub struct MemoryItemRepository {
    inner: Mutex<RepositoryInner>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_item(&self, item: Item) {
        let mut inner = self.inner.lock().await;
        inner.items.insert(item.id, item);
    }

    pub async fn insert_member(&self, member_id: i64) {
        let mut inner = self.inner.lock().await;
        inner.members.insert(member_id);
    }

    /// Durable like rows, exposed for test assertions
    pub async fn like_rows(&self) -> Vec<(i64, i64)> {
        let inner = self.inner.lock().await;
        let mut rows: Vec<(i64, i64)> = inner.likes.iter().copied().collect();
        rows.sort();
        rows
    }
}

#[async_trait::async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Item>> {
        let inner = self.inner.lock().await;
        Ok(inner.items.get(&id).cloned())
    }

    async fn find_all_by_id(&self, ids: &[i64]) -> AppResult<Vec<Item>> {
        let inner = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.items.get(id).cloned())
            .collect())
    }

    async fn save(&self, item: &Item) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn find_top_by_view_count(&self, limit: i64) -> AppResult<Vec<Item>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<Item> = inner.items.values().cloned().collect();
        items.sort_by(|a, b| b.view_count.cmp(&a.view_count).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn find_top_by_like_count(&self, limit: i64) -> AppResult<Vec<Item>> {
        let inner = self.inner.lock().await;
        let mut items: Vec<Item> = inner.items.values().cloned().collect();
        items.sort_by(|a, b| b.like_count.cmp(&a.like_count).then_with(|| a.id.cmp(&b.id)));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn find_ids_by_owner(&self, owner_id: i64) -> AppResult<Vec<i64>> {
        let inner = self.inner.lock().await;
        let mut ids: Vec<i64> = inner
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .map(|item| item.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn find_similar_by_tags(&self, item: &Item, min_overlap: i64) -> AppResult<Vec<Item>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .items
            .values()
            .filter(|other| {
                other.id != item.id
                    && other.is_public
                    && other.shared_tag_count(item) as i64 >= min_overlap
            })
            .cloned()
            .collect())
    }

    async fn member_exists(&self, member_id: i64) -> AppResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.members.contains(&member_id))
    }

    async fn like_exists(&self, item_id: i64, member_id: i64) -> AppResult<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.likes.contains(&(item_id, member_id)))
    }

    async fn save_like(&self, item_id: i64, member_id: i64) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.items.contains_key(&item_id) {
            return Err(AppError::NotFound(format!("item {}", item_id)));
        }
        inner.likes.insert((item_id, member_id));
        Ok(())
    }

    async fn delete_like(&self, item_id: i64, member_id: i64) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        inner.likes.remove(&(item_id, member_id));
        Ok(())
    }

    async fn find_liked_members(&self, item_id: i64) -> AppResult<Vec<i64>> {
        let inner = self.inner.lock().await;
        let mut members: Vec<i64> = inner
            .likes
            .iter()
            .filter(|(item, _)| *item == item_id)
            .map(|(_, member)| *member)
            .collect();
        members.sort();
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("item_like:*", "item_like:42"));
        assert!(glob_match("view_seen:1:*", "view_seen:1:1.2.3.4"));
        assert!(!glob_match("item_like:*", "member_liked:42"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn test_set_if_absent_blocks_second_caller() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_secs(60);
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_if_absent_succeeds_after_expiry() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_millis(10);
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.set_if_absent("k", "1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_round_trip() {
        let store = MemoryCounterStore::new();
        assert!(store.toggle_set_member("s", "100").await.unwrap());
        assert!(store.set_is_member("s", "100").await.unwrap());
        assert!(!store.toggle_set_member("s", "100").await.unwrap());
        assert!(!store.set_is_member("s", "100").await.unwrap());
        assert_eq!(store.set_size("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reverse_range_orders_by_score() {
        let store = MemoryCounterStore::new();
        store.sorted_set_incr("z", "a", 1.0).await.unwrap();
        store.sorted_set_incr("z", "b", 3.0).await.unwrap();
        store.sorted_set_incr("z", "c", 2.0).await.unwrap();

        let all = store.sorted_set_reverse_range("z", 0, -1).await.unwrap();
        assert_eq!(all, vec!["b", "c", "a"]);

        let top_two = store.sorted_set_reverse_range("z", 0, 1).await.unwrap();
        assert_eq!(top_two, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_keys_matches_namespace_only() {
        let store = MemoryCounterStore::new();
        store.set_add("item_like:1", "100").await.unwrap();
        store.set_add("item_like:2", "100").await.unwrap();
        store.set_add("member_liked:100", "1").await.unwrap();

        let keys = store.keys("item_like:*").await.unwrap();
        assert_eq!(keys, vec!["item_like:1", "item_like:2"]);
    }

    #[tokio::test]
    async fn test_delete_removes_all_kinds() {
        let store = MemoryCounterStore::new();
        store
            .set("s", "v", Duration::from_secs(60))
            .await
            .unwrap();
        store.set_add("set", "m").await.unwrap();
        store.sorted_set_incr("z", "m", 1.0).await.unwrap();

        store
            .delete(&["s".to_string(), "set".to_string(), "z".to_string()])
            .await
            .unwrap();

        assert_eq!(store.get("s").await.unwrap(), None);
        assert_eq!(store.set_size("set").await.unwrap(), 0);
        assert_eq!(store.sorted_set_score("z", "m").await.unwrap(), None);
    }
}
