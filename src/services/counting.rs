use std::sync::Arc;
use std::time::Duration;

use crate::db::redis::keys::{CacheKey, RankingKey};
use crate::db::{CounterStore, ItemRepository};
use crate::error::{AppError, AppResult};

/// Default lifetime of a per-client view-dedupe marker
pub const DEFAULT_VIEW_DEDUPE_TTL: Duration = Duration::from_secs(86_400);

/// Default lifetime of the trending/popular ranking windows
pub const DEFAULT_RANKING_WINDOW_TTL: Duration = Duration::from_secs(86_400);

/// Records view and like signals against the counter store without touching
/// the durable store synchronously.
///
/// The durable store is consulted only for existence checks; counter
/// mutations stay cache-side until the reconciliation job folds them in.
pub struct CountingService {
    store: Arc<dyn CounterStore>,
    items: Arc<dyn ItemRepository>,
    view_dedupe_ttl: Duration,
    window_ttl: Duration,
}

impl CountingService {
    pub fn new(store: Arc<dyn CounterStore>, items: Arc<dyn ItemRepository>) -> Self {
        Self::with_ttls(store, items, DEFAULT_VIEW_DEDUPE_TTL, DEFAULT_RANKING_WINDOW_TTL)
    }

    pub fn with_ttls(
        store: Arc<dyn CounterStore>,
        items: Arc<dyn ItemRepository>,
        view_dedupe_ttl: Duration,
        window_ttl: Duration,
    ) -> Self {
        Self {
            store,
            items,
            view_dedupe_ttl,
            window_ttl,
        }
    }

    /// Counts a view for `(client, item)` at most once per dedupe window.
    ///
    /// The dedupe marker is claimed with an atomic set-if-absent, so of any
    /// number of concurrent calls for the same client and item exactly one
    /// wins and increments. Returns whether this call counted the view.
    ///
    /// Fails closed: a store error means the view was not counted and the
    /// marker may or may not be held; the client re-views within the window
    /// at worst.
    pub async fn register_view(&self, item_id: i64, client: &str) -> AppResult<bool> {
        let marker = CacheKey::ViewMarker {
            item_id,
            client: client.to_string(),
        }
        .to_string();

        let is_new_view = self
            .store
            .set_if_absent(&marker, "1", self.view_dedupe_ttl)
            .await?;

        if !is_new_view {
            tracing::debug!(item_id, client = %client, "view already counted in window");
            return Ok(false);
        }

        let member = item_id.to_string();
        self.store
            .sorted_set_incr(&RankingKey::Views.to_string(), &member, 1.0)
            .await?;

        // The window is a secondary signal; losing an increment there is
        // tolerated divergence, not a failed view.
        if let Err(e) = self.bump_window(RankingKey::TrendingWindow, &member, 1.0).await {
            tracing::warn!(item_id, error = %e, "trending window out of sync");
        }

        tracing::debug!(item_id, client = %client, "view counted");
        Ok(true)
    }

    /// Toggles `member_id`'s like on an item and returns whether the member
    /// now likes it.
    ///
    /// The membership check and flip run as one atomic store-side operation;
    /// concurrent toggles from the same member serialize there and can never
    /// double-add. Item and member must exist durably.
    pub async fn toggle_like(&self, item_id: i64, member_id: i64) -> AppResult<bool> {
        if self.items.find_by_id(item_id).await?.is_none() {
            return Err(AppError::NotFound(format!("item {}", item_id)));
        }
        if !self.items.member_exists(member_id).await? {
            return Err(AppError::NotFound(format!("member {}", member_id)));
        }

        let like_set = CacheKey::LikeSet(item_id).to_string();
        let now_liked = self
            .store
            .toggle_set_member(&like_set, &member_id.to_string())
            .await?;

        // The toggle above is the commit point. Ranking structures and the
        // member-liked index trail it; on failure they diverge until the
        // next counting event or reconciliation run.
        if let Err(e) = self.update_like_rankings(item_id, member_id, now_liked).await {
            tracing::warn!(item_id, member_id, error = %e, "ranking structures out of sync");
        }

        tracing::debug!(item_id, member_id, now_liked, "like toggled");
        Ok(now_liked)
    }

    /// Whether the member currently likes the item. Pure membership check.
    pub async fn is_liked(&self, item_id: i64, member_id: i64) -> AppResult<bool> {
        let like_set = CacheKey::LikeSet(item_id).to_string();
        self.store
            .set_is_member(&like_set, &member_id.to_string())
            .await
    }

    /// Live like count: the size of the item's like set. Authoritative for
    /// display until reconciliation.
    pub async fn live_like_count(&self, item_id: i64) -> AppResult<i64> {
        let like_set = CacheKey::LikeSet(item_id).to_string();
        self.store.set_size(&like_set).await
    }

    /// Live view count from the ranking structure; 0 when the item has no
    /// entry yet
    pub async fn live_view_count(&self, item_id: i64) -> AppResult<i64> {
        let score = self
            .store
            .sorted_set_score(&RankingKey::Views.to_string(), &item_id.to_string())
            .await?;
        Ok(score.unwrap_or(0.0) as i64)
    }

    /// Cascades item deletion into the cache: dedupe markers, like set,
    /// ranking memberships, and the cached recommendation list.
    pub async fn purge_item(&self, item_id: i64) -> AppResult<()> {
        let markers = self
            .store
            .keys(&CacheKey::view_marker_pattern(item_id))
            .await?;
        self.store.delete(&markers).await?;

        self.store
            .delete(&[
                CacheKey::LikeSet(item_id).to_string(),
                CacheKey::Recommendation(item_id).to_string(),
            ])
            .await?;

        let member = item_id.to_string();
        for key in RankingKey::all() {
            self.store
                .sorted_set_remove(&key.to_string(), &member)
                .await?;
        }

        tracing::info!(item_id, "cache entries purged for deleted item");
        Ok(())
    }

    async fn update_like_rankings(
        &self,
        item_id: i64,
        member_id: i64,
        now_liked: bool,
    ) -> AppResult<()> {
        let member = item_id.to_string();
        let delta = if now_liked { 1.0 } else { -1.0 };

        self.store
            .sorted_set_incr(&RankingKey::Likes.to_string(), &member, delta)
            .await?;
        self.bump_window(RankingKey::PopularWindow, &member, delta)
            .await?;

        let member_liked = CacheKey::MemberLiked(member_id).to_string();
        if now_liked {
            self.store.set_add(&member_liked, &member).await?;
        } else {
            self.store.set_remove(&member_liked, &member).await?;
        }

        Ok(())
    }

    async fn bump_window(&self, key: RankingKey, member: &str, delta: f64) -> AppResult<()> {
        let key = key.to_string();
        self.store.sorted_set_incr(&key, member, delta).await?;
        self.store.expire(&key, self.window_ttl).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryCounterStore, MemoryItemRepository};
    use crate::models::Item;
    use chrono::Utc;

    fn item(id: i64, owner_id: i64) -> Item {
        Item {
            id,
            owner_id,
            title: format!("item {}", id),
            is_public: true,
            tags: vec![],
            view_count: 0,
            like_count: 0,
            created_at: Utc::now(),
        }
    }

    async fn setup() -> (Arc<MemoryCounterStore>, Arc<MemoryItemRepository>, CountingService) {
        let store = Arc::new(MemoryCounterStore::new());
        let items = Arc::new(MemoryItemRepository::new());
        items.insert_item(item(1, 10)).await;
        items.insert_member(100).await;
        let service = CountingService::new(store.clone(), items.clone());
        (store, items, service)
    }

    #[tokio::test]
    async fn test_second_view_in_window_is_not_counted() {
        let (_, _, service) = setup().await;

        assert!(service.register_view(1, "1.2.3.4").await.unwrap());
        assert!(!service.register_view(1, "1.2.3.4").await.unwrap());

        assert_eq!(service.live_view_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_distinct_clients_each_count() {
        let (_, _, service) = setup().await;

        assert!(service.register_view(1, "1.2.3.4").await.unwrap());
        assert!(service.register_view(1, "5.6.7.8").await.unwrap());

        assert_eq!(service.live_view_count(1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_views_from_one_client_count_once() {
        let (store, items, _) = setup().await;
        let service = Arc::new(CountingService::new(store, items));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.register_view(1, "1.2.3.4").await.unwrap()
            }));
        }

        let mut counted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                counted += 1;
            }
        }

        assert_eq!(counted, 1);
        assert_eq!(service.live_view_count(1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_toggle_like_round_trip() {
        let (_, _, service) = setup().await;

        assert!(service.toggle_like(1, 100).await.unwrap());
        assert!(service.is_liked(1, 100).await.unwrap());
        assert_eq!(service.live_like_count(1).await.unwrap(), 1);

        assert!(!service.toggle_like(1, 100).await.unwrap());
        assert!(!service.is_liked(1, 100).await.unwrap());
        assert_eq!(service.live_like_count(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_even_toggle_count_restores_original_state() {
        let (_, _, service) = setup().await;

        for _ in 0..4 {
            service.toggle_like(1, 100).await.unwrap();
        }
        assert!(!service.is_liked(1, 100).await.unwrap());

        service.toggle_like(1, 100).await.unwrap();
        assert!(service.is_liked(1, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_toggles_never_corrupt_the_set() {
        let (store, items, _) = setup().await;
        let service = Arc::new(CountingService::new(store, items));

        let mut handles = Vec::new();
        for _ in 0..100 {
            let service = service.clone();
            handles.push(tokio::spawn(
                async move { service.toggle_like(1, 100).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let count = service.live_like_count(1).await.unwrap();
        assert!(count >= 0);
        // 100 toggles from one member: parity says the like is off again
        assert_eq!(count, 0);
        assert!(!service.is_liked(1, 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_toggle_like_unknown_item() {
        let (_, _, service) = setup().await;
        let err = service.toggle_like(999, 100).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_like_unknown_member() {
        let (_, _, service) = setup().await;
        let err = service.toggle_like(1, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_toggle_updates_like_ranking_and_member_index() {
        let (store, _, service) = setup().await;

        service.toggle_like(1, 100).await.unwrap();
        let score = store
            .sorted_set_score(&RankingKey::Likes.to_string(), "1")
            .await
            .unwrap();
        assert_eq!(score, Some(1.0));
        assert!(store
            .set_is_member(&CacheKey::MemberLiked(100).to_string(), "1")
            .await
            .unwrap());

        service.toggle_like(1, 100).await.unwrap();
        let score = store
            .sorted_set_score(&RankingKey::Likes.to_string(), "1")
            .await
            .unwrap();
        assert_eq!(score, Some(0.0));
        assert!(!store
            .set_is_member(&CacheKey::MemberLiked(100).to_string(), "1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_purge_item_clears_cache_state() {
        let (store, _, service) = setup().await;

        service.register_view(1, "1.2.3.4").await.unwrap();
        service.toggle_like(1, 100).await.unwrap();
        store
            .set(
                &CacheKey::Recommendation(1).to_string(),
                "[2,3]",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        service.purge_item(1).await.unwrap();

        assert_eq!(service.live_view_count(1).await.unwrap(), 0);
        assert_eq!(service.live_like_count(1).await.unwrap(), 0);
        assert_eq!(
            store
                .get(&CacheKey::Recommendation(1).to_string())
                .await
                .unwrap(),
            None
        );
        // Marker gone: the same client counts again
        assert!(service.register_view(1, "1.2.3.4").await.unwrap());
    }
}
