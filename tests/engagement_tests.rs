//! End-to-end engagement flow over the in-memory store backends: counting,
//! reconciliation, and recommendation wired together the way the production
//! stack wires Redis and Postgres.

use std::sync::Arc;

use chrono::Utc;

use curio_core::db::memory::{MemoryCounterStore, MemoryItemRepository};
use curio_core::models::{Item, SortType};
use curio_core::services::{CountingService, ReconciliationService, RecommendationService};

struct Stack {
    items: Arc<MemoryItemRepository>,
    counting: CountingService,
    reconciliation: ReconciliationService,
    recommendation: RecommendationService,
}

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

async fn stack() -> Stack {
    let store = Arc::new(MemoryCounterStore::new());
    let items = Arc::new(MemoryItemRepository::new());

    for id in 1..=4 {
        items.insert_item(item(id, 10)).await;
    }
    for member_id in [100, 101, 102] {
        items.insert_member(member_id).await;
    }

    Stack {
        items: items.clone(),
        counting: CountingService::new(store.clone(), items.clone()),
        reconciliation: ReconciliationService::new(store.clone(), items.clone()),
        recommendation: RecommendationService::new(store, items),
    }
}

fn ids(summaries: &[curio_core::models::ItemSummary]) -> Vec<i64> {
    summaries.iter().map(|s| s.id).collect()
}

#[tokio::test]
async fn test_signals_flow_through_to_recommendations_and_durable_counts() {
    let stack = stack().await;

    // Three clients view item 2, two view item 3, one views item 4
    for client in ["1.1.1.1", "2.2.2.2", "3.3.3.3"] {
        assert!(stack.counting.register_view(2, client).await.unwrap());
    }
    for client in ["1.1.1.1", "2.2.2.2"] {
        assert!(stack.counting.register_view(3, client).await.unwrap());
    }
    assert!(stack.counting.register_view(4, "1.1.1.1").await.unwrap());

    // Item 3 collects two likes, item 2 one
    assert!(stack.counting.toggle_like(3, 100).await.unwrap());
    assert!(stack.counting.toggle_like(3, 101).await.unwrap());
    assert!(stack.counting.toggle_like(2, 100).await.unwrap());

    // Combined blend: item 3 = 2×1 + 2×3 = 8, item 2 = 3×1 + 1×3 = 6, item 4 = 1
    let recommended = stack
        .recommendation
        .recommend(1, SortType::Combined, None)
        .await
        .unwrap();
    assert_eq!(ids(&recommended), vec![3, 2, 4]);

    let trending = stack.recommendation.trending(3).await.unwrap();
    assert_eq!(ids(&trending), vec![2, 3, 4]);
    assert_eq!(trending[0].view_count, 3);

    // Reconciliation folds the cache counters into the durable rows
    let like_stats = stack.reconciliation.sync_likes_to_database().await.unwrap();
    let view_stats = stack.reconciliation.sync_views_to_database().await.unwrap();
    assert_eq!(like_stats.likes_created, 3);
    assert_eq!(view_stats.items_synced, 3);

    let item2 = stack.items.find_by_id(2).await.unwrap().unwrap();
    let item3 = stack.items.find_by_id(3).await.unwrap().unwrap();
    assert_eq!((item2.view_count, item2.like_count), (3, 1));
    assert_eq!((item3.view_count, item3.like_count), (2, 2));
    assert_eq!(
        stack.items.like_rows().await,
        vec![(2, 100), (3, 100), (3, 101)]
    );

    // Durable like counts agree with the live sets at the sync instant
    assert_eq!(
        item3.like_count,
        stack.counting.live_like_count(3).await.unwrap()
    );
}

#[tokio::test]
async fn test_recommendations_are_served_from_cache_until_expiry() {
    let stack = stack().await;

    stack.counting.register_view(2, "1.1.1.1").await.unwrap();
    let first = stack
        .recommendation
        .recommend(1, SortType::Views, None)
        .await
        .unwrap();
    assert_eq!(ids(&first), vec![2]);

    // New signals arrive, but the cached list keeps serving
    for client in ["4.4.4.4", "5.5.5.5"] {
        stack.counting.register_view(3, client).await.unwrap();
    }
    let second = stack
        .recommendation
        .recommend(1, SortType::Views, None)
        .await
        .unwrap();
    assert_eq!(ids(&second), vec![2]);
}

#[tokio::test]
async fn test_unlike_then_reconcile_prunes_durable_rows() {
    let stack = stack().await;

    stack.counting.toggle_like(2, 100).await.unwrap();
    stack.counting.toggle_like(2, 101).await.unwrap();
    stack.reconciliation.sync_likes_to_database().await.unwrap();
    assert_eq!(stack.items.like_rows().await, vec![(2, 100), (2, 101)]);

    stack.counting.toggle_like(2, 100).await.unwrap();
    let stats = stack.reconciliation.sync_likes_to_database().await.unwrap();

    assert_eq!(stats.likes_removed, 1);
    assert_eq!(stack.items.like_rows().await, vec![(2, 101)]);
    assert_eq!(stack.items.find_by_id(2).await.unwrap().unwrap().like_count, 1);
}

#[tokio::test]
async fn test_dedupe_holds_across_view_and_recommendation_reads() {
    let stack = stack().await;

    assert!(stack.counting.register_view(2, "9.9.9.9").await.unwrap());
    assert!(!stack.counting.register_view(2, "9.9.9.9").await.unwrap());
    assert_eq!(stack.counting.live_view_count(2).await.unwrap(), 1);

    let recommended = stack
        .recommendation
        .recommend(1, SortType::Views, None)
        .await
        .unwrap();
    assert_eq!(ids(&recommended), vec![2]);
    assert_eq!(recommended[0].view_count, 0); // durable projection still lags

    stack.reconciliation.sync_views_to_database().await.unwrap();
    assert_eq!(stack.items.find_by_id(2).await.unwrap().unwrap().view_count, 1);
}
