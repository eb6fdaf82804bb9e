use crate::error::AppResult;
use crate::models::Item;

#[cfg(test)]
use mockall::automock;

/// Durable record store boundary.
///
/// The system of record for items, members, and like relations. Counter
/// columns read through here may lag the counter store between
/// reconciliation runs.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ItemRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Item>>;

    /// Batch lookup. Missing ids are silently absent from the result;
    /// callers decide whether that matters.
    async fn find_all_by_id(&self, ids: &[i64]) -> AppResult<Vec<Item>>;

    /// Upserts the item row, including its counter columns
    async fn save(&self, item: &Item) -> AppResult<()>;

    /// Items ordered by view count descending, ties by ascending id
    async fn find_top_by_view_count(&self, limit: i64) -> AppResult<Vec<Item>>;

    /// Items ordered by like count descending, ties by ascending id
    async fn find_top_by_like_count(&self, limit: i64) -> AppResult<Vec<Item>>;

    async fn find_ids_by_owner(&self, owner_id: i64) -> AppResult<Vec<i64>>;

    /// Public items sharing at least `min_overlap` tags with `item`,
    /// excluding the item itself
    async fn find_similar_by_tags(&self, item: &Item, min_overlap: i64) -> AppResult<Vec<Item>>;

    async fn member_exists(&self, member_id: i64) -> AppResult<bool>;

    async fn like_exists(&self, item_id: i64, member_id: i64) -> AppResult<bool>;

    /// Records a like relation; inserting an existing relation is a no-op
    async fn save_like(&self, item_id: i64, member_id: i64) -> AppResult<()>;

    async fn delete_like(&self, item_id: i64, member_id: i64) -> AppResult<()>;

    /// Member ids with a durable like relation for the item
    async fn find_liked_members(&self, item_id: i64) -> AppResult<Vec<i64>>;
}
