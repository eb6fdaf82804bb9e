use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::error::AppResult;
use crate::models::Item;

use super::repository::ItemRepository;

const ITEM_COLUMNS: &str =
    "id, owner_id, title, is_public, tags, view_count, like_count, created_at";

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed item repository
#[derive(Clone)]
pub struct PgItemRepository {
    pool: PgPool,
}

impl PgItemRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ItemRepository for PgItemRepository {
    async fn find_by_id(&self, id: i64) -> AppResult<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    async fn find_all_by_id(&self, ids: &[i64]) -> AppResult<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items WHERE id = ANY($1)",
            ITEM_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn save(&self, item: &Item) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, owner_id, title, is_public, tags, view_count, like_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                owner_id = EXCLUDED.owner_id,
                title = EXCLUDED.title,
                is_public = EXCLUDED.is_public,
                tags = EXCLUDED.tags,
                view_count = EXCLUDED.view_count,
                like_count = EXCLUDED.like_count
            "#,
        )
        .bind(item.id)
        .bind(item.owner_id)
        .bind(&item.title)
        .bind(item.is_public)
        .bind(&item.tags)
        .bind(item.view_count)
        .bind(item.like_count)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_top_by_view_count(&self, limit: i64) -> AppResult<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items ORDER BY view_count DESC, id ASC LIMIT $1",
            ITEM_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn find_top_by_like_count(&self, limit: i64) -> AppResult<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            "SELECT {} FROM items ORDER BY like_count DESC, id ASC LIMIT $1",
            ITEM_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn find_ids_by_owner(&self, owner_id: i64) -> AppResult<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM items WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    async fn find_similar_by_tags(&self, item: &Item, min_overlap: i64) -> AppResult<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(&format!(
            r#"
            SELECT {} FROM items i
            WHERE i.id <> $1
              AND i.is_public
              AND (SELECT count(DISTINCT t) FROM unnest(i.tags) AS t WHERE t = ANY($2)) >= $3
            "#,
            ITEM_COLUMNS
        ))
        .bind(item.id)
        .bind(&item.tags)
        .bind(min_overlap)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn member_exists(&self, member_id: i64) -> AppResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM members WHERE id = $1)")
                .bind(member_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn like_exists(&self, item_id: i64, member_id: i64) -> AppResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM item_likes WHERE item_id = $1 AND member_id = $2)",
        )
        .bind(item_id)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn save_like(&self, item_id: i64, member_id: i64) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO item_likes (item_id, member_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(item_id)
        .bind(member_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_like(&self, item_id: i64, member_id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM item_likes WHERE item_id = $1 AND member_id = $2")
            .bind(item_id)
            .bind(member_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_liked_members(&self, item_id: i64) -> AppResult<Vec<i64>> {
        let members =
            sqlx::query_scalar::<_, i64>("SELECT member_id FROM item_likes WHERE item_id = $1")
                .bind(item_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(members)
    }
}
