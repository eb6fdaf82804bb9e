use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::redis::keys::{CacheKey, RankingKey, LIKE_SET_PATTERN};
use crate::db::{CounterStore, ItemRepository};
use crate::error::{AppError, AppResult};

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    /// Items whose durable row was brought up to date
    pub items_synced: usize,
    /// Durable like rows created this pass
    pub likes_created: usize,
    /// Durable like rows pruned this pass
    pub likes_removed: usize,
    /// Entries skipped over (malformed key, missing item, per-item error)
    pub skipped: usize,
}

/// Folds cache-side counters into the durable store.
///
/// Best-effort batch semantics: one item failing never aborts the rest, and
/// re-running against already-reconciled state is a no-op. Reads are
/// snapshot reads; toggles landing mid-pass are picked up next run.
pub struct ReconciliationService {
    store: Arc<dyn CounterStore>,
    items: Arc<dyn ItemRepository>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn CounterStore>, items: Arc<dyn ItemRepository>) -> Self {
        Self { store, items }
    }

    /// Reconciles every like set in the counting namespace: creates missing
    /// durable like rows, prunes rows whose member no longer appears in the
    /// cache snapshot, and writes the snapshot size to `Item.like_count`.
    pub async fn sync_likes_to_database(&self) -> AppResult<SyncStats> {
        let keys = self.store.keys(LIKE_SET_PATTERN).await?;
        let mut stats = SyncStats::default();

        for key in keys {
            let Some(item_id) = CacheKey::parse_like_set(&key) else {
                tracing::warn!(key = %key, "skipping malformed like-set key");
                stats.skipped += 1;
                continue;
            };

            match self.sync_item_likes(item_id, &key).await {
                Ok((created, removed)) => {
                    stats.items_synced += 1;
                    stats.likes_created += created;
                    stats.likes_removed += removed;
                }
                Err(e) => {
                    tracing::warn!(item_id, error = %e, "like sync failed for item; continuing");
                    stats.skipped += 1;
                }
            }
        }

        tracing::info!(
            items = stats.items_synced,
            created = stats.likes_created,
            removed = stats.likes_removed,
            skipped = stats.skipped,
            "like reconciliation complete"
        );
        Ok(stats)
    }

    async fn sync_item_likes(&self, item_id: i64, key: &str) -> AppResult<(usize, usize)> {
        let Some(mut item) = self.items.find_by_id(item_id).await? else {
            return Err(AppError::NotFound(format!("item {}", item_id)));
        };

        // Snapshot of the like set; concurrent toggles after this read are
        // deferred to the next pass
        let members = self.store.set_members(key).await?;

        let mut created = 0;
        let mut snapshot_ids: HashSet<i64> = HashSet::with_capacity(members.len());
        for member in &members {
            let Ok(member_id) = member.parse::<i64>() else {
                tracing::warn!(key = %key, member = %member, "skipping unparseable member id");
                continue;
            };
            snapshot_ids.insert(member_id);

            if !self.items.member_exists(member_id).await? {
                tracing::warn!(item_id, member_id, "skipping like for unknown member");
                continue;
            }
            if !self.items.like_exists(item_id, member_id).await? {
                self.items.save_like(item_id, member_id).await?;
                created += 1;
            }
        }

        let mut removed = 0;
        for member_id in self.items.find_liked_members(item_id).await? {
            if !snapshot_ids.contains(&member_id) {
                self.items.delete_like(item_id, member_id).await?;
                removed += 1;
            }
        }

        item.like_count = members.len() as i64;
        self.items.save(&item).await?;

        Ok((created, removed))
    }

    /// Writes live view counts into the durable rows. Counts never move
    /// backwards: a cache eviction must not erase view history.
    pub async fn sync_views_to_database(&self) -> AppResult<SyncStats> {
        let key = RankingKey::Views.to_string();
        let entries = self.store.sorted_set_reverse_range(&key, 0, -1).await?;
        let mut stats = SyncStats::default();

        for member in entries {
            let Ok(item_id) = member.parse::<i64>() else {
                tracing::warn!(key = %key, member = %member, "skipping unparseable ranking member");
                stats.skipped += 1;
                continue;
            };

            match self.sync_item_views(item_id, &key, &member).await {
                Ok(()) => stats.items_synced += 1,
                Err(e) => {
                    tracing::warn!(item_id, error = %e, "view sync failed for item; continuing");
                    stats.skipped += 1;
                }
            }
        }

        tracing::info!(
            items = stats.items_synced,
            skipped = stats.skipped,
            "view reconciliation complete"
        );
        Ok(stats)
    }

    async fn sync_item_views(&self, item_id: i64, key: &str, member: &str) -> AppResult<()> {
        let Some(mut item) = self.items.find_by_id(item_id).await? else {
            return Err(AppError::NotFound(format!("item {}", item_id)));
        };

        let live = self
            .store
            .sorted_set_score(key, member)
            .await?
            .unwrap_or(0.0) as i64;

        if live > item.view_count {
            item.view_count = live;
            self.items.save(&item).await?;
        }

        Ok(())
    }

    /// One full pass over both counters. Errors are logged, never propagated;
    /// the scheduler calls this on every tick.
    pub async fn run_once(&self) {
        if let Err(e) = self.sync_likes_to_database().await {
            tracing::error!(error = %e, "like reconciliation pass failed");
        }
        if let Err(e) = self.sync_views_to_database().await {
            tracing::error!(error = %e, "view reconciliation pass failed");
        }
    }

    /// Spawns the background reconciliation worker.
    ///
    /// Runs a pass immediately, then on every interval tick, until the
    /// handle is shut down. A single worker serializes all passes; there is
    /// no locking against live traffic.
    pub fn spawn(self: Arc<Self>, every: Duration) -> ReconciliationHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = every.as_secs(), "reconciliation worker started");
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        // Final pass so counters accumulated since the last
                        // tick survive the restart
                        self.run_once().await;
                        tracing::info!("reconciliation worker stopped");
                        break;
                    }
                }
            }
        });

        ReconciliationHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle for gracefully stopping the reconciliation worker
pub struct ReconciliationHandle {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl ReconciliationHandle {
    /// Signals the worker to run a final pass and stop, then waits for it
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "reconciliation worker task failed");
        }
    }
}
