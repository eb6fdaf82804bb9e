use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::redis::keys::{CacheKey, RankingKey};
use crate::db::{CounterStore, ItemRepository};
use crate::error::{AppError, AppResult};
use crate::models::{Item, ItemSummary, SortType};

/// Weight of a view in the combined score
pub const DEFAULT_VIEW_WEIGHT: f64 = 1.0;

/// Weight of a like in the combined score. A like is a deliberate signal;
/// 3:1 keeps a well-liked item ahead of a merely-browsed one without letting
/// likes drown out view volume.
pub const DEFAULT_LIKE_WEIGHT: f64 = 3.0;

pub const DEFAULT_MAX_RESULTS: usize = 20;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(1_800);

/// Minimum shared tags for an item to count as similar to the seed
const SIMILAR_TAG_OVERLAP: i64 = 3;

/// Tuning knobs for the recommendation engine
#[derive(Debug, Clone)]
pub struct RecommendConfig {
    pub view_weight: f64,
    pub like_weight: f64,
    pub max_results: usize,
    pub cache_ttl: Duration,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            view_weight: DEFAULT_VIEW_WEIGHT,
            like_weight: DEFAULT_LIKE_WEIGHT,
            max_results: DEFAULT_MAX_RESULTS,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl From<&Config> for RecommendConfig {
    fn from(config: &Config) -> Self {
        Self {
            view_weight: config.recommend_view_weight,
            like_weight: config.recommend_like_weight,
            max_results: config.recommend_max_results,
            cache_ttl: Duration::from_secs(config.recommend_cache_ttl_secs),
        }
    }
}

/// Produces ranked candidate lists of related items.
///
/// Live ranking structures drive the scores; the durable store is the
/// fallback when they are empty or the counter store is unreachable. The
/// counter store is an optimization here, never a correctness dependency —
/// only a missing seed or a durable-store failure fails a request.
pub struct RecommendationService {
    store: Arc<dyn CounterStore>,
    items: Arc<dyn ItemRepository>,
    config: RecommendConfig,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn CounterStore>, items: Arc<dyn ItemRepository>) -> Self {
        Self::with_config(store, items, RecommendConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn CounterStore>,
        items: Arc<dyn ItemRepository>,
        config: RecommendConfig,
    ) -> Self {
        Self {
            store,
            items,
            config,
        }
    }

    /// Recommends items related to `seed_id`, ordered by the chosen
    /// strategy, ties broken by ascending item id.
    ///
    /// A previously computed list is served from the cache as-is. Items the
    /// actor owns are excluded when actor context is given.
    pub async fn recommend(
        &self,
        seed_id: i64,
        sort: SortType,
        actor: Option<i64>,
    ) -> AppResult<Vec<ItemSummary>> {
        let Some(seed) = self.items.find_by_id(seed_id).await? else {
            return Err(AppError::NotFound(format!("item {}", seed_id)));
        };

        let cache_key = CacheKey::Recommendation(seed_id).to_string();
        if let Some(ids) = self.cached_ids(&cache_key).await {
            tracing::debug!(seed_id, "recommendation cache hit");
            return self.resolve_and_prune(&ids).await;
        }

        let mut excluded: HashSet<i64> = HashSet::new();
        excluded.insert(seed_id);
        if let Some(actor_id) = actor {
            excluded.extend(self.items.find_ids_by_owner(actor_id).await?);
        }

        let mut candidates = match self.live_candidates(sort).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(
                    seed_id,
                    error = %e,
                    "counter store unavailable; recommending from durable counts"
                );
                BTreeMap::new()
            }
        };

        if sort == SortType::Combined {
            for similar in self
                .items
                .find_similar_by_tags(&seed, SIMILAR_TAG_OVERLAP)
                .await?
            {
                let durable_score = self.blend(similar.view_count as f64, similar.like_count as f64);
                candidates.entry(similar.id).or_insert(durable_score);
            }
        }

        candidates.retain(|id, _| !excluded.contains(id));

        let ranked = if candidates.is_empty() {
            self.durable_candidates(sort, &excluded).await?
        } else {
            rank(candidates, self.config.max_results)
        };

        let summaries = self.resolve_and_prune(&ranked).await?;

        if !summaries.is_empty() {
            let ids: Vec<i64> = summaries.iter().map(|s| s.id).collect();
            self.write_cache(&cache_key, seed_id, &ids).await;
        }

        Ok(summaries)
    }

    /// Top of the 24h trending window resolved to summaries carrying the
    /// live window counts, with a durable fallback when the window is empty
    /// or the counter store is unreachable.
    pub async fn trending(&self, limit: usize) -> AppResult<Vec<ItemSummary>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let live = match self.window_scores(limit).await {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!(error = %e, "counter store unavailable; trending from durable counts");
                Vec::new()
            }
        };

        if live.is_empty() {
            let items = self.items.find_top_by_view_count(limit as i64).await?;
            return Ok(items.iter().map(ItemSummary::from).collect());
        }

        let ids: Vec<i64> = live.iter().map(|(id, _)| *id).collect();
        let mut summaries = self.resolve_and_prune(&ids).await?;
        if summaries.is_empty() {
            let items = self.items.find_top_by_view_count(limit as i64).await?;
            return Ok(items.iter().map(ItemSummary::from).collect());
        }

        let scores: HashMap<i64, f64> = live.into_iter().collect();
        for summary in &mut summaries {
            if let Some(score) = scores.get(&summary.id) {
                summary.view_count = *score as i64;
            }
        }

        Ok(summaries)
    }

    async fn cached_ids(&self, cache_key: &str) -> Option<Vec<i64>> {
        match self.store.get(cache_key).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<i64>>(&json) {
                Ok(ids) => Some(ids),
                Err(e) => {
                    tracing::warn!(key = %cache_key, error = %e, "dropping unreadable recommendation cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %cache_key, error = %e, "recommendation cache read failed");
                None
            }
        }
    }

    async fn write_cache(&self, cache_key: &str, seed_id: i64, ids: &[i64]) {
        let json = match serde_json::to_string(ids) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(seed_id, error = %e, "recommendation cache encode failed");
                return;
            }
        };

        if let Err(e) = self.store.set(cache_key, &json, self.config.cache_ttl).await {
            tracing::warn!(seed_id, error = %e, "recommendation cache write failed");
        } else {
            tracing::debug!(seed_id, count = ids.len(), "recommendation list cached");
        }
    }

    /// Candidate scores from the live ranking structures. Only counter-store
    /// reads happen here; callers degrade an error into "no candidates".
    async fn live_candidates(&self, sort: SortType) -> AppResult<BTreeMap<i64, f64>> {
        match sort {
            SortType::Views => self.metric_scores(RankingKey::Views).await,
            SortType::Likes => self.metric_scores(RankingKey::Likes).await,
            SortType::Combined => {
                let views = self.metric_scores(RankingKey::Views).await?;
                let likes = self.metric_scores(RankingKey::Likes).await?;

                let ids: HashSet<i64> = views.keys().chain(likes.keys()).copied().collect();
                let mut combined = BTreeMap::new();
                for id in ids {
                    let view_score = views.get(&id).copied().unwrap_or(0.0);
                    let like_score = likes.get(&id).copied().unwrap_or(0.0);
                    combined.insert(id, self.blend(view_score, like_score));
                }

                // Window members join the candidate set even when the
                // all-time structures have no score for them yet
                for window in [RankingKey::TrendingWindow, RankingKey::PopularWindow] {
                    let members = self
                        .store
                        .sorted_set_reverse_range(
                            &window.to_string(),
                            0,
                            self.config.max_results as isize - 1,
                        )
                        .await?;
                    for member in members {
                        if let Ok(id) = member.parse::<i64>() {
                            combined.entry(id).or_insert(0.0);
                        }
                    }
                }

                Ok(combined)
            }
        }
    }

    async fn metric_scores(&self, key: RankingKey) -> AppResult<BTreeMap<i64, f64>> {
        let key = key.to_string();
        let members = self
            .store
            .sorted_set_reverse_range(&key, 0, self.config.max_results as isize - 1)
            .await?;

        let mut scores = BTreeMap::new();
        for member in members {
            let Ok(id) = member.parse::<i64>() else {
                tracing::warn!(key = %key, member = %member, "skipping unparseable ranking member");
                continue;
            };
            let score = self
                .store
                .sorted_set_score(&key, &member)
                .await?
                .unwrap_or(0.0);
            scores.insert(id, score);
        }
        Ok(scores)
    }

    async fn window_scores(&self, limit: usize) -> AppResult<Vec<(i64, f64)>> {
        let key = RankingKey::TrendingWindow.to_string();
        let members = self
            .store
            .sorted_set_reverse_range(&key, 0, limit as isize - 1)
            .await?;

        let mut scores = Vec::with_capacity(members.len());
        for member in members {
            let Ok(id) = member.parse::<i64>() else {
                continue;
            };
            let score = self
                .store
                .sorted_set_score(&key, &member)
                .await?
                .unwrap_or(0.0);
            scores.push((id, score));
        }

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Ok(scores)
    }

    /// Ranked fallback over durable counters, applied when no live
    /// candidates survive exclusion
    async fn durable_candidates(
        &self,
        sort: SortType,
        excluded: &HashSet<i64>,
    ) -> AppResult<Vec<i64>> {
        let limit = (self.config.max_results + excluded.len()) as i64;

        match sort {
            SortType::Views => {
                let items = self.items.find_top_by_view_count(limit).await?;
                Ok(take_ids(items, excluded, self.config.max_results))
            }
            SortType::Likes => {
                let items = self.items.find_top_by_like_count(limit).await?;
                Ok(take_ids(items, excluded, self.config.max_results))
            }
            SortType::Combined => {
                let mut blended = BTreeMap::new();
                let top_views = self.items.find_top_by_view_count(limit).await?;
                let top_likes = self.items.find_top_by_like_count(limit).await?;
                for item in top_views.into_iter().chain(top_likes) {
                    let score = self.blend(item.view_count as f64, item.like_count as f64);
                    blended.insert(item.id, score);
                }
                blended.retain(|id, _| !excluded.contains(id));
                Ok(rank(blended, self.config.max_results))
            }
        }
    }

    /// Resolves ids to summaries preserving order. Ids no longer durable are
    /// dropped and pruned from the ranking structures best-effort.
    async fn resolve_and_prune(&self, ids: &[i64]) -> AppResult<Vec<ItemSummary>> {
        let items = self.items.find_all_by_id(ids).await?;
        let by_id: HashMap<i64, &Item> = items.iter().map(|item| (item.id, item)).collect();

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.get(id) {
                Some(item) => summaries.push(ItemSummary::from(*item)),
                None => {
                    tracing::debug!(item_id = id, "pruning stale ranking entry");
                    let member = id.to_string();
                    for key in RankingKey::all() {
                        if let Err(e) = self
                            .store
                            .sorted_set_remove(&key.to_string(), &member)
                            .await
                        {
                            tracing::debug!(item_id = id, error = %e, "stale entry prune failed");
                        }
                    }
                }
            }
        }
        Ok(summaries)
    }

    fn blend(&self, view_score: f64, like_score: f64) -> f64 {
        view_score * self.config.view_weight + like_score * self.config.like_weight
    }
}

/// Deterministic ranking: descending score, ties by ascending item id
fn rank(candidates: BTreeMap<i64, f64>, max_results: usize) -> Vec<i64> {
    let mut ranked: Vec<(i64, f64)> = candidates.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(max_results);
    ranked.into_iter().map(|(id, _)| id).collect()
}

fn take_ids(items: Vec<Item>, excluded: &HashSet<i64>, max_results: usize) -> Vec<i64> {
    items
        .into_iter()
        .map(|item| item.id)
        .filter(|id| !excluded.contains(id))
        .take(max_results)
        .collect()
}
