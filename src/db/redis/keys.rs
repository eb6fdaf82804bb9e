use std::fmt::Display;

/// Prefix shared by all per-item like sets; scanned by the reconciliation job
pub const LIKE_SET_PATTERN: &str = "item_like:*";

/// Keys for single-value and set entries in the counter store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Per-client view-dedupe marker, expires after the dedupe window
    ViewMarker { item_id: i64, client: String },
    /// Set of member ids currently liking an item; its size is the live like count
    LikeSet(i64),
    /// Set of item ids a member currently likes
    MemberLiked(i64),
    /// Cached ordered id list computed by the recommendation engine
    Recommendation(i64),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::ViewMarker { item_id, client } => {
                write!(f, "view_seen:{}:{}", item_id, client)
            }
            CacheKey::LikeSet(item_id) => write!(f, "item_like:{}", item_id),
            CacheKey::MemberLiked(member_id) => write!(f, "member_liked:{}", member_id),
            CacheKey::Recommendation(item_id) => write!(f, "recommend:{}", item_id),
        }
    }
}

impl CacheKey {
    /// Parses the item id out of a like-set key produced by `LikeSet`.
    ///
    /// Returns `None` for keys that do not match the `item_like:{id}` shape;
    /// the reconciliation job skips those rather than failing the batch.
    pub fn parse_like_set(key: &str) -> Option<i64> {
        key.strip_prefix("item_like:")?.parse().ok()
    }

    /// Glob pattern matching every view-dedupe marker for an item,
    /// regardless of client
    pub fn view_marker_pattern(item_id: i64) -> String {
        format!("view_seen:{}:*", item_id)
    }
}

/// Score-ordered ranking structures, one sorted set per metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingKey {
    /// All-time live view counts
    Views,
    /// All-time live like counts
    Likes,
    /// Views within the rolling 24h window
    TrendingWindow,
    /// Likes within the rolling 24h window
    PopularWindow,
}

impl Display for RankingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RankingKey::Views => write!(f, "rank:view_count"),
            RankingKey::Likes => write!(f, "rank:like_count"),
            RankingKey::TrendingWindow => write!(f, "rank:trending:24h"),
            RankingKey::PopularWindow => write!(f, "rank:popular:24h"),
        }
    }
}

impl RankingKey {
    /// Every ranking structure an item may appear in; used when cascading
    /// item deletion into the cache
    pub fn all() -> [RankingKey; 4] {
        [
            RankingKey::Views,
            RankingKey::Likes,
            RankingKey::TrendingWindow,
            RankingKey::PopularWindow,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_marker_key() {
        let key = CacheKey::ViewMarker {
            item_id: 42,
            client: "1.2.3.4".to_string(),
        };
        assert_eq!(format!("{}", key), "view_seen:42:1.2.3.4");
    }

    #[test]
    fn test_like_set_key() {
        assert_eq!(format!("{}", CacheKey::LikeSet(7)), "item_like:7");
    }

    #[test]
    fn test_member_liked_key() {
        assert_eq!(format!("{}", CacheKey::MemberLiked(100)), "member_liked:100");
    }

    #[test]
    fn test_recommendation_key() {
        assert_eq!(format!("{}", CacheKey::Recommendation(3)), "recommend:3");
    }

    #[test]
    fn test_parse_like_set_round_trip() {
        let key = format!("{}", CacheKey::LikeSet(99));
        assert_eq!(CacheKey::parse_like_set(&key), Some(99));
    }

    #[test]
    fn test_view_marker_pattern_covers_marker_keys() {
        let marker = CacheKey::ViewMarker {
            item_id: 5,
            client: "10.0.0.1".to_string(),
        };
        let pattern = CacheKey::view_marker_pattern(5);
        assert_eq!(pattern, "view_seen:5:*");
        assert!(format!("{}", marker).starts_with(pattern.trim_end_matches('*')));
    }

    #[test]
    fn test_parse_like_set_rejects_garbage() {
        assert_eq!(CacheKey::parse_like_set("item_like:"), None);
        assert_eq!(CacheKey::parse_like_set("item_like:abc"), None);
        assert_eq!(CacheKey::parse_like_set("view_seen:1:x"), None);
    }

    #[test]
    fn test_ranking_keys() {
        assert_eq!(format!("{}", RankingKey::Views), "rank:view_count");
        assert_eq!(format!("{}", RankingKey::Likes), "rank:like_count");
        assert_eq!(format!("{}", RankingKey::TrendingWindow), "rank:trending:24h");
        assert_eq!(format!("{}", RankingKey::PopularWindow), "rank:popular:24h");
    }
}
