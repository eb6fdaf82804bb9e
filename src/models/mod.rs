use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A curated link collection or playlist subject to view/like counting
/// and recommendation.
///
/// Counter columns are eventually consistent: the live values live in the
/// counter store and are folded into these fields by the reconciliation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub is_public: bool,
    /// Unordered tag set; duplicates carry no meaning
    pub tags: Vec<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Number of tags shared with `other`, ignoring duplicates
    pub fn shared_tag_count(&self, other: &Item) -> usize {
        self.tags
            .iter()
            .filter(|tag| other.tags.iter().any(|t| t == *tag))
            .collect::<std::collections::HashSet<_>>()
            .len()
    }
}

/// The projection of an item returned by recommendation and trending queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: i64,
    pub title: String,
    pub owner_id: i64,
    pub view_count: i64,
    pub like_count: i64,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            owner_id: item.owner_id,
            view_count: item.view_count,
            like_count: item.like_count,
        }
    }
}

/// Ranking strategy for recommendation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Views,
    Likes,
    #[default]
    Combined,
}

impl Display for SortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortType::Views => write!(f, "views"),
            SortType::Likes => write!(f, "likes"),
            SortType::Combined => write!(f, "combined"),
        }
    }
}

impl std::str::FromStr for SortType {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "views" => Ok(SortType::Views),
            "likes" => Ok(SortType::Likes),
            "combined" => Ok(SortType::Combined),
            other => Err(crate::error::AppError::InvalidInput(format!(
                "unknown sort type: {}",
                other
            ))),
        }
    }
}
