pub mod counting;
pub mod reconciliation;
pub mod recommendation;

pub use counting::CountingService;
pub use reconciliation::{ReconciliationHandle, ReconciliationService, SyncStats};
pub use recommendation::{RecommendConfig, RecommendationService};
