//! Engagement core for the Curio link-curation platform.
//!
//! Three cooperating engines over two stores: the counting engine records
//! view and like signals against a low-latency counter store (Redis), the
//! reconciliation job periodically folds those counters into the durable
//! record store (Postgres), and the recommendation engine ranks related
//! items from the live signals with a durable fallback.
//!
//! The HTTP layer that drives these engines lives outside this crate; the
//! `curio-syncd` binary runs the reconciliation worker stand-alone.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
