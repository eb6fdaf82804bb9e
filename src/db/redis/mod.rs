pub mod counter;
pub mod keys;

pub use counter::create_redis_client;
pub use counter::CounterStore;
pub use counter::RedisCounterStore;
pub use keys::CacheKey;
pub use keys::RankingKey;
