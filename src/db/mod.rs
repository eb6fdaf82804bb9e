pub mod memory;
pub mod postgres;
pub mod redis;
pub mod repository;

pub use postgres::create_pool;
pub use postgres::PgItemRepository;
pub use redis::create_redis_client;
pub use redis::CacheKey;
pub use redis::CounterStore;
pub use redis::RankingKey;
pub use redis::RedisCounterStore;
pub use repository::ItemRepository;
