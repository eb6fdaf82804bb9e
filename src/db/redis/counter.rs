use std::time::Duration;

use redis::{AsyncCommands, Client};

use crate::error::AppResult;

#[cfg(test)]
use mockall::automock;

/// Atomic check-and-toggle over a set member.
///
/// Runs store-side as a single operation so two concurrent toggles from the
/// same member can never both observe "absent" and double-add. Returns 1
/// when the member was added, 0 when it was removed.
const TOGGLE_MEMBER_SCRIPT: &str = r#"
if redis.call('SISMEMBER', KEYS[1], ARGV[1]) == 1 then
    redis.call('SREM', KEYS[1], ARGV[1]);
    return 0;
else
    redis.call('SADD', KEYS[1], ARGV[1]);
    return 1;
end
"#;

/// Low-latency counter store boundary.
///
/// Correctness of the counting engine relies entirely on the atomicity this
/// store provides per operation (set-if-absent, scripted toggle, increment);
/// there is no application-level locking above it.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait CounterStore: Send + Sync {
    /// Sets `key` to `value` with a TTL only when the key is absent.
    /// Returns whether this caller won the set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool>;

    /// Atomically adds `member` to the set when absent, removes it when
    /// present. Returns whether the member is in the set afterwards.
    async fn toggle_set_member(&self, key: &str, member: &str) -> AppResult<bool>;

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>>;

    async fn set_size(&self, key: &str) -> AppResult<i64>;

    async fn set_is_member(&self, key: &str, member: &str) -> AppResult<bool>;

    async fn set_add(&self, key: &str, member: &str) -> AppResult<()>;

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()>;

    /// Increments `member`'s score in a sorted set, creating it at `delta`
    /// when absent. Returns the new score.
    async fn sorted_set_incr(&self, key: &str, member: &str, delta: f64) -> AppResult<f64>;

    async fn sorted_set_score(&self, key: &str, member: &str) -> AppResult<Option<f64>>;

    /// Members of a sorted set ordered by descending score, over the
    /// inclusive index range `[start, stop]` (`-1` means "last").
    async fn sorted_set_reverse_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<String>>;

    async fn sorted_set_remove(&self, key: &str, member: &str) -> AppResult<()>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Keys matching a glob pattern. Used only by the batch reconciliation
    /// job, never on request paths.
    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>>;

    async fn delete(&self, keys: &[String]) -> AppResult<()>;

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()>;
}

/// Creates a Redis client for the counter store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed counter store
pub struct RedisCounterStore {
    client: Client,
    toggle_script: redis::Script,
}

impl RedisCounterStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            toggle_script: redis::Script::new(TOGGLE_MEMBER_SCRIPT),
        }
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait::async_trait]
impl CounterStore for RedisCounterStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let set: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(set.is_some())
    }

    async fn toggle_set_member(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let result: i64 = self
            .toggle_script
            .key(key)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(result == 1)
    }

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn set_size(&self, key: &str) -> AppResult<i64> {
        let mut conn = self.connection().await?;
        let size: i64 = conn.scard(key).await?;
        Ok(size)
    }

    async fn set_is_member(&self, key: &str, member: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let is_member: bool = conn.sismember(key, member).await?;
        Ok(is_member)
    }

    async fn set_add(&self, key: &str, member: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.srem(key, member).await?;
        Ok(())
    }

    async fn sorted_set_incr(&self, key: &str, member: &str, delta: f64) -> AppResult<f64> {
        let mut conn = self.connection().await?;
        let score: f64 = conn.zincr(key, member, delta).await?;
        Ok(score)
    }

    async fn sorted_set_score(&self, key: &str, member: &str) -> AppResult<Option<f64>> {
        let mut conn = self.connection().await?;
        let score: Option<f64> = conn.zscore(key, member).await?;
        Ok(score)
    }

    async fn sorted_set_reverse_range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let members: Vec<String> = conn.zrevrange(key, start, stop).await?;
        Ok(members)
    }

    async fn sorted_set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.zrem(key, member).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> AppResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
        Ok(())
    }
}
