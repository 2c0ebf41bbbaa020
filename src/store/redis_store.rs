// ABOUTME: Redis-backed Store over a multiplexed async connection.
// ABOUTME: Conditional writes use SET NX PX and Lua compare-and-set/delete scripts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{Connector, Store};
use crate::error::StoreError;

const COMPARE_AND_SET: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
  return 1
end
return 0
";

const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
";

const SCAN_BATCH: usize = 200;

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Index of the last element in a list range holding `len` entries.
fn last_index(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX).saturating_sub(1)
}

/// Escape glob metacharacters so a literal prefix can be used with MATCH.
fn escape_match(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('*');
    out
}

/// A Store talking to Redis.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(key);
        }
        let values: Vec<Option<String>> = pipe.query_async(&mut conn).await?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let replaced: i64 = redis::Script::new(COMPARE_AND_SET)
            .key(key)
            .arg(expected)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(replaced == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = escape_match(prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn index_upsert_max(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // GT only updates existing members upward; new members are always added.
        let _: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg("GT")
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn index_range(
        &self,
        key: &str,
        min_score: Option<f64>,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        let mut conn = self.conn.clone();
        let min = min_score.map_or_else(|| "-inf".to_string(), |s| s.to_string());
        let members: Vec<(String, f64)> = redis::cmd("ZRANGEBYSCORE")
            .arg(key)
            .arg(min)
            .arg("+inf")
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn index_prune(&self, key: &str, max_score: f64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(format!("({max_score}"))
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let stop = last_index(max_len.max(1));
        let _: () = redis::pipe()
            .atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(value)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(stop)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(last_index(limit))
            .query_async(&mut conn)
            .await?;
        Ok(entries)
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}

/// Opens multiplexed Redis connections.
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    async fn connect(&self) -> Result<Arc<dyn Store>, StoreError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        let store: Arc<dyn Store> = Arc::new(RedisStore::new(conn));
        Ok(store)
    }

    fn describe(&self) -> String {
        let info = self.client.get_connection_info();
        format!("redis://{}", info.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_match_escapes_glob_chars() {
        assert_eq!(escape_match("coord:lock:"), "coord:lock:*");
        assert_eq!(escape_match("a*b?[c]"), "a\\*b\\?\\[c\\]*");
    }

    #[test]
    fn test_last_index_saturates() {
        assert_eq!(last_index(1), 0);
        assert_eq!(last_index(20), 19);
        assert_eq!(last_index(usize::MAX), i64::MAX - 1);
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[test]
    fn test_describe_hides_password() {
        let connector = RedisConnector::new("redis://:secret@localhost:6379").unwrap();
        let described = connector.describe();
        assert!(!described.contains("secret"));
        assert!(described.contains("localhost"));
    }
}
