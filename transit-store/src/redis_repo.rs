use redis::RedisResult;
use tracing::info;

/// Redis is only used for per-client request throttling.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns false once `limit` is exceeded
    /// within `window_seconds`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

pub fn rate_limit_key(client_ip: &str) -> String {
    format!("transit:ratelimit:{}", client_ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_opens_without_a_server() {
        // Opening only parses the URL; no connection is made yet.
        assert!(RedisClient::new("redis://127.0.0.1:6379").await.is_ok());
        assert!(RedisClient::new("not a url").await.is_err());
        assert_eq!(rate_limit_key("10.0.0.7"), "transit:ratelimit:10.0.0.7");
    }
}
