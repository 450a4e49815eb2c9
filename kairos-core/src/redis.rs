use anyhow::{anyhow, Result};
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::sync::Arc;
use tracing;

use crate::config::RedisConfig;
use crate::error::Error;

pub type RedisPool = Arc<Client>;
pub type RedisConnection = MultiplexedConnection;

/// Channel pattern matched by the fan-out bridge.
pub const CHANNEL_PATTERN: &str = "notifications:*";

const CHANNEL_PREFIX: &str = "notifications:";

/// Per-recipient pub/sub channel name.
pub fn user_channel(user_id: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, user_id)
}

/// Extracts the recipient from a channel name, if it is one of ours.
pub fn channel_user(channel: &str) -> Option<&str> {
    channel.strip_prefix(CHANNEL_PREFIX).filter(|s| !s.is_empty())
}

pub async fn create_pool(config: &RedisConfig) -> Result<RedisPool> {
    tracing::info!("Setting up Redis connection");
    tracing::info!("Redis URL: {}", mask_redis_url(&config.url));

    let client = Client::open(config.url.as_str())
        .map_err(|e| anyhow!("Failed to create Redis client: {}", e))?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| anyhow!("Failed to connect to Redis: {}", e))?;

    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map_err(|e| anyhow!("Failed to ping Redis: {}", e))?;

    tracing::info!("Redis connection established");

    Ok(Arc::new(client))
}

pub async fn get_connection(pool: &RedisPool) -> Result<RedisConnection, Error> {
    pool.get_multiplexed_async_connection()
        .await
        .map_err(|e| Error::PubSub(format!("Failed to get Redis connection: {}", e)))
}

/// Publishes a payload on a user's notification channel.
pub async fn publish(pool: &RedisPool, channel: &str, payload: &str) -> Result<(), Error> {
    let mut conn = get_connection(pool).await?;
    redis::cmd("PUBLISH")
        .arg(channel)
        .arg(payload)
        .query_async::<i64>(&mut conn)
        .await
        .map_err(|e| Error::PubSub(format!("Failed to publish on {}: {}", channel, e)))?;
    Ok(())
}

fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        let (before_at, after_at) = url.split_at(at_pos);
        if let Some(colon_pos) = before_at.rfind(':') {
            let (protocol_user, _password) = before_at.split_at(colon_pos);
            format!("{}:****@{}", protocol_user, after_at)
        } else {
            format!("redis://****@{}", after_at)
        }
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_round_trips() {
        let channel = user_channel("cku7x2l9");
        assert_eq!(channel, "notifications:cku7x2l9");
        assert_eq!(channel_user(&channel), Some("cku7x2l9"));
    }

    #[test]
    fn foreign_channels_are_ignored() {
        assert_eq!(channel_user("presence:cku7x2l9"), None);
        assert_eq!(channel_user("notifications:"), None);
    }
}
