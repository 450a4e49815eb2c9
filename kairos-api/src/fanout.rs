//! Redis → registry fan-out bridge.
//!
//! One task per process holds the pattern subscription covering every
//! user channel and routes each published event to the local registry.
//! Connections served by other processes are reached by their own bridge;
//! the registry never spans processes.

use anyhow::{anyhow, Result};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing;

use kairos_core::redis::{channel_user, CHANNEL_PATTERN};
use kairos_core::AppContext;

use crate::registry::ConnectionRegistry;

pub async fn run(ctx: AppContext, registry: Arc<ConnectionRegistry>) -> Result<()> {
    tracing::info!("Starting notification fan-out bridge");

    let mut error_count = 0u32;

    loop {
        match subscribe_and_forward(&ctx, &registry).await {
            Ok(()) => {
                // Subscription stream ended without an error; resubscribe.
                error_count = 0;
            }
            Err(e) => {
                error_count += 1;
                tracing::warn!(
                    "Fan-out bridge error (count {}): {}",
                    error_count,
                    e
                );
            }
        }

        let backoff =
            Duration::from_secs(1 << error_count.min(5)).min(Duration::from_secs(30));
        tokio::time::sleep(backoff).await;
    }
}

async fn subscribe_and_forward(
    ctx: &AppContext,
    registry: &Arc<ConnectionRegistry>,
) -> Result<()> {
    let mut pubsub = ctx
        .redis_pool
        .get_async_pubsub()
        .await
        .map_err(|e| anyhow!("Failed to open pub/sub connection: {}", e))?;

    pubsub
        .psubscribe(CHANNEL_PATTERN)
        .await
        .map_err(|e| anyhow!("Failed to subscribe to {}: {}", CHANNEL_PATTERN, e))?;

    tracing::info!("Subscribed to {}", CHANNEL_PATTERN);

    let mut stream = pubsub.on_message();

    while let Some(msg) = stream.next().await {
        let channel = msg.get_channel_name().to_string();
        let Some(user_id) = channel_user(&channel) else {
            continue;
        };

        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Non-text payload on {}: {}", channel, e);
                continue;
            }
        };

        let delivered = registry.dispatch(user_id, &payload);
        tracing::debug!(
            "Forwarded event on {} to {} connection(s)",
            channel,
            delivered
        );
    }

    Ok(())
}
