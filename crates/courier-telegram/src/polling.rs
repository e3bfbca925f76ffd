//! Long-polling `getUpdates` as the poller's [`Transport`].

use super::TelegramClient;
use async_trait::async_trait;
use courier_core::{error::TransportError, traits::Transport, update::Update};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[async_trait]
impl Transport for TelegramClient {
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let params = json!({
            "offset": offset,
            "timeout": timeout_secs,
        });
        // The server holds the request for up to `timeout_secs`; the client
        // deadline must outlast it.
        let deadline = Duration::from_secs(timeout_secs) + self.request_timeout;
        let result = self.call_with_timeout("getUpdates", params, deadline).await?;

        let updates = parse_updates(result)?;
        if !updates.is_empty() {
            debug!(
                "telegram: received {} update(s) at offset {offset}",
                updates.len()
            );
        }
        Ok(updates)
    }
}

/// Decode a `getUpdates` result. A missing result is an empty batch.
pub(crate) fn parse_updates(result: Value) -> Result<Vec<Update>, TransportError> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(result)
        .map_err(|e| TransportError::Decode(format!("getUpdates result: {e}")))
}
