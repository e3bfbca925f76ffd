//! Telegram Bot API transport.
//!
//! Every endpoint goes through one generic request primitive,
//! [`TelegramClient::call`]. Long polling via `getUpdates` is exposed as the
//! [`Transport`](courier_core::traits::Transport) the poller drives.
//! Docs: <https://core.telegram.org/bots/api>

mod polling;
pub mod types;


use courier_core::{
    config::TelegramConfig,
    error::{CourierError, TransportError},
};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use types::{TgResponse, TgUser};

/// Telegram Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    /// Added on top of the long-poll wait for `getUpdates`; used as-is for
    /// every other call.
    request_timeout: Duration,
}

impl TelegramClient {
    /// Create a new client from config.
    pub fn new(config: &TelegramConfig) -> Result<Self, CourierError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: format!("{}{}", config.api_url, config.bot_token),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }

    /// Invoke any Bot API method with a JSON parameter object and return
    /// its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        self.call_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// `getMe`: the bot's own identity.
    pub async fn get_me(&self) -> Result<TgUser, TransportError> {
        let result = self.call("getMe", serde_json::json!({})).await?;
        serde_json::from_value(result)
            .map_err(|e| TransportError::Decode(format!("getMe result: {e}")))
    }

    pub(crate) async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let url = format!("{}/{method}", self.base_url);
        debug!("telegram: calling {method}");

        // `without_url` keeps the bot token out of error messages.
        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&params)
            .send()
            .await
            .map_err(|e| TransportError::Http(format!("{method} failed: {}", e.without_url())))?;

        // Telegram answers errors with a JSON envelope and a non-2xx status,
        // so the body is decoded regardless of status.
        let status = resp.status();
        let body: TgResponse<Value> = resp.json().await.map_err(|e| {
            TransportError::Decode(format!("{method} response ({status}): {}", e.without_url()))
        })?;

        body.into_result()
    }
}
