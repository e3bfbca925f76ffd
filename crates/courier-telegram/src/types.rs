//! Telegram Bot API deserialization types.

use courier_core::error::TransportError;
use serde::Deserialize;
use serde_json::Value;

/// The `{ok, result, ...}` envelope every Bot API response is wrapped in.
#[derive(Debug, Deserialize)]
pub(crate) struct TgResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
    pub parameters: Option<TgResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TgResponseParameters {
    pub retry_after: Option<u64>,
}

impl TgResponse<Value> {
    /// Unwrap the envelope into `result` or an API error.
    pub(crate) fn into_result(self) -> Result<Value, TransportError> {
        if !self.ok {
            let mut description = self.description.unwrap_or_default();
            if let Some(secs) = self.parameters.and_then(|p| p.retry_after) {
                description.push_str(&format!(" (retry after {secs}s)"));
            }
            return Err(TransportError::Api {
                code: self.error_code,
                description,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// A Telegram user or bot, as returned by `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl TgUser {
    /// `@username` when set, otherwise the full name.
    pub fn display_name(&self) -> String {
        if let Some(ref un) = self.username {
            format!("@{un}")
        } else if let Some(ref ln) = self.last_name {
            format!("{} {ln}", self.first_name)
        } else {
            self.first_name.clone()
        }
    }
}
