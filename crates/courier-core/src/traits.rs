use crate::{error::TransportError, update::Update};
use async_trait::async_trait;

/// Update source: the poller's only view of the network.
///
/// The Telegram HTTP client implements this; tests plug in scripted
/// transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch updates with `update_id >= offset`, waiting up to
    /// `timeout_secs` on the server side for one to arrive.
    ///
    /// An expired long poll is `Ok(vec![])`, never an error.
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError>;
}
