//! In-memory transport for poll-loop tests.

use crate::poller::StopHandle;
use async_trait::async_trait;
use courier_core::{error::TransportError, traits::Transport, update::Update};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// One scripted answer to `fetch_updates`.
pub(crate) enum Step {
    Updates(Vec<Update>),
    Fail(&'static str),
    /// Request a stop while this fetch is in flight, then return the batch.
    StopMidFetch(Vec<Update>),
}

/// A recorded `fetch_updates` call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Call {
    pub offset: i64,
    pub timeout_secs: u64,
    pub at: Instant,
}

/// Plays back a script of fetch results. Once the script runs out it
/// stops the poller, or long-polls empty batches when no stop handle is set.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Call>>,
    stop: Mutex<Option<StopHandle>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Default::default()
        }
    }

    pub fn stop_when_exhausted(&self, handle: StopHandle) {
        *self.stop.lock().unwrap() = Some(handle);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn offsets(&self) -> Vec<i64> {
        self.calls().iter().map(|c| c.offset).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_updates(
        &self,
        offset: i64,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        self.calls.lock().unwrap().push(Call {
            offset,
            timeout_secs,
            at: Instant::now(),
        });

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Updates(updates)) => Ok(updates),
            Some(Step::Fail(msg)) => Err(TransportError::Http(msg.to_string())),
            Some(Step::StopMidFetch(updates)) => {
                if let Some(handle) = self.stop.lock().unwrap().as_ref() {
                    handle.stop();
                }
                Ok(updates)
            }
            None => {
                let handle = self.stop.lock().unwrap().clone();
                match handle {
                    Some(handle) => {
                        handle.stop();
                    }
                    None => {
                        let wait = Duration::from_secs(timeout_secs.max(1));
                        tokio::time::sleep(wait).await;
                    }
                }
                Ok(Vec::new())
            }
        }
    }
}

/// Text messages with the given ids.
pub(crate) fn messages(ids: &[i64]) -> Vec<Update> {
    ids.iter().map(|&id| message(id)).collect()
}

fn message(id: i64) -> Update {
    let body = json!({"chat": {"id": 1}, "text": format!("m{id}")});
    Update::new(id, "message", body)
}
