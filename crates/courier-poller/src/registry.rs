//! Handler registry and update routing.
//!
//! Handlers are registered per [`UpdateKind`] and run in registration order;
//! one optional catch-all runs for every update, known kind or not. Each
//! handler runs in its own task so an error or panic stays contained.

use courier_core::update::{Update, UpdateKind};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What a handler returns. Errors are logged, never propagated.
pub type HandlerResult = anyhow::Result<()>;

/// Boxed handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A registered update handler.
pub type Handler = Arc<dyn Fn(Arc<Update>) -> HandlerFuture + Send + Sync>;

/// Per-kind ordered handler lists plus an optional catch-all.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    typed: HashMap<UpdateKind, Vec<Handler>>,
    catch_all: Option<Handler>,
}

/// Result of dispatching one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub kind: UpdateKind,
    /// Handlers invoked, catch-all included.
    pub invoked: usize,
    /// Of those, how many returned an error or panicked.
    pub failed: usize,
}

fn boxed<F, Fut>(handler: F) -> Handler
where
    F: Fn(Arc<Update>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |update| Box::pin(handler(update)))
}

macro_rules! kind_shortcuts {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            #[doc = concat!("Register a handler for `", stringify!($kind), "` updates.")]
            pub fn $name<F, Fut>(&mut self, handler: F) -> &mut Self
            where
                F: Fn(Arc<Update>) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = HandlerResult> + Send + 'static,
            {
                self.on(UpdateKind::$kind, handler)
            }
        )*
    };
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `kind`. `Unknown` updates never reach typed
    /// handlers, so registering for it is ignored.
    pub fn on<F, Fut>(&mut self, kind: UpdateKind, handler: F) -> &mut Self
    where
        F: Fn(Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if kind == UpdateKind::Unknown {
            warn!("ignoring handler registered for unknown updates; use on_update instead");
            return self;
        }
        self.typed.entry(kind).or_default().push(boxed(handler));
        self
    }

    /// Set the catch-all handler, replacing any previous one.
    pub fn on_update<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<Update>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.catch_all.replace(boxed(handler)).is_some() {
            debug!("catch-all handler replaced");
        }
        self
    }

    kind_shortcuts! {
        on_message => Message,
        on_edited_message => EditedMessage,
        on_channel_post => ChannelPost,
        on_callback_query => CallbackQuery,
        on_inline_query => InlineQuery,
        on_chat_join_request => ChatJoinRequest,
        on_business_message => BusinessMessage,
    }

    /// Number of typed handlers for `kind`.
    pub fn handler_count(&self, kind: UpdateKind) -> usize {
        self.typed.get(&kind).map_or(0, Vec::len)
    }

    pub fn has_catch_all(&self) -> bool {
        self.catch_all.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.typed.is_empty() && self.catch_all.is_none()
    }

    /// Run every typed handler for the update's kind in order, then the
    /// catch-all. Failures are logged and do not stop later handlers.
    pub async fn dispatch(&self, update: Arc<Update>) -> DispatchOutcome {
        let kind = update.kind();
        let mut outcome = DispatchOutcome {
            kind,
            invoked: 0,
            failed: 0,
        };

        let typed = self.typed.get(&kind).map_or(&[][..], Vec::as_slice);
        for (idx, handler) in typed.iter().enumerate() {
            outcome.invoked += 1;
            let label = format!("{kind} handler #{idx}");
            if !run_isolated(handler, update.clone(), kind, &label).await {
                outcome.failed += 1;
            }
        }

        if let Some(ref handler) = self.catch_all {
            outcome.invoked += 1;
            if !run_isolated(handler, update.clone(), kind, "catch-all handler").await {
                outcome.failed += 1;
            }
        }

        if outcome.invoked == 0 {
            debug!("no handler for update {} ({kind})", update.update_id);
        }
        outcome
    }
}

/// Run one handler in its own task; `false` if it failed or panicked.
async fn run_isolated(
    handler: &Handler,
    update: Arc<Update>,
    kind: UpdateKind,
    label: &str,
) -> bool {
    let update_id = update.update_id;
    let handler = Arc::clone(handler);
    match tokio::spawn(async move { handler(update).await }).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{label} failed on update {update_id} ({kind}): {e:#}");
            false
        }
        Err(e) if e.is_panic() => {
            error!("{label} panicked on update {update_id} ({kind})");
            false
        }
        Err(e) => {
            warn!("{label} cancelled on update {update_id} ({kind}): {e}");
            false
        }
    }
}
