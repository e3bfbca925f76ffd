use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One event delivered by `getUpdates`.
///
/// Apart from `update_id` the record is kept opaque: whatever payload field
/// Telegram populated stays in `payload` as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Update {
    /// Build an update from an id and a single payload field.
    pub fn new(update_id: i64, field: &str, body: Value) -> Self {
        let mut payload = Map::new();
        payload.insert(field.to_string(), body);
        Self { update_id, payload }
    }

    /// Classify this update by its payload field.
    pub fn kind(&self) -> UpdateKind {
        UpdateKind::classify(self)
    }

    /// The JSON body of the populated payload field, if the kind is known.
    pub fn body(&self) -> Option<&Value> {
        self.kind().field().and_then(|f| self.payload.get(f))
    }

    /// `chat.id` of a message-like payload.
    pub fn chat_id(&self) -> Option<i64> {
        let body = self.body()?;
        body.get("chat")
            .or_else(|| body.get("message").and_then(|m| m.get("chat")))
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
    }

    /// `text` of a message-like payload.
    pub fn text(&self) -> Option<&str> {
        self.body()?.get("text").and_then(Value::as_str)
    }
}

/// The closed set of update kinds, one per Bot API payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateKind {
    Message,
    EditedMessage,
    ChannelPost,
    EditedChannelPost,
    BusinessConnection,
    BusinessMessage,
    EditedBusinessMessage,
    DeletedBusinessMessages,
    MessageReaction,
    MessageReactionCount,
    InlineQuery,
    ChosenInlineResult,
    CallbackQuery,
    ShippingQuery,
    PreCheckoutQuery,
    PurchasedPaidMedia,
    Poll,
    PollAnswer,
    MyChatMember,
    ChatMember,
    ChatJoinRequest,
    ChatBoost,
    RemovedChatBoost,
    /// No known payload field was present.
    Unknown,
}

impl UpdateKind {
    /// Every known kind, in classification order.
    pub const ALL: [UpdateKind; 23] = [
        Self::Message,
        Self::EditedMessage,
        Self::ChannelPost,
        Self::EditedChannelPost,
        Self::BusinessConnection,
        Self::BusinessMessage,
        Self::EditedBusinessMessage,
        Self::DeletedBusinessMessages,
        Self::MessageReaction,
        Self::MessageReactionCount,
        Self::InlineQuery,
        Self::ChosenInlineResult,
        Self::CallbackQuery,
        Self::ShippingQuery,
        Self::PreCheckoutQuery,
        Self::PurchasedPaidMedia,
        Self::Poll,
        Self::PollAnswer,
        Self::MyChatMember,
        Self::ChatMember,
        Self::ChatJoinRequest,
        Self::ChatBoost,
        Self::RemovedChatBoost,
    ];

    /// Payload field name on the wire, `None` for `Unknown`.
    pub fn field(&self) -> Option<&'static str> {
        let name = match self {
            Self::Message => "message",
            Self::EditedMessage => "edited_message",
            Self::ChannelPost => "channel_post",
            Self::EditedChannelPost => "edited_channel_post",
            Self::BusinessConnection => "business_connection",
            Self::BusinessMessage => "business_message",
            Self::EditedBusinessMessage => "edited_business_message",
            Self::DeletedBusinessMessages => "deleted_business_messages",
            Self::MessageReaction => "message_reaction",
            Self::MessageReactionCount => "message_reaction_count",
            Self::InlineQuery => "inline_query",
            Self::ChosenInlineResult => "chosen_inline_result",
            Self::CallbackQuery => "callback_query",
            Self::ShippingQuery => "shipping_query",
            Self::PreCheckoutQuery => "pre_checkout_query",
            Self::PurchasedPaidMedia => "purchased_paid_media",
            Self::Poll => "poll",
            Self::PollAnswer => "poll_answer",
            Self::MyChatMember => "my_chat_member",
            Self::ChatMember => "chat_member",
            Self::ChatJoinRequest => "chat_join_request",
            Self::ChatBoost => "chat_boost",
            Self::RemovedChatBoost => "removed_chat_boost",
            Self::Unknown => return None,
        };
        Some(name)
    }

    /// First known payload field present on the update wins.
    pub fn classify(update: &Update) -> UpdateKind {
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.field()
                    .is_some_and(|f| update.payload.get(f).is_some_and(|v| !v.is_null()))
            })
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field().unwrap_or("unknown"))
    }
}
