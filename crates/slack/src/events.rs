use std::borrow::Cow;
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::commands::{CommandRequest, CommandRouter, CommandService};
use crate::replies::Reply;
use crate::web::{ChatClient, ChatError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

impl SlackEnvelope {
    /// Reads an `events_api` Socket Mode frame. Frames of any other type
    /// carry no event and yield `None`.
    pub fn from_frame(frame: &Value) -> Option<Self> {
        if frame.get("type").and_then(Value::as_str) != Some("events_api") {
            return None;
        }
        let envelope_id = frame.get("envelope_id").and_then(Value::as_str)?.to_owned();
        let event = frame.get("payload").and_then(|payload| payload.get("event"))?;

        Some(Self { envelope_id, event: SlackEvent::from_json(event) })
    }

    /// Outer `event_id`, stable across Slack's redeliveries of one event.
    pub fn event_id(frame: &Value) -> Option<&str> {
        frame.get("payload").and_then(|payload| payload.get("event_id")).and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    fn from_json(event: &Value) -> Self {
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("unknown");
        if event_type != "message" {
            return Self::Unsupported { event_type: event_type.to_owned() };
        }

        let text_field = |name: &str| event.get(name).and_then(Value::as_str).map(str::to_owned);
        match (text_field("channel"), text_field("ts")) {
            (Some(channel_id), Some(ts)) => Self::Message(MessageEvent {
                channel_id,
                channel_type: text_field("channel_type"),
                ts,
                thread_ts: text_field("thread_ts"),
                user_id: text_field("user"),
                bot_id: text_field("bot_id"),
                subtype: text_field("subtype"),
                text: text_field("text").unwrap_or_default(),
            }),
            _ => Self::Unsupported { event_type: "message".to_owned() },
        }
    }

    pub fn thread_key(&self) -> Option<&str> {
        match self {
            Self::Message(message) => Some(message.thread_key()),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    pub channel_type: Option<String>,
    pub ts: String,
    pub thread_ts: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub text: String,
}

impl MessageEvent {
    /// Thread the message belongs to; a top-level message starts its own.
    pub fn thread_key(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    pub fn in_thread(&self) -> bool {
        self.thread_ts.is_some()
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.channel_type.as_deref(), Some("im" | "mpim"))
            || self.channel_id.starts_with('D')
    }

    /// Command text if the bot should answer this message, with a leading
    /// mention of the bot removed and Slack's `&amp;`, `&lt;` and `&gt;`
    /// escapes decoded.
    pub fn addressed_text(&self, bot_user_id: &str) -> Option<Cow<'_, str>> {
        if self.bot_id.is_some() {
            return None;
        }
        match self.user_id.as_deref() {
            None => return None,
            Some(user) if user == bot_user_id => return None,
            Some(_) => {}
        }
        if self.subtype.as_deref().is_some_and(|subtype| subtype != "thread_broadcast") {
            return None;
        }

        let text = self.text.trim();
        let stripped = strip_mention(text, bot_user_id);
        if stripped.is_some() || self.in_thread() || self.is_direct() {
            return Some(decode_entities(stripped.unwrap_or(text)));
        }
        None
    }
}

fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&"))
}

fn strip_mention<'a>(text: &'a str, bot_user_id: &str) -> Option<&'a str> {
    let rest = text.strip_prefix("<@")?.strip_prefix(bot_user_id)?;
    let rest = match rest.strip_prefix('|') {
        Some(labelled) => labelled.split_once('>')?.1,
        None => rest.strip_prefix('>')?,
    };
    Some(rest.trim_start_matches(':').trim())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Reply),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Chat(#[from] ChatError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Routes addressed messages through the command table and posts the
/// reply into the message's thread.
pub struct MessageHandler<S> {
    router: CommandRouter<S>,
    chat: Arc<dyn ChatClient>,
    bot_user_id: String,
}

impl<S> MessageHandler<S>
where
    S: CommandService,
{
    pub fn new(router: CommandRouter<S>, chat: Arc<dyn ChatClient>, bot_user_id: String) -> Self {
        Self { router, chat, bot_user_id }
    }

    /// Sends `reply` and returns what actually reached the user. A failed
    /// upload is answered with a text reply naming the error, and its rows
    /// are not remembered.
    async fn deliver(
        &self,
        event: &MessageEvent,
        request: &CommandRequest,
        reply: Reply,
    ) -> Result<Reply, ChatError> {
        let thread = Some(event.thread_key());
        let (filename, content, results) = match reply {
            Reply::Text(text) => {
                self.chat.reply(&event.channel_id, thread, &text).await?;
                return Ok(Reply::Text(text));
            }
            Reply::File { filename, content, results } => (filename, content, results),
        };

        match self.chat.upload_file(&event.channel_id, thread, &filename, &content).await {
            Ok(()) => {
                if let Some(results) = results {
                    self.router.service().results_delivered(request, results).await;
                }
                Ok(Reply::File { filename, content, results: None })
            }
            Err(upload_error) => {
                warn!(
                    event_name = "egress.slack.upload_failed",
                    correlation_id = %request.correlation_id,
                    thread_id = %request.thread_key,
                    filename = %filename,
                    error = %upload_error,
                    "could not upload result file"
                );
                let text = format!("Error uploading {filename}: {upload_error}");
                self.chat.reply(&event.channel_id, thread, &text).await?;
                Ok(Reply::Text(text))
            }
        }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: CommandService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Message
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Message(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(text) = event.addressed_text(&self.bot_user_id) else {
            debug!(
                event_name = "ingress.slack.message_ignored",
                correlation_id = %ctx.correlation_id,
                thread_id = event.thread_key(),
                "message not addressed to the bot"
            );
            return Ok(HandlerResult::Ignored);
        };

        let request = CommandRequest {
            text: text.into_owned(),
            channel_id: event.channel_id.clone(),
            thread_key: event.thread_key().to_owned(),
            in_thread: event.in_thread(),
            correlation_id: ctx.correlation_id.clone(),
        };
        let reply = self.router.route(&request).await;
        let reply_kind = reply.kind();

        let reply = match self.deliver(event, &request, reply).await {
            Ok(reply) => reply,
            Err(error) => {
                warn!(
                    event_name = "egress.slack.reply_failed",
                    correlation_id = %ctx.correlation_id,
                    thread_id = %request.thread_key,
                    reply_kind,
                    error = %error,
                    "could not deliver reply"
                );
                return Err(error.into());
            }
        };

        info!(
            event_name = "command.replied",
            correlation_id = %ctx.correlation_id,
            thread_id = %request.thread_key,
            reply_kind = reply.kind(),
            "replied to command"
        );
        Ok(HandlerResult::Responded(reply))
    }
}
