//! Live conversations over WebSocket.
//!
//! Each connection is a [`ChatSession`] actor bound to the verified caller. Clients send JSON [`ClientEvent`]s and
//! receive JSON [`ServerEvent`]s, both tagged by a `type` field:
//!
//! ```json
//! {"type": "join_conversation", "conversation_id": "trade_5f1e0c0a9d8b7a61"}
//! {"type": "send_message", "conversation_id": "trade_5f1e0c0a9d8b7a61", "recipient": "0x5e11e4", "text": "Hi!"}
//! ```
//!
//! Joining subscribes the session to the conversation's topic on the message bus and replies with `joined` followed by
//! the recent `message_history`. From then on every stored message arrives as `message_received`, in storage order.
//! A session that falls too far behind the bus gets a fresh `message_history` instead of the messages it missed.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use actix::{
    Actor,
    ActorContext,
    ActorFutureExt,
    Addr,
    AsyncContext,
    Handler,
    Message as ActixMessage,
    StreamHandler,
    WrapFuture,
};
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use escrow_trade_engine::{
    api::DEFAULT_HISTORY_LIMIT,
    db_types::{Address, ConversationId, HistoryOrder, Message, MessageBody},
    ConversationApiError,
    ConversationManagement,
    MessageRelay,
};
use log::*;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::auth::Caller;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Storage backends that a chat session can run on.
pub trait ChatBackend: ConversationManagement + Clone + Unpin + 'static {}

impl<T> ChatBackend for T where T: ConversationManagement + Clone + Unpin + 'static {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation {
        conversation_id: ConversationId,
    },
    LeaveConversation {
        conversation_id: ConversationId,
    },
    GetHistory {
        conversation_id: ConversationId,
        limit: Option<i64>,
        offset: Option<i64>,
        #[serde(default)]
        order: HistoryOrder,
    },
    /// Either `text` (plain) or `body` (plain or encrypted) must be given.
    SendMessage {
        conversation_id: ConversationId,
        recipient: Address,
        text: Option<String>,
        body: Option<MessageBody>,
    },
    MarkRead {
        message_id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined {
        conversation_id: ConversationId,
    },
    MessageHistory {
        conversation_id: ConversationId,
        messages: Vec<Message>,
    },
    MessageReceived {
        message: Message,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        conversation_id: Option<ConversationId>,
    },
}

impl ServerEvent {
    fn error<S: ToString>(message: S, conversation_id: Option<&ConversationId>) -> Self {
        Self::Error { message: message.to_string(), conversation_id: conversation_id.cloned() }
    }
}

/// What the bus forwarder hands to the session actor.
#[derive(ActixMessage)]
#[rtype(result = "()")]
enum LiveUpdate {
    Message(Message),
    Lagged(ConversationId, u64),
}

struct Subscription {
    forwarder: JoinHandle<()>,
    /// The highest message id already sent to the client. Anything at or below it is a duplicate.
    last_seen: i64,
}

pub struct ChatSession<B> {
    caller: Address,
    relay: MessageRelay<B>,
    subscriptions: HashMap<ConversationId, Subscription>,
    hb: Instant,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(caller: Address, relay: MessageRelay<B>) -> Self {
        Self { caller, relay, subscriptions: HashMap::new(), hb: Instant::now() }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("💬️ Heartbeat timeout, disconnecting chat session for {}", act.caller);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_event(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => ctx.text(json),
            Err(e) => error!("💬️ Could not serialize a chat event for {}. {e}", self.caller),
        }
    }

    fn handle_client_event(&mut self, event: ClientEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event {
            ClientEvent::JoinConversation { conversation_id } => self.join(conversation_id, ctx),
            ClientEvent::LeaveConversation { conversation_id } => self.leave(&conversation_id),
            ClientEvent::GetHistory { conversation_id, limit, offset, order } => {
                let relay = self.relay.clone();
                let caller = self.caller.clone();
                let id = conversation_id.clone();
                let fut = async move { relay.history(&id, &caller, limit, offset, order).await };
                ctx.spawn(fut.into_actor(self).map(move |res, act, ctx| match res {
                    Ok(messages) => act.send_event(ctx, &ServerEvent::MessageHistory { conversation_id, messages }),
                    Err(e) => act.send_event(ctx, &ServerEvent::error(e, Some(&conversation_id))),
                }));
            },
            ClientEvent::SendMessage { conversation_id, recipient, text, body } => {
                let body = match (body, text) {
                    (Some(body), _) => body,
                    (None, Some(text)) => MessageBody::plain(text),
                    (None, None) => {
                        let event = ServerEvent::error("A message needs a text or a body", Some(&conversation_id));
                        return self.send_event(ctx, &event);
                    },
                };
                let relay = self.relay.clone();
                let caller = self.caller.clone();
                let id = conversation_id.clone();
                let fut = async move { relay.send(&id, &caller, &recipient, body).await };
                ctx.spawn(fut.into_actor(self).map(move |res, act, ctx| match res {
                    // Joined sessions get their own message back from the bus
                    Ok(message) if !act.subscriptions.contains_key(&conversation_id) => {
                        act.send_event(ctx, &ServerEvent::MessageReceived { message })
                    },
                    Ok(_) => {},
                    Err(e) => act.send_event(ctx, &ServerEvent::error(e, Some(&conversation_id))),
                }));
            },
            ClientEvent::MarkRead { message_id } => {
                let relay = self.relay.clone();
                let caller = self.caller.clone();
                let fut = async move { relay.mark_read(message_id, &caller).await };
                ctx.spawn(fut.into_actor(self).map(move |res, act, ctx| match res {
                    Ok(updated) => trace!("💬️ Read receipt for message #{message_id} from {}: {updated}", act.caller),
                    Err(e) => act.send_event(ctx, &ServerEvent::error(e, None)),
                }));
            },
        }
    }

    fn join(&mut self, conversation_id: ConversationId, ctx: &mut ws::WebsocketContext<Self>) {
        let relay = self.relay.clone();
        let caller = self.caller.clone();
        let id = conversation_id.clone();
        let already_joined = self.subscriptions.contains_key(&conversation_id);
        // Subscribe first, then read history, so that nothing stored in between is lost
        let fut = async move {
            let receiver = if already_joined { None } else { Some(relay.subscribe(&id, &caller).await?) };
            let messages = recent_history(&relay, &id, &caller).await?;
            Ok::<_, ConversationApiError>((receiver, messages))
        };
        ctx.spawn(fut.into_actor(self).map(move |res, act, ctx| {
            let (receiver, messages) = match res {
                Ok(v) => v,
                Err(e) => {
                    debug!("💬️ {} could not join {conversation_id}. {e}", act.caller);
                    return act.send_event(ctx, &ServerEvent::error(e, Some(&conversation_id)));
                },
            };
            let last_seen = messages.last().map(|m| m.id).unwrap_or(0);
            if let Some(receiver) = receiver {
                let forwarder = forward_live_updates(receiver, conversation_id.clone(), ctx.address());
                let subscription = Subscription { forwarder, last_seen };
                if let Some(old) = act.subscriptions.insert(conversation_id.clone(), subscription) {
                    old.forwarder.abort();
                }
                info!("💬️ {} joined {conversation_id}", act.caller);
            } else if let Some(sub) = act.subscriptions.get_mut(&conversation_id) {
                sub.last_seen = sub.last_seen.max(last_seen);
            }
            act.send_event(ctx, &ServerEvent::Joined { conversation_id: conversation_id.clone() });
            act.send_event(ctx, &ServerEvent::MessageHistory { conversation_id, messages });
        }));
    }

    fn leave(&mut self, conversation_id: &ConversationId) {
        if let Some(sub) = self.subscriptions.remove(conversation_id) {
            sub.forwarder.abort();
            info!("💬️ {} left {conversation_id}", self.caller);
        }
    }

    fn resync(&mut self, conversation_id: ConversationId, ctx: &mut ws::WebsocketContext<Self>) {
        let relay = self.relay.clone();
        let caller = self.caller.clone();
        let id = conversation_id.clone();
        let fut = async move { recent_history(&relay, &id, &caller).await };
        ctx.spawn(fut.into_actor(self).map(move |res, act, ctx| match res {
            Ok(messages) => {
                if let Some(sub) = act.subscriptions.get_mut(&conversation_id) {
                    sub.last_seen = messages.last().map(|m| m.id).unwrap_or(0).max(sub.last_seen);
                }
                act.send_event(ctx, &ServerEvent::MessageHistory { conversation_id, messages });
            },
            Err(e) => act.send_event(ctx, &ServerEvent::error(e, Some(&conversation_id))),
        }));
    }
}

/// The latest page of a conversation, oldest message first.
async fn recent_history<B: ConversationManagement>(
    relay: &MessageRelay<B>,
    id: &ConversationId,
    caller: &Address,
) -> Result<Vec<Message>, ConversationApiError> {
    let mut messages =
        relay.history(id, caller, Some(DEFAULT_HISTORY_LIMIT), None, HistoryOrder::NewestFirst).await?;
    messages.reverse();
    Ok(messages)
}

fn forward_live_updates<B: ChatBackend>(
    mut receiver: broadcast::Receiver<Message>,
    conversation_id: ConversationId,
    session: Addr<ChatSession<B>>,
) -> JoinHandle<()> {
    actix::spawn(async move {
        loop {
            let update = match receiver.recv().await {
                Ok(message) => LiveUpdate::Message(message),
                Err(RecvError::Lagged(n)) => LiveUpdate::Lagged(conversation_id.clone(), n),
                Err(RecvError::Closed) => break,
            };
            if !session.connected() {
                break;
            }
            session.do_send(update);
        }
        trace!("💬️ Live forwarding for {conversation_id} ended");
    })
}

impl<B: ChatBackend> Actor for ChatSession<B> {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("💬️ Chat session started for {}", self.caller);
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        for (_, sub) in self.subscriptions.drain() {
            sub.forwarder.abort();
        }
        info!("💬️ Chat session for {} closed", self.caller);
    }
}

impl<B: ChatBackend> Handler<LiveUpdate> for ChatSession<B> {
    type Result = ();

    fn handle(&mut self, update: LiveUpdate, ctx: &mut Self::Context) {
        match update {
            LiveUpdate::Message(message) => {
                let Some(sub) = self.subscriptions.get_mut(&message.conversation_id) else {
                    return;
                };
                if message.id <= sub.last_seen {
                    return;
                }
                sub.last_seen = message.id;
                self.send_event(ctx, &ServerEvent::MessageReceived { message });
            },
            LiveUpdate::Lagged(conversation_id, missed) => {
                warn!("💬️ Chat session for {} missed {missed} live messages in {conversation_id}", self.caller);
                self.resync(conversation_id, ctx);
            },
        }
    }
}

impl<B: ChatBackend> StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSession<B> {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            },
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            },
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => self.handle_client_event(event, ctx),
                    Err(e) => {
                        debug!("💬️ Unreadable chat event from {}. {e}", self.caller);
                        self.send_event(ctx, &ServerEvent::error(format!("Invalid event. {e}"), None));
                    },
                }
            },
            Ok(ws::Message::Binary(_)) => {
                self.send_event(ctx, &ServerEvent::error("Binary frames are not supported", None));
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            },
            Err(e) => {
                warn!("💬️ WebSocket protocol error for {}. {e}", self.caller);
                ctx.stop();
            },
            _ => {},
        }
    }
}

crate::route!(chat_socket => Get "/ws" impl ChatBackend);
/// Upgrades the request to a WebSocket chat session for the verified caller.
pub async fn chat_socket<B: ChatBackend>(
    caller: Caller,
    req: HttpRequest,
    stream: web::Payload,
    relay: web::Data<MessageRelay<B>>,
) -> Result<HttpResponse, actix_web::Error> {
    debug!("💬️ WebSocket upgrade requested by {}", *caller);
    let session = ChatSession::new(caller.0, relay.get_ref().clone());
    ws::start(session, &req, stream)
}
