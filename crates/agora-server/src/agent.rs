//! Client agent: the server side of one authenticated user's connection.
//!
//! Each agent runs two loops. The inbound loop reads and dispatches client
//! frames on the task that accepted the connection; the outbound loop is
//! spawned and is the only writer to the socket. They share a cancellation
//! token so that either side ending stops the other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use agora_shared::constants::UNKNOWN_USERNAME;
use agora_shared::{decode, encode, time, ChatMessage, ClientFrame, Envelope, ProtocolError, UserId};
use agora_store::PersistedMessage;
use chrono::{DateTime, Utc};
use futures::{Sink, Stream};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionReader, ConnectionWriter, Frame, Inbound, TransportError};
use crate::error::ChatError;
use crate::hub::{AgentHandle, Hub};
use crate::mailbox::{Mailbox, MailboxReceiver};
use crate::store::ChatStore;

/// Per-agent tunables derived from the server configuration.
#[derive(Debug, Clone, Copy)]
pub struct AgentLimits {
    pub mailbox_capacity: usize,
    pub ping_interval: Duration,
    pub history_page_size: u32,
}

/// Lifecycle of one agent. Both loops run only while `Registered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Connecting,
    Registered,
    Draining,
    Closed,
}

/// Everything the inbound loop needs to handle a frame.
struct AgentContext {
    handle: AgentHandle,
    hub: Arc<Hub>,
    store: Arc<dyn ChatStore>,
    limits: AgentLimits,
}

pub struct ClientAgent {
    ctx: AgentContext,
    receiver: MailboxReceiver,
}

impl ClientAgent {
    pub fn new(
        user_id: UserId,
        username: impl Into<String>,
        hub: Arc<Hub>,
        store: Arc<dyn ChatStore>,
        limits: AgentLimits,
    ) -> Self {
        let (mailbox, receiver) = Mailbox::new(limits.mailbox_capacity);
        Self {
            ctx: AgentContext {
                handle: AgentHandle::new(user_id, username, mailbox),
                hub,
                store,
                limits,
            },
            receiver,
        }
    }

    /// Register with the hub, serve the connection until either side ends it,
    /// then unregister. Returns once both loops have stopped.
    pub async fn run<R, W>(self, mut reader: ConnectionReader<R>, writer: ConnectionWriter<W>)
    where
        R: Stream<Item = Result<Frame, TransportError>> + Send + Unpin,
        W: Sink<Frame, Error = TransportError> + Send + Unpin + 'static,
    {
        let ClientAgent { ctx, receiver } = self;
        let mut state = AgentState::Connecting;
        info!(user_id = %ctx.handle.user_id, agent_id = %ctx.handle.id, "Agent connecting");

        let shutdown = CancellationToken::new();
        ctx.hub.register(ctx.handle.clone()).await;
        transition(&ctx.handle, &mut state, AgentState::Registered);

        let outbound = tokio::spawn(outbound_loop(
            writer,
            receiver,
            ctx.limits,
            shutdown.clone(),
            ctx.handle.user_id,
        ));

        match ctx.inbound_loop(&mut reader, &shutdown).await {
            Ok(()) => debug!(user_id = %ctx.handle.user_id, "Inbound loop finished"),
            Err(e) => info!(user_id = %ctx.handle.user_id, error = %e, "Connection ended"),
        }

        transition(&ctx.handle, &mut state, AgentState::Draining);
        ctx.hub
            .unregister(ctx.handle.user_id, ctx.handle.id)
            .await;
        // Already closed if unregistered or replaced; closing again is a no-op.
        ctx.handle.mailbox.close();

        if let Err(e) = outbound.await {
            error!(user_id = %ctx.handle.user_id, error = %e, "Outbound loop panicked");
        }
        transition(&ctx.handle, &mut state, AgentState::Closed);
    }
}

fn transition(handle: &AgentHandle, state: &mut AgentState, next: AgentState) {
    debug!(
        user_id = %handle.user_id,
        agent_id = %handle.id,
        from = ?*state,
        to = ?next,
        "Agent state change"
    );
    *state = next;
}

impl AgentContext {
    /// Read until the peer goes away, the read deadline passes, or the
    /// outbound loop signals shutdown. `Ok` means a clean stop.
    async fn inbound_loop<R>(
        &self,
        reader: &mut ConnectionReader<R>,
        shutdown: &CancellationToken,
    ) -> Result<(), ChatError>
    where
        R: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        let user_id = self.handle.user_id;
        loop {
            let inbound = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                inbound = reader.recv() => inbound,
            };

            let text = match inbound {
                Ok(Inbound::Text(text)) => text,
                Ok(Inbound::Binary(len)) => {
                    warn!(user_id = %user_id, error = %ProtocolError::Binary(len), "Discarding frame");
                    continue;
                }
                Err(TransportError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let frame = match decode(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Discarding frame");
                    continue;
                }
            };

            let kind = frame.kind();
            match self.dispatch(frame).await {
                Ok(()) => {}
                Err(ChatError::Persistence(e)) => {
                    error!(user_id = %user_id, kind, error = %e, "Store failure, frame not handled");
                }
                Err(e) => warn!(user_id = %user_id, kind, error = %e, "Frame not handled"),
            }
        }
    }

    async fn dispatch(&self, frame: ClientFrame) -> Result<(), ChatError> {
        match frame {
            ClientFrame::Message {
                receiver_id,
                content,
            } => self.handle_chat(receiver_id, content).await,
            ClientFrame::Typing { receiver_id } => {
                let envelope = Envelope::Typing {
                    sender_id: self.handle.user_id,
                    receiver_id,
                    username: self.handle.username.clone(),
                };
                self.forward_ephemeral(receiver_id, envelope).await
            }
            ClientFrame::TypingStopped { receiver_id } => {
                let envelope = Envelope::TypingStopped {
                    sender_id: self.handle.user_id,
                    receiver_id,
                    username: self.handle.username.clone(),
                };
                self.forward_ephemeral(receiver_id, envelope).await
            }
            ClientFrame::GetHistory { receiver_id } => {
                let rows = self
                    .store
                    .history(self.handle.user_id, receiver_id, self.limits.history_page_size)
                    .await?;
                let messages = self.annotate(rows).await?;
                self.reply(&Envelope::history(messages))
            }
            ClientFrame::GetMoreHistory {
                receiver_id,
                timestamp,
            } => {
                let before = self.cursor(timestamp.as_deref());
                let rows = self
                    .store
                    .history_before(
                        self.handle.user_id,
                        receiver_id,
                        before,
                        self.limits.history_page_size,
                    )
                    .await?;
                let messages = self.annotate(rows).await?;
                self.reply(&Envelope::more_history(messages))
            }
        }
    }

    /// Persist, deliver to the receiver, echo to the sender. Nothing is sent
    /// if persisting fails.
    async fn handle_chat(&self, receiver_id: UserId, content: String) -> Result<(), ChatError> {
        let sender_id = self.handle.user_id;
        let stored = self
            .store
            .persist(sender_id, receiver_id, content, time::now())
            .await?;

        let envelope = Envelope::Message(ChatMessage {
            sender_id: stored.sender_id,
            receiver_id: stored.receiver_id,
            content: stored.content,
            timestamp: stored.timestamp,
            username: self.handle.username.clone(),
        });
        let frame: Arc<str> = Arc::from(encode(&envelope)?);

        if receiver_id != sender_id {
            let delivered = self.hub.send_to_user(receiver_id, Arc::clone(&frame)).await;
            debug!(sender_id = %sender_id, receiver_id = %receiver_id, delivered, "Chat message routed");
        }
        self.enqueue_own(frame);
        Ok(())
    }

    /// Typing indicators are never persisted; an offline receiver drops them.
    async fn forward_ephemeral(&self, receiver_id: UserId, envelope: Envelope) -> Result<(), ChatError> {
        let frame: Arc<str> = Arc::from(encode(&envelope)?);
        let delivered = self.hub.send_to_user(receiver_id, frame).await;
        debug!(sender_id = %self.handle.user_id, receiver_id = %receiver_id, delivered, "Typing indicator routed");
        Ok(())
    }

    fn reply(&self, envelope: &Envelope) -> Result<(), ChatError> {
        let frame: Arc<str> = Arc::from(encode(envelope)?);
        self.enqueue_own(frame);
        Ok(())
    }

    /// Queue directly on this agent's mailbox, not through the hub, so a
    /// replacement connection for the same user never receives it.
    fn enqueue_own(&self, frame: Arc<str>) {
        if let Err(e) = self.handle.mailbox.try_deliver(frame) {
            debug!(user_id = %self.handle.user_id, reason = ?e, "Own mailbox rejected frame");
        }
    }

    fn cursor(&self, raw: Option<&str>) -> DateTime<Utc> {
        match raw {
            Some(raw) => time::parse_cursor(raw).unwrap_or_else(|| {
                debug!(user_id = %self.handle.user_id, cursor = raw, "Unparsable cursor, using now");
                time::now()
            }),
            None => time::now(),
        }
    }

    /// Attach each sender's display name.
    async fn annotate(&self, rows: Vec<PersistedMessage>) -> Result<Vec<ChatMessage>, ChatError> {
        let mut names: HashMap<UserId, String> = HashMap::new();
        names.insert(self.handle.user_id, self.handle.username.clone());

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let username = match names.get(&row.sender_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self
                        .store
                        .username(row.sender_id)
                        .await?
                        .unwrap_or_else(|| UNKNOWN_USERNAME.to_string());
                    names.insert(row.sender_id, name.clone());
                    name
                }
            };
            messages.push(ChatMessage {
                sender_id: row.sender_id,
                receiver_id: row.receiver_id,
                content: row.content,
                timestamp: row.timestamp,
                username,
            });
        }
        Ok(messages)
    }
}

/// Sole writer to the connection. Stops when the mailbox is closed and
/// drained, or on the first write failure; then closes the connection and
/// raises `shutdown`. A ping goes out only after `ping_interval` without
/// any write.
async fn outbound_loop<W>(
    mut writer: ConnectionWriter<W>,
    mut mailbox: MailboxReceiver,
    limits: AgentLimits,
    shutdown: CancellationToken,
    user_id: UserId,
) where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + limits.ping_interval, limits.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let result = loop {
        tokio::select! {
            frame = mailbox.recv() => match frame {
                Some(first) => {
                    if let Err(e) = write_batch(&mut writer, &mut mailbox, first, limits.mailbox_capacity).await {
                        break Err(e);
                    }
                    ticker.reset();
                }
                None => break Ok(()),
            },
            _ = ticker.tick() => {
                if let Err(e) = writer.ping().await {
                    break Err(e);
                }
            }
        }
    };

    match result {
        Ok(()) => debug!(user_id = %user_id, "Mailbox closed, closing connection"),
        Err(e) => warn!(user_id = %user_id, error = %e, "Write failed, closing connection"),
    }

    writer.close().await;
    shutdown.cancel();
}

/// Feed `first` plus everything already queued, then flush once.
async fn write_batch<W>(
    writer: &mut ConnectionWriter<W>,
    mailbox: &mut MailboxReceiver,
    first: Arc<str>,
    max: usize,
) -> Result<(), TransportError>
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    writer.feed_text(first.to_string()).await?;
    for frame in mailbox.drain_ready(max.saturating_sub(1)) {
        writer.feed_text(frame.to_string()).await?;
    }
    writer.flush().await
}
