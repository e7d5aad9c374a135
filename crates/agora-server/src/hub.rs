//! Process-wide registry of online users and router between their agents.
//!
//! At most one agent is registered per user. The registry lock is held only
//! to mutate or to take a snapshot; the store lookup for last messages,
//! encoding and delivery all happen after it is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agora_shared::{encode, Envelope, LastMessage, PresenceEntry, UserId};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::mailbox::{DeliveryError, Mailbox};
use crate::store::ChatStore;

/// The hub's view of one connected agent.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    pub id: Uuid,
    pub user_id: UserId,
    pub username: String,
    pub mailbox: Mailbox,
}

impl AgentHandle {
    pub fn new(user_id: UserId, username: impl Into<String>, mailbox: Mailbox) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            username: username.into(),
            mailbox,
        }
    }
}

/// Presence payload plus the mailboxes it goes to.
struct PresenceSnapshot {
    /// Taken under the registry lock; orders snapshots of concurrent changes.
    seq: u64,
    users: Vec<PresenceEntry>,
    recipients: Vec<(UserId, Mailbox)>,
}

#[derive(Default)]
pub struct Hub {
    agents: RwLock<HashMap<UserId, AgentHandle>>,
    /// Source of the last messages attached to presence entries.
    store: Option<Arc<dyn ChatStore>>,
    snapshot_seq: AtomicU64,
    /// Highest `seq` fanned out so far.
    delivered_seq: AtomicU64,
}

impl Hub {
    /// A hub that also attaches each user's last messages to presence.
    /// `Hub::default()` lists usernames only.
    pub fn with_store(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    /// Admit `agent`, closing any agent previously registered for the same
    /// user, then broadcast presence.
    pub async fn register(&self, agent: AgentHandle) {
        let user_id = agent.user_id;
        let agent_id = agent.id;

        let snapshot = {
            let mut agents = self.agents.write().await;
            if let Some(previous) = agents.remove(&user_id) {
                previous.mailbox.close();
                info!(
                    user_id = %user_id,
                    previous_agent = %previous.id,
                    agent_id = %agent_id,
                    "Replacing existing connection"
                );
            }
            agents.insert(user_id, agent);
            self.snapshot(&agents)
        };

        info!(user_id = %user_id, agent_id = %agent_id, online = snapshot.users.len(), "User registered");
        self.publish(snapshot).await;
    }

    /// Remove the registry entry for `user_id` if it still belongs to
    /// `agent_id`. Returns whether an entry was removed.
    pub async fn unregister(&self, user_id: UserId, agent_id: Uuid) -> bool {
        let snapshot = {
            let mut agents = self.agents.write().await;
            let is_current = agents
                .get(&user_id)
                .is_some_and(|current| current.id == agent_id);
            if !is_current {
                debug!(user_id = %user_id, agent_id = %agent_id, "Unregister ignored, not the current agent");
                return false;
            }
            if let Some(removed) = agents.remove(&user_id) {
                removed.mailbox.close();
            }
            self.snapshot(&agents)
        };

        info!(user_id = %user_id, agent_id = %agent_id, online = snapshot.users.len(), "User unregistered");
        self.publish(snapshot).await;
        true
    }

    /// Queue an encoded frame for `user_id` without waiting.
    ///
    /// Returns `false` if the user is offline or their mailbox is full.
    pub async fn send_to_user(&self, user_id: UserId, frame: Arc<str>) -> bool {
        let mailbox = {
            let agents = self.agents.read().await;
            agents.get(&user_id).map(|agent| agent.mailbox.clone())
        };

        let Some(mailbox) = mailbox else {
            debug!(user_id = %user_id, "Recipient offline");
            return false;
        };

        match mailbox.try_deliver(frame) {
            Ok(()) => true,
            Err(DeliveryError::Full) => {
                warn!(user_id = %user_id, "Mailbox full, dropping frame");
                false
            }
            Err(DeliveryError::Closed) => {
                debug!(user_id = %user_id, "Mailbox closed, dropping frame");
                false
            }
        }
    }

    /// Ids of every registered user, ascending.
    pub async fn online_users(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.agents.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Re-send the current presence list on demand. Register and unregister
    /// already broadcast their own snapshot, so nothing in the server calls it.
    #[allow(dead_code)]
    pub async fn broadcast_presence(&self) {
        let snapshot = {
            let agents = self.agents.read().await;
            self.snapshot(&agents)
        };
        self.publish(snapshot).await;
    }

    fn snapshot(&self, agents: &HashMap<UserId, AgentHandle>) -> PresenceSnapshot {
        let mut users: Vec<PresenceEntry> = agents
            .values()
            .map(|agent| PresenceEntry::new(agent.user_id, agent.username.clone()))
            .collect();
        users.sort_unstable_by_key(|entry| entry.id);

        let recipients = agents
            .values()
            .map(|agent| (agent.user_id, agent.mailbox.clone()))
            .collect();

        PresenceSnapshot {
            seq: self.snapshot_seq.fetch_add(1, Ordering::Relaxed) + 1,
            users,
            recipients,
        }
    }

    /// Attach last messages, then fan out unless a newer snapshot already went.
    async fn publish(&self, mut snapshot: PresenceSnapshot) {
        self.attach_last_messages(&mut snapshot.users).await;

        let newest = self.delivered_seq.fetch_max(snapshot.seq, Ordering::AcqRel);
        if newest > snapshot.seq {
            debug!(seq = snapshot.seq, newest, "Skipping stale presence snapshot");
            return;
        }
        fan_out_presence(snapshot);
    }

    /// Presence still goes out without last messages if the store fails.
    async fn attach_last_messages(&self, users: &mut [PresenceEntry]) {
        let Some(store) = &self.store else {
            return;
        };
        if users.is_empty() {
            return;
        }

        let ids = users.iter().map(|entry| entry.id).collect();
        let mut latest = match store.last_messages(ids).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(error = %e, "Failed to load last messages for presence");
                return;
            }
        };

        for entry in users.iter_mut() {
            let Some(peers) = latest.remove(&entry.id).filter(|peers| !peers.is_empty()) else {
                continue;
            };
            entry.last_messages = Some(
                peers
                    .into_iter()
                    .map(|(peer, message)| {
                        (
                            peer,
                            LastMessage {
                                sender_id: message.sender_id,
                                content: message.content,
                                timestamp: message.timestamp,
                            },
                        )
                    })
                    .collect(),
            );
        }
    }
}

fn fan_out_presence(snapshot: PresenceSnapshot) {
    let frame: Arc<str> = match encode(&Envelope::UserList {
        users: snapshot.users,
    }) {
        Ok(text) => Arc::from(text),
        Err(e) => {
            error!(error = %e, "Failed to encode presence list");
            return;
        }
    };

    for (user_id, mailbox) in snapshot.recipients {
        if let Err(e) = mailbox.try_deliver(Arc::clone(&frame)) {
            debug!(user_id = %user_id, reason = ?e, "Presence update not delivered");
        }
    }
}
