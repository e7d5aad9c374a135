//! Persistence seam used by the client agents.

use std::collections::HashMap;

use agora_shared::UserId;
use agora_store::{PersistedMessage, SharedDatabase, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Message store operations the chat core needs.
#[async_trait]
pub trait ChatStore: Send + Sync + 'static {
    /// Durably append one message.
    async fn persist(
        &self,
        sender: UserId,
        receiver: UserId,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Result<PersistedMessage, StoreError>;

    /// Most recent `limit` messages between `a` and `b`, oldest first.
    async fn history(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>, StoreError>;

    /// Up to `limit` messages strictly older than `before`, oldest first.
    async fn history_before(
        &self,
        a: UserId,
        b: UserId,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>, StoreError>;

    async fn username(&self, id: UserId) -> Result<Option<String>, StoreError>;

    /// For each of `users`, their latest message with every peer.
    async fn last_messages(
        &self,
        users: Vec<UserId>,
    ) -> Result<HashMap<UserId, HashMap<UserId, PersistedMessage>>, StoreError>;
}

#[async_trait]
impl ChatStore for SharedDatabase {
    async fn persist(
        &self,
        sender: UserId,
        receiver: UserId,
        content: String,
        timestamp: DateTime<Utc>,
    ) -> Result<PersistedMessage, StoreError> {
        self.call(move |db| db.insert_message(sender, receiver, &content, timestamp))
            .await
    }

    async fn history(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.call(move |db| db.get_history(a, b, limit)).await
    }

    async fn history_before(
        &self,
        a: UserId,
        b: UserId,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.call(move |db| db.get_history_before(a, b, before, limit))
            .await
    }

    async fn username(&self, id: UserId) -> Result<Option<String>, StoreError> {
        self.call(move |db| db.get_username(id)).await
    }

    async fn last_messages(
        &self,
        users: Vec<UserId>,
    ) -> Result<HashMap<UserId, HashMap<UserId, PersistedMessage>>, StoreError> {
        self.call(move |db| {
            let mut latest = HashMap::with_capacity(users.len());
            for user in users {
                latest.insert(user, db.get_last_messages(user)?);
            }
            Ok(latest)
        })
        .await
    }
}

/// Store whose writes always fail, for exercising the persistence error path.
#[cfg(test)]
pub(crate) struct FailingWrites(pub SharedDatabase);

#[cfg(test)]
#[async_trait]
impl ChatStore for FailingWrites {
    async fn persist(
        &self,
        _sender: UserId,
        _receiver: UserId,
        _content: String,
        _timestamp: DateTime<Utc>,
    ) -> Result<PersistedMessage, StoreError> {
        Err(StoreError::Poisoned)
    }

    async fn history(
        &self,
        a: UserId,
        b: UserId,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        self.0.history(a, b, limit).await
    }

    async fn history_before(
        &self,
        a: UserId,
        b: UserId,
        before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PersistedMessage>, StoreError> {
        self.0.history_before(a, b, before, limit).await
    }

    async fn username(&self, id: UserId) -> Result<Option<String>, StoreError> {
        self.0.username(id).await
    }

    async fn last_messages(
        &self,
        users: Vec<UserId>,
    ) -> Result<HashMap<UserId, HashMap<UserId, PersistedMessage>>, StoreError> {
        self.0.last_messages(users).await
    }
}
