//! In-memory object store with typed CRUD helpers.
//!
//! One store instance corresponds to one managed context: the encryption
//! core, trust machine and destruction scheduler all take `&mut ObjectStore`,
//! which serializes their access the same way a single-context queue would.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use murmure_shared::protocol::MessageContent;
use murmure_shared::types::{ClientId, ConversationId, MessageId, UserId};

use crate::error::{Result, StoreError};
use crate::models::{Client, Conversation, MessageRecord, User};

/// Central entity store: users, devices, conversations, timelines.
pub struct ObjectStore {
    self_user: UserId,
    self_client: Option<ClientId>,
    users: HashMap<UserId, User>,
    clients: HashMap<UserId, BTreeMap<ClientId, Client>>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<MessageId, MessageRecord>,
    timelines: HashMap<ConversationId, Vec<MessageId>>,
}

impl ObjectStore {
    /// Create a store for the given self user.
    pub fn new(self_user: UserId, now: DateTime<Utc>) -> Self {
        let mut users = HashMap::new();
        let mut user = User::new(self_user, now);
        user.is_connected = true;
        users.insert(self_user, user);

        Self {
            self_user,
            self_client: None,
            users,
            clients: HashMap::new(),
            conversations: HashMap::new(),
            messages: HashMap::new(),
            timelines: HashMap::new(),
        }
    }

    pub fn self_user(&self) -> UserId {
        self.self_user
    }

    /// Register the local device. Required before any send.
    pub fn set_self_client(&mut self, client: ClientId, now: DateTime<Utc>) {
        self.insert_client(Client::new(client.clone(), self.self_user, now));
        self.self_client = Some(client);
    }

    pub fn self_client(&self) -> Option<&ClientId> {
        self.self_client.as_ref()
    }

    // -- Users ---------------------------------------------------------

    pub fn insert_user(&mut self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn user_mut(&mut self, id: &UserId) -> Option<&mut User> {
        self.users.get_mut(id)
    }

    // -- Clients -------------------------------------------------------

    pub fn insert_client(&mut self, client: Client) {
        self.clients
            .entry(client.user)
            .or_default()
            .insert(client.id.clone(), client);
    }

    pub fn client(&self, user: &UserId, id: &ClientId) -> Option<&Client> {
        self.clients.get(user)?.get(id)
    }

    pub fn client_mut(&mut self, user: &UserId, id: &ClientId) -> Option<&mut Client> {
        self.clients.get_mut(user)?.get_mut(id)
    }

    /// Remove a revoked device.
    pub fn remove_client(&mut self, user: &UserId, id: &ClientId) -> Result<()> {
        self.clients
            .get_mut(user)
            .and_then(|clients| clients.remove(id))
            .map(|_| tracing::debug!(user = %user.short(), client = %id, "device removed"))
            .ok_or(StoreError::UnknownClient(id.clone()))
    }

    /// Devices of one user, in stable identifier order.
    pub fn clients_of<'a>(&'a self, user: &UserId) -> impl Iterator<Item = &'a Client> + 'a {
        self.clients.get(user).into_iter().flat_map(|c| c.values())
    }

    // -- Conversations -------------------------------------------------

    pub fn insert_conversation(&mut self, conversation: Conversation) {
        self.timelines.entry(conversation.id).or_default();
        self.conversations.insert(conversation.id, conversation);
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn conversation_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    /// Move the local read marker forward. Never moves backwards.
    pub fn advance_read_marker(
        &mut self,
        id: &ConversationId,
        up_to: DateTime<Utc>,
    ) -> Result<()> {
        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or(StoreError::UnknownConversation(*id))?;
        match conversation.read_marker {
            Some(current) if current >= up_to => {}
            _ => conversation.read_marker = Some(up_to),
        }
        Ok(())
    }

    // -- Messages ------------------------------------------------------

    /// Append a record to its conversation's timeline.
    pub fn append_message(&mut self, record: MessageRecord) -> Result<()> {
        let conversation = self
            .conversations
            .get(&record.conversation)
            .ok_or(StoreError::UnknownConversation(record.conversation))?;
        debug_assert!(conversation.id == record.conversation);

        tracing::trace!(message = %record.id, conversation = %record.conversation, "record appended");
        self.timelines
            .entry(record.conversation)
            .or_default()
            .push(record.id);
        self.messages.insert(record.id, record);
        Ok(())
    }

    /// Append a user message, applying the conversation's destruction
    /// timer. Delivery receipts never self-destruct.
    pub fn append_user_message(
        &mut self,
        conversation: &ConversationId,
        sender: UserId,
        content: MessageContent,
        now: DateTime<Utc>,
    ) -> Result<MessageId> {
        let timer = self
            .conversations
            .get(conversation)
            .ok_or(StoreError::UnknownConversation(*conversation))?
            .message_timer;

        let id = MessageId::new();
        let mut record = MessageRecord::new(id, *conversation, sender, content, now);
        if !record.is_confirmation() {
            record.ephemeral_timeout = timer;
        }
        self.append_message(record)?;
        Ok(id)
    }

    pub fn message(&self, id: &MessageId) -> Option<&MessageRecord> {
        self.messages.get(id)
    }

    pub fn message_mut(&mut self, id: &MessageId) -> Option<&mut MessageRecord> {
        self.messages.get_mut(id)
    }

    /// Remove a record entirely (timeline entry included).
    pub fn remove_message(&mut self, id: &MessageId) -> Result<()> {
        let record = self
            .messages
            .remove(id)
            .ok_or(StoreError::UnknownMessage(*id))?;
        if let Some(timeline) = self.timelines.get_mut(&record.conversation) {
            timeline.retain(|m| m != id);
        }
        Ok(())
    }

    /// Full timeline (visible and hidden), oldest first.
    pub fn timeline(&self, conversation: &ConversationId) -> &[MessageId] {
        self.timelines
            .get(conversation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Visible timeline, oldest first.
    pub fn visible_timeline(&self, conversation: &ConversationId) -> Vec<MessageId> {
        self.timeline(conversation)
            .iter()
            .filter(|id| self.messages.get(id).is_some_and(|m| !m.hidden))
            .copied()
            .collect()
    }

    /// Hidden records of a conversation (receiver-side destroyed copies).
    pub fn hidden_messages(&self, conversation: &ConversationId) -> Vec<MessageId> {
        self.timeline(conversation)
            .iter()
            .filter(|id| self.messages.get(id).is_some_and(|m| m.hidden))
            .copied()
            .collect()
    }

    pub fn last_visible_message(&self, conversation: &ConversationId) -> Option<&MessageRecord> {
        self.timeline(conversation)
            .iter()
            .rev()
            .filter_map(|id| self.messages.get(id))
            .find(|m| !m.hidden)
    }

    /// Records across all conversations whose destruction countdown has
    /// started. Used for restart recovery.
    pub fn messages_with_destruction_date(&self) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self
            .messages
            .values()
            .filter(|m| m.destruction_date.is_some() && !m.is_obfuscated && !m.hidden)
            .map(|m| m.id)
            .collect();
        ids.sort();
        ids
    }

    /// Look up a message by identifier within one conversation, the way a
    /// referenced-message id arrives on the wire.
    pub fn message_in_conversation(
        &self,
        conversation: &ConversationId,
        id: &MessageId,
    ) -> Option<&MessageRecord> {
        self.messages
            .get(id)
            .filter(|m| &m.conversation == conversation)
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("self_user", &self.self_user.short())
            .field("users", &self.users.len())
            .field("conversations", &self.conversations.len())
            .field("messages", &self.messages.len())
            .finish()
    }
}
