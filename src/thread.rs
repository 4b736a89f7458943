use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ThreadError;
use crate::llm::ChatMessage;

/// Ordered in-memory conversation history.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMessageStore {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_messages: Option<usize>,
}

impl ChatMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_messages: None,
        }
    }

    /// Keeps at most `max_messages`, dropping the oldest first.
    pub fn max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self.truncate();
        self
    }

    pub fn add_messages<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        self.messages.extend(messages);
        self.truncate();
    }

    pub fn list_messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn serialize(&self) -> Result<Value, ThreadError> {
        serde_json::to_value(self).map_err(|err| ThreadError::InvalidState(err.to_string()))
    }

    pub fn deserialize(state: Value) -> Result<Self, ThreadError> {
        serde_json::from_value(state).map_err(|err| ThreadError::InvalidState(err.to_string()))
    }

    fn truncate(&mut self) {
        if let Some(max) = self.max_messages {
            let excess = self.messages.len().saturating_sub(max);
            if excess > 0 {
                self.messages.drain(..excess);
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct ThreadState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    chat_message_store_state: Option<ChatMessageStore>,
}

/// Conversation state shared between turns of an agent.
///
/// A thread either keeps its messages locally in a [`ChatMessageStore`] or is
/// bound to a conversation id held by the service, never both. Clones share
/// the same state.
#[derive(Clone, Debug, Default)]
pub struct AgentThread {
    state: Arc<RwLock<ThreadState>>,
}

impl AgentThread {
    pub fn new() -> Self {
        Self::with_message_store(ChatMessageStore::new())
    }

    pub fn with_message_store(store: ChatMessageStore) -> Self {
        Self::from_state(ThreadState {
            service_thread_id: None,
            chat_message_store_state: Some(store),
        })
    }

    pub fn with_service_thread_id(service_thread_id: impl Into<String>) -> Self {
        Self::from_state(ThreadState {
            service_thread_id: Some(service_thread_id.into()),
            chat_message_store_state: None,
        })
    }

    fn from_state(state: ThreadState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn service_thread_id(&self) -> Option<String> {
        self.state
            .read()
            .expect("thread lock poisoned")
            .service_thread_id
            .clone()
    }

    pub fn is_service_managed(&self) -> bool {
        self.service_thread_id().is_some()
    }

    /// Binds the thread to a service conversation. Fails when local messages
    /// have already been recorded.
    pub fn set_service_thread_id(
        &self,
        service_thread_id: impl Into<String>,
    ) -> Result<(), ThreadError> {
        let mut state = self.state.write().expect("thread lock poisoned");
        if state
            .chat_message_store_state
            .as_ref()
            .is_some_and(|store| !store.is_empty())
        {
            return Err(ThreadError::InvalidState(
                "only one of service_thread_id or message store may be set".to_string(),
            ));
        }
        state.chat_message_store_state = None;
        state.service_thread_id = Some(service_thread_id.into());
        Ok(())
    }

    pub fn set_message_store(&self, store: ChatMessageStore) -> Result<(), ThreadError> {
        let mut state = self.state.write().expect("thread lock poisoned");
        if let Some(id) = &state.service_thread_id {
            return Err(ThreadError::ServiceManaged(id.clone()));
        }
        state.chat_message_store_state = Some(store);
        Ok(())
    }

    /// Records messages exchanged in a run. Service-managed threads keep
    /// their history remotely, so nothing is stored.
    pub fn on_new_messages(&self, messages: &[ChatMessage]) {
        let mut state = self.state.write().expect("thread lock poisoned");
        if state.service_thread_id.is_some() {
            return;
        }
        state
            .chat_message_store_state
            .get_or_insert_with(ChatMessageStore::new)
            .add_messages(messages.iter().cloned());
    }

    /// Locally stored messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state
            .read()
            .expect("thread lock poisoned")
            .chat_message_store_state
            .as_ref()
            .map(|store| store.list_messages().to_vec())
            .unwrap_or_default()
    }

    pub fn serialize(&self) -> Result<Value, ThreadError> {
        let state = self.state.read().expect("thread lock poisoned");
        serde_json::to_value(&*state).map_err(|err| ThreadError::InvalidState(err.to_string()))
    }

    pub fn deserialize(value: Value) -> Result<Self, ThreadError> {
        let state = serde_json::from_value::<ThreadState>(value)
            .map_err(|err| ThreadError::InvalidState(err.to_string()))?;
        if state.service_thread_id.is_some() && state.chat_message_store_state.is_some() {
            return Err(ThreadError::InvalidState(
                "only one of service_thread_id or message store may be set".to_string(),
            ));
        }
        Ok(Self::from_state(state))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn store_keeps_insertion_order_and_caps_length() {
        let mut store = ChatMessageStore::new().max_messages(2);
        store.add_messages([
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
        ]);

        let texts = store
            .list_messages()
            .iter()
            .map(ChatMessage::text)
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[test]
    fn store_preserves_additional_properties_through_serialization() {
        let mut store = ChatMessageStore::new();
        store.add_messages([ChatMessage::user("X=2").property("content", json!("X=2"))]);

        let restored = ChatMessageStore::deserialize(store.serialize().expect("serializes"))
            .expect("deserializes");

        assert_eq!(restored, store);
        assert_eq!(
            restored.list_messages()[0].additional_properties["content"],
            json!("X=2")
        );
    }

    #[test]
    fn thread_clones_share_history() {
        let thread = AgentThread::new();
        let handle = thread.clone();

        handle.on_new_messages(&[ChatMessage::user("hi"), ChatMessage::assistant("hello")]);

        assert_eq!(thread.messages().len(), 2);
    }

    #[test]
    fn service_thread_ignores_local_messages() {
        let thread = AgentThread::with_service_thread_id("thread_123");
        thread.on_new_messages(&[ChatMessage::user("hi")]);

        assert!(thread.messages().is_empty());
        assert!(matches!(
            thread.set_message_store(ChatMessageStore::new()),
            Err(ThreadError::ServiceManaged(id)) if id == "thread_123"
        ));
    }

    #[test]
    fn service_id_cannot_replace_recorded_messages() {
        let thread = AgentThread::new();
        thread.on_new_messages(&[ChatMessage::user("hi")]);

        assert!(thread.set_service_thread_id("thread_1").is_err());
    }

    #[test]
    fn thread_round_trips_through_json() {
        let thread = AgentThread::new();
        thread.on_new_messages(&[ChatMessage::user("Tell me a joke about a pirate.")]);

        let state = thread.serialize().expect("serializes");
        assert_eq!(
            state["chat_message_store_state"]["messages"][0]["role"],
            "user"
        );

        let resumed = AgentThread::deserialize(state).expect("deserializes");
        assert_eq!(resumed.messages(), thread.messages());
    }

    #[test]
    fn deserialize_rejects_conflicting_state() {
        let err = AgentThread::deserialize(json!({
            "service_thread_id": "t",
            "chat_message_store_state": {"messages": []}
        }))
        .expect_err("conflict");
        assert!(matches!(err, ThreadError::InvalidState(_)));
    }
}
