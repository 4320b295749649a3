/// Conversation session logic: start a conversation, or continue one with
/// its full history, persisting each exchange.
///
/// A backend failure aborts the operation before anything is written; a store
/// failure after a successful backend call loses that reply (no compensation
/// beyond the store's own transactions).
use crate::client::{ChatBackend, ChatMessage};
use crate::error::{SessionError, StoreError};
use crate::models::Conversation;
use crate::store::ConversationStore;

/// How often `start` regenerates the id when it collides with a stored one.
const CREATE_ATTEMPTS: usize = 5;

pub struct Sessions<'a, B> {
    store: &'a ConversationStore,
    backend: &'a B,
}

impl<'a, B: ChatBackend> Sessions<'a, B> {
    pub fn new(store: &'a ConversationStore, backend: &'a B) -> Self {
        Self { store, backend }
    }

    /// Ask the backend with no prior history and store the exchange as a new
    /// conversation.
    pub async fn start(&self, prompt: &str) -> Result<Conversation, SessionError> {
        let reply = self.backend.chat_completion(prompt, &[]).await?;
        let mut conversation = Conversation::from_exchange(prompt, &reply);

        let mut attempt = 1;
        loop {
            match self.store.create(conversation.clone()) {
                Ok(created) => {
                    tracing::info!(id = %created.id, title = %created.title, "started conversation");
                    return Ok(created);
                }
                Err(StoreError::Duplicate(id)) if attempt < CREATE_ATTEMPTS => {
                    tracing::warn!(%id, attempt, "conversation id collision, regenerating");
                    conversation.reassign_id();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send `prompt` with the stored history of `id` and append the exchange.
    pub async fn continue_conversation(
        &self,
        id: &str,
        prompt: &str,
    ) -> Result<Conversation, SessionError> {
        let mut conversation = self.store.get(id)?;
        if conversation.messages.is_empty() {
            return Err(SessionError::EmptyConversation(id.to_string()));
        }

        let history: Vec<ChatMessage> = conversation.messages.iter().map(ChatMessage::from).collect();
        let reply = self.backend.chat_completion(prompt, &history).await?;

        conversation.push_exchange(prompt, &reply);
        let updated = self.store.update(conversation)?;
        tracing::info!(id = %updated.id, messages = updated.messages.len(), "continued conversation");
        Ok(updated)
    }

    /// Continue whichever conversation was created last.
    pub async fn continue_latest(&self, prompt: &str) -> Result<Conversation, SessionError> {
        let latest = self.store.get_most_recent()?;
        self.continue_conversation(&latest.id, prompt).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::error::RequestError;
    use crate::models::{Message, Role};

    /// In-process backend: answers `reply-N`, or fails when told to, and
    /// remembers every request.
    #[derive(Default)]
    pub(crate) struct FakeBackend {
        pub calls: RefCell<Vec<(String, Vec<ChatMessage>)>>,
        pub fail: bool,
        pub models: Vec<String>,
        pub ensure_calls: RefCell<usize>,
    }

    impl FakeBackend {
        pub fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl ChatBackend for FakeBackend {
        async fn chat_completion(
            &self,
            prompt: &str,
            history: &[ChatMessage],
        ) -> Result<String, RequestError> {
            self.calls.borrow_mut().push((prompt.to_string(), history.to_vec()));
            if self.fail {
                return Err(RequestError::NoChoices);
            }
            Ok(format!("reply-{}", self.call_count()))
        }

        async fn list_models(&self) -> Result<Vec<String>, RequestError> {
            Ok(self.models.clone())
        }

        async fn ensure_running(&self) -> Result<(), RequestError> {
            *self.ensure_calls.borrow_mut() += 1;
            Ok(())
        }
    }

    fn roles(conversation: &Conversation) -> Vec<Role> {
        conversation.messages.iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn test_start_persists_user_then_assistant() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);

        let prompt = "Explain the borrow checker in one paragraph";
        let started = sessions.start(prompt).await.unwrap();

        let stored = store.get(&started.id).unwrap();
        assert_eq!(roles(&stored), vec![Role::User, Role::Assistant]);
        assert_eq!(stored.messages[0].content, prompt);
        assert_eq!(stored.messages[1].content, "reply-1");
        assert_eq!(stored.title, "Explain the borrow c");
        // First request carries no history
        assert!(backend.calls.borrow()[0].1.is_empty());
    }

    #[tokio::test]
    async fn test_start_backend_failure_creates_nothing() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::failing();
        let sessions = Sessions::new(&store, &backend);

        let err = sessions.start("hello").await.unwrap_err();
        assert!(matches!(err, SessionError::Request(RequestError::NoChoices)));
        assert!(store.get_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_back_to_back_starts_get_distinct_ids() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);

        let first = sessions.start("same prompt").await.unwrap();
        let second = sessions.start("same prompt").await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(store.get_all().unwrap().len(), 2);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_continue_sends_history_and_appends() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);

        let started = sessions.start("first question").await.unwrap();
        let continued = sessions.continue_conversation(&started.id, "second question").await.unwrap();

        assert_eq!(continued.messages.len(), 4);
        let (prompt, history) = backend.calls.borrow()[1].clone();
        assert_eq!(prompt, "second question");
        assert_eq!(
            history,
            vec![
                ChatMessage { role: Role::User, content: "first question".to_string() },
                ChatMessage { role: Role::Assistant, content: "reply-1".to_string() },
            ]
        );
    }

    #[tokio::test]
    async fn test_n_continuations_add_two_messages_each_in_order() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);

        let started = sessions.start("q0").await.unwrap();
        for n in 1..=4 {
            sessions.continue_conversation(&started.id, &format!("q{n}")).await.unwrap();
        }

        let stored = store.get(&started.id).unwrap();
        assert_eq!(stored.messages.len(), 2 + 2 * 4);
        let contents: Vec<_> = stored.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["q0", "reply-1", "q1", "reply-2", "q2", "reply-3", "q3", "reply-4", "q4", "reply-5"]
        );
    }

    #[tokio::test]
    async fn test_continue_unknown_id_skips_backend() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);

        let err = sessions.continue_conversation("missing1", "hello").await.unwrap_err();
        assert!(matches!(err, SessionError::Store(ref e) if e.is_not_found()));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_continue_empty_conversation_is_rejected() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);

        let mut empty = Conversation::from_exchange("x", "y");
        empty.messages.clear();
        let empty = store.create(empty).unwrap();

        let err = sessions.continue_conversation(&empty.id, "hello").await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyConversation(_)));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_continue_backend_failure_leaves_store_untouched() {
        let store = ConversationStore::open_in_memory().unwrap();
        let seeded = Conversation::from_exchange("hello", "hi");
        let seeded = store.create(seeded).unwrap();

        let backend = FakeBackend::failing();
        let sessions = Sessions::new(&store, &backend);
        assert!(sessions.continue_conversation(&seeded.id, "again").await.is_err());
        assert_eq!(store.get(&seeded.id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_continue_latest_targets_most_recent() {
        let store = ConversationStore::open_in_memory().unwrap();
        let mut older = Conversation::from_exchange("older", "a");
        older.created_at -= chrono::Duration::minutes(1);
        let older = store.create(older).unwrap();
        let newer = store.create(Conversation::from_exchange("newer", "b")).unwrap();

        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);
        let continued = sessions.continue_latest("follow up").await.unwrap();

        assert_eq!(continued.id, newer.id);
        assert_eq!(store.get(&older.id).unwrap().messages.len(), 2);
        assert_eq!(store.get(&newer.id).unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_continue_latest_with_empty_store() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let sessions = Sessions::new(&store, &backend);
        let err = sessions.continue_latest("anyone?").await.unwrap_err();
        assert!(matches!(err, SessionError::Store(ref e) if e.is_not_found()));
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn test_history_conversion_keeps_role_and_content() {
        let message = Message::new("abc", Role::Assistant, "  spaced  ");
        let wire = ChatMessage::from(&message);
        assert_eq!(wire.role, Role::Assistant);
        assert_eq!(wire.content, "  spaced  ");
    }
}
