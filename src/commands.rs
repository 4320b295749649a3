/// One-shot `chat` command: list, list models, continue, or start a
/// conversation, printing the result to `out`.
use std::io::Write;

use anyhow::{Context, Result, bail};

use crate::client::ChatBackend;
use crate::sessions::Sessions;
use crate::store::ConversationStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub list: bool,
    pub list_models: bool,
    pub continue_id: Option<String>,
    pub continue_last: bool,
    pub prompt: Vec<String>,
    /// Render replies as terminal markdown instead of raw text
    pub markdown: bool,
}

/// The single behaviour one invocation performs.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    List,
    ListModels,
    Continue { id: String, prompt: String },
    ContinueLast { prompt: String },
    Start { prompt: String },
}

impl ChatOptions {
    /// Listing beats continuation, continuation beats starting fresh.
    pub fn action(&self) -> Result<ChatAction> {
        if self.list {
            return Ok(ChatAction::List);
        }
        if self.list_models {
            return Ok(ChatAction::ListModels);
        }

        let prompt = self.prompt.join(" ");
        if prompt.trim().is_empty() {
            bail!("a prompt is required, e.g. `termpilot chat how do I reverse a Vec?`");
        }

        Ok(match (&self.continue_id, self.continue_last) {
            (Some(id), _) => ChatAction::Continue { id: id.clone(), prompt },
            (None, true) => ChatAction::ContinueLast { prompt },
            (None, false) => ChatAction::Start { prompt },
        })
    }
}

pub async fn run_chat<B: ChatBackend>(
    opts: &ChatOptions,
    store: &ConversationStore,
    backend: &B,
    out: &mut impl Write,
) -> Result<()> {
    let action = opts.action()?;
    tracing::debug!(?action, "chat command");
    let sessions = Sessions::new(store, backend);

    match action {
        ChatAction::List => {
            let conversations = store.get_all().context("failed to list conversations")?;
            writeln!(out, "Conversations ({}):", conversations.len())?;
            for conversation in &conversations {
                writeln!(out, "{} {}", conversation.id, conversation.title)?;
            }
        }
        ChatAction::ListModels => {
            backend.ensure_running().await?;
            let models = backend.list_models().await.context("failed to list models")?;
            for model in models {
                writeln!(out, "{model}")?;
            }
        }
        ChatAction::Continue { id, prompt } => {
            // Resolve the target before touching the backend
            store.get(&id).with_context(|| format!("failed to get conversation {id}"))?;
            backend.ensure_running().await?;
            let conversation = sessions
                .continue_conversation(&id, &prompt)
                .await
                .context("failed to continue conversation")?;
            print_reply(out, &conversation, opts.markdown)?;
        }
        ChatAction::ContinueLast { prompt } => {
            let latest = store.get_most_recent().context("no conversation to continue")?;
            backend.ensure_running().await?;
            let conversation = sessions
                .continue_conversation(&latest.id, &prompt)
                .await
                .context("failed to continue conversation")?;
            print_reply(out, &conversation, opts.markdown)?;
        }
        ChatAction::Start { prompt } => {
            backend.ensure_running().await?;
            let conversation = sessions
                .start(&prompt)
                .await
                .context("failed to start conversation")?;
            print_reply(out, &conversation, opts.markdown)?;
        }
    }
    Ok(())
}

fn print_reply(
    out: &mut impl Write,
    conversation: &crate::models::Conversation,
    markdown: bool,
) -> Result<()> {
    if let Some(reply) = conversation.messages.last() {
        if markdown {
            let rendered = crate::markdown::render(&reply.content, crate::markdown::terminal_width());
            writeln!(out, "{}", rendered.trim_end())?;
        } else {
            writeln!(out, "{}", reply.content.trim_end())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Conversation;
    use crate::sessions::tests::FakeBackend;

    fn opts(prompt: &str) -> ChatOptions {
        ChatOptions {
            prompt: prompt.split_whitespace().map(str::to_string).collect(),
            ..ChatOptions::default()
        }
    }

    async fn run(opts: &ChatOptions, store: &ConversationStore, backend: &FakeBackend) -> Result<String> {
        let mut out = Vec::new();
        run_chat(opts, store, backend, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_action_precedence() {
        let all = ChatOptions {
            list: true,
            list_models: true,
            continue_id: Some("abc".into()),
            continue_last: true,
            prompt: vec!["hi".into()],
            markdown: true,
        };
        assert_eq!(all.action().unwrap(), ChatAction::List);

        let models = ChatOptions { list: false, ..all.clone() };
        assert_eq!(models.action().unwrap(), ChatAction::ListModels);

        let cont = ChatOptions { list_models: false, ..models };
        assert_eq!(
            cont.action().unwrap(),
            ChatAction::Continue { id: "abc".into(), prompt: "hi".into() }
        );

        let last = ChatOptions { continue_id: None, ..cont };
        assert_eq!(last.action().unwrap(), ChatAction::ContinueLast { prompt: "hi".into() });

        let start = ChatOptions { continue_last: false, ..last };
        assert_eq!(start.action().unwrap(), ChatAction::Start { prompt: "hi".into() });
    }

    #[test]
    fn test_prompt_words_joined_with_spaces() {
        let action = opts("what   is  rust").action().unwrap();
        assert_eq!(action, ChatAction::Start { prompt: "what is rust".into() });
    }

    #[test]
    fn test_listing_needs_no_prompt() {
        let list = ChatOptions { list: true, ..ChatOptions::default() };
        assert_eq!(list.action().unwrap(), ChatAction::List);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_backend() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        assert!(run(&ChatOptions::default(), &store, &backend).await.is_err());
        assert_eq!(backend.call_count(), 0);
        assert_eq!(*backend.ensure_calls.borrow(), 0);
    }

    #[tokio::test]
    async fn test_list_prints_count_and_entries() {
        let store = ConversationStore::open_in_memory().unwrap();
        let created = store.create(Conversation::from_exchange("hello there", "hi")).unwrap();
        let backend = FakeBackend::default();

        let list = ChatOptions { list: true, ..ChatOptions::default() };
        let out = run(&list, &store, &backend).await.unwrap();
        assert_eq!(out, format!("Conversations (1):\n{} hello there\n", created.id));
        assert_eq!(*backend.ensure_calls.borrow(), 0);
    }

    #[tokio::test]
    async fn test_list_models_prints_one_per_line() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend {
            models: vec!["llama3.2".into(), "mistral".into()],
            ..FakeBackend::default()
        };
        let list = ChatOptions { list_models: true, ..ChatOptions::default() };
        let out = run(&list, &store, &backend).await.unwrap();
        assert_eq!(out, "llama3.2\nmistral\n");
        assert_eq!(*backend.ensure_calls.borrow(), 1);
    }

    #[tokio::test]
    async fn test_continue_unknown_id_makes_no_backend_call() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let cont = ChatOptions { continue_id: Some("deadbeef".into()), ..opts("hello") };

        let err = run(&cont, &store, &backend).await.unwrap_err();
        assert!(err.to_string().contains("deadbeef"));
        assert_eq!(backend.call_count(), 0);
        assert_eq!(*backend.ensure_calls.borrow(), 0);
    }

    #[tokio::test]
    async fn test_start_prints_reply_and_persists() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let out = run(&opts("tell me a joke"), &store, &backend).await.unwrap();
        assert_eq!(out, "reply-1\n");

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "tell me a joke");
    }

    #[tokio::test]
    async fn test_markdown_reply_is_rendered() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let styled = ChatOptions { markdown: true, ..opts("tell me a joke") };
        let out = run(&styled, &store, &backend).await.unwrap();
        assert!(out.contains("reply-1"));
        assert!(out.ends_with('\n'));
        assert_eq!(store.get_all().unwrap()[0].messages[1].content, "reply-1");
    }

    #[tokio::test]
    async fn test_continue_last_appends_to_latest() {
        let store = ConversationStore::open_in_memory().unwrap();
        let seeded = store.create(Conversation::from_exchange("first", "answer")).unwrap();
        let backend = FakeBackend::default();

        let last = ChatOptions { continue_last: true, ..opts("and then?") };
        let out = run(&last, &store, &backend).await.unwrap();
        assert_eq!(out, "reply-1\n");
        assert_eq!(store.get(&seeded.id).unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn test_continue_last_on_empty_store_fails_without_backend() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::default();
        let last = ChatOptions { continue_last: true, ..opts("anyone?") };
        assert!(run(&last, &store, &backend).await.is_err());
        assert_eq!(*backend.ensure_calls.borrow(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let store = ConversationStore::open_in_memory().unwrap();
        let backend = FakeBackend::failing();
        let err = run(&opts("hello"), &store, &backend).await.unwrap_err();
        assert!(format!("{err:#}").contains("no choices returned"));
        assert!(store.get_all().unwrap().is_empty());
    }
}
