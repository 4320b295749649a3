use std::io::{self, BufRead, Write};
use std::process::Stdio;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::process::Child;
use tokio::time::Instant;

use crate::config::BackendConfig;
use crate::error::RequestError;
use crate::models::{Message, Role};

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self { role: message.role, content: message.content.clone() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ── Backend seam ──────────────────────────────────────────────────────────────

/// What the session logic, the command surface and the TUI need from a model
/// server. [`Client`] is the HTTP implementation.
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    /// Send `history` followed by `prompt` as a new user turn; return the reply.
    async fn chat_completion(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, RequestError>;

    async fn list_models(&self) -> Result<Vec<String>, RequestError>;

    /// Make sure the server answers, launching it (with operator consent) if needed.
    async fn ensure_running(&self) -> Result<(), RequestError>;
}

// ── Client ────────────────────────────────────────────────────────────────────

pub struct Client {
    http: reqwest::Client,
    config: BackendConfig,
    /// Server process we launched ourselves, if any
    child: Mutex<Option<Child>>,
}

impl Client {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            child: Mutex::new(None),
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// `{base_url}:{port}`, or just the base URL when no port is configured.
    pub fn origin(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if self.config.port.is_empty() {
            base.to_string()
        } else {
            format!("{base}:{}", self.config.port)
        }
    }

    /// `{base_url}:{port}/{version}/{path}`
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.origin(), self.config.version, path)
    }

    pub async fn chat_completion(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, RequestError> {
        let url = self.endpoint("chat/completions");

        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(prompt));
        let body = ChatRequest { model: &self.config.model, messages: &messages };

        tracing::debug!(%url, model = %self.config.model, turns = messages.len(), "chat completion request");
        let raw = self.send(self.http.post(&url).json(&body), &url).await?;

        let parsed: ChatResponse = serde_json::from_str(&raw)
            .map_err(|source| RequestError::Decode { url: url.clone(), source })?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(RequestError::NoChoices)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, RequestError> {
        let url = self.endpoint("models");
        let raw = self.send(self.http.get(&url), &url).await?;
        let parsed: ModelList = serde_json::from_str(&raw)
            .map_err(|source| RequestError::Decode { url: url.clone(), source })?;
        Ok(parsed.data.into_iter().map(|m| m.id).collect())
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, req: reqwest::RequestBuilder, url: &str) -> Result<String, RequestError> {
        let transport = |source| RequestError::Transport { url: url.to_string(), source };

        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RequestError::Status { status: status.as_u16(), body });
        }
        resp.text().await.map_err(transport)
    }

    // ── Backend process ───────────────────────────────────────────────────────

    /// GET the server root with the configured probe timeout. Never errors.
    pub async fn is_backend_running(&self) -> bool {
        let url = format!("{}/", self.origin());
        match self
            .http
            .get(&url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                tracing::debug!(%url, error = %e, "backend probe failed");
                false
            }
        }
    }

    /// Probe the server; if it is down, ask `confirm` whether to launch it and
    /// wait (bounded) for it to come up.
    pub async fn start_backend_if_not_running(
        &self,
        confirm: impl FnOnce() -> bool,
    ) -> Result<(), RequestError> {
        if self.is_backend_running().await {
            return Ok(());
        }
        if !confirm() {
            return Err(RequestError::NotRunning);
        }

        self.launch()?;

        let deadline = Instant::now() + self.config.startup_timeout;
        loop {
            if self.is_backend_running().await {
                tracing::info!(origin = %self.origin(), "backend is up");
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::warn!(timeout = ?self.config.startup_timeout, "backend did not come up");
                return Err(RequestError::StartupTimeout(self.config.startup_timeout));
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn launch(&self) -> Result<(), RequestError> {
        let command = self.config.command.join(" ");
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(RequestError::Launch {
                command,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty backend command"),
            });
        };

        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(self.config.stop_on_exit)
            .spawn()
            .map_err(|source| RequestError::Launch { command: command.clone(), source })?;

        tracing::info!(pid = ?child.id(), %command, "launched backend");
        if let Ok(mut slot) = self.child.lock() {
            *slot = Some(child);
        }
        Ok(())
    }

    /// Whether a launched server process is being tracked.
    #[cfg(test)]
    pub fn owns_backend_process(&self) -> bool {
        self.child.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Terminate the server we launched, if configured to do so.
    pub async fn shutdown(&self) {
        if !self.config.stop_on_exit {
            return;
        }
        let child = self.child.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut child) = child {
            match child.kill().await {
                Ok(()) => tracing::info!("stopped launched backend"),
                Err(e) => tracing::warn!(error = %e, "failed to stop launched backend"),
            }
        }
    }
}

impl ChatBackend for Client {
    async fn chat_completion(
        &self,
        prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, RequestError> {
        Client::chat_completion(self, prompt, history).await
    }

    async fn list_models(&self) -> Result<Vec<String>, RequestError> {
        Client::list_models(self).await
    }

    async fn ensure_running(&self) -> Result<(), RequestError> {
        let origin = self.origin();
        self.start_backend_if_not_running(|| ask_to_start(&origin)).await
    }
}

/// Interactive y/n prompt on the controlling terminal.
fn ask_to_start(origin: &str) -> bool {
    print!("Backend is not running at {origin}. Would you like to start it? (y/n): ");
    let _ = io::stdout().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y")
}
