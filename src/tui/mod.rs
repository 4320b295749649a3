/// Ratatui-based TUI for termpilot.
///
/// Three screens: browse saved conversations, chat inside one, or compose a
/// brand-new one. Keys are turned into a [`Command`] by [`App::handle_key`];
/// the event loop executes it against the store and backend and feeds the
/// outcome back into the [`App`]. Rendering is a pure function of the `App`.
///
/// Layout (chat / compose):
///   ┌────────────────────────────────────────────────┐
///   │  transcript (scrollable, Min(0))               │
///   ├────────────────────────────────────────────────┤
///   │  status bar (1 line)                           │
///   ├────────────────────────────────────────────────┤
///   │  input line (2 lines, fixed)                   │
///   └────────────────────────────────────────────────┘
pub mod chat;
pub mod input;
pub mod render;
pub mod sidebar;

use std::io;

use anyhow::Result;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::{Stream, StreamExt};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::client::ChatBackend;
use crate::models::Conversation;
use crate::sessions::Sessions;
use crate::store::ConversationStore;
use input::InputLine;

// ── Screen / Command ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Screen {
    Browsing,
    Chatting { conversation: Conversation },
    ComposingNew,
}

/// Work the event loop must do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    None,
    Quit,
    /// Load the full conversation and switch to the chat screen
    Open(String),
    /// Load the conversation for the browse preview pane
    Preview(String),
    Continue { id: String, prompt: String },
    Start(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Ready,
    Waiting,
    Failed(String),
}

// ── App ───────────────────────────────────────────────────────────────────────

pub struct App {
    pub screen: Screen,
    /// Listing (newest first); messages are not loaded
    pub conversations: Vec<Conversation>,
    pub selected: usize,
    /// Fully loaded conversation shown next to the list on wide terminals
    pub preview: Option<Conversation>,
    pub input: InputLine,
    pub status: Status,
    /// Lines scrolled up from the bottom of the transcript
    pub scroll: usize,
    pub model: String,
}

impl App {
    pub fn new(conversations: Vec<Conversation>, model: impl Into<String>) -> Self {
        Self {
            screen: Screen::Browsing,
            conversations,
            selected: 0,
            preview: None,
            input: InputLine::default(),
            status: Status::Ready,
            scroll: 0,
            model: model.into(),
        }
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.conversations.get(self.selected).map(|c| c.id.as_str())
    }

    /// Id of the conversation the preview pane should show, if it is not
    /// already loaded.
    pub fn preview_wanted(&self) -> Option<String> {
        let id = self.selected_id()?;
        match &self.preview {
            Some(p) if p.id == id => None,
            _ => Some(id.to_string()),
        }
    }

    // ── Key handling ──────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent) -> Command {
        if is_quit_key(&key) {
            return Command::Quit;
        }

        match self.screen {
            Screen::Browsing => self.handle_browse_key(key),
            Screen::Chatting { .. } | Screen::ComposingNew => self.handle_input_key(key),
        }
    }

    fn handle_browse_key(&mut self, key: KeyEvent) -> Command {
        match key.code {
            KeyCode::Char('q') => Command::Quit,
            KeyCode::Char('n') => {
                self.input.clear();
                self.status = Status::Ready;
                self.scroll = 0;
                self.screen = Screen::ComposingNew;
                Command::None
            }
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Home => self.move_selection(-(self.selected as isize)),
            KeyCode::End => self.move_selection(self.conversations.len() as isize),
            KeyCode::Enter => match self.selected_id() {
                Some(id) => Command::Open(id.to_string()),
                None => Command::None,
            },
            _ => Command::None,
        }
    }

    fn move_selection(&mut self, delta: isize) -> Command {
        if self.conversations.is_empty() {
            return Command::None;
        }
        let last = self.conversations.len() - 1;
        let next = (self.selected as isize + delta).clamp(0, last as isize) as usize;
        if next == self.selected {
            return Command::None;
        }
        self.selected = next;
        match self.preview_wanted() {
            Some(id) => Command::Preview(id),
            None => Command::None,
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Command {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Esc => {
                self.input.clear();
                self.status = Status::Ready;
                self.scroll = 0;
                self.screen = Screen::Browsing;
                Command::None
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Char('a') if ctrl => {
                self.input.home();
                Command::None
            }
            KeyCode::Char('e') if ctrl => {
                self.input.end();
                Command::None
            }
            KeyCode::Char('u') if ctrl => {
                self.input.delete_to_start();
                Command::None
            }
            KeyCode::Char('w') if ctrl => {
                self.input.delete_word();
                Command::None
            }
            KeyCode::Char(c) if !ctrl => {
                self.input.insert(c);
                Command::None
            }
            KeyCode::Backspace if alt => {
                self.input.delete_word();
                Command::None
            }
            KeyCode::Backspace => {
                self.input.backspace();
                Command::None
            }
            KeyCode::Delete => {
                self.input.delete_forward();
                Command::None
            }
            KeyCode::Left if ctrl || alt => {
                self.input.word_left();
                Command::None
            }
            KeyCode::Right if ctrl || alt => {
                self.input.word_right();
                Command::None
            }
            KeyCode::Left => {
                self.input.left();
                Command::None
            }
            KeyCode::Right => {
                self.input.right();
                Command::None
            }
            KeyCode::Home => {
                self.input.home();
                Command::None
            }
            KeyCode::End => {
                self.input.end();
                Command::None
            }
            KeyCode::PageUp | KeyCode::Up => {
                self.scroll = self.scroll.saturating_add(if key.code == KeyCode::Up { 1 } else { 10 });
                Command::None
            }
            KeyCode::PageDown | KeyCode::Down => {
                self.scroll = self.scroll.saturating_sub(if key.code == KeyCode::Down { 1 } else { 10 });
                Command::None
            }
            _ => Command::None,
        }
    }

    fn submit(&mut self) -> Command {
        if self.input.is_blank() {
            return Command::None;
        }
        let prompt = self.input.take();
        self.status = Status::Waiting;
        self.scroll = 0;
        match &self.screen {
            Screen::Chatting { conversation } => Command::Continue {
                id: conversation.id.clone(),
                prompt,
            },
            Screen::ComposingNew => Command::Start(prompt),
            Screen::Browsing => {
                self.status = Status::Ready;
                Command::None
            }
        }
    }

    // ── Outcomes ──────────────────────────────────────────────────────────────

    pub fn show_conversation(&mut self, conversation: Conversation) {
        self.input.clear();
        self.status = Status::Ready;
        self.scroll = 0;
        self.screen = Screen::Chatting { conversation };
    }

    /// Replace the listing, keeping the selection in range.
    pub fn set_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.selected = self.selected.min(self.conversations.len().saturating_sub(1));
    }

    pub fn set_preview(&mut self, conversation: Conversation) {
        self.preview = Some(conversation);
    }

    pub fn conversation_updated(&mut self, updated: Conversation) {
        self.status = Status::Ready;
        if let Some(p) = self.preview.as_mut().filter(|p| p.id == updated.id) {
            *p = updated.clone();
        }
        if let Screen::Chatting { conversation } = &mut self.screen {
            if conversation.id == updated.id {
                *conversation = updated;
            }
        }
    }

    /// Back to the refreshed list with the new conversation selected and previewed.
    pub fn conversation_started(&mut self, started: Conversation, listing: Vec<Conversation>) {
        self.conversations = listing;
        if !self.conversations.iter().any(|c| c.id == started.id) {
            self.conversations.insert(0, started.clone());
        }
        self.selected = self
            .conversations
            .iter()
            .position(|c| c.id == started.id)
            .unwrap_or(0);
        self.preview = Some(started);
        self.status = Status::Ready;
        self.scroll = 0;
        self.screen = Screen::Browsing;
    }

    /// Stay on the current screen and put the unsent prompt back.
    pub fn report_failure(&mut self, message: impl Into<String>, draft: Option<String>) {
        self.status = Status::Failed(message.into());
        if let Some(draft) = draft {
            self.input.set(draft);
        }
    }
}

// ── Command execution ─────────────────────────────────────────────────────────

/// Run `command` to completion. Returns `false` when the UI should exit.
pub async fn run_command<B: ChatBackend>(
    app: &mut App,
    command: Command,
    store: &ConversationStore,
    sessions: &Sessions<'_, B>,
) -> bool {
    match command {
        Command::None => {}
        Command::Quit => return false,
        Command::Open(id) => match store.get(&id) {
            Ok(conversation) => app.show_conversation(conversation),
            Err(e) => {
                tracing::error!(%id, error = %e, "failed to open conversation");
                if e.is_not_found() {
                    if let Ok(listing) = store.get_all() {
                        app.set_conversations(listing);
                    }
                }
                app.report_failure(e.to_string(), None);
            }
        },
        Command::Preview(id) => match store.get(&id) {
            Ok(conversation) => app.set_preview(conversation),
            Err(e) => tracing::warn!(%id, error = %e, "failed to load preview"),
        },
        Command::Continue { id, prompt } => {
            match sessions.continue_conversation(&id, &prompt).await {
                Ok(conversation) => app.conversation_updated(conversation),
                Err(e) => {
                    tracing::error!(%id, error = %e, "failed to continue conversation");
                    app.report_failure(e.to_string(), Some(prompt));
                }
            }
        }
        Command::Start(prompt) => match sessions.start(&prompt).await {
            Ok(conversation) => {
                let listing = store.get_all().unwrap_or_else(|e| {
                    tracing::error!(error = %e, "failed to refresh conversation list");
                    app.conversations.clone()
                });
                app.conversation_started(conversation, listing);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start conversation");
                app.report_failure(e.to_string(), Some(prompt));
            }
        },
    }
    true
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run<B: ChatBackend>(store: &ConversationStore, backend: &B, model: &str) -> Result<()> {
    let conversations = store.get_all()?;
    let mut app = App::new(conversations, model);
    let sessions = Sessions::new(store, backend);

    let mut terminal = setup_terminal()?;

    // Panic hook: restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, &mut app, store, &sessions).await;

    restore_terminal(&mut terminal);
    result
}

fn is_quit_key(key: &KeyEvent) -> bool {
    key.kind == KeyEventKind::Press
        && key.modifiers.contains(KeyModifiers::CONTROL)
        && key.code == KeyCode::Char('c')
}

/// Execute a backend-bound command while still reading the terminal.
/// Ctrl+C abandons the pending request and quits; any other key typed while
/// waiting is dropped.
async fn run_while_reading_keys<B, S>(
    app: &mut App,
    command: Command,
    store: &ConversationStore,
    sessions: &Sessions<'_, B>,
    events: &mut S,
) -> Result<bool>
where
    B: ChatBackend,
    S: Stream<Item = io::Result<Event>> + Unpin,
{
    let pending = run_command(app, command, store, sessions);
    tokio::pin!(pending);

    loop {
        tokio::select! {
            keep_going = &mut pending => return Ok(keep_going),
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if is_quit_key(&key) => {
                    tracing::debug!("quit while waiting for a reply");
                    return Ok(false);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(false),
            },
        }
    }
}

async fn event_loop<B: ChatBackend>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    store: &ConversationStore,
    sessions: &Sessions<'_, B>,
) -> Result<()> {
    if let Some(id) = app.preview_wanted() {
        run_command(app, Command::Preview(id), store, sessions).await;
    }

    let mut events = EventStream::new();
    terminal.draw(|f| render::draw(f, app))?;

    while let Some(event) = events.next().await {
        match event? {
            Event::Key(key) if key.kind == KeyEventKind::Press => {
                let command = app.handle_key(key);
                let keep_going = if matches!(command, Command::Continue { .. } | Command::Start(_)) {
                    // Show the waiting state before the backend call
                    terminal.draw(|f| render::draw(f, app))?;
                    run_while_reading_keys(app, command, store, sessions, &mut events).await?
                } else {
                    run_command(app, command, store, sessions).await
                };
                if !keep_going {
                    break;
                }
            }
            Event::Resize(_, _) => {}
            _ => continue,
        }
        terminal.draw(|f| render::draw(f, app))?;
    }

    Ok(())
}
