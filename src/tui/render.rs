/// Ratatui draw entry-point for termpilot.
/// Thin dispatcher: the list lives in sidebar.rs, transcripts in chat.rs.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

use super::{App, Screen, Status};

/// Below this width the browse screen shows the list only.
const PREVIEW_MIN_WIDTH: u16 = 80;
const LIST_WIDTH: u16 = 36;

// ── Main draw entry point ─────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, app: &App) {
    match &app.screen {
        Screen::Browsing => draw_browse(f, app),
        Screen::Chatting { conversation } => {
            draw_chat_screen(f, app, &conversation.title, &conversation.messages)
        }
        Screen::ComposingNew => draw_chat_screen(f, app, "new conversation", &[]),
    }
}

fn draw_browse(f: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(f.area());

    if rows[0].width >= PREVIEW_MIN_WIDTH {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(LIST_WIDTH), Constraint::Min(0)])
            .split(rows[0]);
        super::sidebar::draw_conversation_list(f, app, cols[0]);
        draw_preview(f, app, cols[1]);
    } else {
        super::sidebar::draw_conversation_list(f, app, rows[0]);
    }

    draw_status_bar(f, app, rows[1], "↑↓ select · Enter open · n new · q quit");
}

fn draw_preview(f: &mut Frame, app: &App, area: Rect) {
    let preview = app
        .preview
        .as_ref()
        .filter(|p| Some(p.id.as_str()) == app.selected_id());
    match preview {
        Some(conversation) => super::chat::draw_transcript(f, &conversation.messages, 0, area),
        None => {
            let hint = if app.conversations.is_empty() { "" } else { "  Enter to open" };
            f.render_widget(
                Paragraph::new(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
                    .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14)))),
                area,
            );
        }
    }
}

fn draw_chat_screen(f: &mut Frame, app: &App, title: &str, messages: &[crate::models::Message]) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Min(0),    // transcript
            Constraint::Length(1), // status bar
            Constraint::Length(2), // input
        ])
        .split(f.area());

    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(" ◆ ", Style::default().fg(Color::Cyan)),
            Span::styled(title.to_string(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        ])),
        chunks[0],
    );
    super::chat::draw_transcript(f, messages, app.scroll, chunks[1]);
    draw_status_bar(f, app, chunks[2], "Enter send · Esc back · Ctrl+C quit");
    draw_input(f, app, chunks[3]);
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect, hints: &str) {
    let (glyph, glyph_color, message, message_color) = match &app.status {
        Status::Ready => ("▲", Color::White, hints.to_string(), Color::DarkGray),
        Status::Waiting => ("⠿", Color::Cyan, "waiting for reply…".to_string(), Color::Cyan),
        Status::Failed(err) => ("✗", Color::Red, err.clone(), Color::Red),
    };

    let line = Line::from(vec![
        Span::raw(" "),
        Span::styled(glyph, Style::default().fg(glyph_color).add_modifier(Modifier::BOLD)),
        Span::styled(" termpilot", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::styled("  ·  ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.model.clone(), Style::default().fg(Color::Rgb(100, 180, 220))),
        Span::raw("  "),
        Span::styled(message, Style::default().fg(message_color)),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_input(f: &mut Frame, app: &App, area: Rect) {
    let waiting = app.status == Status::Waiting;
    let (border_color, prompt_color) = if waiting {
        (Color::Rgb(40, 40, 60), Color::DarkGray)
    } else {
        (Color::Rgb(60, 60, 80), Color::Cyan)
    };

    // "  ❯ " is four columns
    let prompt_width: u16 = 4;
    let text_width = area.width.saturating_sub(prompt_width) as usize;
    let (shown, cursor_col) = app.input.visible(text_width);

    let prompt_span = Span::styled("  ❯ ", Style::default().fg(prompt_color).add_modifier(Modifier::BOLD));
    let content_span = if app.input.text().is_empty() && !waiting {
        Span::styled("message", Style::default().fg(Color::Rgb(70, 70, 90)))
    } else {
        Span::styled(shown.to_string(), Style::default().fg(Color::White))
    };

    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(border_color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)));

    f.render_widget(Paragraph::new(Line::from(vec![prompt_span, content_span])).block(block), area);

    if !waiting && text_width > 0 && area.height > 1 {
        let cursor_x = area.x + prompt_width + cursor_col as u16;
        let cursor_y = area.y + 1; // +1 for top border
        f.set_cursor_position((cursor_x, cursor_y));
    }
}
