/// Transcript pane: role label + trimmed content per message, newest at the bottom.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, List, ListItem},
};
use unicode_width::UnicodeWidthStr;

use crate::models::{Message, Role};

/// Columns reserved left of the message body ("  " + label + gap).
const INDENT: usize = 12;

fn role_style(role: Role) -> (&'static str, Color, Color) {
    match role {
        Role::User => ("USER", Color::Rgb(160, 140, 255), Color::Rgb(235, 232, 255)),
        Role::Assistant => ("ASSISTANT", Color::Rgb(0, 210, 210), Color::Rgb(210, 230, 255)),
    }
}

// ── Items builder ─────────────────────────────────────────────────────────────

pub fn build_items(messages: &[Message], term_width: u16) -> Vec<ListItem<'static>> {
    let wrap_width = (term_width as usize).saturating_sub(INDENT).max(20);
    let mut items: Vec<ListItem<'static>> = Vec::new();

    for message in messages {
        let (label, label_fg, text_fg) = role_style(message.role);
        let body = message.content.trim();

        let mut first = true;
        let src_lines: Vec<&str> = if body.is_empty() { vec![""] } else { body.lines().collect() };
        for src_line in src_lines {
            for w in wrap_text(src_line, wrap_width) {
                if first {
                    first = false;
                    let pad = INDENT.saturating_sub(2 + label.len());
                    items.push(ListItem::new(Line::from(vec![
                        Span::raw("  "),
                        Span::styled(label, Style::default().fg(label_fg).add_modifier(Modifier::BOLD)),
                        Span::raw(" ".repeat(pad)),
                        Span::styled(w, Style::default().fg(text_fg)),
                    ])));
                } else {
                    items.push(ListItem::new(Line::from(vec![
                        Span::raw(" ".repeat(INDENT)),
                        Span::styled(w, Style::default().fg(text_fg)),
                    ])));
                }
            }
        }
        items.push(ListItem::new(Line::raw("")));
    }

    items
}

/// Draw `messages` bottom-anchored; `scroll` lines up from the newest.
pub fn draw_transcript(f: &mut Frame, messages: &[Message], scroll: usize, area: Rect) {
    let all_items = build_items(messages, area.width);
    let total = all_items.len();
    let visible = area.height as usize;

    let skip = if total > visible {
        (total - visible).saturating_sub(scroll)
    } else {
        0
    };

    let sliced: Vec<ListItem<'static>> = all_items.into_iter().skip(skip).collect();
    let list = List::new(sliced)
        .block(Block::default().style(Style::default().bg(Color::Rgb(8, 8, 14))));
    f.render_widget(list, area);
}

// ── Utilities ─────────────────────────────────────────────────────────────────

/// Word-wrap a single line of text to `max_width` display columns.
/// Never breaks a word unless the word alone exceeds `max_width`.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return vec![String::new()];
    }
    let max_width = max_width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = word.width();
        if current_width > 0 && current_width + 1 + word_width <= max_width {
            current.push(' ');
            current.push_str(word);
            current_width += 1 + word_width;
            continue;
        }
        if current_width > 0 {
            lines.push(std::mem::take(&mut current));
        }
        if word_width <= max_width {
            current.push_str(word);
            current_width = word_width;
        } else {
            // Hard-split an overlong word by display width
            current_width = 0;
            for c in word.chars() {
                let cw = c.to_string().width();
                if current_width + cw > max_width && current_width > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                current.push(c);
                current_width += cw;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_breaks_on_words() {
        assert_eq!(wrap_text("the quick brown fox", 10), vec!["the quick", "brown fox"]);
    }

    #[test]
    fn test_wrap_text_blank_line_kept() {
        assert_eq!(wrap_text("", 10), vec![String::new()]);
        assert_eq!(wrap_text("   ", 10), vec![String::new()]);
    }

    #[test]
    fn test_wrap_text_splits_overlong_word() {
        assert_eq!(wrap_text("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_wrap_text_counts_display_width() {
        // Each CJK char is two columns wide
        assert_eq!(wrap_text("漢字 漢字", 4), vec!["漢字", "漢字"]);
    }

    #[test]
    fn test_items_label_first_line_and_trim_content() {
        let messages = vec![
            Message::new("c", Role::User, "  hi there \n"),
            Message::new("c", Role::Assistant, "line one\nline two"),
        ];
        let items = build_items(&messages, 80);
        // user: 1 line + blank, assistant: 2 lines + blank
        assert_eq!(items.len(), 5);
    }
}
