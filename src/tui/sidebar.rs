/// Conversation list shown on the browse screen.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
};

use super::App;

pub fn draw_conversation_list(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::RIGHT)
        .border_style(Style::default().fg(Color::Rgb(40, 38, 60)))
        .title(Span::styled(
            format!(" Conversations ({}) ", app.conversations.len()),
            Style::default().fg(Color::Rgb(100, 95, 150)).add_modifier(Modifier::BOLD),
        ))
        .style(Style::default().bg(Color::Rgb(6, 6, 12)));

    if app.conversations.is_empty() {
        let items = vec![
            ListItem::new(Line::from(Span::styled(
                " no conversations yet",
                Style::default().fg(Color::Rgb(70, 67, 100)),
            ))),
            ListItem::new(Line::from(Span::styled(
                " press n to start one",
                Style::default().fg(Color::Rgb(50, 47, 75)),
            ))),
        ];
        f.render_widget(List::new(items).block(block), area);
        return;
    }

    let items: Vec<ListItem<'static>> = app
        .conversations
        .iter()
        .map(|c| {
            ListItem::new(Line::from(vec![
                Span::styled(format!(" {} ", c.id), Style::default().fg(Color::Rgb(90, 87, 130))),
                Span::styled(c.title.clone(), Style::default().fg(Color::Rgb(170, 165, 210))),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Rgb(28, 26, 48))
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▸");

    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}
