use chatbox_core::{ChatMessage, MessageKind, Sender};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{AccountMode, App, InputMode, LoginField, Screen, TextInput};

/// Styles `**bold**` runs; an unmatched marker stays literal
fn styled_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    // An even part count means the last marker has no partner
    let unmatched = parts.len() % 2 == 0;
    let last = parts.len() - 1;

    let mut spans: Vec<Span<'static>> = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        let bold = i % 2 == 1;
        if bold && unmatched && i == last {
            spans.push(Span::raw(format!("**{part}")));
        } else if bold && !part.is_empty() {
            spans.push(Span::styled(
                part.to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else if bold {
            spans.push(Span::raw("****"));
        } else if !part.is_empty() {
            spans.push(Span::raw(part.to_string()));
        }
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Login => render_login_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" Chatbox ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("  {}", app.chat.api().base_url()),
            Style::default().fg(Color::Gray),
        ),
    ];

    if let Some(status) = &app.status {
        spans.push(Span::styled(
            format!("  {status}"),
            Style::default().fg(Color::LightRed).bold(),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match (app.screen, app.login.mode) {
        (Screen::Login, AccountMode::Login) => " LOGIN ",
        (Screen::Login, AccountMode::Register) => " REGISTER ",
        (Screen::Chat, _) => " CHAT ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: &[(&str, &str)] = match (app.screen, app.input_mode) {
        (Screen::Login, _) => &[
            (" Tab ", " field "),
            (" Enter ", " submit "),
            (" Ctrl+R ", " login/register "),
            (" Esc ", " quit "),
        ],
        (Screen::Chat, InputMode::Normal) => &[
            (" j/k ", " sessions "),
            (" Enter ", " open "),
            (" n ", " new "),
            (" d ", " delete "),
            (" r ", " reload "),
            (" i ", " type "),
            (" PgUp/PgDn ", " scroll "),
            (" L ", " logout "),
            (" q ", " quit "),
        ],
        (Screen::Chat, InputMode::Editing) => &[
            (" Enter ", " send "),
            (" Esc ", " stop typing "),
        ],
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in pairs {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ─────────────────────────────────────────────────────────────────────────
// Login
// ─────────────────────────────────────────────────────────────────────────

fn render_login_screen(app: &App, frame: &mut Frame, area: Rect) {
    let form = &app.login;

    // Centered box
    let popup_width = 56.min(area.width.saturating_sub(4));
    let popup_height = 12.min(area.height);
    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let title = match form.mode {
        AccountMode::Login => " Log in ",
        AccountMode::Register => " Create account ",
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let [email_area, password_area, message_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(inner);

    // Mask with one asterisk per character so the cursor still lines up
    let password_mask = TextInput {
        value: "*".repeat(form.password.len()),
        cursor: form.password.cursor,
    };
    render_field(frame, email_area, " Email ", &form.email, form.field == LoginField::Email);
    render_field(
        frame,
        password_area,
        " Password ",
        &password_mask,
        form.field == LoginField::Password,
    );

    let message = if form.busy {
        Line::from(Span::styled(
            "Please wait...",
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ))
    } else if let Some(error) = &form.error {
        Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red)))
    } else if let Some(notice) = &form.notice {
        Line::from(Span::styled(notice.clone(), Style::default().fg(Color::Green)))
    } else {
        Line::default()
    };
    frame.render_widget(Paragraph::new(message).wrap(Wrap { trim: true }), message_area);
}

fn render_field(frame: &mut Frame, area: Rect, title: &str, input: &TextInput, focused: bool) {
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    let (visible, _) = visible_window(input, area);
    frame.render_widget(
        Paragraph::new(visible).style(Style::default().fg(Color::Cyan)).block(block),
        area,
    );

    if focused {
        place_cursor(frame, input, area);
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [sessions_area, main_area] = Layout::horizontal([
        Constraint::Length(32.min(area.width / 3)),
        Constraint::Min(0),
    ])
    .areas(area);

    let [thread_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(main_area);

    // Store areas for mouse hit-testing
    app.sessions_area = Some(sessions_area);
    app.thread_area = Some(thread_area);

    render_sessions(app, frame, sessions_area);
    render_thread(app, frame, thread_area);
    render_input(app, frame, input_area);
}

fn render_sessions(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Sessions ({}) ", app.chat.sessions().len()));

    if app.chat.sessions().is_empty() {
        let empty = Paragraph::new("No sessions yet.\nPress n to start one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let items: Vec<ListItem> = app
        .chat
        .sessions()
        .sessions()
        .iter()
        .map(|session| {
            let active = app.chat.sessions().is_active(&session.id);
            let marker = if active { "● " } else { "  " };
            let style = if active {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(Color::Yellow)),
                Span::styled(session.display_title(), style),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.session_state);
}

fn sender_label(message: &ChatMessage) -> Span<'static> {
    match message.sender {
        Sender::User => Span::styled(
            "You:",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Sender::Bot => Span::styled(
            "Bot:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
    }
}

fn thread_text(app: &App) -> Text<'static> {
    let messages = app.chat.messages().messages();
    if messages.is_empty() {
        let hint = if app.chat.active_id().is_some() {
            "Say hello. Press i to start typing."
        } else {
            "Select or create a session to start chatting."
        };
        return Text::from(Span::styled(hint, Style::default().fg(Color::DarkGray)));
    }

    let mut lines: Vec<Line> = Vec::new();
    for message in messages {
        lines.push(Line::from(sender_label(message)));
        match message.kind {
            MessageKind::Text => {
                for line in message.text.lines() {
                    lines.push(styled_line(line));
                }
            }
            MessageKind::Typing(_) => {
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat((app.animation_frame as usize) + 1);
                lines.push(Line::from(Span::styled(
                    format!("typing{dots}"),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
            }
            MessageKind::Error => {
                for line in message.text.lines() {
                    lines.push(Line::from(Span::styled(
                        line.to_string(),
                        Style::default().fg(Color::Red),
                    )));
                }
            }
        }
        lines.push(Line::default());
    }

    Text::from(lines)
}

fn render_thread(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size minus borders, for scroll calculations
    app.thread_height = area.height.saturating_sub(2);
    app.thread_width = area.width.saturating_sub(2);
    if app.follow_bottom {
        app.scroll_thread_to_bottom();
    }

    let title = app
        .chat
        .sessions()
        .active()
        .map(|s| format!(" {} ", s.display_title()))
        .unwrap_or_else(|| " Chat ".to_string());

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);

    let thread = Paragraph::new(thread_text(app))
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.thread_scroll, 0));

    frame.render_widget(thread, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let title = if app.chat.messages().is_waiting() {
        " Message (waiting for reply) "
    } else {
        " Message (i to type) "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let (visible_text, _) = visible_window(&app.input, area);

    // Use cyan text to match the "You:" style
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        place_cursor(frame, &app.input, area);
    }
}

/// Visible slice of a bordered single-line field, scrolled to keep the cursor in view
fn visible_window(input: &TextInput, area: Rect) -> (String, usize) {
    let inner_width = area.width.saturating_sub(2) as usize;
    let scroll_offset = if inner_width == 0 {
        0
    } else {
        (input.cursor + 1).saturating_sub(inner_width)
    };

    let visible: String = input
        .value
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();
    (visible, scroll_offset)
}

fn place_cursor(frame: &mut Frame, input: &TextInput, area: Rect) {
    let (_, scroll_offset) = visible_window(input, area);
    let cursor_x = (input.cursor - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    fn bold_runs(line: &Line) -> Vec<String> {
        line.spans
            .iter()
            .filter(|s| s.style.add_modifier.contains(Modifier::BOLD))
            .map(|s| s.content.to_string())
            .collect()
    }

    #[test]
    fn test_styled_line_bolds_pairs() {
        let line = styled_line("a **b** c **d**");
        assert_eq!(plain(&line), "a b c d");
        assert_eq!(bold_runs(&line), vec!["b", "d"]);
    }

    #[test]
    fn test_styled_line_keeps_unmatched_marker() {
        let line = styled_line("2 ** 3");
        assert_eq!(plain(&line), "2 ** 3");
        assert!(bold_runs(&line).is_empty());
    }

    #[test]
    fn test_visible_window_follows_cursor() {
        let input = TextInput {
            value: "abcdefghij".to_string(),
            cursor: 10,
        };
        // Inner width 5
        let (visible, offset) = visible_window(&input, Rect::new(0, 0, 7, 3));
        assert_eq!(offset, 6);
        assert_eq!(visible, "ghij");
    }
}
