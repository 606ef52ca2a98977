//! Conversation history display component

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::message::{Message, Role};

/// Renders the live message list, bottom-anchored, with a cursor on the
/// message still streaming in.
pub struct ChatHistory<'a> {
    messages: &'a [Message],
}

impl<'a> ChatHistory<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self { messages }
    }
}

impl Widget for ChatHistory<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("🌿 SpeciesLens");

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.messages.is_empty() {
            let welcome_lines = vec![
                Line::from(vec![Span::styled(
                    "瞬間辨識大自然物種 📷",
                    Style::default().fg(Color::Green),
                )]),
                Line::from(vec![Span::raw("")]),
                Line::from(vec![Span::styled(
                    "上傳植物、動物或昆蟲的照片，我將為您辨識並提供有趣的知識。",
                    Style::default().fg(Color::Gray),
                )]),
                Line::from(vec![Span::raw("")]),
                Line::from(vec![Span::styled(
                    "Attach a photo with /image <path>, then describe what you saw.",
                    Style::default().fg(Color::DarkGray),
                )]),
            ];

            for (i, line) in welcome_lines.iter().enumerate() {
                if i < inner_area.height as usize {
                    buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
                }
            }
            return;
        }

        let mut all_lines: Vec<Line> = Vec::new();
        for message in self.messages {
            all_lines.extend(render_message(message, inner_area.width));
            // spacing between messages
            all_lines.push(Line::from(vec![Span::raw("")]));
        }

        // Bottom-anchored: show the most recent lines that fit
        let height = inner_area.height as usize;
        let start = all_lines.len().saturating_sub(height);
        for (i, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner_area.x, inner_area.y + i as u16, line, inner_area.width);
        }
    }
}

/// Render a single message into lines
fn render_message(message: &Message, width: u16) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    let role_icon = match message.role {
        Role::User => "👤",
        Role::Model => "🦊",
    };
    let attachment = if message.image_data.is_some() { " 📷" } else { "" };

    let timestamp = chrono::DateTime::from_timestamp_millis(message.timestamp)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_default();
    let header = format!("{} {}{} {}", role_icon, timestamp, attachment, "─".repeat(20));

    lines.push(Line::from(vec![Span::styled(
        header,
        Style::default().fg(Color::DarkGray),
    )]));

    let style = match message.role {
        Role::User => Style::default().fg(Color::Blue),
        Role::Model => Style::default().fg(Color::Green),
    };

    let content_lines = wrap_text(&message.text, width.saturating_sub(2) as usize);
    let last = content_lines.len().saturating_sub(1);
    for (i, content_line) in content_lines.into_iter().enumerate() {
        let cursor = if message.is_streaming() && i == last { "▋" } else { "" };
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(content_line, style),
            Span::styled(cursor, Style::default().fg(Color::Yellow)),
        ]));
    }

    lines
}

/// Wrap text to fit within the given width
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        for word in paragraph.split_whitespace() {
            if current_line.chars().count() + word.chars().count() + 1 <= width {
                if !current_line.is_empty() {
                    current_line.push(' ');
                }
                current_line.push_str(word);
            } else {
                if !current_line.is_empty() {
                    lines.push(current_line);
                    current_line = String::new();
                }
                current_line.push_str(word);
            }
        }
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("a quick brown fox jumps over", 12);
        assert!(lines.iter().all(|l| l.chars().count() <= 12));
        assert_eq!(lines.join(" "), "a quick brown fox jumps over");
    }

    #[test]
    fn test_wrap_text_keeps_paragraph_breaks() {
        let lines = wrap_text("**赤狐**\n*Vulpes vulpes*", 40);
        assert_eq!(lines, vec!["**赤狐**".to_string(), "*Vulpes vulpes*".to_string()]);
    }
}
