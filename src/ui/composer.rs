use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::ui::commands::{ParsedCommand, parse_slash_command};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// Single-line input box with cursor editing and a pending-photo badge.
#[derive(Clone)]
pub struct Composer {
    content: String,
    cursor_position: usize,
    placeholder: String,
    has_focus: bool,
    /// File name of the photo attached via /image, shown until submit
    pending_image: Option<String>,
}

impl Composer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            cursor_position: 0,
            placeholder: placeholder.into(),
            has_focus: true,
            pending_image: None,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if !key.modifiers.contains(KeyModifiers::SHIFT)
                    && !self.content.trim().is_empty()
                {
                    let content = std::mem::take(&mut self.content);
                    self.cursor_position = 0;
                    if let Some(command) = parse_slash_command(&content) {
                        return ComposerResult::Command(command);
                    }
                    return ComposerResult::Submitted(content);
                }
            }
            KeyCode::Char(c) => {
                self.content.insert(self.byte_cursor(), c);
                self.cursor_position += 1;
            }
            KeyCode::Backspace => {
                if self.cursor_position > 0 {
                    self.cursor_position -= 1;
                    self.content.remove(self.byte_cursor());
                }
            }
            KeyCode::Left => {
                self.cursor_position = self.cursor_position.saturating_sub(1);
            }
            KeyCode::Right => {
                let chars = self.content.chars().count();
                if self.cursor_position < chars {
                    self.cursor_position += 1;
                }
            }
            KeyCode::Home => self.cursor_position = 0,
            KeyCode::End => self.cursor_position = self.content.chars().count(),
            _ => {}
        }

        ComposerResult::None
    }

    /// Byte offset of the char-indexed cursor
    fn byte_cursor(&self) -> usize {
        self.content
            .char_indices()
            .nth(self.cursor_position)
            .map(|(i, _)| i)
            .unwrap_or(self.content.len())
    }

    pub fn set_focus(&mut self, has_focus: bool) {
        self.has_focus = has_focus;
    }

    /// Record a photo staged for the next submission
    pub fn set_pending_image(&mut self, name: Option<String>) {
        self.pending_image = name;
    }
}

impl Widget for &Composer {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = match &self.pending_image {
            Some(name) => format!("🔍 Message (📷 {})", name),
            None => "🔍 Message".to_string(),
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(if self.has_focus {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::Gray)
            });

        let inner_area = block.inner(area);
        block.render(area, buf);

        if self.content.is_empty() {
            let placeholder_line = Line::from(vec![Span::styled(
                self.placeholder.clone(),
                Style::default().fg(Color::DarkGray),
            )]);
            buf.set_line(inner_area.x, inner_area.y, &placeholder_line, inner_area.width);
        } else {
            let mut content: String = self.content.clone();
            if self.has_focus {
                let at = self
                    .content
                    .char_indices()
                    .nth(self.cursor_position)
                    .map(|(i, _)| i)
                    .unwrap_or(content.len());
                content.insert(at, '▌');
            }
            let line = Line::from(vec![Span::raw(content)]);
            buf.set_line(inner_area.x, inner_area.y, &line, inner_area.width);
        }
    }
}
