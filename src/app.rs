//! Terminal application loop: draws the chat view, routes key input to
//! the composer, and pumps streamed chunks into the controller each frame.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::analysis::AnalysisService;
use crate::chat::{ChatController, SubmitError};
use crate::config::Config;
use crate::llm::GeminiClient;
use crate::ui::{ChatHistory, Composer, ComposerResult, SlashCommand, get_help_text};

pub struct App {
    controller: ChatController,
    composer: Composer,
    /// Data URL of a photo staged via /image, sent with the next message
    pending_image: Option<String>,
    status: Option<String>,
    running: bool,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let client = GeminiClient::new(config)?;
        let service = AnalysisService::new(Arc::new(client));

        Ok(Self {
            controller: ChatController::new(service),
            composer: Composer::new("Describe or photograph a species... (/help for commands)"),
            pending_image: None,
            status: None,
            running: true,
        })
    }

    /// Run the terminal loop until the user quits.
    pub async fn run(&mut self) -> Result<()> {
        enable_raw_mode().context("Failed to enable raw mode")?;
        let mut stdout = std::io::stdout();
        execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

        let result = self.event_loop(&mut terminal).await;

        disable_raw_mode().ok();
        execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
        terminal.show_cursor().ok();

        result
    }

    async fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    ) -> Result<()> {
        while self.running {
            // Fold any chunks that arrived since the last frame
            self.controller.pump();
            self.composer.set_focus(!self.controller.is_loading());

            terminal.draw(|frame| {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([
                        Constraint::Min(10),
                        Constraint::Length(1),
                        Constraint::Length(3),
                    ])
                    .split(frame.size());

                frame.render_widget(ChatHistory::new(self.controller.messages()), chunks[0]);

                let status = self.status.clone().unwrap_or_default();
                frame.render_widget(
                    Paragraph::new(Line::from(Span::styled(
                        status,
                        Style::default().fg(Color::Yellow),
                    ))),
                    chunks[1],
                );

                frame.render_widget(&self.composer, chunks[2]);
            })?;

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL)
                    {
                        self.running = false;
                        continue;
                    }
                    // Input is gated while a reply streams in
                    if self.controller.is_loading() {
                        continue;
                    }
                    let action = self.composer.handle_key(key);
                    self.handle_composer_result(action).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_composer_result(&mut self, result: ComposerResult) {
        match result {
            ComposerResult::Submitted(text) => {
                self.status = None;
                let image = self.pending_image.take();
                match self.controller.submit(&text, image).await {
                    Ok(()) => self.composer.set_pending_image(None),
                    Err(e @ SubmitError::ImageTooLarge { .. }) => {
                        self.status = Some(format!("⚠️ {e}"));
                        self.composer.set_pending_image(None);
                    }
                    Err(e @ SubmitError::Busy) => {
                        self.status = Some(format!("⚠️ {e}"));
                    }
                }
            }
            ComposerResult::Command(parsed) => match parsed.command {
                SlashCommand::Image => match parsed.argument() {
                    Some(path) => self.attach_image(path),
                    None => self.status = Some("Usage: /image <path>".to_string()),
                },
                SlashCommand::Clear => {
                    self.status = None;
                    self.pending_image = None;
                    self.composer.set_pending_image(None);
                    self.controller.reset();
                }
                SlashCommand::Help => {
                    self.status = Some(get_help_text().replace('\n', " "));
                }
                SlashCommand::Quit => self.running = false,
            },
            ComposerResult::None => {}
        }
    }

    /// Load a photo from disk and stage it for the next message.
    fn attach_image(&mut self, path: &str) {
        match std::fs::read(path) {
            Ok(bytes) => {
                let mime = mime_for_path(path);
                let file_name = Path::new(path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(path)
                    .to_string();
                let data_url = format!("data:{};base64,{}", mime, BASE64.encode(&bytes));

                self.composer.set_pending_image(Some(file_name));
                self.pending_image = Some(data_url);
                self.status = Some("📷 Photo attached; send a message to identify it.".to_string());
            }
            Err(e) => {
                self.status = Some(format!("⚠️ Could not read {path}: {e}"));
            }
        }
    }
}

/// Best-effort mime type from the file extension; JPEG when unknown.
fn mime_for_path(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}
