//! Chat UI components for the terminal interface

pub mod commands;
pub mod composer;
pub mod history;

pub use commands::{ParsedCommand, SlashCommand, get_help_text, parse_slash_command};
pub use composer::{Composer, ComposerResult};
pub use history::ChatHistory;
