//! Prompt generation for the extraction providers

pub mod prompt;

pub use prompt::PromptBuilder;
