pub mod autofill;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod fill;
pub mod generate;
pub mod llm;
pub mod page;
pub mod prompts;
pub mod settings;
pub mod state;
pub mod template;
pub mod wait;
