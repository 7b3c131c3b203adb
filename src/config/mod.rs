// Configuration management module
// TOML settings stored in the application home directory

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    AgentsConfig, Config, ConfigError, DoctorsConfig, IndexConfig, LlmConfig, OllamaConfig,
    RetrievalConfig,
};
