// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::{apply_model_override, default_config_path, load_config, load_config_from};
pub use settings::{BudgetSettings, Config, ContextSettings, RefinementSettings};
