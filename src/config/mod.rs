pub mod loader;
pub mod params;
pub mod types;
pub mod validation;

pub use loader::{load_config, load_config_from_string};
pub use params::{extract_param, require_param};
pub use types::{Config, PipelineConfig, StageConfig};
pub use validation::validate_config;
