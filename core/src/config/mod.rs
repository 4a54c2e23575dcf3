mod load;
mod types;

pub use load::{apply_env_overrides, get_data_dir, load_default, load_path};
pub use types::{AppConfig, LoggingConfig, ProcessConfig, RenderConfig};
