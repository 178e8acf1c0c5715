//! Process runtime shared by the workspace binaries: layered configuration,
//! home directory resolution and logging initialisation.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{AppConfig, AppSection, CliArgs, ConfigProvider, LoggingConfig, Section};
pub use logging::init_logging_from_config;
pub use paths::{resolve_home_dir, HomeDirError};
