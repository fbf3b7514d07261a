//! Client state
//!
//! - `app_state` - capture lifecycle and its manager
//! - `status` - user-visible status line and connection indicator
//! - `config` - settings file and live configuration
//! - `error` - state errors

mod app_state;
pub mod config;
mod error;
pub mod status;

pub use app_state::{CaptureState, StateManager};
pub use config::{ClientConfig, ConfigError, ConfigManager, GlobalConfig, Persona};
pub use error::{StateError, StateResult};
pub use status::{Indicator, StatusBoard, StatusSnapshot};
