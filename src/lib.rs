pub mod app;
pub mod chart;
pub mod config;
pub mod errors;
pub mod format;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod progress;
pub mod quilt;
pub mod state;
pub mod stats;
pub mod storage;
pub mod ui;

pub use app::router;
pub use config::AppConfig;
pub use state::AppState;
pub use storage::{load_data, resolve_data_path};
