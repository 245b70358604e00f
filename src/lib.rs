// Library surface for the binary, headless/integration tests and reuse.
// Keep this free of terminal drawing; that lives in main.rs.
pub mod app;
pub mod app_dirs;
pub mod clock;
pub mod error;
pub mod history;
pub mod persist;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod stats;
pub mod stimulus;
pub mod sud;
pub mod timer;
