// Library surface for the terminal front-end and headless/integration tests.
pub mod app_dirs;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod history;
pub mod logging;
pub mod observable;
pub mod runtime;
pub mod sequence;
pub mod session;
pub mod speech;
pub mod stub;
pub mod ui;
pub mod util;
