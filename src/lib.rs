pub mod accumulator;
pub mod actions;
pub mod constants;
pub mod context;
pub mod db;
pub mod gateway;
pub mod health;
pub mod json_shape;
pub mod logging;
pub mod main_helper;
pub mod models;
pub mod prompt;
pub mod redaction_layer;
pub mod session;
pub mod sse;
pub mod store;
pub mod str_utils;
pub mod streaming;
pub mod trace_layer;
pub mod transport;
pub mod types;

pub use types::*;

pub use main_helper::{AppState, Args};
