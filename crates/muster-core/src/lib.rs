pub mod barrier;
pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod io;
pub mod manifest;
pub mod paths;
pub mod pattern;
pub mod spawn;
pub mod store;
pub mod types;
pub mod unit;

pub use error::{MusterError, Result};
