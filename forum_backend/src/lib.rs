pub mod accounts;
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod communities;
pub mod config;
pub mod database;
pub mod error;
pub mod node;
pub mod ranking;
pub mod requests;
pub mod seed;
pub mod telemetry;
pub mod threading;
pub mod utils;
pub mod votes;

pub use error::{ForumError, ForumResult};
