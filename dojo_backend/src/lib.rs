pub mod api;
pub mod blog;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod error;
pub mod files;
pub mod forum;
pub mod identity;
pub mod node;
pub mod notifications;
pub mod profiles;
pub mod reactions;
pub mod seed;
pub mod telemetry;
pub mod utils;
