pub mod api;
pub mod bootstrap;
pub mod config;
pub mod database;
pub mod domain;
pub mod models;
pub mod services;

pub use config::Config;
pub use database::Database;
