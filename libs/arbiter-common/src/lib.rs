//! Types, configuration and persistence shared by the Arbiter engine, API and CLI.

pub mod config;
pub mod redis;
pub mod store;
pub mod types;
