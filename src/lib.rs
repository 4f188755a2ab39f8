pub mod agent;
pub mod config;
pub mod error;
pub mod model;
pub mod protocol;
pub mod server;
pub mod store;
