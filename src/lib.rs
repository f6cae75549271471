pub mod aggregate;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod report;
pub mod status;
pub mod terms;
pub mod tracker;
pub mod watch;
