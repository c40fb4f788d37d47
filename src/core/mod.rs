pub mod types;
pub mod index;
pub mod config;
pub mod error;
pub mod stats;
