pub mod config;
pub mod crypto;
pub mod error;
pub mod job;
pub mod manager;
pub mod requirements;
pub mod scheduler;
pub mod store;
