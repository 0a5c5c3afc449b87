// src/lib.rs

pub mod catalog;
pub mod config;
pub mod consensus;
pub mod error;
pub mod message;
pub mod provider;
pub mod router;
pub mod server;
pub mod store;
pub mod task;
pub mod title;
