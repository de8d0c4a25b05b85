//! Core domain + application logic for the member export bot.
//!
//! This crate is intentionally framework-agnostic. Telegram (teloxide) and the TDLib gateway
//! live behind ports (traits) implemented in adapter crates.

pub mod chat;
pub mod config;
pub mod domain;
pub mod enumerate;
pub mod errors;
pub mod export;
pub mod exporter;
pub mod gate;
pub mod logging;
pub mod members;
pub mod messaging;
pub mod security;
pub mod supervisor;

pub use errors::{Error, Result};
