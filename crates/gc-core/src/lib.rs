//! Core domain + application logic for the Guardcast group bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and MongoDB live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod moderation;
pub mod panel;
pub mod scheduler;
pub mod store;
pub mod wizard;

pub use errors::{Error, Result};
