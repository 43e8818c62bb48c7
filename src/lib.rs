#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod bot;
pub mod config;
pub mod error;
pub mod event;
pub(crate) mod serde_helpers;
pub mod store;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Environment variable consulted for the configuration file path.
pub const CONFIG_PATH_VAR: &str = "WSBOT_CONFIG";
