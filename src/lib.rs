//! Leadbot: a Telegram lead-magnet assistant.

pub mod auth;
pub mod bot;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod contacts;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod knowledge;
pub mod llm;
pub mod store;
