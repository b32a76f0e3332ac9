//! Inbox Rules — rule-driven mailbox automation.

pub mod config;
pub mod error;
pub mod mail;
pub mod rules;
pub mod store;
