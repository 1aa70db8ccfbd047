//! Message-triggered translation relay for a Slack workspace.
//!
//! Listens for new channel messages, detects the source language with a
//! single probe translation call, fans out translations into the configured
//! target languages, and posts a formatted reply threaded to the original
//! message.

pub mod cache;
pub mod config;
pub mod deepl;
pub mod dispatch;
pub mod emoji;
pub mod i18n;
pub mod openai;
pub mod provider;
pub mod server;
pub mod slack;
