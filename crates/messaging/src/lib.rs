//! HTTP adapter for the real-time messaging provider.
//!
//! Speaks the Conversations REST dialect: form-encoded writes, JSON
//! responses, basic auth with the account id and auth token.

pub mod client;
mod failure;

pub use client::HttpMessagingProvider;
