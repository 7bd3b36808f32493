// Library root: exposes internals for integration tests.
// The binary entry point is src/main.rs.

pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod health;
pub mod http;
pub mod llm;
pub mod logger;
