//! HTTP transport: route handlers and the server loop.

pub mod routes;
pub mod server;

pub use server::{ServerConfig, serve};
