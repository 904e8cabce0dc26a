//! HTTP surface: admission middleware, routes and server.

mod client_ip;
mod middleware;
mod routes;
mod server;

pub use client_ip::ClientResolver;
pub use middleware::{admission_middleware, UNKNOWN_CLIENT};
pub use routes::{router, AppState, CompletionRequest, CompletionResponse};
pub use server::HttpServer;
