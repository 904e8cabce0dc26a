//! Turnstile - per-client admission gate for an LLM completion endpoint
//!
//! Every request to the completion route is first evaluated against counters
//! held in a shared store (Redis in production): a ban flag, a per-UTC-day
//! counter and a short rolling window. Clients that burst past the window cap
//! are banned for a week. Store failures fail closed.

pub mod admission;
pub mod completion;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
