//! Turnstile - Per-Client IP Rate Limiting
//!
//! This crate implements request-rate admission control for an HTTP-serving
//! process. It tracks how many requests each client (identified by IP
//! address) has made within a rolling timeframe and reports whether a given
//! client should be denied service for exceeding a configured threshold.
//! The host server owns the sockets and the responses; this crate only
//! counts and decides.

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use client::{ClientRequest, RequestMeta};
pub use config::LimiterConfig;
pub use error::{Result, TurnstileError};
pub use ratelimit::RateLimiter;
