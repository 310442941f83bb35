//! Client identification.
//!
//! Derives the normalized identifier the limiter counts requests under,
//! from either the transport connection or a reverse-proxy
//! forwarded-address header.

mod resolver;

pub use resolver::{resolve, ClientRequest, RequestMeta, ResolvedClient};
