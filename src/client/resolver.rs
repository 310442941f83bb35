//! Client identifier resolution.

use std::net::SocketAddr;
use tracing::trace;

/// IPv4-mapped IPv6 prefix stripped during normalization.
const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// Shortest address the mapped-prefix check applies to. Anything under
/// this length is passed through untouched.
const MAPPED_CHECK_LEN: usize = 15;

/// The request data the limiter reads, and nothing else.
///
/// Hosts implement this for their own request type, or hand over a
/// [`RequestMeta`] built from values they have already extracted.
pub trait ClientRequest {
    /// Transport-level remote address of the connection, if known.
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// Value of the forwarded-address header (e.g. `X-Forwarded-For`),
    /// if present.
    fn forwarded_for(&self) -> Option<&str>;
}

/// Plain carrier for pre-extracted request data.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Remote address of the transport connection.
    pub remote_addr: Option<SocketAddr>,
    /// Forwarded-address header value, verbatim.
    pub forwarded_for: Option<String>,
}

impl ClientRequest for RequestMeta {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    fn forwarded_for(&self) -> Option<&str> {
        self.forwarded_for.as_deref()
    }
}

/// Outcome of client resolution.
///
/// Resolution never fails the request path: an address that cannot be
/// determined becomes [`ResolvedClient::Unresolved`], which callers map
/// to the configured placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedClient {
    /// Address extracted from the request.
    Resolved(String),
    /// No usable address; the placeholder stands in.
    Unresolved,
}

impl ResolvedClient {
    /// The identifier to count under, substituting `placeholder` when
    /// unresolved.
    pub fn identifier(self, placeholder: &str) -> String {
        match self {
            ResolvedClient::Resolved(addr) => addr,
            ResolvedClient::Unresolved => placeholder.to_string(),
        }
    }
}

/// Resolve the client identifier for a request.
///
/// With `use_reverse_proxy` set, the first entry of the forwarded-address
/// header wins (the leftmost address is the original client, later entries
/// are intermediate proxies); otherwise the transport remote address is
/// used.
pub fn resolve<R: ClientRequest>(request: &R, use_reverse_proxy: bool) -> ResolvedClient {
    let candidate = if use_reverse_proxy {
        match request.forwarded_for() {
            Some(header) => {
                let first = header.split(',').next().unwrap_or(header);
                first.trim().to_string()
            }
            None => {
                trace!("No forwarded-address header present, using placeholder");
                return ResolvedClient::Unresolved;
            }
        }
    } else {
        match request.remote_addr() {
            Some(addr) => addr.ip().to_string(),
            None => {
                trace!("No transport remote address present, using placeholder");
                return ResolvedClient::Unresolved;
            }
        }
    };

    normalize(candidate)
}

/// Strip the IPv4-mapped prefix from addresses long enough to carry it.
///
/// A long address without the prefix (a full IPv6 address, or header
/// garbage) resolves to the placeholder rather than a raw string that no
/// other request would ever match.
fn normalize(candidate: String) -> ResolvedClient {
    if candidate.len() < MAPPED_CHECK_LEN {
        return ResolvedClient::Resolved(candidate);
    }

    match candidate.strip_prefix(IPV4_MAPPED_PREFIX) {
        Some(stripped) => ResolvedClient::Resolved(stripped.to_string()),
        None => {
            trace!(addr = %candidate, "Unrecognized address form, using placeholder");
            ResolvedClient::Unresolved
        }
    }
}
