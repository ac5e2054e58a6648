use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read vs state-changing request classes. Only `Obtain` is cacheable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// A read-only RPC call (HTTP GET/HEAD in the entry adapter).
    Obtain,
    /// A state-changing RPC call (injection, signing, ...).
    Push,
}

/// An inbound request, immutable for the lifetime of handling.
#[derive(Debug, Clone)]
pub struct Request {
    /// Project identifier, opaque string.
    pub uuid: String,
    /// Node RPC path, may contain a query string.
    pub path: String,
    pub action: Action,
}

impl Request {
    /// Build a request, normalizing `path` to start with a leading `/`.
    ///
    /// `uuid` must be non-empty; this is a caller invariant, not validated here —
    /// the entry adapter rejects the request before a `Request` is ever constructed.
    pub fn new(uuid: impl Into<String>, path: impl Into<String>, action: Action) -> Self {
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self { uuid: uuid.into(), path, action }
    }
}

/// A registered tenant of the proxy, identified by a UUID.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub uuid: String,
    pub title: String,
    pub creation_date: DateTime<Utc>,
}

/// A single accepted request, recorded for billing/telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub project_uuid: String,
    pub path: String,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    pub fn for_request(request: &Request, timestamp: DateTime<Utc>) -> Self {
        Self {
            project_uuid: request.uuid.clone(),
            path: request.path.clone(),
            action: request.action,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_missing_leading_slash() {
        let r = Request::new("p1", "chains/main/blocks/head", Action::Obtain);
        assert_eq!(r.path, "/chains/main/blocks/head");
    }

    #[test]
    fn new_preserves_already_normalized_path() {
        let r = Request::new("p1", "/chains/main", Action::Obtain);
        assert_eq!(r.path, "/chains/main");
    }

    #[test]
    fn for_request_copies_uuid_path_and_action() {
        let r = Request::new("p1", "/a/b", Action::Push);
        let ts = Utc::now();
        let m = MetricRecord::for_request(&r, ts);
        assert_eq!(m.project_uuid, "p1");
        assert_eq!(m.path, "/a/b");
        assert_eq!(m.action, Action::Push);
        assert_eq!(m.timestamp, ts);
    }
}
