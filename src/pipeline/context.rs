//! Framework-free request context.
//!
//! Validators never see the HTTP framework's types. The middleware
//! builds a [`RequestContext`] from the incoming request and the
//! pipeline reads headers, query parameters and form fields from it.

use std::collections::HashMap;
use std::net::IpAddr;

/// Identity claims attached by an upstream authenticator.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl CallerIdentity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Opaque view of an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub remote_addr: IpAddr,
    pub method: String,
    pub path: String,
    /// Header names are stored lowercase.
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub form: HashMap<String, String>,
    pub identity: Option<CallerIdentity>,
}

impl RequestContext {
    /// Create a context with no headers or parameters.
    pub fn new(remote_addr: IpAddr, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            remote_addr,
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
            query: HashMap::new(),
            form: HashMap::new(),
            identity: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_form(mut self, name: &str, value: &str) -> Self {
        self.form.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_identity(mut self, subject: &str, roles: &[&str]) -> Self {
        self.identity = Some(CallerIdentity {
            subject: subject.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        });
        self
    }
}
