//! Per-request trace context
//!
//! A [`RequestContext`] identifies one logical request for telemetry and for
//! correlation on the server side. Its ids travel as HTTP headers on every
//! physical attempt and are echoed back in the telemetry hook events.
//!
//! # Examples
//!
//! ```rust
//! use open_responder::RequestContext;
//!
//! let ctx = RequestContext::new()
//!     .with_session_id("session-42")
//!     .with_user_id("user-7")
//!     .with_tag("checkout");
//!
//! assert_eq!(ctx.trace_id().len(), 32);
//! assert_eq!(ctx.span_id().len(), 16);
//! ```

use rand::Rng;
use std::collections::BTreeMap;

pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const PARENT_SPAN_ID_HEADER: &str = "x-parent-span-id";

/// Random lowercase hex id of `bytes` bytes
fn random_hex(bytes: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..bytes).map(|_| format!("{:02x}", rng.r#gen::<u8>())).collect()
}

/// Generate a W3C-style 128-bit trace id
pub fn generate_trace_id() -> String {
    random_hex(16)
}

/// Generate a W3C-style 64-bit span id
pub fn generate_span_id() -> String {
    random_hex(8)
}

/// Trace ids and caller metadata for one logical request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    session_id: Option<String>,
    user_id: Option<String>,
    trace_name: Option<String>,
    tags: Vec<String>,
    metadata: BTreeMap<String, String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// A fresh context with newly generated trace and span ids.
    pub fn new() -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
            session_id: None,
            user_id: None,
            trace_name: None,
            tags: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// A child context in the same trace, parented to this context's span.
    pub fn child(&self) -> Self {
        Self {
            span_id: generate_span_id(),
            parent_span_id: Some(self.span_id.clone()),
            ..self.clone()
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_parent_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(span_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_trace_name(mut self, name: impl Into<String>) -> Self {
        self.trace_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn parent_span_id(&self) -> Option<&str> {
        self.parent_span_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Trace name, or `default` when none was set.
    pub fn trace_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.trace_name.as_deref().unwrap_or(default)
    }

    /// Correlation headers sent with every attempt.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![(TRACE_ID_HEADER, self.trace_id.clone())];
        if let Some(session) = &self.session_id {
            headers.push((SESSION_ID_HEADER, session.clone()));
        }
        // The server's span for this request is parented to ours.
        headers.push((PARENT_SPAN_ID_HEADER, self.span_id.clone()));
        headers
    }

    /// Flat attribute view for exporters.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        let mut attrs = BTreeMap::new();
        attrs.insert("trace.id".to_string(), self.trace_id.clone());
        attrs.insert("span.id".to_string(), self.span_id.clone());
        if let Some(parent) = &self.parent_span_id {
            attrs.insert("span.parent_id".to_string(), parent.clone());
        }
        if let Some(session) = &self.session_id {
            attrs.insert("session.id".to_string(), session.clone());
        }
        if let Some(user) = &self.user_id {
            attrs.insert("user.id".to_string(), user.clone());
        }
        if let Some(name) = &self.trace_name {
            attrs.insert("span.name".to_string(), name.clone());
        }
        if !self.tags.is_empty() {
            attrs.insert("tags".to_string(), self.tags.join(","));
        }
        for (key, value) in &self.metadata {
            attrs.insert(key.clone(), value.clone());
        }
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_hex(s: &str) -> bool {
        s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    }

    #[test]
    fn test_generated_ids() {
        let trace = generate_trace_id();
        let span = generate_span_id();
        assert_eq!(trace.len(), 32);
        assert_eq!(span.len(), 16);
        assert!(is_hex(&trace));
        assert!(is_hex(&span));
        assert_ne!(generate_trace_id(), trace);
    }

    #[test]
    fn test_child_context_shares_trace() {
        let parent = RequestContext::new().with_session_id("s1");
        let child = parent.child();
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(child.span_id(), parent.span_id());
        assert_eq!(child.parent_span_id(), Some(parent.span_id()));
        assert_eq!(child.session_id(), Some("s1"));
    }

    #[test]
    fn test_headers() {
        let ctx = RequestContext::new().with_trace_id("t".repeat(32));
        let headers = ctx.headers();
        assert!(headers.contains(&(TRACE_ID_HEADER, "t".repeat(32))));
        assert!(!headers.iter().any(|(name, _)| *name == SESSION_ID_HEADER));

        let ctx = ctx.with_session_id("abc");
        assert!(ctx.headers().contains(&(SESSION_ID_HEADER, "abc".to_string())));
    }

    #[test]
    fn test_attributes() {
        let ctx = RequestContext::new()
            .with_user_id("u1")
            .with_trace_name("checkout")
            .with_tag("a")
            .with_tag("b")
            .with_metadata("region", "eu");

        let attrs = ctx.attributes();
        assert_eq!(attrs["user.id"], "u1");
        assert_eq!(attrs["span.name"], "checkout");
        assert_eq!(attrs["tags"], "a,b");
        assert_eq!(attrs["region"], "eu");
        assert_eq!(ctx.trace_name_or("default"), "checkout");
        assert_eq!(RequestContext::new().trace_name_or("default"), "default");
    }
}
