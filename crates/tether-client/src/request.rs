//! Operation descriptors and the tagged not-ready result.

use std::fmt;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical HTTP operation against the agents API.
///
/// `path` is relative to the configured base URL and always starts with `/`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// When false the response body is ignored instead of parsed.
    pub expects_json: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            expects_json: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::Post, path);
        request.body = Some(body);
        request
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn without_response_body(mut self) -> Self {
        self.expects_json = false;
        self
    }

    /// Path plus percent-encoded query string.
    #[must_use]
    pub fn path_and_query(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{query}", self.path)
    }
}

/// Result of an operation whose resource may legitimately not exist yet.
///
/// A 404/409 on a freshly launched agent's conversation is a routine early
/// state, not a failure, so it is carried as `NotReady` instead of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetch<T> {
    Ready(T),
    NotReady,
}

impl<T> Fetch<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Self::Ready(value) => Fetch::Ready(f(value)),
            Self::NotReady => Fetch::NotReady,
        }
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NotReady => None,
        }
    }

    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Treat not-ready as an error for endpoints whose resource must exist.
    pub fn require(self, path: &str) -> Result<T, ApiError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::NotReady => Err(ApiError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

impl<T: Default> Fetch<T> {
    pub fn unwrap_or_default(self) -> T {
        self.ready().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_percent_encoded() {
        let request = ApiRequest::get("/v0/agents")
            .with_query("limit", 20)
            .with_query("cursor", "bc 1&2");
        assert_eq!(request.path_and_query(), "/v0/agents?limit=20&cursor=bc%201%262");
    }

    #[test]
    fn not_ready_requires_into_not_found() {
        let fetch: Fetch<u8> = Fetch::NotReady;
        assert!(matches!(
            fetch.require("/v0/agents/x"),
            Err(ApiError::NotFound { path }) if path == "/v0/agents/x"
        ));
        assert_eq!(Fetch::Ready(3).require("/p").unwrap(), 3);
    }

    #[test]
    fn not_ready_defaults_to_empty() {
        let fetch: Fetch<Vec<u8>> = Fetch::NotReady;
        assert!(fetch.unwrap_or_default().is_empty());
    }
}
