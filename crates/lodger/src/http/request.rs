//! Inbound request value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Headers, Method};

/// Body field consulted when method override is enabled.
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Header consulted when method override is enabled.
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Flat string parameters carried by the query string or body.
pub type Parameters = BTreeMap<String, String>;

/// Request as normalized by the host adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    method: Method,
    path: String,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    query: Parameters,
    #[serde(default)]
    body: Parameters,
    #[serde(default)]
    server: Parameters,
    #[serde(skip)]
    method_override: bool,
}

impl Request {
    /// Creates a request for `path` with no headers or parameters.
    ///
    /// The path is normalized to start with a single `/` and to carry no
    /// trailing slash, except for the root itself.
    #[must_use]
    pub fn new(method: Method, path: impl AsRef<str>) -> Self {
        Self {
            method,
            path: normalize_path(path.as_ref()),
            headers: Headers::new(),
            query: Parameters::new(),
            body: Parameters::new(),
            server: Parameters::new(),
            method_override: false,
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(path: impl AsRef<str>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Shorthand for a `POST` request.
    #[must_use]
    pub fn post(path: impl AsRef<str>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a query-string parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Adds a body parameter.
    #[must_use]
    pub fn with_body(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.body.insert(name.into(), value.into());
        self
    }

    /// Adds a server-environment entry.
    #[must_use]
    pub fn with_server(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.server.insert(name.into(), value.into());
        self
    }

    /// Allows `POST` requests to masquerade as another method.
    pub const fn enable_method_override(&mut self) {
        self.method_override = true;
    }

    /// Returns `true` once method override has been enabled.
    #[must_use]
    pub const fn method_override_enabled(&self) -> bool {
        self.method_override
    }

    /// Method used for routing.
    ///
    /// With method override enabled, a `POST` carrying a known method in
    /// the `_method` body field or the `X-HTTP-Method-Override` header
    /// reports that method instead. Unknown values are ignored.
    #[must_use]
    pub fn method(&self) -> Method {
        if !self.method_override || self.method != Method::Post {
            return self.method;
        }
        self.headers
            .get(METHOD_OVERRIDE_HEADER)
            .or_else(|| self.body.get(METHOD_OVERRIDE_FIELD).map(String::as_str))
            .and_then(|candidate| candidate.parse().ok())
            .unwrap_or(self.method)
    }

    /// Method the client actually sent.
    #[must_use]
    pub const fn real_method(&self) -> Method {
        self.method
    }

    /// Normalized request path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Replaces the request path.
    pub fn set_path(&mut self, path: impl AsRef<str>) {
        self.path = normalize_path(path.as_ref());
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub const fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Query-string parameters.
    #[must_use]
    pub const fn query(&self) -> &Parameters {
        &self.query
    }

    /// Body parameters.
    #[must_use]
    pub const fn body(&self) -> &Parameters {
        &self.body
    }

    /// Server-environment metadata supplied by the host.
    #[must_use]
    pub const fn server(&self) -> &Parameters {
        &self.server
    }

    /// Looks up an input value, preferring the body over the query string.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&str> {
        self.body
            .get(name)
            .or_else(|| self.query.get(name))
            .map(String::as_str)
    }

    /// Returns `true` when the client asked for a JSON response.
    #[must_use]
    pub fn wants_json(&self) -> bool {
        self.headers
            .get("accept")
            .is_some_and(|accept| accept.contains("application/json"))
    }
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::root("", "/")]
    #[case::slash("/", "/")]
    #[case::bare("posts", "/posts")]
    #[case::trailing("/posts/42/", "/posts/42")]
    fn paths_are_normalized(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Request::get(raw).path(), expected);
    }

    #[test]
    fn override_is_ignored_until_enabled() {
        let request = Request::post("/posts/1").with_body(METHOD_OVERRIDE_FIELD, "DELETE");
        assert_eq!(request.method(), Method::Post);
    }

    #[rstest]
    #[case::body_field(Request::post("/p").with_body("_method", "put"), Method::Put)]
    #[case::header(
        Request::post("/p").with_header("X-HTTP-Method-Override", "PATCH"),
        Method::Patch
    )]
    #[case::unknown_value(Request::post("/p").with_body("_method", "BREW"), Method::Post)]
    #[case::not_a_post(Request::get("/p").with_query("_method", "DELETE"), Method::Get)]
    fn override_applies_to_posts_only(#[case] mut request: Request, #[case] expected: Method) {
        request.enable_method_override();
        assert_eq!(request.method(), expected);
    }

    #[test]
    fn real_method_survives_override() {
        let mut request = Request::post("/p").with_body("_method", "DELETE");
        request.enable_method_override();
        assert_eq!(request.method(), Method::Delete);
        assert_eq!(request.real_method(), Method::Post);
    }

    #[test]
    fn body_input_wins_over_query() {
        let request = Request::post("/p")
            .with_query("q", "from-query")
            .with_body("q", "from-body")
            .with_query("only", "query");
        assert_eq!(request.input("q"), Some("from-body"));
        assert_eq!(request.input("only"), Some("query"));
        assert_eq!(request.input("missing"), None);
    }

    #[test]
    fn deserializes_with_optional_sections_missing() {
        let request: Request =
            serde_json::from_str(r#"{"method":"GET","path":"/hello"}"#).expect("request");
        assert_eq!(request.method(), Method::Get);
        assert!(request.headers().is_empty());
        assert!(!request.method_override_enabled());
    }
}
