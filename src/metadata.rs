//! A ready-made request descriptor.
//!
//! [`RequestMetadata`] implements [`ApiRequest`] with every capability stored
//! as a plain field. It backs the client's `get`/`post`/... helpers and suits
//! one-off calls that don't warrant a dedicated request type.

use crate::{
    request::{ApiRequest, ErrorSlot, RequestBody},
    Error, Param, Result,
};
use bytes::Bytes;
use http::Method;
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

type SlotFactory = Arc<dyn Fn() -> Box<dyn ErrorSlot> + Send + Sync>;

#[derive(Debug, Clone)]
enum Body {
    Bytes(Bytes),
    Text(String),
    Json(serde_json::Value),
}

/// Metadata for an individual API call.
///
/// # Examples
///
/// ```
/// use omniapi::{Param, RequestMetadata};
/// use http::Method;
///
/// let page: Option<u32> = Some(2);
/// let request = RequestMetadata::new(Method::GET, "/repos/{owner}/issues")
///     .with_param(Param::path("owner", "rust-lang"))
///     .with_param(Param::query("page", &page).omit_empty())
///     .with_query_param("state", "open");
/// ```
#[derive(Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The path template (relative to the base URL).
    pub path: String,

    /// Path and query parameters.
    pub params: Vec<Param>,

    /// Whether to send the request without credentials.
    pub skip_auth: bool,

    body: Option<Body>,
    error_slots: Vec<SlotFactory>,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path template.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            skip_auth: false,
            body: None,
            error_slots: Vec::new(),
        }
    }

    /// Adds a path or query parameter.
    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Adds a query parameter.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key: String = key.into();
        let value: String = value.into();
        self.params.push(Param::query(key, &value));
        self
    }

    /// Adds multiple query parameters.
    pub fn with_query_params(
        mut self,
        params: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.params
            .extend(params.into_iter().map(|(key, value)| Param::query(key, &value)));
        self
    }

    /// Sets a JSON body.
    ///
    /// The value is captured immediately and encoded with the client's codec
    /// on every send.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented as JSON.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(Error::Encode)?;
        self.body = Some(Body::Json(value));
        Ok(self)
    }

    /// Sets a raw byte body.
    pub fn with_body_bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = Some(Body::Bytes(bytes.into()));
        self
    }

    /// Sets a text body.
    pub fn with_body_text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(Body::Text(text.into()));
        self
    }

    /// Declares an error struct the response body is also decoded into.
    pub fn with_error<E>(mut self) -> Self
    where
        E: DeserializeOwned + std::error::Error + Default + Send + Sync + 'static,
    {
        self.error_slots
            .push(Arc::new(|| Box::new(E::default()) as Box<dyn ErrorSlot>));
        self
    }

    /// Sends this request without credentials.
    pub fn without_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

impl ApiRequest for RequestMetadata {
    fn method(&self) -> Method {
        self.method.clone()
    }

    fn path_template(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.path)
    }

    fn params(&self) -> Vec<Param> {
        self.params.clone()
    }

    fn body(&self) -> Option<RequestBody<'_>> {
        self.body.as_ref().map(|body| match body {
            Body::Bytes(bytes) => RequestBody::Bytes(bytes.clone()),
            Body::Text(text) => RequestBody::Text(Cow::Borrowed(text)),
            Body::Json(value) => RequestBody::Json(value),
        })
    }

    fn error_slots(&self) -> Vec<Box<dyn ErrorSlot>> {
        self.error_slots.iter().map(|make| make()).collect()
    }

    fn skip_auth(&self) -> bool {
        self.skip_auth
    }
}

impl std::fmt::Debug for RequestMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMetadata")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("params", &self.params)
            .field("skip_auth", &self.skip_auth)
            .field("body", &self.body)
            .field("error_slots", &self.error_slots.len())
            .finish()
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}
