//! The request descriptor protocol.
//!
//! Per-API glue describes each call by implementing [`ApiRequest`]. Only the
//! method and path template are required; body, parameters, error slots and
//! the auth opt-out have defaults.

use crate::{codec::JsonCodec, BoxError, Param};
use bytes::Bytes;
use http::Method;
use serde::{de::DeserializeOwned, Serialize};
use std::borrow::Cow;

/// A description of one logical API call.
///
/// # Examples
///
/// ```
/// use omniapi::{ApiRequest, Param, RequestBody};
/// use http::Method;
/// use serde::Serialize;
/// use std::borrow::Cow;
///
/// #[derive(Serialize)]
/// struct Rename {
///     name: String,
/// }
///
/// struct RenameProject {
///     project_id: u64,
///     notify: bool,
///     body: Rename,
/// }
///
/// impl ApiRequest for RenameProject {
///     fn method(&self) -> Method {
///         Method::PATCH
///     }
///
///     fn path_template(&self) -> Cow<'_, str> {
///         "/projects/{project_id}".into()
///     }
///
///     fn params(&self) -> Vec<Param> {
///         vec![
///             Param::path("project_id", &self.project_id),
///             Param::query("notify", &self.notify).omit_empty(),
///         ]
///     }
///
///     fn body(&self) -> Option<RequestBody<'_>> {
///         Some(RequestBody::json(&self.body))
///     }
/// }
/// ```
pub trait ApiRequest: Send + Sync {
    /// The HTTP method.
    fn method(&self) -> Method;

    /// The path relative to the base URL, with `{name}` placeholders and an
    /// optional embedded query string.
    fn path_template(&self) -> Cow<'_, str>;

    /// Path and query parameters.
    fn params(&self) -> Vec<Param> {
        Vec::new()
    }

    /// The request body. `None` sends no body.
    ///
    /// Called once per send attempt, so a streaming body is rebuilt on retry.
    fn body(&self) -> Option<RequestBody<'_>> {
        None
    }

    /// Zero-valued error structs the response body is also decoded into.
    fn error_slots(&self) -> Vec<Box<dyn ErrorSlot>> {
        Vec::new()
    }

    /// Returns `true` to send this request without credentials.
    fn skip_auth(&self) -> bool {
        false
    }
}

impl<R: ApiRequest + ?Sized> ApiRequest for &R {
    fn method(&self) -> Method {
        (**self).method()
    }

    fn path_template(&self) -> Cow<'_, str> {
        (**self).path_template()
    }

    fn params(&self) -> Vec<Param> {
        (**self).params()
    }

    fn body(&self) -> Option<RequestBody<'_>> {
        (**self).body()
    }

    fn error_slots(&self) -> Vec<Box<dyn ErrorSlot>> {
        (**self).error_slots()
    }

    fn skip_auth(&self) -> bool {
        (**self).skip_auth()
    }
}

/// A value that can be encoded as a JSON request body.
///
/// Blanket-implemented for every `Serialize` type; it exists so that
/// [`RequestBody`] can hold any serializable value behind a reference.
pub trait JsonBody: Send + Sync {
    /// Converts the value to a JSON tree.
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<T: Serialize + Send + Sync + ?Sized> JsonBody for T {
    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// The body of a request, by native shape.
pub enum RequestBody<'a> {
    /// A body passed through to the transport unchanged.
    Stream(reqwest::Body),
    /// Raw bytes, sent with a fixed length.
    Bytes(Bytes),
    /// Text, sent with a fixed length.
    Text(Cow<'a, str>),
    /// A value encoded with the client's JSON codec.
    Json(&'a dyn JsonBody),
}

impl<'a> RequestBody<'a> {
    /// A body JSON-encoded from `value`.
    pub fn json<T: Serialize + Send + Sync>(value: &'a T) -> Self {
        RequestBody::Json(value)
    }

    /// A fixed-length text body.
    pub fn text(text: impl Into<Cow<'a, str>>) -> Self {
        RequestBody::Text(text.into())
    }

    /// A fixed-length byte body.
    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        RequestBody::Bytes(bytes.into())
    }

    /// A body handed to the transport as-is.
    pub fn stream(body: impl Into<reqwest::Body>) -> Self {
        RequestBody::Stream(body.into())
    }
}

impl std::fmt::Debug for RequestBody<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Stream(_) => f.write_str("Stream(..)"),
            RequestBody::Bytes(b) => f.debug_tuple("Bytes").field(b).finish(),
            RequestBody::Text(t) => f.debug_tuple("Text").field(t).finish(),
            RequestBody::Json(_) => f.write_str("Json(..)"),
        }
    }
}

/// A destination for API errors embedded in a response body.
///
/// Blanket-implemented for any `DeserializeOwned` type that is also an
/// [`std::error::Error`]; its `Display` output is the rendered message. A slot
/// whose message renders empty is treated as "no error".
pub trait ErrorSlot: Send + Sync {
    /// Decodes `raw` into this slot, replacing its contents.
    fn decode(&mut self, codec: &JsonCodec, raw: &[u8]) -> serde_json::Result<()>;

    /// The rendered message; empty means no error was reported.
    fn message(&self) -> String;

    /// Converts the slot into an error for the cause chain.
    fn into_error(self: Box<Self>) -> BoxError;
}

impl<E> ErrorSlot for E
where
    E: DeserializeOwned + std::error::Error + Send + Sync + 'static,
{
    fn decode(&mut self, codec: &JsonCodec, raw: &[u8]) -> serde_json::Result<()> {
        *self = codec.decode(raw)?;
        Ok(())
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn into_error(self: Box<Self>) -> BoxError {
        self
    }
}

/// A boxed zero-valued error slot, for [`ApiRequest::error_slots`].
pub fn error_slot<E>() -> Box<dyn ErrorSlot>
where
    E: ErrorSlot + Default + 'static,
{
    Box::new(E::default())
}
