//! Response wrapper that preserves both decoded data and raw response details.
//!
//! [`Client::execute`](crate::Client::execute) decodes into a caller-owned
//! destination and returns a `Response<()>` holding only the metadata;
//! [`Client::call`](crate::Client::call) returns the decoded value in
//! [`Response::data`].

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful HTTP response.
///
/// # Type Parameters
///
/// * `T` - The type of the decoded response data
///
/// # Examples
///
/// ```no_run
/// use omniapi::Client;
/// use serde::Deserialize;
///
/// #[derive(Default, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example(client: Client) -> Result<(), omniapi::Error> {
/// let response = client.get::<User>("/users/123").await?;
///
/// println!("User: {}", response.data.name);
/// println!("Request took {:?}", response.latency);
/// println!("Status: {}", response.status);
/// println!("Attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T = ()> {
    /// The decoded response data.
    pub data: T,

    /// The raw response body.
    pub raw_body: Bytes,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency of the call, including retries and backoff.
    pub latency: Duration,

    /// The number of send attempts made.
    ///
    /// This will be `1` for requests that succeeded on the first try.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: Bytes,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type using the provided function.
    ///
    /// # Examples
    ///
    /// ```
    /// # use omniapi::Response;
    /// # use bytes::Bytes;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     42,
    ///     Bytes::from_static(b"42"),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns the raw body as text, replacing invalid UTF-8.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_body)
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
