//! Error types for API calls.
//!
//! Every failure surfaced by [`Client::execute`](crate::Client::execute) is an
//! [`Error`]. Failures that come from the server side (a non-2xx status, a body
//! that could not be decoded, or an API error embedded in the body) are carried
//! by [`ErrorResponse`], which keeps the originating response and an inspectable
//! chain of causes.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use url::Url;

/// A boxed, thread-safe error used for transport, preflight and API error causes.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The main error type for API calls.
///
/// # Examples
///
/// ```no_run
/// use omniapi::{Client, Error, RequestMetadata};
/// use http::Method;
///
/// # async fn example(client: Client) {
/// let request = RequestMetadata::new(Method::GET, "/users/42");
/// match client.call::<_, serde_json::Value>(&request).await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::Transport { attempts, source }) => {
///         eprintln!("Gave up after {} attempts: {}", attempts, source);
///     }
///     Err(Error::Response(e)) => {
///         eprintln!("API error: {}", e);
///         if let Some(response) = e.response() {
///             eprintln!("  status: {}", response.status);
///             eprintln!("  body: {}", response.text());
///         }
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Invalid configuration was provided.
    ///
    /// This indicates a problem with how the client was configured, such as a
    /// missing base URL or an invalid header value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request's path template could not be rendered.
    ///
    /// Returned for unknown placeholders, unbalanced braces, control
    /// characters and malformed percent-escapes.
    #[error("Invalid path template: {0}")]
    Template(String),

    /// The request body could not be encoded as JSON.
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The preflight authentication hook rejected the request.
    ///
    /// Preflight failures abort the call before anything is sent and are never
    /// retried.
    #[error("Preflight authentication failed: {0}")]
    Preflight(#[source] BoxError),

    /// The transport failed to produce a response and retries were exhausted.
    ///
    /// # Fields
    ///
    /// * `attempts` - The number of send attempts made
    /// * `source` - The error reported by the transport on the last attempt
    #[error("Failed to do http request after {attempts} attempts: {source}")]
    Transport {
        /// The number of send attempts made
        attempts: usize,
        /// The last transport error
        #[source]
        source: BoxError,
    },

    /// The response arrived but its body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The server signalled a failure, or the body could not be decoded.
    #[error(transparent)]
    Response(#[from] ErrorResponse),
}

impl Error {
    /// Returns `true` if this error came from the transport layer.
    ///
    /// Only transport failures are retried by the client. By the time one is
    /// returned to the caller the retry budget is already spent, but callers
    /// with their own outer retry loop can use this to decide.
    ///
    /// # Examples
    ///
    /// ```
    /// use omniapi::Error;
    ///
    /// let err = Error::Transport {
    ///     attempts: 3,
    ///     source: "connection refused".into(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::Configuration("missing base URL".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } => true,
            Error::Configuration(_) => false,
            Error::InvalidUrl(_) => false,
            Error::Template(_) => false,
            Error::Encode(_) => false,
            Error::Preflight(_) => false,
            Error::Body(_) => false,
            Error::Response(_) => false,
        }
    }

    /// Returns the HTTP status code if this error carries a response.
    pub fn status(&self) -> Option<StatusCode> {
        self.as_response()?.response().map(|r| r.status)
    }

    /// Returns the raw response body if this error carries a response.
    pub fn raw_response(&self) -> Option<Cow<'_, str>> {
        self.as_response()?.response().map(ResponseInfo::text)
    }

    /// Returns the [`ErrorResponse`] if this is a server-side failure.
    pub fn as_response(&self) -> Option<&ErrorResponse> {
        match self {
            Error::Response(e) => Some(e),
            _ => None,
        }
    }

    /// Searches the cause chain for an error of type `E`.
    ///
    /// Joined API errors are searched member by member, so this finds a
    /// decoded error struct even when several error slots matched.
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Error::Response(e) => e.find(),
            other => find_in(other.source()),
        }
    }
}

/// A summary of the HTTP response an [`ErrorResponse`] originated from.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The final request URL.
    pub url: Url,
    /// The raw response body.
    pub raw_body: Bytes,
}

impl ResponseInfo {
    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_body)
    }

    /// Returns the status line, e.g. `404 Not Found`.
    pub fn status_line(&self) -> String {
        self.status.to_string()
    }
}

/// A structured error carrying a message, the originating response and an
/// optional parent error.
///
/// The parent is exposed through [`std::error::Error::source`], so the chain
/// reads transport error → decode error → decoded API error. Use
/// [`ErrorResponse::find`] to get at a decoded error struct directly.
#[derive(Debug)]
pub struct ErrorResponse {
    message: String,
    response: Option<Box<ResponseInfo>>,
    parent: Option<BoxError>,
}

impl ErrorResponse {
    /// Creates a new `ErrorResponse`.
    pub fn new(
        message: impl Into<String>,
        response: Option<ResponseInfo>,
        parent: Option<BoxError>,
    ) -> Self {
        Self {
            message: message.into(),
            response: response.map(Box::new),
            parent,
        }
    }

    /// The message without the parent's text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The response this error originated from, if any.
    pub fn response(&self) -> Option<&ResponseInfo> {
        self.response.as_deref()
    }

    /// The wrapped parent error, if any.
    pub fn parent(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.parent.as_deref()
    }

    /// Consumes the error and returns the parent.
    pub fn into_parent(self) -> Option<BoxError> {
        self.parent
    }

    /// Searches the parent chain for an error of type `E`.
    ///
    /// # Examples
    ///
    /// ```
    /// use omniapi::ErrorResponse;
    ///
    /// #[derive(Debug)]
    /// struct QuotaExceeded;
    ///
    /// impl std::fmt::Display for QuotaExceeded {
    ///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    ///         f.write_str("quota exceeded")
    ///     }
    /// }
    ///
    /// impl std::error::Error for QuotaExceeded {}
    ///
    /// let err = ErrorResponse::new("error in response", None, Some(Box::new(QuotaExceeded)));
    /// assert!(err.find::<QuotaExceeded>().is_some());
    /// assert_eq!(err.to_string(), "error in response: quota exceeded");
    /// ```
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        find_in(self.parent.as_deref().map(|e| e as &(dyn StdError + 'static)))
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            None => f.write_str(&self.message),
            Some(parent) => write!(f, "{}: {}", self.message, parent),
        }
    }
}

impl StdError for ErrorResponse {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.parent.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

fn find_in<'a, E: StdError + 'static>(
    mut current: Option<&'a (dyn StdError + 'static)>,
) -> Option<&'a E> {
    while let Some(err) = current {
        if let Some(found) = err.downcast_ref::<E>() {
            return Some(found);
        }
        if let Some(joined) = err.downcast_ref::<JoinedErrors>() {
            let found = joined
                .iter()
                .find_map(|member| find_in::<E>(Some(member as &(dyn StdError + 'static))));
            if found.is_some() {
                return found;
            }
        }
        current = err.source();
    }
    None
}

/// Several errors reported together, one per line.
#[derive(Debug)]
pub struct JoinedErrors(Vec<BoxError>);

impl JoinedErrors {
    /// Iterates over the joined errors in the order they were reported.
    pub fn iter(&self) -> impl Iterator<Item = &(dyn StdError + Send + Sync + 'static)> {
        self.0.iter().map(|e| e.as_ref())
    }

    /// The number of joined errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was joined.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the value and returns the joined errors.
    pub fn into_inner(self) -> Vec<BoxError> {
        self.0
    }
}

impl fmt::Display for JoinedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl StdError for JoinedErrors {}

/// Joins errors: nothing for an empty list, the error itself for a single one.
pub(crate) fn join(mut errors: Vec<BoxError>) -> Option<BoxError> {
    match errors.len() {
        0 => None,
        1 => errors.pop(),
        _ => Some(Box::new(JoinedErrors(errors))),
    }
}

/// Every decode target rejected the response body.
#[derive(Debug)]
pub struct DecodeError {
    failures: Vec<serde_json::Error>,
}

impl DecodeError {
    pub(crate) fn new(failures: Vec<serde_json::Error>) -> Self {
        Self { failures }
    }

    /// The individual decode failures, destination first.
    pub fn failures(&self) -> &[serde_json::Error] {
        &self.failures
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl StdError for DecodeError {}

/// A specialized `Result` type for API calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct ApiFailure(&'static str);

    impl fmt::Display for ApiFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl StdError for ApiFailure {}

    #[test]
    fn test_message_without_parent() {
        let err = ErrorResponse::new("404 Not Found", None, None);
        assert_eq!(err.to_string(), "404 Not Found");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_join_single_is_unwrapped() {
        let single: Vec<BoxError> = vec![Box::new(ApiFailure("a"))];
        let joined = join(single).unwrap();
        assert!(joined.downcast_ref::<ApiFailure>().is_some());
        assert!(join(Vec::new()).is_none());
    }

    #[test]
    fn test_find_through_joined_errors() {
        let failures: Vec<BoxError> = vec![
            Box::new(ApiFailure("first")),
            Box::new(std::io::Error::other("second")),
        ];
        let parent = join(failures);
        let err = ErrorResponse::new("400 Bad Request", None, parent);

        assert_eq!(err.to_string(), "400 Bad Request: first\nsecond");
        assert_eq!(err.find::<ApiFailure>(), Some(&ApiFailure("first")));
        assert!(err.find::<std::io::Error>().is_some());
        assert!(err.find::<DecodeError>().is_none());
    }

    #[test]
    fn test_error_accessors() {
        let info = ResponseInfo {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers: HeaderMap::new(),
            url: Url::parse("https://api.example.com/x").unwrap(),
            raw_body: Bytes::from_static(b"down"),
        };
        let err = Error::from(ErrorResponse::new(info.status_line(), Some(info), None));

        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(err.raw_response().as_deref(), Some("down"));
        assert_eq!(err.to_string(), "503 Service Unavailable");
        assert!(!err.is_retryable());
    }
}
