//! Authentication strategies.
//!
//! A client is configured with exactly one [`Auth`]. Basic and API-key auth add
//! a header to each request, OAuth2 wraps the transport once at build time, and
//! preflight hands the built request to caller code for custom signing.

use crate::{oauth2::TokenSource, BoxError, Client, Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use http::header::AUTHORIZATION;
use http::{HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;

/// A custom signing step run on every authenticated request just before it is
/// sent.
///
/// The hook receives the fully built request and the client, and returns the
/// request to send, which may be a different one. Returning an error aborts
/// the call: nothing is sent and nothing is retried.
///
/// Closures with the matching signature implement this trait.
///
/// # Examples
///
/// ```
/// use omniapi::{Auth, BoxError, Client};
///
/// let auth = Auth::preflight(|mut request: reqwest::Request, _client: &Client| {
///     let signature = format!("v1:{}", request.url().path());
///     request.headers_mut().insert("x-signature", signature.parse()?);
///     Ok::<_, BoxError>(request)
/// });
/// ```
#[async_trait]
pub trait Preflight: Send + Sync {
    /// Prepares the request for sending.
    async fn prepare(
        &self,
        request: reqwest::Request,
        client: &Client,
    ) -> std::result::Result<reqwest::Request, BoxError>;
}

#[async_trait]
impl<F> Preflight for F
where
    F: Fn(reqwest::Request, &Client) -> std::result::Result<reqwest::Request, BoxError>
        + Send
        + Sync,
{
    async fn prepare(
        &self,
        request: reqwest::Request,
        client: &Client,
    ) -> std::result::Result<reqwest::Request, BoxError> {
        self(request, client)
    }
}

/// How requests are authenticated.
#[derive(Clone, Default)]
pub enum Auth {
    /// No credentials are attached.
    #[default]
    None,

    /// `Authorization: Basic` from a username and password.
    Basic {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },

    /// A fixed header carrying an API key.
    ApiKey {
        /// The header name.
        header: HeaderName,
        /// The key.
        value: HeaderValue,
    },

    /// Bearer tokens from a token source.
    ///
    /// The transport is wrapped in an
    /// [`OAuth2Transport`](crate::oauth2::OAuth2Transport) when the client is
    /// built, so nothing happens per request here.
    OAuth2(Arc<dyn TokenSource>),

    /// A custom signing hook.
    Preflight(Arc<dyn Preflight>),
}

impl Auth {
    /// Basic authentication.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// API-key authentication through `header`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn api_key(header: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let header = HeaderName::try_from(header.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let mut value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        value.set_sensitive(true);
        Ok(Auth::ApiKey { header, value })
    }

    /// OAuth2 bearer tokens from `source`.
    pub fn oauth2(source: impl TokenSource + 'static) -> Self {
        Auth::OAuth2(Arc::new(source))
    }

    /// A custom preflight hook.
    pub fn preflight(hook: impl Preflight + 'static) -> Self {
        Auth::Preflight(Arc::new(hook))
    }

    /// Attaches credentials to `request`.
    pub(crate) async fn authenticate(
        &self,
        mut request: reqwest::Request,
        client: &Client,
    ) -> Result<reqwest::Request> {
        match self {
            Auth::None | Auth::OAuth2(_) => Ok(request),
            Auth::Basic { username, password } => {
                request
                    .headers_mut()
                    .insert(AUTHORIZATION, basic_auth_value(username, password)?);
                Ok(request)
            }
            Auth::ApiKey { header, value } => {
                request.headers_mut().append(header.clone(), value.clone());
                Ok(request)
            }
            Auth::Preflight(hook) => hook
                .prepare(request, client)
                .await
                .map_err(Error::Preflight),
        }
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => f.write_str("None"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Auth::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .finish_non_exhaustive(),
            Auth::OAuth2(_) => f.write_str("OAuth2(..)"),
            Auth::Preflight(_) => f.write_str("Preflight(..)"),
        }
    }
}

/// Builds a sensitive `Basic` authorization value.
pub(crate) fn basic_auth_value(username: &str, password: &str) -> Result<HeaderValue> {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    let mut value = HeaderValue::try_from(format!("Basic {}", encoded))
        .map_err(|e| Error::Configuration(format!("Invalid basic auth credentials: {}", e)))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_value() {
        let value = basic_auth_value("aladdin", "opensesame").unwrap();
        assert_eq!(value, "Basic YWxhZGRpbjpvcGVuc2VzYW1l");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_api_key_rejects_bad_header() {
        assert!(matches!(
            Auth::api_key("bad header", "k"),
            Err(Error::Configuration(_))
        ));
        assert!(Auth::api_key("x-api-key", "k").is_ok());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", Auth::basic("user", "hunter2"));
        assert!(rendered.contains("user"));
        assert!(!rendered.contains("hunter2"));
    }
}
