//! The HTTP transport the client sends requests through.
//!
//! The client never opens sockets itself. It hands each prepared request to a
//! [`Transport`], which is supplied at construction. `reqwest::Client`
//! implements the trait, and decorators such as
//! [`OAuth2Transport`](crate::oauth2::OAuth2Transport) wrap another transport.

use crate::{BoxError, Error};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use std::sync::Arc;

/// Sends a prepared request and returns the raw response.
///
/// An `Err` means no HTTP response was obtained (connection failure, timeout,
/// DNS or TLS error). These are the only failures the client retries; a
/// response with any status code is returned as `Ok`.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use omniapi::{BoxError, Transport};
///
/// struct Logged<T>(T);
///
/// #[async_trait]
/// impl<T: Transport> Transport for Logged<T> {
///     async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, BoxError> {
///         println!("{} {}", request.method(), request.url());
///         self.0.execute(request).await
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request.
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, BoxError>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, BoxError> {
        reqwest::Client::execute(self, request)
            .await
            .map_err(|e| Box::new(e) as BoxError)
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, BoxError> {
        (**self).execute(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, BoxError> {
        (**self).execute(request).await
    }
}

/// Builds a `reqwest::Client` that reads and writes `jar` on every redirect
/// hop.
///
/// A client that only sees the final response cannot capture cookies set by a
/// `3xx` on the way. Pair this with [`ClientBuilder::cookie_jar`] so both
/// sides share one jar, or use [`Client::builder_with_cookies`].
///
/// [`ClientBuilder::cookie_jar`]: crate::ClientBuilder::cookie_jar
/// [`Client::builder_with_cookies`]: crate::Client::builder_with_cookies
pub fn cookie_transport(jar: Arc<Jar>) -> crate::Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_provider(jar)
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
}
