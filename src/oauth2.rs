//! OAuth2 bearer-token support.
//!
//! [`OAuth2Transport`] decorates another [`Transport`] and sets
//! `Authorization: <type> <token>` on every request, fetching tokens from a
//! [`TokenSource`]. The client installs the decorator once when it is built
//! with [`Auth::OAuth2`](crate::Auth::OAuth2).

use crate::{auth::basic_auth_value, BoxError, Transport};
use aliri_clock::DurationSecs;
use aliri_tokens::backoff::ErrorBackoffConfig;
use aliri_tokens::jitter::RandomEarlyJitter;
use aliri_tokens::sources::AsyncTokenSource;
use aliri_tokens::{
    AccessToken, IdToken, TokenLifetimeConfig, TokenStatus, TokenWatcher, TokenWithLifetime,
};
use async_trait::async_trait;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use url::{form_urlencoded, Url};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TTL: Duration = Duration::from_secs(3600);
/// How long before expiry a token becomes stale and is refreshed.
const DEFAULT_REFRESH_OFFSET: Duration = Duration::from_secs(30);
/// Minimum stale window, and the base of the error backoff.
const DEFAULT_MIN_REFRESH_PERIOD: Duration = Duration::from_secs(10);
/// Upper bound of the random early refresh.
const DEFAULT_JITTER: Duration = Duration::from_secs(5);

/// Errors from the client-credentials flow.
///
/// Messages never contain the client secret or an access token.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The token request failed or the endpoint answered with an error status.
    #[error("{0}")]
    Http(String),

    /// The token endpoint returned an unparseable response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The token endpoint returned a `token_type` other than `Bearer`.
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),

    /// The client credentials cannot be sent.
    #[error("OAuth2 config error: {0}")]
    ConfigError(String),

    /// The cached token expired and the background refresh has not caught up.
    #[error("token unavailable: {0}")]
    Unavailable(String),
}

/// An OAuth2 access token.
#[derive(Clone)]
pub struct Token {
    access_token: String,
    token_type: String,
}

impl Token {
    /// A bearer token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
        }
    }

    /// Sets the token type used in the `Authorization` header.
    pub fn with_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// The raw access token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The token type, `Bearer` unless set otherwise.
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    fn authorization(&self) -> Result<HeaderValue, BoxError> {
        let mut value = HeaderValue::try_from(format!("{} {}", self.token_type, self.access_token))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Supplies access tokens, refreshing them as needed.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns a currently valid token.
    async fn token(&self) -> Result<Token, BoxError>;
}

#[async_trait]
impl<S: TokenSource + ?Sized> TokenSource for Arc<S> {
    async fn token(&self) -> Result<Token, BoxError> {
        (**self).token().await
    }
}

/// A token source that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(Token);

impl StaticToken {
    /// A static bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self(Token::bearer(access_token))
    }
}

impl From<Token> for StaticToken {
    fn from(token: Token) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Token, BoxError> {
        Ok(self.0.clone())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges client credentials for tokens. Driven by a [`TokenWatcher`].
#[derive(Clone)]
struct CredentialsExchange {
    token_url: Url,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    transport: Arc<dyn Transport>,
    default_ttl: Duration,
    refresh_offset: Duration,
    min_refresh_period: Duration,
}

impl CredentialsExchange {
    fn token_request(&self) -> Result<reqwest::Request, TokenError> {
        let form_body = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            form.append_pair("grant_type", "client_credentials");
            if let Some(scope) = &self.scope {
                form.append_pair("scope", scope);
            }
            form.finish()
        };

        let credentials = basic_auth_value(&self.client_id, &self.client_secret)
            .map_err(|_| TokenError::ConfigError("client id or secret is not a valid header".into()))?;

        let mut request = reqwest::Request::new(Method::POST, self.token_url.clone());
        let headers = request.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, credentials);
        *request.body_mut() = Some(reqwest::Body::from(form_body));
        Ok(request)
    }
}

#[async_trait]
impl AsyncTokenSource for CredentialsExchange {
    type Error = TokenError;

    async fn request_token(&mut self) -> Result<TokenWithLifetime, Self::Error> {
        let request = self.token_request()?;
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| TokenError::Http(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| TokenError::Http(format!("failed to read token response: {}", e)))?;
        if !status.is_success() {
            return Err(TokenError::Http(format!(
                "token endpoint returned {}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| TokenError::InvalidResponse(e.to_string()))?;
        if let Some(token_type) = &parsed.token_type {
            if !token_type.eq_ignore_ascii_case("bearer") {
                return Err(TokenError::UnsupportedTokenType(token_type.clone()));
            }
        }

        let lifetime_secs = parsed.expires_in.unwrap_or(self.default_ttl.as_secs());
        let (freshness, min_stale) =
            refresh_params(lifetime_secs, self.refresh_offset, self.min_refresh_period);

        tracing::debug!(
            token_url = %self.token_url,
            expires_in = lifetime_secs,
            "Fetched OAuth2 token"
        );

        Ok(TokenLifetimeConfig::new(freshness, min_stale).create_token(
            &AccessToken::new(parsed.access_token),
            None::<&IdToken>,
            DurationSecs(lifetime_secs),
        ))
    }
}

/// Returns `(freshness_period, min_staleness_period)` so that a token goes
/// stale `refresh_offset` before expiry, or halfway through its life when the
/// offset is longer than the lifetime. The stale time never passes expiry.
#[allow(clippy::cast_precision_loss)]
fn refresh_params(
    lifetime_secs: u64,
    refresh_offset: Duration,
    min_refresh_period: Duration,
) -> (f64, DurationSecs) {
    if lifetime_secs == 0 {
        return (0.0, DurationSecs(0));
    }

    let offset = refresh_offset.as_secs();
    let desired_delay = if offset < lifetime_secs {
        lifetime_secs - offset
    } else {
        lifetime_secs / 2
    };

    let freshness = desired_delay as f64 / lifetime_secs as f64;
    let min_stale = min_refresh_period.as_secs().min(desired_delay);
    (freshness, DurationSecs(min_stale))
}

/// The OAuth2 client-credentials grant (RFC 6749 §4.4).
///
/// Tokens are requested from the token endpoint with HTTP Basic client
/// authentication. The first call to [`TokenSource::token`] fetches a token and
/// starts an `aliri_tokens` watcher that refreshes it in the background before
/// it goes stale, with random early jitter and error backoff. Later calls read
/// the cached token without touching the network.
///
/// # Examples
///
/// ```no_run
/// use omniapi::oauth2::ClientCredentials;
/// use omniapi::{Auth, Client};
/// use url::Url;
///
/// # fn example() -> Result<(), omniapi::Error> {
/// let http = reqwest::Client::new();
/// let source = ClientCredentials::new(
///     Url::parse("https://auth.example.com/oauth/token")?,
///     "client-id",
///     "client-secret",
///     http.clone(),
/// )
/// .with_scopes(["read", "write"]);
///
/// let client = Client::builder(http)
///     .base_url("https://api.example.com")?
///     .auth(Auth::oauth2(source))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientCredentials {
    exchange: CredentialsExchange,
    jitter: Duration,
    watcher: OnceCell<TokenWatcher>,
}

impl ClientCredentials {
    /// Creates a source that requests tokens from `token_url` through `transport`.
    pub fn new(
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        transport: impl Transport + 'static,
    ) -> Self {
        Self {
            exchange: CredentialsExchange {
                token_url,
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                scope: None,
                transport: Arc::new(transport),
                default_ttl: DEFAULT_TTL,
                refresh_offset: DEFAULT_REFRESH_OFFSET,
                min_refresh_period: DEFAULT_MIN_REFRESH_PERIOD,
            },
            jitter: DEFAULT_JITTER,
            watcher: OnceCell::new(),
        }
    }

    /// Requests the given scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scopes: Vec<String> = scopes.into_iter().map(Into::into).collect();
        self.exchange.scope = (!scopes.is_empty()).then(|| scopes.join(" "));
        self
    }

    /// Sets the lifetime assumed when the endpoint omits `expires_in`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.exchange.default_ttl = ttl;
        self
    }

    /// Sets how long before expiry the token is refreshed.
    pub fn with_refresh_offset(mut self, offset: Duration) -> Self {
        self.exchange.refresh_offset = offset;
        self
    }

    /// Sets the maximum random early refresh.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    async fn watcher(&self) -> Result<&TokenWatcher, TokenError> {
        self.watcher
            .get_or_try_init(|| {
                let jitter = RandomEarlyJitter::new(DurationSecs(self.jitter.as_secs()));
                let min = self.exchange.min_refresh_period;
                let backoff = ErrorBackoffConfig::new(min, min * 30, 2);
                TokenWatcher::spawn_from_token_source(self.exchange.clone(), jitter, backoff)
            })
            .await
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.exchange.token_url.as_str())
            .field("client_id", &self.exchange.client_id)
            .field("scope", &self.exchange.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn token(&self) -> Result<Token, BoxError> {
        let watcher = self.watcher().await?;
        let borrowed = watcher.token();
        if matches!(borrowed.token_status(), TokenStatus::Expired) {
            return Err(TokenError::Unavailable("token expired, refresh pending".into()).into());
        }
        Ok(Token::bearer(borrowed.access_token().as_str()))
    }
}

/// A transport that adds an OAuth2 token to every request.
pub struct OAuth2Transport<T> {
    inner: T,
    source: Arc<dyn TokenSource>,
}

impl<T: Transport> OAuth2Transport<T> {
    /// Wraps `inner` with tokens from `source`.
    pub fn new(inner: T, source: Arc<dyn TokenSource>) -> Self {
        Self { inner, source }
    }
}

#[async_trait]
impl<T: Transport> Transport for OAuth2Transport<T> {
    async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response, BoxError> {
        let token = self.source.token().await?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, token.authorization()?);
        self.inner.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with the same status and body.
    struct Canned {
        status: u16,
        body: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for Canned {
        async fn execute(&self, _request: reqwest::Request) -> Result<reqwest::Response, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let response = http::Response::builder()
                .status(self.status)
                .body(self.body)?;
            Ok(reqwest::Response::from(response))
        }
    }

    fn credentials(status: u16, body: &'static str) -> (ClientCredentials, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = Canned {
            status,
            body,
            calls: calls.clone(),
        };
        let source = ClientCredentials::new(
            Url::parse("https://auth.example.com/token").unwrap(),
            "id",
            "secret",
            transport,
        );
        (source, calls)
    }

    #[test]
    fn test_authorization_header() {
        let value = Token::bearer("abc").authorization().unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());

        let value = Token::bearer("abc").with_type("MAC").authorization().unwrap();
        assert_eq!(value, "MAC abc");
    }

    #[test]
    fn test_debug_hides_token() {
        let rendered = format!("{:?}", Token::bearer("very-secret"));
        assert!(!rendered.contains("very-secret"));
    }

    #[test]
    fn test_refresh_params() {
        let min = Duration::from_secs(10);

        let (freshness, min_stale) = refresh_params(3600, Duration::from_secs(30), min);
        assert!((freshness - 3570.0 / 3600.0).abs() < f64::EPSILON);
        assert_eq!(min_stale.0, 10);

        // Offset longer than the lifetime: stale halfway through.
        let (freshness, min_stale) = refresh_params(20, Duration::from_secs(30), min);
        assert!((freshness - 0.5).abs() < f64::EPSILON);
        assert_eq!(min_stale.0, 10);

        let (freshness, min_stale) = refresh_params(0, Duration::from_secs(30), min);
        assert_eq!(freshness, 0.0);
        assert_eq!(min_stale.0, 0);
    }

    #[test]
    fn test_token_request_shape() {
        let (source, _) = credentials(200, "{}");
        let source = source.with_scopes(["read", "write"]);
        let request = source.exchange.token_request().unwrap();

        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.headers()[AUTHORIZATION], "Basic aWQ6c2VjcmV0");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"grant_type=client_credentials&scope=read+write");
    }

    #[tokio::test]
    async fn test_static_token() {
        let token = StaticToken::new("t").token().await.unwrap();
        assert_eq!(token.access_token(), "t");
    }

    #[tokio::test]
    async fn test_client_credentials_fetches_once() {
        let (source, calls) = credentials(
            200,
            r#"{"access_token": "abc", "token_type": "bearer", "expires_in": 3600}"#,
        );

        assert_eq!(source.token().await.unwrap().access_token(), "abc");
        assert_eq!(source.token().await.unwrap().access_token(), "abc");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_credentials_rejects_non_bearer() {
        let (source, _) = credentials(200, r#"{"access_token": "abc", "token_type": "mac"}"#);
        let err = source.token().await.unwrap_err();
        assert!(err.to_string().contains("unsupported token type: mac"));
    }

    #[tokio::test]
    async fn test_client_credentials_error_status() {
        let (source, calls) = credentials(401, r#"{"error": "invalid_client"}"#);
        let err = source.token().await.unwrap_err();
        assert!(err.to_string().contains("401 Unauthorized"));
        assert!(err.to_string().contains("invalid_client"));

        // A failed first fetch is retried on the next call.
        assert!(source.token().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
