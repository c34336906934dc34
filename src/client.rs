//! API client with transport retries and unified error handling.
//!
//! The [`Client`] type is the main entry point for making API calls.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::{
    auth::{Auth, Preflight},
    codec::JsonCodec,
    compose::{compose, standard_headers, Outbound},
    error::ResponseInfo,
    metadata::RequestMetadata,
    oauth2::{OAuth2Transport, TokenSource},
    request::ApiRequest,
    resolve::resolve,
    retry::RetryPolicy,
    transport::cookie_transport,
    Error, Response, Result, Transport,
};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, Method};
use reqwest::cookie::{CookieStore, Jar};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{field, Instrument, Span};
use url::Url;

/// The media type sent in `Content-Type` and `Accept` unless configured otherwise.
pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// The charset sent in `Content-Type` unless configured otherwise.
pub const DEFAULT_CHARSET: &str = "utf-8";

/// The `User-Agent` sent unless configured otherwise.
pub const DEFAULT_USER_AGENT: &str = concat!("omniapi/", env!("CARGO_PKG_VERSION"));

/// An API client that builds, authenticates, sends and decodes requests.
///
/// The client is cheap to clone and designed to be reused: clones share the
/// transport, the JSON codec and the cookie jar.
///
/// # Examples
///
/// ```no_run
/// use omniapi::{Auth, Client, RequestMetadata};
/// use http::Method;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize)]
/// struct CreateUser {
///     name: String,
/// }
///
/// #[derive(Default, Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), omniapi::Error> {
/// let client = Client::builder(reqwest::Client::new())
///     .base_url("https://api.example.com/v1")?
///     .auth(Auth::basic("user", "secret"))
///     .max_retries(3)
///     .build()?;
///
/// // GET request
/// let user = client.get::<User>("/users/123").await?;
/// println!("User: {}", user.data.name);
///
/// // POST request
/// let new_user = CreateUser { name: "Alice".to_string() };
/// let created = client.post::<_, User>("/users", &new_user).await?;
/// println!("Created user with ID: {}", created.data.id);
///
/// // Decoding into an existing value
/// let mut user = User::default();
/// let request = RequestMetadata::new(Method::GET, "/users/me");
/// client.execute(&request, Some(&mut user)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// The transport requests go through, wrapped for OAuth2 if configured.
    transport: Arc<dyn Transport>,
    /// The transport as supplied, used by requests that skip auth.
    base_transport: Arc<dyn Transport>,
    outbound: Outbound,
    auth: Auth,
    retry: RetryPolicy,
    debug: bool,
    disallow_unknown_fields: bool,
    codec: OnceLock<JsonCodec>,
    use_cookies: bool,
    cookie_jar: OnceLock<Arc<Jar>>,
    user_agent: String,
    media_type: String,
    charset: String,
}

impl Client {
    /// Creates a new `ClientBuilder` sending through `transport`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use omniapi::Client;
    ///
    /// # fn example() -> Result<(), omniapi::Error> {
    /// let client = Client::builder(reqwest::Client::new())
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(transport: impl Transport + 'static) -> ClientBuilder {
        ClientBuilder::new(transport)
    }

    /// Creates a `ClientBuilder` whose transport and client share one cookie
    /// jar, so cookies set on redirect hops are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying `reqwest::Client` cannot be built.
    pub fn builder_with_cookies() -> Result<ClientBuilder> {
        let jar = Arc::new(Jar::default());
        let transport = cookie_transport(jar.clone())?;
        Ok(ClientBuilder::new(transport).cookie_jar(jar))
    }

    /// Returns a builder preloaded with this client's configuration.
    ///
    /// The new client gets a fresh JSON codec. The cookie jar is carried over
    /// unless cookies are disabled on the builder.
    pub fn to_builder(&self) -> ClientBuilder {
        let inner = &self.inner;
        ClientBuilder {
            transport: inner.base_transport.clone(),
            base_url: Some(inner.outbound.base_url.clone()),
            user_agent: inner.user_agent.clone(),
            media_type: inner.media_type.clone(),
            charset: inner.charset.clone(),
            auth: inner.auth.clone(),
            retry: inner.retry,
            timeout: inner.outbound.timeout,
            debug: inner.debug,
            use_cookies: inner.use_cookies,
            cookie_jar: inner.cookie_jar.get().cloned(),
            disallow_unknown_fields: inner.disallow_unknown_fields,
        }
    }

    /// The base URL every request path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.outbound.base_url
    }

    /// The JSON codec, created on first use.
    pub fn codec(&self) -> &JsonCodec {
        self.inner
            .codec
            .get_or_init(|| JsonCodec::new(self.inner.disallow_unknown_fields))
    }

    /// The shared cookie jar, created on first use. `None` if cookies are off.
    pub fn cookie_jar(&self) -> Option<&Arc<Jar>> {
        if !self.inner.use_cookies {
            return None;
        }
        Some(self.inner.cookie_jar.get_or_init(Default::default))
    }

    /// Executes a request, decoding a successful body into `destination`.
    ///
    /// This is the core entry point; the other request methods build on it.
    /// The request is built, authenticated and sent; if the transport fails
    /// to produce a response the whole sequence is repeated up to the
    /// configured number of retries. The body of a 2xx response is decoded into
    /// `destination` (when given) and into the request's error slots.
    ///
    /// Dropping the returned future cancels the call, including any pending
    /// retry.
    ///
    /// # Errors
    ///
    /// * [`Error::Template`], [`Error::Encode`] - the request could not be built
    /// * [`Error::Preflight`] - the preflight hook rejected the request
    /// * [`Error::Transport`] - no response after all attempts
    /// * [`Error::Response`] - a non-2xx status, an undecodable body, or an
    ///   API error reported in the body
    pub async fn execute<R, T>(&self, request: &R, destination: Option<&mut T>) -> Result<Response>
    where
        R: ApiRequest + ?Sized,
        T: DeserializeOwned,
    {
        let span = tracing::info_span!(
            "http request",
            http.method = %request.method(),
            http.url = field::Empty,
            http.status_code = field::Empty,
            error = field::Empty,
        );

        let result = self
            .execute_in_span(request, destination, &span)
            .instrument(span.clone())
            .await;
        if let Err(e) = &result {
            span.record("error", field::display(e));
        }
        result
    }

    /// Executes a request without decoding the response body.
    pub async fn send<R>(&self, request: &R) -> Result<Response>
    where
        R: ApiRequest + ?Sized,
    {
        self.execute::<R, serde::de::IgnoredAny>(request, None).await
    }

    /// Executes a request and decodes the body into a fresh `T`.
    ///
    /// Decoding starts from `T::default()`, which is returned unchanged when
    /// the body is empty.
    pub async fn call<R, T>(&self, request: &R) -> Result<Response<T>>
    where
        R: ApiRequest + ?Sized,
        T: DeserializeOwned + Default,
    {
        let mut data = T::default();
        let response = self.execute(request, Some(&mut data)).await?;
        Ok(response.map(|()| data))
    }

    async fn execute_in_span<R, T>(
        &self,
        request: &R,
        destination: Option<&mut T>,
        span: &Span,
    ) -> Result<Response>
    where
        R: ApiRequest + ?Sized,
        T: DeserializeOwned,
    {
        let start_time = Instant::now();
        let mut attempt = 0;

        let response = loop {
            let prepared = self.prepare(request).await?;
            let method = prepared.method().clone();
            let url = prepared.url().clone();
            span.record("http.url", field::display(&url));

            if self.inner.debug {
                dump_request(&prepared, attempt);
            }

            match self.transport_for(request).execute(prepared).await {
                Ok(response) => break response,
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        attempt = attempt,
                        method = %method,
                        url = %url,
                        "Request failed"
                    );

                    let Some(delay) = self.inner.retry.delay_for_attempt(attempt) else {
                        return Err(Error::Transport {
                            attempts: attempt + 1,
                            source: e,
                        });
                    };

                    tracing::debug!(
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt,
                        "Retrying request after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        span.record("http.status_code", status.as_u16());
        self.store_cookies(&headers, &url);

        let raw_body = response.bytes().await.map_err(Error::Body)?;
        let latency = start_time.elapsed();
        let attempts = attempt + 1;

        if self.inner.debug {
            tracing::debug!(
                status = status.as_u16(),
                headers = ?headers,
                body = %String::from_utf8_lossy(&raw_body),
                "Inbound response"
            );
        }
        tracing::debug!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            attempts = attempts,
            "Received HTTP response"
        );

        let info = ResponseInfo {
            status,
            headers,
            url,
            raw_body,
        };
        resolve(&info, request.error_slots(), destination, self.codec())?;

        Ok(Response::new(
            (),
            info.raw_body,
            status,
            info.headers,
            latency,
            attempts,
        ))
    }

    /// Builds and authenticates one attempt.
    async fn prepare<R>(&self, request: &R) -> Result<reqwest::Request>
    where
        R: ApiRequest + ?Sized,
    {
        let mut prepared = compose(request, &self.inner.outbound, self.codec())?;

        if let Some(jar) = self.cookie_jar() {
            if let Some(cookies) = jar.cookies(prepared.url()) {
                prepared.headers_mut().insert(COOKIE, cookies);
            }
        }

        if request.skip_auth() {
            return Ok(prepared);
        }
        self.inner.auth.authenticate(prepared, self).await
    }

    /// Requests that skip auth bypass the OAuth2 decorator.
    fn transport_for<R>(&self, request: &R) -> &dyn Transport
    where
        R: ApiRequest + ?Sized,
    {
        if request.skip_auth() {
            self.inner.base_transport.as_ref()
        } else {
            self.inner.transport.as_ref()
        }
    }

    fn store_cookies(&self, headers: &HeaderMap, url: &Url) {
        let Some(jar) = self.cookie_jar() else {
            return;
        };
        let mut set_cookies = headers.get_all(SET_COOKIE).iter();
        jar.set_cookies(&mut set_cookies, url);
    }

    /// Makes a GET request to the specified path.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use omniapi::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Default, Deserialize)]
    /// struct User { name: String }
    ///
    /// # async fn example(client: Client) -> Result<(), omniapi::Error> {
    /// let user: omniapi::Response<User> = client.get("/users/123").await?;
    /// println!("User: {}", user.data.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned + Default,
    {
        let request = RequestMetadata::new(Method::GET, path);
        self.call(&request).await
    }

    /// Makes a POST request to the specified path with a JSON body.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Default,
    {
        let request = RequestMetadata::new(Method::POST, path).with_json(body)?;
        self.call(&request).await
    }

    /// Makes a PUT request to the specified path with a JSON body.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Default,
    {
        let request = RequestMetadata::new(Method::PUT, path).with_json(body)?;
        self.call(&request).await
    }

    /// Makes a PATCH request to the specified path with a JSON body.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned + Default,
    {
        let request = RequestMetadata::new(Method::PATCH, path).with_json(body)?;
        self.call(&request).await
    }

    /// Makes a DELETE request to the specified path.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned + Default,
    {
        let request = RequestMetadata::new(Method::DELETE, path);
        self.call(&request).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.outbound.base_url.as_str())
            .field("auth", &self.inner.auth)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

fn dump_request(request: &reqwest::Request, attempt: usize) {
    let body = request
        .body()
        .map(|body| match body.as_bytes() {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => "<stream>".to_string(),
        })
        .unwrap_or_default();

    tracing::debug!(
        method = %request.method(),
        url = %request.url(),
        headers = ?request.headers(),
        body = %body,
        attempt = attempt,
        "Outbound request"
    );
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use omniapi::{Auth, ClientBuilder};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), omniapi::Error> {
/// let client = ClientBuilder::new(reqwest::Client::new())
///     .base_url("https://api.example.com")?
///     .user_agent("my-app/1.0")
///     .auth(Auth::api_key("x-api-key", "secret")?)
///     .max_retries(2)
///     .retry_backoff(Duration::from_millis(250))
///     .timeout(Duration::from_secs(30))
///     .use_cookies(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    transport: Arc<dyn Transport>,
    base_url: Option<Url>,
    user_agent: String,
    media_type: String,
    charset: String,
    auth: Auth,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    debug: bool,
    use_cookies: bool,
    cookie_jar: Option<Arc<Jar>>,
    disallow_unknown_fields: bool,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            base_url: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            media_type: DEFAULT_MEDIA_TYPE.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            auth: Auth::None,
            retry: RetryPolicy::none(),
            timeout: None,
            debug: false,
            use_cookies: false,
            cookie_jar: None,
            disallow_unknown_fields: false,
        }
    }

    /// Replaces the transport requests are sent through.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the media type used for `Content-Type` and `Accept`.
    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Sets the charset advertised in `Content-Type`.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Sets the authentication strategy.
    pub fn auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// Uses HTTP Basic authentication.
    pub fn basic_auth(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth(Auth::basic(username, password))
    }

    /// Sends an API key in `header`.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn api_key_auth(self, header: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        Ok(self.auth(Auth::api_key(header, value)?))
    }

    /// Uses OAuth2 tokens from `source`.
    pub fn oauth2(self, source: impl TokenSource + 'static) -> Self {
        self.auth(Auth::oauth2(source))
    }

    /// Signs requests with a custom preflight hook.
    pub fn preflight(self, hook: impl Preflight + 'static) -> Self {
        self.auth(Auth::preflight(hook))
    }

    /// Sets how many times a transport failure is retried.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.retry = RetryPolicy::new(max_retries).with_backoff(self.retry.backoff());
        self
    }

    /// Sets the fixed pause between retries.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry = self.retry.with_backoff(backoff);
        self
    }

    /// Sets the retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets a timeout applied to each send attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Dumps outbound requests and inbound responses at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Keeps a cookie jar shared by all calls on the client.
    ///
    /// The client attaches and stores cookies around each call, which only
    /// sees the final response of a redirect chain. To keep cookies set on
    /// intermediate hops, share the jar with the transport through
    /// [`cookie_jar`](Self::cookie_jar) and
    /// [`cookie_transport`](crate::cookie_transport).
    ///
    /// Disabling cookies drops any jar carried over from
    /// [`Client::to_builder`].
    pub fn use_cookies(mut self, use_cookies: bool) -> Self {
        self.use_cookies = use_cookies;
        if !use_cookies {
            self.cookie_jar = None;
        }
        self
    }

    /// Uses `jar` as the client's cookie jar and turns cookies on.
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.use_cookies = true;
        self.cookie_jar = Some(jar);
        self
    }

    /// Rejects response fields the destination type does not declare.
    pub fn disallow_unknown_fields(mut self, disallow: bool) -> Self {
        self.disallow_unknown_fields = disallow;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided, if the base URL cannot
    /// carry a path, or if a header value is invalid.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Base URL cannot be a base: {}",
                base_url
            )));
        }

        let headers = standard_headers(&self.media_type, &self.charset, &self.user_agent)?;

        let transport: Arc<dyn Transport> = match &self.auth {
            Auth::OAuth2(source) => Arc::new(OAuth2Transport::new(
                self.transport.clone(),
                source.clone(),
            )),
            _ => self.transport.clone(),
        };

        let cookie_jar = match self.cookie_jar {
            Some(jar) if self.use_cookies => OnceLock::from(jar),
            _ => OnceLock::new(),
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                base_transport: self.transport,
                outbound: Outbound {
                    base_url,
                    headers,
                    timeout: self.timeout,
                },
                auth: self.auth,
                retry: self.retry,
                debug: self.debug,
                disallow_unknown_fields: self.disallow_unknown_fields,
                codec: OnceLock::new(),
                use_cookies: self.use_cookies,
                cookie_jar,
                user_agent: self.user_agent,
                media_type: self.media_type,
                charset: self.charset,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ClientBuilder {
        Client::builder(reqwest::Client::new())
    }

    #[test]
    fn test_base_url_is_required() {
        let err = builder().build().unwrap_err();
        assert!(matches!(err, Error::Configuration(ref msg) if msg.contains("Base URL")));
    }

    #[test]
    fn test_base_url_must_accept_paths() {
        let err = builder()
            .base_url("mailto:ops@example.com")
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_invalid_user_agent_is_rejected() {
        let err = builder()
            .base_url("https://api.example.com")
            .unwrap()
            .user_agent("bad\nagent")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_codec_is_cached() {
        let client = builder()
            .base_url("https://api.example.com")
            .unwrap()
            .build()
            .unwrap();
        assert!(std::ptr::eq(client.codec(), client.clone().codec()));
        assert!(!client.codec().disallow_unknown_fields());
    }

    #[test]
    fn test_rebuild_resets_codec() {
        let client = builder()
            .base_url("https://api.example.com")
            .unwrap()
            .build()
            .unwrap();
        assert!(!client.codec().disallow_unknown_fields());

        let strict = client
            .to_builder()
            .disallow_unknown_fields(true)
            .build()
            .unwrap();
        assert!(strict.codec().disallow_unknown_fields());
        assert_eq!(strict.base_url(), client.base_url());
    }

    #[test]
    fn test_cookie_jar_lifecycle() {
        let client = builder()
            .base_url("https://api.example.com")
            .unwrap()
            .build()
            .unwrap();
        assert!(client.cookie_jar().is_none());

        let with_cookies = client.to_builder().use_cookies(true).build().unwrap();
        let jar = with_cookies.cookie_jar().unwrap().clone();
        assert!(Arc::ptr_eq(&jar, with_cookies.cookie_jar().unwrap()));

        let carried = with_cookies.to_builder().build().unwrap();
        assert!(Arc::ptr_eq(&jar, carried.cookie_jar().unwrap()));

        let dropped = with_cookies.to_builder().use_cookies(false).build().unwrap();
        assert!(dropped.cookie_jar().is_none());
    }

    #[test]
    fn test_explicit_cookie_jar_is_used() {
        let jar = Arc::new(Jar::default());
        let client = builder()
            .base_url("https://api.example.com")
            .unwrap()
            .cookie_jar(jar.clone())
            .build()
            .unwrap();
        assert!(Arc::ptr_eq(&jar, client.cookie_jar().unwrap()));

        let shared = Client::builder_with_cookies()
            .unwrap()
            .base_url("https://api.example.com")
            .unwrap()
            .build()
            .unwrap();
        assert!(shared.cookie_jar().is_some());
    }
}
