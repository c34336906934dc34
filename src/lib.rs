//! # Omniapi - A foundation for typed HTTP API clients
//!
//! Omniapi turns small request descriptors into authenticated HTTP calls. A
//! per-API crate describes each endpoint once (method, path template,
//! parameters, body and error shapes) and the [`Client`] takes care of
//! URL building, headers, authentication, transport retries, cookies and
//! decoding.
//!
//! ## Quick Start
//!
//! ```no_run
//! use omniapi::{ApiRequest, Auth, Client, Param};
//! use http::Method;
//! use serde::Deserialize;
//! use std::borrow::Cow;
//!
//! struct GetInvoice {
//!     id: u64,
//!     expand: Option<String>,
//! }
//!
//! impl ApiRequest for GetInvoice {
//!     fn method(&self) -> Method {
//!         Method::GET
//!     }
//!
//!     fn path_template(&self) -> Cow<'_, str> {
//!         "/invoices/{id}".into()
//!     }
//!
//!     fn params(&self) -> Vec<Param> {
//!         vec![
//!             Param::path("id", &self.id),
//!             Param::query("expand", &self.expand).omit_empty(),
//!         ]
//!     }
//! }
//!
//! #[derive(Default, Deserialize)]
//! struct Invoice {
//!     id: u64,
//!     total: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), omniapi::Error> {
//!     let client = Client::builder(reqwest::Client::new())
//!         .base_url("https://api.example.com/v2")?
//!         .auth(Auth::basic("user", "secret"))
//!         .max_retries(3)
//!         .build()?;
//!
//!     let invoice = client
//!         .call::<_, Invoice>(&GetInvoice { id: 42, expand: None })
//!         .await?;
//!     println!("Invoice {} totals {}", invoice.data.id, invoice.data.total);
//!     println!("Request took {:?}", invoice.latency);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Request descriptors** - Implement [`ApiRequest`] or use [`RequestMetadata`]
//! - **Path and query parameters** - Declared with [`Param`], with `omit_empty` support
//! - **Authentication** - Basic, API key, OAuth2 (with background token refresh) and custom preflight signing
//! - **Transport retries** - Fixed backoff on connection failures only
//! - **Error slots** - Decode API errors from both error and 2xx bodies
//! - **Error chains** - Every response error keeps the status, headers and raw body
//! - **Cookies** - Optional jar shared by all calls on a client, and by redirect hops with [`Client::builder_with_cookies`]
//! - **Tracing** - Each call runs in an `http request` span
//!
//! ## Error Handling
//!
//! Response errors are [`ErrorResponse`] values. The decoded API error, if any,
//! sits in the cause chain:
//!
//! ```no_run
//! use omniapi::{Client, Error, RequestMetadata};
//! use http::Method;
//! use serde::Deserialize;
//! use std::fmt;
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct ApiFault {
//!     #[serde(default)]
//!     message: String,
//! }
//!
//! impl fmt::Display for ApiFault {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         f.write_str(&self.message)
//!     }
//! }
//!
//! impl std::error::Error for ApiFault {}
//!
//! # async fn example(client: Client) -> Result<(), Error> {
//! let request = RequestMetadata::new(Method::DELETE, "/invoices/42").with_error::<ApiFault>();
//! match client.send(&request).await {
//!     Ok(response) => println!("Deleted ({})", response.status),
//!     Err(e) => {
//!         if let Some(fault) = e.find::<ApiFault>() {
//!             eprintln!("API said: {}", fault.message);
//!         }
//!         if let Some(status) = e.status() {
//!             eprintln!("HTTP {}: {}", status, e.raw_response().unwrap_or_default());
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod codec;
mod compose;
mod error;
pub mod metadata;
pub mod oauth2;
mod params;
mod request;
mod resolve;
mod response;
pub mod retry;
mod transport;

pub use auth::{Auth, Preflight};
pub use client::{
    Client, ClientBuilder, DEFAULT_CHARSET, DEFAULT_MEDIA_TYPE, DEFAULT_USER_AGENT,
};
pub use codec::JsonCodec;
pub use compose::build_url;
pub use error::{
    BoxError, DecodeError, Error, ErrorResponse, JoinedErrors, ResponseInfo, Result,
};
pub use metadata::RequestMetadata;
pub use params::{Location, Param, ParamValue};
pub use request::{error_slot, ApiRequest, ErrorSlot, JsonBody, RequestBody};
pub use response::Response;
pub use retry::RetryPolicy;
pub use transport::{cookie_transport, Transport};
