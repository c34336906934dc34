//! Example demonstrating the authentication strategies.
//!
//! This example shows how to:
//! - Use API-key and Basic authentication
//! - Sign requests with a preflight hook
//! - Use OAuth2 bearer tokens
//! - Send individual requests without credentials
//!
//! Run with: `cargo run --example custom_auth`

use http::Method;
use omniapi::oauth2::StaticToken;
use omniapi::{Auth, BoxError, Client, RequestMetadata};
use std::time::{SystemTime, UNIX_EPOCH};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("omniapi=debug")
        .init();

    let http = reqwest::Client::new();

    println!("=== API Key ===");
    let client = Client::builder(http.clone())
        .base_url("https://httpbin.org")?
        .api_key_auth("X-Api-Key", "demo-key")?
        .build()?;
    let echoed = client.get::<serde_json::Value>("/headers").await?;
    println!("{}", echoed.data["headers"]);
    println!();

    println!("=== Basic ===");
    let client = client.to_builder().basic_auth("user", "passwd").build()?;
    let response = client
        .send(&RequestMetadata::new(Method::GET, "/basic-auth/user/passwd"))
        .await?;
    println!("Status: {}", response.status);
    println!();

    println!("=== Preflight Signing ===");
    let client = client
        .to_builder()
        .preflight(|mut request: reqwest::Request, _client: &Client| {
            let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
            let signature = format!("{}:{}:{}", request.method(), request.url().path(), timestamp);
            request.headers_mut().insert("x-signature", signature.parse()?);
            Ok::<_, BoxError>(request)
        })
        .build()?;
    let echoed = client.get::<serde_json::Value>("/headers").await?;
    println!("{}", echoed.data["headers"]["X-Signature"]);
    println!();

    println!("=== OAuth2 Bearer ===");
    let client = client
        .to_builder()
        .auth(Auth::oauth2(StaticToken::new("demo-token")))
        .build()?;
    let response = client
        .send(&RequestMetadata::new(Method::GET, "/bearer"))
        .await?;
    println!("Status: {}", response.status);
    println!();

    println!("=== Skipping Auth ===");
    let request = RequestMetadata::new(Method::GET, "/headers").without_auth();
    let echoed = client.call::<_, serde_json::Value>(&request).await?;
    println!("{}", echoed.data["headers"]);

    Ok(())
}
