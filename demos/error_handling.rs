//! Example demonstrating error handling.
//!
//! This example shows how to:
//! - Inspect status codes and raw bodies of failed calls
//! - Decode API errors into error slots and find them in the cause chain
//! - Deal with undecodable bodies
//! - Retry transport failures
//!
//! Run with: `cargo run --example error_handling`

use http::Method;
use omniapi::{Client, DecodeError, Error, RequestMetadata};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

/// The error body JSONPlaceholder-style APIs return.
#[derive(Debug, Default, Deserialize)]
struct ApiFault {
    #[serde(default)]
    message: String,
}

impl fmt::Display for ApiFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiFault {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("omniapi=info")
        .init();

    let client = Client::builder(reqwest::Client::new())
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== Example 1: Handling HTTP Errors ===");
    let request = RequestMetadata::new(Method::GET, "/posts/999999").with_error::<ApiFault>();
    match client.call::<_, Post>(&request).await {
        Ok(response) => println!("Success: {:?}", response.data),
        Err(Error::Response(e)) => {
            println!("HTTP Error: {}", e);
            if let Some(response) = e.response() {
                println!("  Status: {}", response.status);
                println!("  Is client error (4xx): {}", response.status.is_client_error());
                println!("  Raw response: {}", response.text());
                println!("  Content-Type: {:?}", response.headers.get("content-type"));
            }
            match e.find::<ApiFault>() {
                Some(fault) => println!("  API message: {}", fault.message),
                None => println!("  No API message in the body"),
            }
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 2: Handling Decode Failures ===");
    #[derive(Default, Deserialize)]
    #[allow(dead_code)]
    struct WrongSchema {
        nonexistent_field: String,
    }

    match client.get::<WrongSchema>("/posts/1").await {
        Ok(_) => println!("Unexpected success"),
        Err(e) => {
            println!("Error: {}", e);
            if let Some(decode) = e.find::<DecodeError>() {
                for failure in decode.failures() {
                    println!("  Serde error: {}", failure);
                }
            }
            if let Some(raw) = e.raw_response() {
                println!(
                    "  Raw response (first 200 chars): {}",
                    raw.chars().take(200).collect::<String>()
                );
            }
        }
    }
    println!();

    println!("=== Example 3: Transport Failures ===");
    let bad_client = Client::builder(reqwest::Client::new())
        .base_url("https://this-domain-does-not-exist-12345.com")?
        .max_retries(2)
        .retry_backoff(Duration::from_millis(200))
        .build()?;

    match bad_client.get::<serde_json::Value>("/").await {
        Ok(_) => println!("Unexpected success"),
        Err(Error::Transport { attempts, source }) => {
            println!("Transport Error after {} attempts!", attempts);
            println!("  Error: {}", source);
        }
        Err(e) => println!("Other error: {}", e),
    }
    println!();

    println!("=== Example 4: Using Error Methods ===");
    if let Err(e) = client.get::<Post>("/posts/999999").await {
        println!("Error occurred: {}", e);
        println!("  Is retryable: {}", e.is_retryable());
        if let Some(status) = e.status() {
            println!("  HTTP status: {}", status);
        }
        if let Some(raw) = e.raw_response() {
            println!("  Raw response available: {} bytes", raw.len());
        }
    }

    Ok(())
}
