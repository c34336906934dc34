//! Basic example demonstrating request descriptors and the verb helpers.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Describe an endpoint with `ApiRequest` and path/query parameters
//! - Make POST requests with a JSON body
//! - Access response data and metadata
//!
//! Run with: `cargo run --example basic_call`

use http::Method;
use omniapi::{ApiRequest, Client, Error, Param};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Default, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

/// `GET /users/{user_id}/posts?_limit=N`
struct ListUserPosts {
    user_id: u32,
    limit: Option<u32>,
}

impl ApiRequest for ListUserPosts {
    fn method(&self) -> Method {
        Method::GET
    }

    fn path_template(&self) -> Cow<'_, str> {
        "/users/{user_id}/posts".into()
    }

    fn params(&self) -> Vec<Param> {
        vec![
            Param::path("user_id", &self.user_id),
            Param::query("_limit", &self.limit),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("omniapi=debug,basic_call=info")
        .init();

    // Create a client for the JSONPlaceholder API
    let client = Client::builder(reqwest::Client::new())
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== GET Request Example ===");
    let response = client.get::<Post>("/posts/1").await?;

    println!("Post ID: {}", response.data.id);
    println!("Title: {}", response.data.title);
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!();

    println!("=== Request Descriptor Example ===");
    let request = ListUserPosts {
        user_id: 1,
        limit: Some(3),
    };
    let posts = client.call::<_, Vec<Post>>(&request).await?;
    for post in posts.iter() {
        println!("#{} {}", post.id, post.title);
    }
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let response = client.post::<_, Post>("/posts", &new_post).await?;

    println!("Created post ID: {}", response.data.id);
    println!("Title: {}", response.data.title);
    println!();

    println!("=== Accessing Response Metadata ===");
    println!("Raw response length: {} bytes", response.raw_body.len());
    println!("Content-Type: {:?}", response.header("content-type"));
    println!("Attempts: {}", response.attempts);

    Ok(())
}
