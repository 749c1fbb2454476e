//! Simple example of using the favicon-service library
//!
//! Run with: FAVICON_API_URL=https://... DATABASE_URL= cargo run --example simple_lookup --no-default-features

use favicon_service::{Config, FaviconError, FaviconService};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("favicon_service=debug")
        .init();

    println!("Favicon Service Library Example");
    println!("===============================");

    let config = Arc::new(Config::load()?);
    let service = FaviconService::from_config(config).await?;

    // The second resolves through the cache once the first has been stored
    let test_urls = vec![
        "https://www.rust-lang.org/learn",
        "https://www.rust-lang.org/tools",
        "https://blog.rust-lang.org:443/",
        "ftp://example.com",
    ];

    for url in test_urls {
        println!("\nLooking up: {}", url);
        println!("{}", "-".repeat(50));

        match service.resolve(url).await {
            Ok(resolution) => {
                println!("   Host: {}", resolution.host);
                println!("   Cached: {}", resolution.cached());
                println!("   Title: {}", resolution.icon.title);
                println!("   Image: {}", resolution.icon.image_url);
                println!("   Background: {}", resolution.icon.background_color);
            }
            Err(FaviconError::RateLimited) => {
                println!("Rate limited, try again shortly");
            }
            Err(e) if e.is_validation() => {
                println!("Rejected input: {}", e);
            }
            Err(e) => {
                println!("Error: {}", e);
            }
        }
    }

    Ok(())
}
