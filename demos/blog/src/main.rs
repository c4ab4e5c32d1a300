//! Blog example binary
//!
//! Lists posts, fetches one post twice (the second read is answered from
//! state) and loads the comments nested under it, against any JSON REST API
//! shaped like `/posts/{id}/comments`.
//!
//! ```text
//! RESOURCE_BASE_URL=https://jsonplaceholder.typicode.com RUST_LOG=debug cargo run -p blog
//! ```

use anyhow::Context;
use composable_resource_core::config::TransportConfig;
use composable_resource_core::environment::SystemClock;
use composable_resource_core::resource::{ResourceDefinition, ResourceEnvironment};
use composable_resource_runtime::metrics::MetricsServer;
use composable_resource_runtime::{ReqwestClient, ResourceIndex, ResourceStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blog=info,composable_resource_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut metrics = MetricsServer::new("127.0.0.1:9090".parse()?);
    metrics.start()?;

    let mut global = TransportConfig::from_env().context("invalid transport configuration")?;
    if global.base_url.is_none() {
        global.base_url = Some(DEFAULT_BASE_URL.to_string());
    }
    if global.timeout.is_none() {
        global.timeout = Some(Duration::from_secs(10));
    }
    tracing::info!(base_url = ?global.base_url, "Starting blog example");

    let environment = ResourceEnvironment::new(Arc::new(ReqwestClient::new()), Arc::new(SystemClock))
        .with_global_config(global)
        .with_store_config(TransportConfig::default().with_header("accept", "application/json"));

    let posts = ResourceStore::new(
        ResourceDefinition::new("posts", "/posts/")
            .nest(ResourceDefinition::new("comments", "/comments")),
        environment.clone(),
    );
    let users = ResourceStore::new(ResourceDefinition::new("users", "/users/"), environment);
    let index = ResourceIndex::new().with(posts.clone()).with(users.clone());

    let listed = posts.index(json!({"userId": 1})).await?;
    println!("Listed {} posts", listed.data.as_array().map_or(0, Vec::len));

    let first = posts.show(1).await?;
    println!("Post 1: {}", first.data["title"]);
    let again = posts.show(1).await?;
    println!("Post 1 again (from state): {}", again.data["title"]);

    let comments = posts.nested("comments", 1)?;
    comments.index(json!({})).await?;
    println!(
        "Post 1 has {} comments (state path {:?})",
        comments.state().await.data.len(),
        comments.state_path()
    );

    users.show(1).await?;

    let snapshot = index.snapshot().await;
    println!("\nSnapshot keys: {:?}", snapshot.as_object().map(|o| o.keys().collect::<Vec<_>>()));
    println!("{}", serde_json::to_string_pretty(&snapshot["posts"]["requests"])?);

    if let Some(rendered) = metrics.render() {
        println!("\n=== Metrics ===\n{rendered}");
    }

    index.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
