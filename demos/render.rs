//! Render Demo - connect, configure, render and fetch an image.
//!
//! This example demonstrates:
//! - Building a session with the fluent builder
//! - Typed commands in synchronous mode
//! - Fetching a rendered image (flipped so row 0 is the bottom row)
//!
//! # Running
//!
//! Start a SurRender server, then:
//!
//! ```sh
//! RUST_LOG=info,surrender::server=debug cargo run --example render -- localhost 5151
//! ```

use std::time::Duration;

use surrender_client::{Session, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let session = Session::builder()
        .verbosity(3)
        .async_mode(false)
        .response_timeout(Duration::from_secs(60))
        .connect(&host, port)
        .await?;

    tracing::info!("Server version {}", session.version().await?);

    session.set_image_size(512, 512).await?;
    session.set_camera_fov_deg(10.0, 10.0).await?;
    session.set_sun_power(&[1e17, 1e17, 1e17, 1e17]).await?;
    session.set_object_position("camera", [0.0, 0.0, 0.0]).await?;
    session.render().await?;

    let image = session.get_image().await?;
    let mean = image.data().iter().map(|v| f64::from(*v)).sum::<f64>() / image.data().len().max(1) as f64;
    tracing::info!(
        width = image.width(),
        height = image.height(),
        mean,
        "Fetched image"
    );

    session.disconnect().await;
    Ok(())
}
