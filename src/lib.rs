//! # surrender-client
//!
//! Async client for the SurRender rendering server.
//!
//! The server speaks a binary RPC protocol over TCP: every request and
//! response is a map of self-describing tagged values, correlated by the
//! command name stored under the empty-string key.
//!
//! ## Architecture
//!
//! - **Protocol**: tagged values, big-endian wire format, incremental framing
//! - **Transport**: byte-exact reads and writes over one socket
//! - **Correlator**: one request in flight, side-channel frames (server log
//!   lines, file upload requests) handled while waiting
//! - **Session**: connection lifecycle, settings, and typed command wrappers
//!
//! ## Example
//!
//! ```ignore
//! use surrender_client::Session;
//!
//! #[tokio::main]
//! async fn main() -> surrender_client::Result<()> {
//!     let session = Session::builder()
//!         .async_mode(false)
//!         .connect("localhost", 5151)
//!         .await?;
//!
//!     session.set_image_size(512, 512).await?;
//!     session.render().await?;
//!     let image = session.get_image_rgba8().await?;
//!     println!("{}x{}", image.width(), image.height());
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod facade;
pub mod image;
pub mod protocol;
pub mod transport;

mod correlator;
mod session;

pub use correlator::{LogPolicy, DEFAULT_CHUNK_SIZE};
pub use error::{Result, SurrenderError};
pub use facade::ResponseFields;
pub use image::{Image, Sample};
pub use protocol::{Variant, VariantMap};
pub use session::{Session, SessionBuilder, SessionConfig, DEFAULT_PORT};
