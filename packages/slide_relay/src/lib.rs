//! Slide Relay - remote control for browser slide presentations
//!
//! A host browser opens a presentation session; phones join it as remotes
//! by scanning a QR code. Remote commands are forwarded to the host and the
//! resulting slide position is broadcast back so every screen converges.
//!
//! ```no_run
//! use slide_relay::{AppState, RelayConfig, router};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = RelayConfig::default();
//! let app = router(AppState::new(&config, CancellationToken::new()));
//! let listener = tokio::net::TcpListener::bind(config.bind_addr()?).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod id;
pub mod metrics;
pub mod protocol;
pub mod public_url;
pub mod registry;
pub mod relay;
pub mod session;
pub mod session_actor;
pub mod ws;

pub use config::{FileConfig, RelayConfig};
pub use error::RelayError;
pub use gateway::{ConnectionGateway, RoomId};
pub use handlers::{AppState, router};
pub use id::{IdGenerator, ShortIdGenerator};
pub use metrics::RelayMetrics;
pub use protocol::{ClientEvent, Command, ServerEvent};
pub use relay::CommandRelay;
pub use registry::SessionRegistry;
pub use session::{Role, Session, SlideState};
pub use session_actor::SessionHandle;
