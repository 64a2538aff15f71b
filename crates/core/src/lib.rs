//! dapmux: session orchestration for multi-target debugging
//!
//! Maps a dynamically discovered forest of debuggable targets (processes,
//! workers, pages) onto a tree of host debug sessions, one protocol
//! connection per target.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use dapmux::{BinderDelegate, LoopbackHost, ManagerConfig, SessionManager};
//! use dapmux_protocol::SessionConfiguration;
//!
//! #[tokio::main]
//! async fn main() -> dapmux::Result<()> {
//!     let host = Arc::new(LoopbackHost::new("1.90.0"));
//!     let manager = SessionManager::new(host.clone(), binders, ManagerConfig::default())?;
//!
//!     // The user starts a root session; the manager gives it a binder.
//!     let root = host.launch_root(SessionConfiguration::launch("pwa-node", "App"), None)?;
//!
//!     // The binder found a worker under the root and wants to talk to it.
//!     let connection = manager.acquire_dap(worker).await?;
//!
//!     manager.dispose();
//!     Ok(())
//! }
//! ```
//!
//! # Guarantees
//!
//! - One session per target, even under concurrent requests
//! - A child session is started only after its parent session exists
//! - Disposal cascades and is idempotent
//! - Releasing a target that is still being negotiated fails its waiters

pub mod binder;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod host;
pub mod loopback;
pub mod manager;
pub mod session;
pub mod subscription;
pub mod target;

pub use binder::{Binder, BinderContext, BinderDelegate, BinderFactory, DebugAdapter};
pub use capabilities::HostCapabilities;
pub use config::ManagerConfig;
pub use dapmux_runtime::Connection;
pub use error::{Error, Result};
pub use host::{DebugHost, DescriptorFactory};
pub use loopback::{HostEvent, LoopbackHost};
pub use manager::{RegistrySnapshot, SessionManager};
pub use session::Session;
pub use subscription::Subscription;
pub use target::{Target, TargetRef};
