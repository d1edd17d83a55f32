//! Public face of the session engine.
//!
//! - [`Client`] - engine handle with the typed node operations
//! - [`ClientBuilder`] - configurable construction
//! - [`ZkError`] - status codes surfaced to callers
//! - value types: [`Stat`], [`Acl`], [`CreateMode`], [`SessionState`], [`WatchedEvent`]
//!
//! # Basic Usage
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use zk_engine::{Acl, Client, CreateMode, WatchedEvent, WatcherRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let client = Client::builder("127.0.0.1:2181,127.0.0.1:2182/app")
//!         .session_timeout(Duration::from_secs(10))
//!         .default_watcher(Arc::new(|event: WatchedEvent| println!("session: {:?}", event)))
//!         .connect()
//!         .await
//!         .unwrap();
//!
//!     client
//!         .create("/config", b"v1", Acl::open_unsafe(), CreateMode::PERSISTENT)
//!         .await
//!         .unwrap();
//!
//!     let watcher: WatcherRef = Arc::new(|event: WatchedEvent| println!("changed: {:?}", event.path));
//!     let (data, stat) = client.get("/config", Some(watcher)).await.unwrap();
//!     println!("{:?} at version {}", data, stat.version);
//!
//!     client.set("/config", b"v2", stat.version).await.unwrap();
//!     client.close().await.unwrap();
//! }
//! ```

mod acl;
mod builder;
#[allow(clippy::module_inception)]
mod client;
mod error;
mod operation;
mod types;

pub use acl::*;
pub use builder::*;
pub use client::*;
pub use error::*;
pub use operation::*;
pub use types::*;
