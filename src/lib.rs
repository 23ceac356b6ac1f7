//! A dynamic, schema-discovering client for Kubernetes-style REST/Watch APIs.
//!
//! Unlike code-generated clients bound to a fixed set of resource kinds,
//! [`Client`] learns the kinds a cluster serves at runtime by crawling the
//! discovery endpoints, and keeps that vocabulary in sync with the cluster's
//! CustomResourceDefinitions through a background watch. Resources are plain
//! [`serde_json::Value`] documents; the client translates them into the
//! right URLs, verbs, and streaming connections.
//!
//! ```no_run
//! use dynakube::{Client, Config};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), dynakube::Error> {
//!     let client = Client::new(Config::with_token("https://192.168.1.100:6443", "<token>")?).await?;
//!
//!     let pod = json!({
//!         "apiVersion": "v1",
//!         "kind": "Pod",
//!         "metadata": {"name": "busybox", "namespace": "default"},
//!         "spec": {"containers": [{"name": "main", "image": "busybox"}]}
//!     });
//!     client.create_resource(&pod).await?;
//!
//!     let pods = client.list_resources("Pod", "default").await?;
//!     println!("{}", serde_json::to_string_pretty(&pods).unwrap());
//!     Ok(())
//! }
//! ```
//!
//! Watching uses a callback handler on its own background task:
//!
//! ```no_run
//! use dynakube::{Client, Error, WatchHandler};
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! struct PodPrinter;
//!
//! #[async_trait]
//! impl WatchHandler for PodPrinter {
//!     async fn on_added(&self, obj: Value) { println!("+ {}", obj["metadata"]["name"]); }
//!     async fn on_modified(&self, obj: Value) { println!("~ {}", obj["metadata"]["name"]); }
//!     async fn on_deleted(&self, obj: Value) { println!("- {}", obj["metadata"]["name"]); }
//!     async fn on_close(&self, err: Error) { eprintln!("watch ended: {}", err); }
//! }
//!
//! # async fn example(client: Client) -> Result<(), Error> {
//! let handle = client.watch_resources("Pod", "", Arc::new(PodPrinter)).await?;
//! handle.join().await;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod client;
pub mod config;
pub mod convertor;
mod crd;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod registry;
pub mod watch;

pub use client::Client;
pub use config::{Config, Kubeconfig};
pub use convertor::{Convertor, ListOptions};
pub use discovery::Discovery;
pub use error::{ConfigError, Error, ErrorResponse, Result};
pub use executor::Executor;
pub use registry::{KindDescriptor, Registry};
pub use watch::{WatchHandle, WatchHandler};
