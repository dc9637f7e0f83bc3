//! geolayers - OGC source adapters and layer-tree synchronization
//!
//! Client-side plumbing for a web GIS project: talking to GeoServer over
//! WMS, WFS and vector tiles, and keeping a hierarchical layer tree in step
//! with the project backend while edits are applied optimistically.
//!
//! ## Architecture
//! ```text
//! LayerSourceManager ──► WmsAdapter / WfsAdapter / MvtAdapter ──► GeoServer
//!
//! UI ──► LayerTreeSync ──► LayerTree (optimistic)
//!              │
//!              └──► ProjectBackend ──► project service
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use geolayers::backend::HttpProjectBackend;
//! use geolayers::config::{BackendConfig, SyncConfig};
//! use geolayers::sync::LayerTreeSync;
//! use geolayers::tree::{DropPosition, DropTarget};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let backend = HttpProjectBackend::new(&BackendConfig::new("http://localhost:8000"))?;
//! let sync = LayerTreeSync::new(Arc::new(backend), SyncConfig::new("city"));
//! sync.refresh().await?;
//! sync.move_node("roads", DropTarget::node("rivers"), DropPosition::Before).await?;
//! # Ok(())
//! # }
//! ```

// Error types per subsystem
pub mod error;

// Environment-driven settings
pub mod config;

// Web Mercator transform and bounding boxes
pub mod geo;

// WMS / WFS / MVT protocol adapters
pub mod sources;

// Client-side layer tree
pub mod tree;

// Project backend (HTTP client and in-memory double)
pub mod backend;

// Optimistic sync engine
pub mod sync;

pub use error::{BackendError, SourceError, SyncError, TreeError};
pub use sources::{LayerSourceManager, Protocol};
pub use sync::{LayerTreeSync, RollbackPolicy};
pub use tree::LayerTree;

// Shared wire types
pub use layer_types;
