//! docsync - Keep Markdown and PDF exports of Google Docs next to the originals.
//!
//! This library provides functionality to:
//! - Scan configured Drive folders recursively for Google Docs
//! - Detect documents modified since the last recorded sync
//! - Export changed documents to Markdown and PDF
//! - Upload the exports into the document's folder, or write them locally
//!   when the upload fails
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use docsync::{Authenticator, Config, DriveClient, JsonStateStore, Syncer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mappings = config.mappings(Path::new("."))?;
//!
//!     let auth = Authenticator::from_files("credentials.json", "token.json")?;
//!     let client = DriveClient::new(auth, None);
//!     let mut store = JsonStateStore::load("state.json")?;
//!
//!     let report = Syncer::new(&client, &mut store, false).run(&mappings).await?;
//!     println!("{}", report);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod convert;
pub mod deliver;
pub mod detect;
pub mod error;
pub mod folder_id;
pub mod models;
pub mod service;
pub mod state;
pub mod sync;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::DriveClient;
pub use config::{Config, DirectoryMapping, FolderRef};
pub use convert::{Artifact, ExportFormat};
pub use error::{Result, SyncError};
pub use models::{Document, FileMetadata};
pub use service::DriveService;
pub use state::{JsonStateStore, MemoryStateStore, StateStore};
pub use sync::{PlannedAction, SyncReport, Syncer};
