//! Redmine lookup - search, enrich and verify-update Redmine issues.
//!
//! Given recognized indicator values (IP addresses, hashes, domains, emails),
//! this crate searches a Redmine instance for issues mentioning them, fetches
//! the matched issues with their journals, and applies single-attribute
//! updates that are confirmed by re-reading the issue afterwards.
//!
//! # Example
//!
//! ```no_run
//! use redmine_lookup::{Entity, Integration, LookupOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = LookupOptions::new("https://redmine.example.com").with_api_key("secret");
//! let integration = Integration::new(options)?;
//!
//! let entity = Entity::detect("8.8.8.8").ok_or("unrecognized value")?;
//! for result in integration.lookup(&[entity]).await? {
//!     if let Some(data) = result.data {
//!         let details = integration.details(&data.issue_ids).await?;
//!         println!("{} -> {} issue(s)", result.entity.value, details.issues.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

// Public modules for library usage
pub mod classify;
pub mod client;
pub mod config;
pub mod details;
pub mod dispatch;
pub mod error;
pub mod integration;
pub mod model;
pub mod reference;
pub mod rows;
pub mod search;
pub mod transport;
pub mod verify;

// Public CLI module (needed by binary)
pub mod cli;

pub use client::TrackerClient;
pub use config::{LookupOptions, RequestOptions};
pub use dispatch::{Action, DispatchResponse};
pub use error::{ClassifiedError, ConfigError, ErrorKind, Result, Severity};
pub use integration::Integration;
pub use model::{Entity, EntityType, Issue, IssueDetails, IssueId, LookupResult, ReferenceData};
pub use reference::ReferenceCache;
pub use transport::Transport;
