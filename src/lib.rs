//! # Gatestore - Policy-Guarded Hierarchical Key-Value Store
//!
//! `gatestore` is a small in-memory tree of key-value stores with per-field
//! read/write policies, addressed by colon-delimited paths. It is meant for
//! embedding as a policy-guarded configuration or state tree:
//!
//! - **Path addressing**: `"server:tls:port"` walks three store levels
//! - **Per-key policies**: `read-only`, `write-only`, `read-write`, `none`,
//!   with a settable default and per-key overrides at every level
//! - **Auto-vivification**: deep writes create intermediate stores on demand
//! - **Composite expansion**: writing a JSON object or array flattens it
//!   into a child store, leaf by leaf
//! - **Deferred values**: zero-argument suppliers evaluated fresh on every
//!   access, never cached
//! - **Declarative schemas**: concrete store types register their policy
//!   table once, through the [`Schema`] trait
//!
//! The policy layer guards cooperative in-process callers; it is not a
//! security boundary against untrusted code.
//!
//! ## Quick Start
//!
//! ```rust
//! use gatestore::{OpenStore, Result};
//! use serde_json::json;
//!
//! fn main() -> Result<()> {
//!     let mut store = OpenStore::new();
//!
//!     // Write leaves by path; intermediate stores appear on demand
//!     store.write("server:port", 8080)?;
//!
//!     // Composite values expand into nested stores
//!     store.write("features", json!({"tls": true, "hosts": ["a", "b"]}))?;
//!     assert_eq!(store.read("features:hosts:0")?.into_value(), Some(json!("a")));
//!
//!     // Serialize the readable portion of the tree
//!     let snapshot = store.entries();
//!     assert!(snapshot.contains_key("server"));
//!     Ok(())
//! }
//! ```
//!
//! ## Guarding Keys
//!
//! ```rust
//! use gatestore::{Policy, Schema, Store, StoreError};
//!
//! struct Session;
//!
//! impl Schema for Session {
//!     fn overrides() -> Vec<(&'static str, Policy)> {
//!         vec![("token", Policy::WriteOnly)]
//!     }
//! }
//!
//! let mut store = Store::<Session>::new();
//! store.write("token", "s3cret").unwrap();
//!
//! // Write-only keys cannot be read back and never appear in entries()
//! assert!(matches!(store.read("token"), Err(StoreError::AccessDenied { .. })));
//! assert!(store.entries().is_empty());
//! ```

pub mod error;
pub mod flatten;
pub mod path;
pub mod policy;
pub mod store;

pub use error::{Result, StoreError};
pub use flatten::flatten;
pub use policy::{Action, Open, Permissions, Policy, Schema};
pub use store::{Input, OpenStore, Resolved, Slot, Store, Thunk};
