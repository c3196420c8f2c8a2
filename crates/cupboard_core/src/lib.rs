//! # Cupboard Core
//!
//! An embedded store for work items ("crumbs"), sessions ("trails"), typed
//! properties, graph links and shared state ("stashes").
//!
//! Durable data lives in nine ledgers, line-delimited JSON files in the data
//! directory. On every attach a SQLite cache is rebuilt from them and all
//! reads go to it; every write changes the cache inside one transaction and
//! then mirrors the change to the affected ledgers. On detach the cache is
//! deleted.
//!
//! This crate provides:
//! - [`Cupboard`]: attach, detach, flush and table lookup
//! - [`Table`]: `get`, `set`, `delete` and `fetch` over [`Entity`] values
//! - Property defaults and backfill, so every crumb carries a value for
//!   every defined property
//! - Cascades for crumb deletion and trail completion or abandonment
//! - Immediate or deferred ledger mirroring ([`Durability`])
//!
//! ## Example
//!
//! ```rust
//! use cupboard_core::{Config, Crumb, Cupboard, Entity, Filter};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let cupboard = Cupboard::new();
//! cupboard.attach(Config::new(dir.path())).unwrap();
//!
//! let crumbs = cupboard.table("items").unwrap();
//! let id = crumbs
//!     .set("", Crumb { name: "Implement X".into(), ..Default::default() })
//!     .unwrap();
//!
//! let Entity::Crumb(crumb) = crumbs.get(&id).unwrap() else { unreachable!() };
//! assert_eq!(crumb.state, "draft");
//! assert_eq!(crumbs.fetch(&Filter::new()).unwrap().len(), 1);
//!
//! cupboard.detach().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod cascade;
mod config;
mod cupboard;
mod dir;
pub mod entity;
mod error;
mod loader;
mod mirror;
mod property;
mod table;

pub use config::{Backend, Config, Durability};
pub use cupboard::Cupboard;
pub use dir::DataDir;
pub use entity::{
    Category, Crumb, CrumbProperty, Entity, Link, Metadata, Property, Stash, StashHistory,
    TableName, Trail,
};
pub use error::{CoreError, CoreResult};
pub use property::{default_value, ValueType};
pub use table::{Filter, Table};
