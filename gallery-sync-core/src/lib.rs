#![doc = "gallery-sync-core: reconciliation engine and upload orchestration for gallery migrations."]

//! This crate holds everything needed to move a gallery (folders and
//! submissions) from one content-hosting site to another, independent of how
//! either site is reached over the network.
//!
//! # Layout
//! - [`contract`]: data model and the site adapter traits
//! - [`matcher`]: title similarity and best-match selection
//! - [`folders`] / [`submissions`]: cross-site reconciliation
//! - [`worker`]: the migration session and upload orchestrator
//! - [`tables`]: code tables for type, rating and category conversion
//! - [`ratelimit`], [`session`], [`progress`], [`config`], [`error`]: supporting pieces

pub mod config;
pub mod contract;
pub mod error;
pub mod folders;
pub mod matcher;
pub mod progress;
pub mod ratelimit;
pub mod session;
pub mod submissions;
pub mod tables;
pub mod worker;

pub use error::{Result, SyncError};
