//! Core types and trait definitions for the Amparo case-management engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod actor;
pub mod audit;
pub mod blob;
pub mod case;
pub mod child;
pub mod error;
pub mod intake;
pub mod intervention;
pub mod measure;
pub mod notify;
pub mod records;
pub mod store;
pub mod transfer;

pub use error::{Error, Result};
