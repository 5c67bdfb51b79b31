//! # Chain-Indexer Test Suite
//!
//! Unified test crate for cross-crate behavior:
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Shared event/filter builders
//! └── integration/      # End-to-end scenarios over the public API
//!     ├── scenarios.rs  # Subscriber delivery scenarios (S1-S6 class)
//!     ├── properties.rs # Universal delivery/ordering/accounting laws
//!     ├── pipeline.rs   # Parser pipeline against a live bus
//!     └── shutdown.rs   # Priority teardown behavior
//! ```
//!
//! Run with `cargo test -p indexer-tests`.

#![allow(dead_code)]

pub mod fixtures;
pub mod integration;
