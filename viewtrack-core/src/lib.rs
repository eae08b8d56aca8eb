//! # viewtrack-core
//!
//! Core library for viewtrack - a page-view tracker for client browsing sessions.
//!
//! This library provides:
//! - Classification of navigations into page views (referrer, uniqueness, locale)
//! - Filtering by hostname and caller predicate
//! - A debounced delivery queue with an unload-safe flush
//! - Beacon and fetch transports sharing one wire format
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A navigation flows through the components leaf-first:
//!
//! ```text
//! Navigation → classifier → filter → session → queue + scheduler → transport
//!                                        ↘ (no beacon) ───────────↗
//! ```
//!
//! All runtime state the tracker would otherwise read ambiently (host,
//! referrer, clock, beacon capability) comes from an [`Environment`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use viewtrack_core::Config;
//!
//! let config = Config::load().expect("failed to load config");
//! config.tracker.validate().expect("tracker is not configured");
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, TrackerConfig};
pub use environment::{Environment, HostEnvironment, StaticEnvironment};
pub use error::{Error, Result};
pub use filter::{Filter, SkipReason};
pub use tracker::{DeliveryStats, NavigationOutcome, Tracker};
pub use transport::{Beacon, ChannelBeacon, Fetcher, HttpFetcher, Transporter};
pub use types::*;

// Public modules
pub mod classifier;
pub mod config;
pub mod environment;
pub mod error;
pub mod filter;
pub mod logging;
pub mod scheduler;
pub mod session;
pub mod tracker;
pub mod transport;
pub mod types;
