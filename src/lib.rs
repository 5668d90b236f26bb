//! # Energy Price Workspace
//!
//! Facade over the [`price_forecast`] crate, which benchmarks hourly
//! day-ahead electricity price forecasts with a walk-forward protocol.
//!
//! ## Example
//!
//! ```
//! use energy_price_workspace::CountryRegistry;
//!
//! let registry = CountryRegistry::builtin();
//! let greece = registry.resolve("GR").unwrap();
//! assert_eq!(greece.share_columns()[0], "Coal_share");
//! ```

pub use price_forecast::*;
