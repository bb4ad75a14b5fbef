//! Streaming time-series engine over an append-only price file.
//!
//! Answers two queries over arbitrary sub-ranges of a `(timestamp, price)`
//! series: the best single buy-then-sell trade for a fund amount, and a
//! bounded, time-bucketed series for charting. See [`engine::PriceEngine`].

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod point;
pub mod profit;
pub mod resample;
pub mod scanner;
pub mod source;
pub mod stats;
pub mod utils;

pub use engine::PriceEngine;
pub use error::{EngineError, Result};
