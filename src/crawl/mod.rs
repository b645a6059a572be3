//! Breadth-first site crawling
//!
//! This module contains the crawl-specific logic, split along the
//! decision/effect line:
//! - [`Frontier`]: pure traversal state (visited set, FIFO queue, scope,
//!   budget)
//! - [`CrawlController`]: the sequential fetch loop around it

mod controller;
mod frontier;

pub use controller::{CrawlController, CrawlOutcome};
pub use frontier::{EnqueueOutcome, Frontier, FrontierPhase};
