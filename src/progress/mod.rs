//! Progress batching on top of the durable store.
//!
//! Progress changes far more often than anything else in the document, so
//! updates are cached and written in debounced batches instead of one store
//! write per completion mark.

mod batcher;
pub mod state;

pub use batcher::{BatchConfig, FlushSummary, ProgressBatcher};
