//! Application Services
//!
//! Services that run the decode pipeline and move its output downstream.
//!
//! - `StreamProcessor`: Decode and dispatch for one connection/direction
//! - `Relay`: Owns the shared pieces and opens stream processors
//! - `MarketNormalizer`: Document conversion and batch hand-off
//! - `UploadFanout`: Concurrent, isolated publishing to every destination

mod fanout;
mod normalizer;
mod processor;
mod relay;
mod stats;

pub use fanout::{FanoutReport, UploadFanout};
pub use normalizer::{
    Conversion, ConversionError, MarketNormalizer, convert_document, convert_documents,
};
pub use processor::{PipelineError, PipelineEvent, StreamProcessor};
pub use relay::Relay;
pub use stats::{PipelineStats, PipelineStatsSnapshot};
