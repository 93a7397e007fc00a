//! adsb-mesh-core: SBS-1 decoding and per-aircraft aggregation.
//!
//! No async and no sockets: the decode → merge → gate pipeline plus the
//! config model. The `adsb-mesh-gateway` binary wires it to a dump1090 feed
//! and to its output sinks.

pub mod aggregator;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod gate;
pub mod store;
pub mod summary;
pub mod types;

// Re-export commonly used types at crate root
pub use aggregator::{Aggregator, Ingest};
pub use decode::decode_line;
pub use dispatch::{DispatchReport, MarkSentPolicy};
pub use store::{AircraftRecord, AircraftStore};
pub use summary::AircraftSummary;
pub use types::*;
