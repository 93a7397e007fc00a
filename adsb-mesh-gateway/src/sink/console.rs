//! Log-only sink used when no real output is configured.

use adsb_mesh_core::AircraftSummary;

use super::{Sink, SinkError};

pub struct ConsoleSink;

#[async_trait::async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn send(&self, summary: &AircraftSummary) -> Result<(), SinkError> {
        log::info!("Output (simulated): {}", summary.to_text());
        Ok(())
    }
}
