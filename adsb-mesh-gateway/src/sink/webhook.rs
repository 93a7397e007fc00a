//! Webhook sink: HTTP POST of the aircraft summary as JSON.

use adsb_mesh_core::AircraftSummary;

use super::{Sink, SinkError};

/// Posts each summary to a fixed URL.
#[derive(Clone)]
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: &str) -> Self {
        WebhookSink {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

/// JSON body sent for one aircraft.
pub fn payload(summary: &AircraftSummary) -> serde_json::Value {
    serde_json::json!({
        "icao": summary.icao,
        "callsign": summary.callsign,
        "lat": summary.lat,
        "lon": summary.lon,
        "altitude_ft": summary.altitude_ft,
        "ground_speed_kts": summary.ground_speed_kts,
        "track_deg": summary.track_deg,
        "squawk": summary.squawk,
        "text": summary.to_text(),
        "timestamp": summary.timestamp,
    })
}

#[async_trait::async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, summary: &AircraftSummary) -> Result<(), SinkError> {
        self.client
            .post(&self.url)
            .json(&payload(summary))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
