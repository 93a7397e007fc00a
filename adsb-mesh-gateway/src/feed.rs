//! dump1090 SBS-1 (BaseStation) feed reader.
//!
//! Connects to the port-30003 text output and forwards each line, newline
//! stripped, to the aggregator task. Connect failures are retried on a
//! fixed delay; a closed connection is simply reopened.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub const CONNECT_ATTEMPT_DELAY: Duration = Duration::from_secs(5);
pub const CONNECT_ATTEMPT_LIMIT: u32 = 10;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("could not connect to {addr} after {attempts} attempts: {last}")]
    GaveUp {
        addr: String,
        attempts: u32,
        last: std::io::Error,
    },
}

pub struct FeedReader {
    host: String,
    port: u16,
    debug: bool,
    retry_delay: Duration,
    attempt_limit: u32,
}

impl FeedReader {
    pub fn new(host: &str, port: u16, debug: bool) -> Self {
        FeedReader {
            host: host.to_string(),
            port,
            debug,
            retry_delay: CONNECT_ATTEMPT_DELAY,
            attempt_limit: CONNECT_ATTEMPT_LIMIT,
        }
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Read lines until the receiver goes away or connecting keeps failing.
    ///
    /// Returns `Ok(())` only when `tx` is closed.
    pub async fn run(self, tx: mpsc::Sender<String>) -> Result<(), FeedError> {
        let addr = self.addr();
        let mut failures = 0u32;

        loop {
            log::info!("Connecting to dump1090 at {addr}...");
            let stream = match TcpStream::connect(&addr).await {
                Ok(s) => s,
                Err(e) => {
                    failures += 1;
                    if failures >= self.attempt_limit {
                        return Err(FeedError::GaveUp {
                            addr,
                            attempts: failures,
                            last: e,
                        });
                    }
                    log::error!(
                        "dump1090 connection failed ({failures}/{}): {e}; retrying in {:?}",
                        self.attempt_limit,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
            };
            log::info!("Connected to dump1090.");
            failures = 0;

            if !self.pump(stream, &tx).await {
                return Ok(());
            }
            log::warn!(
                "dump1090 connection to {addr} closed; reconnecting in {:?}",
                self.retry_delay
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Forward lines from one connection. Returns false once `tx` is closed.
    async fn pump(&self, stream: TcpStream, tx: &mpsc::Sender<String>) -> bool {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(256);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => return true,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("dump1090 read error: {e}");
                    return true;
                }
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if self.debug {
                log::debug!("Raw: {line}");
            }
            if tx.send(line.to_string()).await.is_err() {
                return false;
            }
        }
    }
}
