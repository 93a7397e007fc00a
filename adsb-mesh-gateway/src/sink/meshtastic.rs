//! Meshtastic device over its stream API, on TCP or a serial port.
//!
//! Text summaries go out as broadcast `TEXT_MESSAGE_APP` packets on the
//! primary channel. The device answers a config request with a stream of
//! `FromRadio` frames we have no use for; a background task drains them so
//! the link never backs up.

use std::io;
use std::time::Duration;

use adsb_mesh_core::AircraftSummary;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialPortInfo, SerialPortType};

use super::{Sink, SinkError};
use crate::proto::{frame_stream, Data, MeshPacket, PacketIds, ToRadio};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Line rate of the Meshtastic serial console.
pub const SERIAL_BAUD: u32 = 115_200;

/// Sent ahead of the first frame so a sleeping serial console switches to
/// protobuf mode.
const SERIAL_WAKE: [u8; 32] = [0xC3; 32];

/// USB vendor ids of the serial bridges Meshtastic boards ship with.
const RADIO_USB_VIDS: [u16; 5] = [
    0x10C4, // Silicon Labs CP210x
    0x1A86, // WCH CH340/CH9102
    0x0403, // FTDI
    0x239A, // Adafruit / nRF52 boards
    0x303A, // Espressif native USB
];

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the device is.
#[derive(Debug, Clone, PartialEq)]
pub enum Transport {
    Tcp { addr: String },
    Serial { path: String },
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp { addr } => write!(f, "{addr}"),
            Transport::Serial { path } => write!(f, "{path}"),
        }
    }
}

/// First USB serial port with a known radio bridge, else the first USB port.
pub fn pick_serial_port(ports: &[SerialPortInfo]) -> Option<String> {
    let usb = ports.iter().filter_map(|p| match &p.port_type {
        SerialPortType::UsbPort(info) => Some((p, info.vid)),
        _ => None,
    });
    usb.clone()
        .find(|(_, vid)| RADIO_USB_VIDS.contains(vid))
        .or_else(|| usb.clone().next())
        .map(|(p, _)| p.port_name.clone())
}

/// Look for an attached radio among the system's serial ports.
pub fn detect_serial_port() -> Option<String> {
    match tokio_serial::available_ports() {
        Ok(ports) => pick_serial_port(&ports),
        Err(e) => {
            log::warn!("Could not list serial ports: {e}");
            None
        }
    }
}

fn drain<R>(mut reader: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 1024];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });
}

pub struct MeshtasticSink {
    transport: Transport,
    writer: Mutex<Option<Writer>>,
    ids: PacketIds,
}

impl MeshtasticSink {
    pub fn new(transport: Transport) -> Self {
        MeshtasticSink {
            transport,
            writer: Mutex::new(None),
            ids: PacketIds::new(),
        }
    }

    pub fn tcp(host: &str, port: u16) -> Self {
        MeshtasticSink::new(Transport::Tcp {
            addr: format!("{host}:{port}"),
        })
    }

    pub fn serial(path: &str) -> Self {
        MeshtasticSink::new(Transport::Serial {
            path: path.to_string(),
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Open the connection now instead of on first send.
    pub async fn connect(&self) -> Result<(), SinkError> {
        let writer = self.open().await?;
        *self.writer.lock().await = Some(writer);
        Ok(())
    }

    async fn open(&self) -> Result<Writer, SinkError> {
        let mut writer: Writer = match &self.transport {
            Transport::Tcp { addr } => {
                let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
                    .await
                    .map_err(|_| SinkError::Timeout(CONNECT_TIMEOUT))??;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                drain(reader);
                Box::new(writer)
            }
            Transport::Serial { path } => {
                let port = tokio_serial::new(path, SERIAL_BAUD)
                    .open_native_async()
                    .map_err(io::Error::from)?;
                let (reader, mut writer) = tokio::io::split(port);
                drain(reader);
                writer.write_all(&SERIAL_WAKE).await?;
                tokio::time::sleep(Duration::from_millis(100)).await;
                Box::new(writer)
            }
        };

        let hello = frame_stream(&ToRadio::WantConfigId(self.ids.next()).encode())?;
        writer.write_all(&hello).await?;
        log::debug!("Meshtastic stream open to {}", self.transport);
        Ok(writer)
    }
}

#[async_trait::async_trait]
impl Sink for MeshtasticSink {
    fn name(&self) -> &str {
        "meshtastic"
    }

    async fn send(&self, summary: &AircraftSummary) -> Result<(), SinkError> {
        let text = summary.to_text();
        let packet = MeshPacket::broadcast(0, self.ids.next(), Data::text(&text)?);
        let framed = frame_stream(&ToRadio::Packet(packet).encode())?;

        let mut guard = self.writer.lock().await;
        let mut writer = match guard.take() {
            Some(w) => w,
            None => self.open().await?,
        };
        // A failed write drops the connection; the next send reconnects.
        writer.write_all(&framed).await?;
        writer.flush().await?;
        *guard = Some(writer);

        log::info!("Sent to Meshtastic: {text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn summary() -> AircraftSummary {
        AircraftSummary {
            icao: "A1B2C3".into(),
            callsign: "UAL123".into(),
            lat: 37.0,
            lon: -122.0,
            altitude_ft: Some(35000),
            ground_speed_kts: None,
            track_deg: None,
            squawk: None,
            timestamp: 0.0,
        }
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[tokio::test]
    async fn test_send_writes_framed_text() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut got = Vec::new();
            let mut buf = [0u8; 512];
            while !contains(&got, b"UAL123 35000ft") {
                let n = sock.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed early");
                got.extend_from_slice(&buf[..n]);
            }
            got
        });

        let sink = MeshtasticSink::tcp("127.0.0.1", port);
        sink.connect().await.unwrap();
        sink.send(&summary()).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        // First frame is the config request
        assert_eq!(&got[..2], &[0x94, 0xC3]);
        assert!(contains(&got, b"UAL123 35000ft 37.00N/122.00W"));
    }

    #[tokio::test]
    async fn test_send_connects_lazily() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            sock.read(&mut buf).await.unwrap()
        });

        let sink = MeshtasticSink::tcp("127.0.0.1", port);
        sink.send(&summary()).await.unwrap();
        assert!(server.await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_send_without_device_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sink = MeshtasticSink::tcp("127.0.0.1", port);
        assert!(sink.send(&summary()).await.is_err());
    }

    fn usb(name: &str, vid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.into(),
            port_type: SerialPortType::UsbPort(tokio_serial::UsbPortInfo {
                vid,
                pid: 0x6001,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    fn builtin(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.into(),
            port_type: SerialPortType::Unknown,
        }
    }

    #[test]
    fn test_pick_serial_port() {
        assert_eq!(pick_serial_port(&[]), None);
        assert_eq!(pick_serial_port(&[builtin("/dev/ttyS0")]), None);

        let ports = [
            builtin("/dev/ttyS0"),
            usb("/dev/ttyUSB0", 0x067B),
            usb("/dev/ttyACM0", 0x239A),
        ];
        assert_eq!(pick_serial_port(&ports).as_deref(), Some("/dev/ttyACM0"));

        let ports = [builtin("/dev/ttyS0"), usb("/dev/ttyUSB3", 0x067B)];
        assert_eq!(pick_serial_port(&ports).as_deref(), Some("/dev/ttyUSB3"));
    }

    #[tokio::test]
    async fn test_serial_missing_device_fails() {
        let sink = MeshtasticSink::serial("/dev/no-such-radio");
        assert_eq!(
            sink.transport(),
            &Transport::Serial {
                path: "/dev/no-such-radio".into()
            }
        );
        assert!(matches!(sink.connect().await, Err(SinkError::Io(_))));
        assert!(sink.send(&summary()).await.is_err());
    }
}
