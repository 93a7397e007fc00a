//! Minimal protobuf encoder for the handful of Meshtastic messages we send.
//!
//! Only encoding, only the fields the gateway sets. Field numbers follow
//! `meshtastic/mesh.proto` and `meshtastic/portnums.proto`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Destination address meaning "every node".
pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;

/// Largest `Data.payload` the firmware accepts.
pub const MAX_PAYLOAD_LEN: usize = 233;

/// Largest framed packet on the TCP/serial stream API.
pub const MAX_STREAM_PACKET: usize = 512;

/// Stream API frame header.
const START1: u8 = 0x94;
const START2: u8 = 0xC3;

/// Default hop limit for packets we originate.
pub const DEFAULT_HOP_LIMIT: u32 = 3;

#[derive(Debug, Error, PartialEq)]
pub enum ProtoError {
    #[error("payload is {0} bytes, limit is {MAX_PAYLOAD_LEN}")]
    PayloadTooLarge(usize),
    #[error("encoded packet is {0} bytes, stream limit is {MAX_STREAM_PACKET}")]
    PacketTooLarge(usize),
}

/// Application port numbers (subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortNum {
    TextMessage = 1,
    NodeInfo = 4,
}

// ---------------------------------------------------------------------------
// Wire primitives
// ---------------------------------------------------------------------------

const WIRE_VARINT: u8 = 0;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

fn put_varint(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

fn put_key(buf: &mut Vec<u8>, field: u32, wire: u8) {
    put_varint(buf, ((field as u64) << 3) | wire as u64);
}

// proto3 scalars at their default value are omitted from the wire.

fn put_uint32(buf: &mut Vec<u8>, field: u32, v: u32) {
    if v != 0 {
        put_key(buf, field, WIRE_VARINT);
        put_varint(buf, v as u64);
    }
}

fn put_bool(buf: &mut Vec<u8>, field: u32, v: bool) {
    if v {
        put_key(buf, field, WIRE_VARINT);
        buf.push(1);
    }
}

fn put_fixed32(buf: &mut Vec<u8>, field: u32, v: u32) {
    if v != 0 {
        put_key(buf, field, WIRE_FIXED32);
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_bytes(buf: &mut Vec<u8>, field: u32, v: &[u8]) {
    if !v.is_empty() {
        put_key(buf, field, WIRE_LEN);
        put_varint(buf, v.len() as u64);
        buf.extend_from_slice(v);
    }
}

/// Embedded messages are written even when empty: presence selects the oneof arm.
fn put_message(buf: &mut Vec<u8>, field: u32, encoded: &[u8]) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, encoded.len() as u64);
    buf.extend_from_slice(encoded);
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// `Data`: the decoded (plaintext) payload of a mesh packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    pub portnum: PortNum,
    pub payload: Vec<u8>,
}

impl Data {
    pub fn text(text: &str) -> Result<Self, ProtoError> {
        if text.len() > MAX_PAYLOAD_LEN {
            return Err(ProtoError::PayloadTooLarge(text.len()));
        }
        Ok(Data {
            portnum: PortNum::TextMessage,
            payload: text.as_bytes().to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.payload.len() + 4);
        put_uint32(&mut buf, 1, self.portnum as u32);
        put_bytes(&mut buf, 2, &self.payload);
        buf
    }
}

/// `User`: node identity announced with `NODEINFO_APP`.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub long_name: String,
    pub short_name: String,
}

impl User {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_bytes(&mut buf, 1, self.id.as_bytes());
        put_bytes(&mut buf, 2, self.long_name.as_bytes());
        put_bytes(&mut buf, 3, self.short_name.as_bytes());
        buf
    }
}

/// The `payload_variant` oneof of a `MeshPacket`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Decoded(Data),
    /// AES-CTR ciphertext of an encoded `Data`.
    Encrypted(Vec<u8>),
}

/// `MeshPacket`: one packet as it travels between nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPacket {
    pub from: u32,
    pub to: u32,
    /// Channel index on the stream API, channel hash on the air.
    pub channel: u32,
    pub payload: Payload,
    pub id: u32,
    pub hop_limit: u32,
    pub want_ack: bool,
}

impl MeshPacket {
    /// Broadcast `decoded` on the primary channel.
    pub fn broadcast(from: u32, id: u32, decoded: Data) -> Self {
        MeshPacket {
            from,
            to: BROADCAST_ADDR,
            channel: 0,
            payload: Payload::Decoded(decoded),
            id,
            hop_limit: DEFAULT_HOP_LIMIT,
            want_ack: false,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_fixed32(&mut buf, 1, self.from);
        put_fixed32(&mut buf, 2, self.to);
        put_uint32(&mut buf, 3, self.channel);
        match &self.payload {
            Payload::Decoded(data) => put_message(&mut buf, 4, &data.encode()),
            Payload::Encrypted(bytes) => put_message(&mut buf, 5, bytes),
        }
        put_fixed32(&mut buf, 6, self.id);
        put_uint32(&mut buf, 9, self.hop_limit);
        put_bool(&mut buf, 10, self.want_ack);
        buf
    }
}

/// `ToRadio`: what a client writes to a device over the stream API.
#[derive(Debug, Clone, PartialEq)]
pub enum ToRadio {
    Packet(MeshPacket),
    WantConfigId(u32),
}

impl ToRadio {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            ToRadio::Packet(p) => put_message(&mut buf, 1, &p.encode()),
            ToRadio::WantConfigId(id) => {
                // Written even if zero: the oneof arm must be present
                put_key(&mut buf, 3, WIRE_VARINT);
                put_varint(&mut buf, *id as u64);
            }
        }
        buf
    }
}

/// Wrap an encoded protobuf in the stream API header: `94 C3 <len:u16 BE>`.
pub fn frame_stream(encoded: &[u8]) -> Result<Vec<u8>, ProtoError> {
    if encoded.len() > MAX_STREAM_PACKET {
        return Err(ProtoError::PacketTooLarge(encoded.len()));
    }
    let mut out = Vec::with_capacity(encoded.len() + 4);
    out.push(START1);
    out.push(START2);
    out.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
    out.extend_from_slice(encoded);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Node identity helpers
// ---------------------------------------------------------------------------

/// Node number from a `!xxxxxxxx` id. Non-hex ids hash (FNV-1a) to 32 bits.
pub fn node_num_from_id(id: &str) -> u32 {
    let hex = id.strip_prefix('!').unwrap_or(id);
    if hex.len() == 8 {
        if let Ok(n) = u32::from_str_radix(hex, 16) {
            return n;
        }
    }
    let mut h: u32 = 0x811C_9DC5;
    for b in id.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

/// Non-zero packet ids, starting from a time-derived seed.
pub struct PacketIds(AtomicU32);

impl PacketIds {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(1);
        PacketIds(AtomicU32::new(seed))
    }

    pub fn next(&self) -> u32 {
        loop {
            let id = self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for PacketIds {
    fn default() -> Self {
        PacketIds::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
