//! Wire format for measurement reports.
//!
//! A report is a fixed three-byte record: the raw ADC sample in the order the
//! converter clocked it out (most significant byte first, never swapped),
//! followed by the one-byte cumulative charge count. The record rides behind a
//! transport envelope describing where and how the network layer should send
//! it.

pub mod convert;

use core::fmt;

use heapless::Vec;

use crate::record::MeasurementRecord;

/// Size of the encoded measurement record.
pub const PAYLOAD_LEN: usize = 3;

/// Size of the encoded envelope header that precedes the payload.
pub const ENVELOPE_LEN: usize = 22;

/// Total size of a framed send request.
pub const FRAME_LEN: usize = ENVELOPE_LEN + PAYLOAD_LEN;

/// Well-known UDP port reserved for user applications on the mesh.
pub const USER_PORT: u16 = 0xF0B8;

/// Packet identifier that asks the network layer not to report delivery.
pub const NO_NOTIFICATION: u16 = 0xFFFF;

/// Link-local multicast address that reaches the network manager (`ff02::2`).
pub const MANAGER_MULTICAST: [u8; 16] = [
    0xFF, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02,
];

/// Bandwidth class requested from the network layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ServiceClass {
    Bandwidth = 0x00,
}

/// Queueing priority requested from the network layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Priority {
    Low = 0x00,
    Medium = 0x01,
    High = 0x02,
}

/// Transport-defined header describing how a report should be sent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SendEnvelope {
    pub destination: [u8; 16],
    pub port: u16,
    pub service: ServiceClass,
    pub priority: Priority,
    pub packet_id: u16,
}

impl SendEnvelope {
    /// Manager multicast, user port, bandwidth service, medium priority, no
    /// delivery notification.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            destination: MANAGER_MULTICAST,
            port: USER_PORT,
            service: ServiceClass::Bandwidth,
            priority: Priority::Medium,
            packet_id: NO_NOTIFICATION,
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Returns `true` when the network layer should report delivery status.
    #[must_use]
    pub const fn wants_notification(&self) -> bool {
        self.packet_id != NO_NOTIFICATION
    }

    fn write_header(&self, out: &mut [u8; ENVELOPE_LEN]) {
        out[..16].copy_from_slice(&self.destination);
        out[16..18].copy_from_slice(&self.port.to_be_bytes());
        out[18] = self.service as u8;
        out[19] = self.priority as u8;
        out[20..22].copy_from_slice(&self.packet_id.to_be_bytes());
    }
}

impl Default for SendEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised while decoding a received payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PayloadError {
    Length { expected: usize, found: usize },
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadError::Length { expected, found } => {
                write!(f, "expected {expected} payload bytes, found {found}")
            }
        }
    }
}

/// Decoded view of the three-byte report.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReportPayload {
    pub sample: i16,
    pub charge: u8,
}

impl ReportPayload {
    #[must_use]
    pub const fn new(sample: i16, charge: u8) -> Self {
        Self { sample, charge }
    }

    /// Builds the payload from a record snapshot. The charge byte saturates.
    #[must_use]
    pub fn from_record(record: &MeasurementRecord) -> Self {
        Self::new(record.current_sample, record.cumulative_charge())
    }

    #[must_use]
    pub fn encode(&self) -> [u8; PAYLOAD_LEN] {
        let [high, low] = self.sample.to_be_bytes();
        [high, low, self.charge]
    }

    /// Parses a payload as received by the manager.
    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        let [high, low, charge] = <[u8; PAYLOAD_LEN]>::try_from(bytes).map_err(|_| {
            PayloadError::Length {
                expected: PAYLOAD_LEN,
                found: bytes.len(),
            }
        })?;

        Ok(Self::new(i16::from_be_bytes([high, low]), charge))
    }

    /// Sample field as the manager unpacks it (unsigned).
    #[must_use]
    pub fn raw_sample(&self) -> u16 {
        u16::from_be_bytes(self.sample.to_be_bytes())
    }
}

/// Encoded send request: envelope header followed by the payload.
pub type Frame = Vec<u8, FRAME_LEN>;

/// Serialises `payload` behind `envelope`.
#[must_use]
pub fn encode_frame(envelope: &SendEnvelope, payload: &ReportPayload) -> Frame {
    let mut header = [0u8; ENVELOPE_LEN];
    envelope.write_header(&mut header);

    let mut frame = Frame::new();
    // Both slices together are exactly FRAME_LEN bytes.
    let _ = frame.extend_from_slice(&header);
    let _ = frame.extend_from_slice(&payload.encode());
    frame
}
