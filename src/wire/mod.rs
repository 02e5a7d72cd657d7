//! Wire codec: fixed-layout, little-endian frame serialization and parsing.
//!
//! Every frame is `BaseHeader ‖ type-specific trailer ‖ payload`, capped at
//! 255 bytes total. Parsing is built from `nom` combinators, mirroring how
//! the rest of this corpus decodes fixed binary layouts; serialization
//! writes into a growable [`bytes::BytesMut`].

use bytes::{BufMut, BytesMut};
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;

use crate::error::MeshError;

/// Reserved address meaning "no destination / invalid".
pub const ADDRESS_NONE: u16 = 0x0000;
/// Reserved address meaning "all nodes".
pub const ADDRESS_BROADCAST: u16 = 0xFFFF;

/// Maximum size of a complete frame on the wire.
pub const MAX_FRAME_SIZE: usize = 255;

/// Size, in bytes, of [`BaseHeader`] on the wire.
pub const BASE_HEADER_SIZE: usize = 6;
/// Size, in bytes, of one [`RoutingTableEntry`] on the wire.
pub const ROUTE_ENTRY_SIZE: usize = 5;
/// Size, in bytes, of the `ROUTE_TABLE` trailer (excluding entries).
pub const ROUTE_TABLE_TRAILER_SIZE: usize = 4;
/// Size, in bytes, of the `JOIN_RESPONSE` trailer.
pub const JOIN_RESPONSE_TRAILER_SIZE: usize = 4;

/// Tag byte identifying the frame's payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Data = 0x00,
    RouteTable = 0x01,
    JoinRequest = 0x02,
    JoinResponse = 0x03,
    SlotRequest = 0x04,
    SlotAllocation = 0x05,
    Ping = 0x06,
}

impl MessageType {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(MessageType::Data),
            0x01 => Some(MessageType::RouteTable),
            0x02 => Some(MessageType::JoinRequest),
            0x03 => Some(MessageType::JoinResponse),
            0x04 => Some(MessageType::SlotRequest),
            0x05 => Some(MessageType::SlotAllocation),
            0x06 => Some(MessageType::Ping),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// destination(2) ‖ source(2) ‖ type(1) ‖ payload_size(1), little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseHeader {
    pub destination: u16,
    pub source: u16,
    pub message_type: MessageType,
    pub payload_size: u8,
}

impl BaseHeader {
    pub const SIZE: usize = BASE_HEADER_SIZE;

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.destination);
        buf.put_u16_le(self.source);
        buf.put_u8(self.message_type.tag());
        buf.put_u8(self.payload_size);
    }

    fn parse(input: &[u8]) -> IResult<&[u8], BaseHeader> {
        let (input, destination) = le_u16(input)?;
        let (input, source) = le_u16(input)?;
        let (input, type_tag) = le_u8(input)?;
        let (input, payload_size) = le_u8(input)?;
        let message_type = MessageType::from_tag(type_tag).ok_or_else(|| {
            nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag))
        })?;
        Ok((
            input,
            BaseHeader {
                destination,
                source,
                message_type,
                payload_size,
            },
        ))
    }
}

/// Response status carried by a `JOIN_RESPONSE` trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JoinResponseStatus {
    Accepted = 0x00,
    Rejected = 0x01,
    CapacityExceeded = 0x02,
    AuthFailed = 0x03,
    RetryLater = 0x04,
}

impl JoinResponseStatus {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(JoinResponseStatus::Accepted),
            0x01 => Some(JoinResponseStatus::Rejected),
            0x02 => Some(JoinResponseStatus::CapacityExceeded),
            0x03 => Some(JoinResponseStatus::AuthFailed),
            0x04 => Some(JoinResponseStatus::RetryLater),
            _ => None,
        }
    }
}

/// A single route entry as it appears on the wire (5 bytes): destination(2)
/// ‖ hop_count(1) ‖ link_quality(1) ‖ allocated_data_slots(1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingTableEntry {
    pub destination: u16,
    pub hop_count: u8,
    pub link_quality: u8,
    pub allocated_data_slots: u8,
}

impl RoutingTableEntry {
    pub const SIZE: usize = ROUTE_ENTRY_SIZE;

    fn write(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.destination);
        buf.put_u8(self.hop_count);
        buf.put_u8(self.link_quality);
        buf.put_u8(self.allocated_data_slots);
    }

    fn parse(input: &[u8]) -> IResult<&[u8], RoutingTableEntry> {
        let (input, destination) = le_u16(input)?;
        let (input, hop_count) = le_u8(input)?;
        let (input, link_quality) = le_u8(input)?;
        let (input, allocated_data_slots) = le_u8(input)?;
        Ok((
            input,
            RoutingTableEntry {
                destination,
                hop_count,
                link_quality,
                allocated_data_slots,
            },
        ))
    }
}

/// A fully decoded frame: header plus type-specific content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Data {
        header: BaseHeader,
        payload: Vec<u8>,
    },
    RouteTable {
        header: BaseHeader,
        network_manager_addr: u16,
        table_version: u8,
        entries: Vec<RoutingTableEntry>,
    },
    JoinRequest {
        header: BaseHeader,
        payload: Vec<u8>,
    },
    JoinResponse {
        header: BaseHeader,
        network_id: u16,
        allocated_slots: u8,
        status: JoinResponseStatus,
    },
    SlotRequest {
        header: BaseHeader,
        payload: Vec<u8>,
    },
    SlotAllocation {
        header: BaseHeader,
        payload: Vec<u8>,
    },
    Ping {
        header: BaseHeader,
        payload: Vec<u8>,
    },
}

impl Message {
    /// The base header common to every message variant.
    pub fn header(&self) -> &BaseHeader {
        match self {
            Message::Data { header, .. }
            | Message::RouteTable { header, .. }
            | Message::JoinRequest { header, .. }
            | Message::JoinResponse { header, .. }
            | Message::SlotRequest { header, .. }
            | Message::SlotAllocation { header, .. }
            | Message::Ping { header, .. } => header,
        }
    }

    /// Total size, in bytes, this message will occupy on the wire.
    pub fn total_size(&self) -> usize {
        BaseHeader::SIZE + self.trailer_and_payload_size()
    }

    fn trailer_and_payload_size(&self) -> usize {
        match self {
            Message::Data { payload, .. }
            | Message::JoinRequest { payload, .. }
            | Message::SlotRequest { payload, .. }
            | Message::SlotAllocation { payload, .. }
            | Message::Ping { payload, .. } => payload.len(),
            Message::RouteTable { entries, .. } => {
                ROUTE_TABLE_TRAILER_SIZE + entries.len() * RoutingTableEntry::SIZE
            }
            Message::JoinResponse { .. } => JOIN_RESPONSE_TRAILER_SIZE,
        }
    }

    /// Serializes this message to its wire representation.
    ///
    /// Fails with [`MeshError::SerializationError`] if the result would
    /// exceed [`MAX_FRAME_SIZE`] or the payload/entry count does not fit
    /// the declared 8-bit size fields.
    pub fn serialize(&self) -> Result<Vec<u8>, MeshError> {
        let total = self.total_size();
        if total > MAX_FRAME_SIZE {
            return Err(MeshError::SerializationError(format!(
                "frame of {total} bytes exceeds the {MAX_FRAME_SIZE}-byte limit"
            )));
        }
        let mut buf = BytesMut::with_capacity(total);
        match self {
            Message::Data { header, payload }
            | Message::JoinRequest { header, payload }
            | Message::SlotRequest { header, payload }
            | Message::SlotAllocation { header, payload }
            | Message::Ping { header, payload } => {
                let payload_size = u8::try_from(payload.len()).map_err(|_| {
                    MeshError::SerializationError("payload exceeds 255 bytes".into())
                })?;
                let header = BaseHeader {
                    payload_size,
                    ..*header
                };
                header.write(&mut buf);
                buf.put_slice(payload);
            }
            Message::RouteTable {
                header,
                network_manager_addr,
                table_version,
                entries,
            } => {
                let entry_count = u8::try_from(entries.len()).map_err(|_| {
                    MeshError::SerializationError("too many routing entries for one frame".into())
                })?;
                let payload_size = u8::try_from(
                    ROUTE_TABLE_TRAILER_SIZE + entries.len() * RoutingTableEntry::SIZE,
                )
                .map_err(|_| {
                    MeshError::SerializationError("route table trailer too large".into())
                })?;
                let header = BaseHeader {
                    payload_size,
                    ..*header
                };
                header.write(&mut buf);
                buf.put_u16_le(*network_manager_addr);
                buf.put_u8(*table_version);
                buf.put_u8(entry_count);
                for entry in entries {
                    entry.write(&mut buf);
                }
            }
            Message::JoinResponse {
                header,
                network_id,
                allocated_slots,
                status,
            } => {
                let header = BaseHeader {
                    payload_size: JOIN_RESPONSE_TRAILER_SIZE as u8,
                    ..*header
                };
                header.write(&mut buf);
                buf.put_u16_le(*network_id);
                buf.put_u8(*allocated_slots);
                buf.put_u8(*status as u8);
            }
        }
        Ok(buf.to_vec())
    }

    /// Deserializes a message from raw bytes. See [`crate::wire`] module
    /// docs for the failure cases.
    pub fn deserialize(input: &[u8]) -> Result<Message, MeshError> {
        if input.len() > MAX_FRAME_SIZE {
            return Err(MeshError::Malformed(format!(
                "frame of {} bytes exceeds the {MAX_FRAME_SIZE}-byte limit",
                input.len()
            )));
        }
        let (rest, header) =
            BaseHeader::parse(input).map_err(|e| MeshError::Malformed(format!("{e}")))?;
        let payload_size = header.payload_size as usize;
        if rest.len() < payload_size {
            return Err(MeshError::Malformed(format!(
                "declared payload_size {payload_size} exceeds remaining {} bytes",
                rest.len()
            )));
        }
        let trailer = &rest[..payload_size];
        match header.message_type {
            MessageType::Data => Ok(Message::Data {
                header,
                payload: trailer.to_vec(),
            }),
            MessageType::JoinRequest => Ok(Message::JoinRequest {
                header,
                payload: trailer.to_vec(),
            }),
            MessageType::SlotRequest => Ok(Message::SlotRequest {
                header,
                payload: trailer.to_vec(),
            }),
            MessageType::SlotAllocation => Ok(Message::SlotAllocation {
                header,
                payload: trailer.to_vec(),
            }),
            MessageType::Ping => Ok(Message::Ping {
                header,
                payload: trailer.to_vec(),
            }),
            MessageType::RouteTable => {
                if trailer.len() < ROUTE_TABLE_TRAILER_SIZE {
                    return Err(MeshError::Malformed(
                        "route table trailer shorter than its fixed fields".into(),
                    ));
                }
                let (entry_bytes, network_manager_addr, table_version, entry_count) = {
                    let (input, network_manager_addr) = le_u16::<_, nom::error::Error<&[u8]>>(trailer)
                        .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                    let (input, table_version) = le_u8::<_, nom::error::Error<&[u8]>>(input)
                        .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                    let (input, entry_count) = le_u8::<_, nom::error::Error<&[u8]>>(input)
                        .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                    (input, network_manager_addr, table_version, entry_count)
                };
                let needed = entry_count as usize * RoutingTableEntry::SIZE;
                if entry_bytes.len() < needed {
                    return Err(MeshError::Malformed(format!(
                        "entry_count {entry_count} needs {needed} bytes, only {} available",
                        entry_bytes.len()
                    )));
                }
                let mut entries = Vec::with_capacity(entry_count as usize);
                let mut remaining = entry_bytes;
                for _ in 0..entry_count {
                    let (next, entry) = RoutingTableEntry::parse(remaining)
                        .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                    entries.push(entry);
                    remaining = next;
                }
                Ok(Message::RouteTable {
                    header,
                    network_manager_addr,
                    table_version,
                    entries,
                })
            }
            MessageType::JoinResponse => {
                if trailer.len() < JOIN_RESPONSE_TRAILER_SIZE {
                    return Err(MeshError::Malformed(
                        "join response trailer shorter than its fixed fields".into(),
                    ));
                }
                let (input, network_id) = le_u16::<_, nom::error::Error<&[u8]>>(trailer)
                    .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                let (input, allocated_slots) = le_u8::<_, nom::error::Error<&[u8]>>(input)
                    .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                let (_, status_tag) = le_u8::<_, nom::error::Error<&[u8]>>(input)
                    .map_err(|e| MeshError::Malformed(format!("{e}")))?;
                let status = JoinResponseStatus::from_tag(status_tag)
                    .ok_or_else(|| MeshError::Malformed(format!("unknown join response status {status_tag:#04x}")))?;
                Ok(Message::JoinResponse {
                    header,
                    network_id,
                    allocated_slots,
                    status,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(message_type: MessageType) -> BaseHeader {
        BaseHeader {
            destination: 0x1234,
            source: 0x0001,
            message_type,
            payload_size: 0,
        }
    }

    #[test]
    fn round_trips_data_message() {
        let msg = Message::Data {
            header: sample_header(MessageType::Data),
            payload: vec![1, 2, 3, 4],
        };
        let bytes = msg.serialize().unwrap();
        assert_eq!(bytes.len(), msg.total_size());
        let decoded = Message::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_route_table_message() {
        let msg = Message::RouteTable {
            header: sample_header(MessageType::RouteTable),
            network_manager_addr: 0x0001,
            table_version: 7,
            entries: vec![
                RoutingTableEntry {
                    destination: 0x0002,
                    hop_count: 1,
                    link_quality: 200,
                    allocated_data_slots: 2,
                },
                RoutingTableEntry {
                    destination: 0x0003,
                    hop_count: 2,
                    link_quality: 150,
                    allocated_data_slots: 1,
                },
            ],
        };
        let bytes = msg.serialize().unwrap();
        let decoded = Message::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn round_trips_join_response() {
        let msg = Message::JoinResponse {
            header: sample_header(MessageType::JoinResponse),
            network_id: 0xBEEF,
            allocated_slots: 3,
            status: JoinResponseStatus::Accepted,
        };
        let bytes = msg.serialize().unwrap();
        let decoded = Message::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn rejects_unknown_type_tag() {
        let mut bytes = vec![0x34, 0x12, 0x01, 0x00, 0xEE, 0x00];
        bytes[4] = 0xEE;
        let err = Message::deserialize(&bytes).unwrap_err();
        assert!(matches!(err, MeshError::Malformed(_)));
    }

    #[test]
    fn rejects_truncated_payload() {
        let header = BaseHeader {
            destination: 1,
            source: 2,
            message_type: MessageType::Data,
            payload_size: 10,
        };
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        let err = Message::deserialize(&buf).unwrap_err();
        assert!(matches!(err, MeshError::Malformed(_)));
    }

    #[test]
    fn rejects_route_table_with_undersized_entries() {
        let header = BaseHeader {
            destination: 1,
            source: 2,
            message_type: MessageType::RouteTable,
            payload_size: 0,
        };
        let mut buf = BytesMut::new();
        header.write(&mut buf);
        buf.put_u16_le(1);
        buf.put_u8(1);
        buf.put_u8(5); // claims 5 entries, supplies none
        let err = Message::deserialize(&buf).unwrap_err();
        assert!(matches!(err, MeshError::Malformed(_)));
    }

    #[test]
    fn rejects_oversized_frame() {
        let msg = Message::Data {
            header: sample_header(MessageType::Data),
            payload: vec![0u8; 250],
        };
        let err = msg.serialize().unwrap_err();
        assert!(matches!(err, MeshError::SerializationError(_)));
    }
}
