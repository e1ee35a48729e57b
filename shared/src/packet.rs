use thiserror::Error;

use crate::types::{PlayerId, Tick};
use crate::wire::{ByteReader, ByteWriter, WireError};

/// Errors that can occur while decoding packet framing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The packet kind byte does not name a known packet kind.
    #[error("unknown packet kind byte {kind:#04x}")]
    UnknownKind { kind: u8 },
}

/// Second byte of every engine packet, after the caller-chosen header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    /// Client -> server: delta-compressed per-tick input stream.
    ClientInput = 1,
    /// Client -> server: opaque request body forwarded to the user handler.
    ClientRequest = 2,
    /// Server -> client: reliable LZ4-compressed full baseline.
    BaselineSync = 3,
    /// Server -> client: non-terminal diff part.
    DiffSync = 4,
    /// Server -> client: terminal diff part carrying `LastPartData`.
    DiffSyncLast = 5,
}

impl PacketKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(kind: u8) -> Result<Self, PacketError> {
        match kind {
            1 => Ok(Self::ClientInput),
            2 => Ok(Self::ClientRequest),
            3 => Ok(Self::BaselineSync),
            4 => Ok(Self::DiffSync),
            5 => Ok(Self::DiffSyncLast),
            _ => Err(PacketError::UnknownKind { kind }),
        }
    }
}

/// Record tag inside baseline and diff payload streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Full entity record: id, version, class, owner, every visible field.
    Full = 0,
    /// Changed-field record: id, count, then `(field_index, value)` pairs.
    Fields = 1,
    /// Destruction record: id, version.
    Destroy = 2,
    /// Remote call record: id, rpc id, flags, element size/count, payload.
    Rpc = 3,
}

impl RecordKind {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(kind: u8) -> Result<Self, PacketError> {
        match kind {
            0 => Ok(Self::Full),
            1 => Ok(Self::Fields),
            2 => Ok(Self::Destroy),
            3 => Ok(Self::Rpc),
            _ => Err(PacketError::UnknownKind { kind }),
        }
    }
}

/// Per-frame header inside a `ClientInput` packet: the two server ticks the
/// client is interpolating between and the normalized fraction between them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPacketHeader {
    pub state_a: Tick,
    pub state_b: Tick,
    pub lerp_msec: f32,
}

impl InputPacketHeader {
    pub const SIZE: usize = 8;

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u16(self.state_a);
        writer.write_u16(self.state_b);
        writer.write_f32(self.lerp_msec);
    }

    pub fn read(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            state_a: reader.read_u16()?,
            state_b: reader.read_u16()?,
            lerp_msec: reader.read_f32()?,
        })
    }
}

/// Header of a reliable `BaselineSync` packet. The body that follows is the
/// LZ4-compressed baseline stream; `original_length` is its uncompressed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaselineDataHeader {
    pub user_header: u8,
    pub packet_kind: u8,
    pub original_length: u32,
    pub tick: Tick,
    pub player_id: PlayerId,
    pub send_rate: u8,
}

impl BaselineDataHeader {
    pub const SIZE: usize = 10;

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.user_header);
        writer.write_u8(self.packet_kind);
        writer.write_u32(self.original_length);
        writer.write_u16(self.tick);
        writer.write_u8(self.player_id);
        writer.write_u8(self.send_rate);
    }

    pub fn read(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            user_header: reader.read_u8()?,
            packet_kind: reader.read_u8()?,
            original_length: reader.read_u32()?,
            tick: reader.read_u16()?,
            player_id: reader.read_u8()?,
            send_rate: reader.read_u8()?,
        })
    }
}

/// Header of every unreliable diff part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffPartHeader {
    pub user_header: u8,
    pub packet_kind: u8,
    pub part: u8,
    pub tick: Tick,
}

impl DiffPartHeader {
    pub const SIZE: usize = 5;
    /// Byte offset of `packet_kind`, for in-place patching.
    pub const KIND_OFFSET: usize = 1;
    /// Byte offset of `part`, for in-place patching.
    pub const PART_OFFSET: usize = 2;

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.user_header);
        writer.write_u8(self.packet_kind);
        writer.write_u8(self.part);
        writer.write_u16(self.tick);
    }

    pub fn read(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            user_header: reader.read_u8()?,
            packet_kind: reader.read_u8()?,
            part: reader.read_u8()?,
            tick: reader.read_u16()?,
        })
    }
}

/// Trailer of the terminal diff part, echoing the server's view of the
/// player's input cursors plus the part capacity in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastPartData {
    pub last_processed_tick: Tick,
    pub last_received_tick: Tick,
    pub mtu: u16,
}

impl LastPartData {
    pub const SIZE: usize = 6;

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.write_u16(self.last_processed_tick);
        writer.write_u16(self.last_received_tick);
        writer.write_u16(self.mtu);
    }

    pub fn read(reader: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            last_processed_tick: reader.read_u16()?,
            last_received_tick: reader.read_u16()?,
            mtu: reader.read_u16()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_kind_round_trip() {
        for kind in [
            PacketKind::ClientInput,
            PacketKind::ClientRequest,
            PacketKind::BaselineSync,
            PacketKind::DiffSync,
            PacketKind::DiffSyncLast,
        ] {
            assert_eq!(PacketKind::from_u8(kind.to_u8()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_packet_kind_fails() {
        assert_eq!(
            PacketKind::from_u8(0xEE),
            Err(PacketError::UnknownKind { kind: 0xEE })
        );
        assert!(RecordKind::from_u8(9).is_err());
    }

    #[test]
    fn header_sizes_match_wire_length() {
        let mut writer = ByteWriter::new();
        InputPacketHeader {
            state_a: 1,
            state_b: 2,
            lerp_msec: 0.5,
        }
        .write(&mut writer);
        assert_eq!(writer.position(), InputPacketHeader::SIZE);

        let mut writer = ByteWriter::new();
        BaselineDataHeader {
            user_header: 0xAA,
            packet_kind: PacketKind::BaselineSync.to_u8(),
            original_length: 64,
            tick: 7,
            player_id: 1,
            send_rate: 2,
        }
        .write(&mut writer);
        assert_eq!(writer.position(), BaselineDataHeader::SIZE);

        let mut writer = ByteWriter::new();
        DiffPartHeader {
            user_header: 0xAA,
            packet_kind: PacketKind::DiffSync.to_u8(),
            part: 0,
            tick: 7,
        }
        .write(&mut writer);
        assert_eq!(writer.position(), DiffPartHeader::SIZE);

        let mut writer = ByteWriter::new();
        LastPartData {
            last_processed_tick: 1,
            last_received_tick: 2,
            mtu: 1200,
        }
        .write(&mut writer);
        assert_eq!(writer.position(), LastPartData::SIZE);
    }

    #[test]
    fn diff_part_header_patch_offsets() {
        let mut writer = ByteWriter::new();
        DiffPartHeader {
            user_header: 0xAA,
            packet_kind: PacketKind::DiffSync.to_u8(),
            part: 0,
            tick: 7,
        }
        .write(&mut writer);

        writer.patch_u8(DiffPartHeader::KIND_OFFSET, PacketKind::DiffSyncLast.to_u8());
        writer.patch_u8(DiffPartHeader::PART_OFFSET, 3);

        let mut reader = ByteReader::new(writer.as_slice());
        let header = DiffPartHeader::read(&mut reader).unwrap();
        assert_eq!(header.packet_kind, PacketKind::DiffSyncLast.to_u8());
        assert_eq!(header.part, 3);
        assert_eq!(header.tick, 7);
    }
}
