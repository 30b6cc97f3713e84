//! # Riptide Wire Format
//!
//! Fixed-width segment header — every integer little-endian, no padding.
//!
//! ```text
//!  0        4    5    6      8        12       16       20       24
//! +--------+----+----+------+--------+--------+--------+--------+---------
//! |  conv  |cmd |frg | wnd  |   ts   |   sn   |  una   |  len   | payload…
//! |  u32   | u8 | u8 | u16  |  u32   |  u32   |  u32   |  u32   |
//! +--------+----+----+------+--------+--------+--------+--------+---------
//! ```
//!
//! Multiple segments may be packed back to back in one datagram up to the
//! sender's MTU; decoding walks the buffer segment by segment. One malformed
//! segment invalidates the rest of the datagram it arrived in.

use bytes::{Buf, BufMut};

use crate::error::DecodeError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 24;

/// Largest number of fragments a single message may span — the fragment
/// index on the wire is one byte, counting down to zero.
pub const MAX_FRAGMENTS: usize = 255;

// ─── Command ─────────────────────────────────────────────────────────────────

/// Segment command discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Data segment carrying application payload.
    Push = 81,
    /// Acknowledgment of a single data segment.
    Ack = 82,
    /// Ask the peer to re-advertise its receive window.
    WindowProbe = 83,
    /// Unsolicited receive-window advertisement.
    WindowTell = 84,
}

impl Command {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            81 => Some(Command::Push),
            82 => Some(Command::Ack),
            83 => Some(Command::WindowProbe),
            84 => Some(Command::WindowTell),
            _ => None,
        }
    }
}

// ─── Segment Header ──────────────────────────────────────────────────────────

/// Decoded segment header — present on every Riptide segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Conversation identifier; both peers must use the same value.
    pub conv: u32,
    /// Command discriminant.
    pub cmd: Command,
    /// Fragments remaining after this one; 0 marks the end of a message.
    pub frg: u8,
    /// Free receive-window slots at the sender, in segments.
    pub wnd: u16,
    /// Sender-relative send time in milliseconds.
    pub ts: u32,
    /// Segment sequence number.
    pub sn: u32,
    /// Everything below this sequence has been received by the sender.
    pub una: u32,
    /// Payload length in bytes.
    pub len: u32,
}

impl SegmentHeader {
    /// Encode the header into a buffer. Panics if the buffer cannot hold
    /// [`HEADER_LEN`] more bytes.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.conv);
        buf.put_u8(self.cmd as u8);
        buf.put_u8(self.frg);
        buf.put_u16_le(self.wnd);
        buf.put_u32_le(self.ts);
        buf.put_u32_le(self.sn);
        buf.put_u32_le(self.una);
        buf.put_u32_le(self.len);
    }

    /// Decode one header and validate that the declared payload fits in the
    /// bytes that follow. On success the cursor is left at the start of the
    /// payload; on failure the cursor position is unspecified and the whole
    /// datagram must be discarded.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, DecodeError> {
        if buf.remaining() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader {
                remaining: buf.remaining(),
            });
        }

        let conv = buf.get_u32_le();
        let raw_cmd = buf.get_u8();
        let frg = buf.get_u8();
        let wnd = buf.get_u16_le();
        let ts = buf.get_u32_le();
        let sn = buf.get_u32_le();
        let una = buf.get_u32_le();
        let len = buf.get_u32_le();

        if len as usize > buf.remaining() {
            return Err(DecodeError::TruncatedPayload {
                declared: len as usize,
                remaining: buf.remaining(),
            });
        }
        let cmd = Command::from_byte(raw_cmd).ok_or(DecodeError::UnknownCommand(raw_cmd))?;

        Ok(SegmentHeader {
            conv,
            cmd,
            frg,
            wnd,
            ts,
            sn,
            una,
            len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    fn sample_header() -> SegmentHeader {
        SegmentHeader {
            conv: 0xDEAD_BEEF,
            cmd: Command::Push,
            frg: 3,
            wnd: 120,
            ts: 42_000,
            sn: 1001,
            una: 990,
            len: 0,
        }
    }

    // ─── Round Trip ─────────────────────────────────────────────────────

    #[test]
    fn header_roundtrip() {
        let hdr = sample_header();
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let decoded = SegmentHeader::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, hdr);
    }

    proptest! {
        #[test]
        fn proptest_header_roundtrip(
            conv in any::<u32>(),
            raw_cmd in 81u8..=84,
            frg in any::<u8>(),
            wnd in any::<u16>(),
            ts in any::<u32>(),
            sn in any::<u32>(),
            una in any::<u32>(),
        ) {
            let hdr = SegmentHeader {
                conv,
                cmd: Command::from_byte(raw_cmd).unwrap(),
                frg,
                wnd,
                ts,
                sn,
                una,
                len: 0,
            };
            let mut buf = BytesMut::new();
            hdr.encode(&mut buf);
            let decoded = SegmentHeader::decode(&mut buf.freeze()).unwrap();
            prop_assert_eq!(decoded, hdr);
        }

        #[test]
        fn proptest_short_buffers_rejected(extra in proptest::collection::vec(any::<u8>(), 0..HEADER_LEN)) {
            let mut cursor = &extra[..];
            let err = SegmentHeader::decode(&mut cursor).unwrap_err();
            let is_truncated = matches!(err, DecodeError::TruncatedHeader { .. });
            prop_assert!(is_truncated);
        }
    }

    // ─── Failure Modes ──────────────────────────────────────────────────

    #[test]
    fn truncated_header_reports_remaining() {
        let bytes = [0u8; 10];
        let err = SegmentHeader::decode(&mut &bytes[..]).unwrap_err();
        assert_eq!(err, DecodeError::TruncatedHeader { remaining: 10 });
    }

    #[test]
    fn truncated_payload_rejected() {
        let mut hdr = sample_header();
        hdr.len = 100; // declares more payload than follows
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        buf.extend_from_slice(&[0u8; 40]);

        let err = SegmentHeader::decode(&mut buf.freeze()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedPayload {
                declared: 100,
                remaining: 40
            }
        );
    }

    #[test]
    fn unknown_command_rejected() {
        let hdr = sample_header();
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        buf[4] = 0x7F; // overwrite the command byte

        let err = SegmentHeader::decode(&mut buf.freeze()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownCommand(0x7F));
    }

    #[test]
    fn command_bytes_match_wire_values() {
        assert_eq!(Command::Push as u8, 81);
        assert_eq!(Command::Ack as u8, 82);
        assert_eq!(Command::WindowProbe as u8, 83);
        assert_eq!(Command::WindowTell as u8, 84);
        assert_eq!(Command::from_byte(80), None);
        assert_eq!(Command::from_byte(85), None);
    }

    // ─── Packed Segments ────────────────────────────────────────────────

    #[test]
    fn packed_segments_decode_sequentially() {
        let mut buf = BytesMut::new();
        for sn in 0..3u32 {
            let mut hdr = sample_header();
            hdr.sn = sn;
            hdr.len = 4;
            hdr.encode(&mut buf);
            buf.extend_from_slice(&sn.to_le_bytes());
        }

        let mut cursor = buf.freeze();
        for expected in 0..3u32 {
            let hdr = SegmentHeader::decode(&mut cursor).unwrap();
            assert_eq!(hdr.sn, expected);
            let payload = cursor.split_to(hdr.len as usize);
            assert_eq!(&payload[..], expected.to_le_bytes());
        }
        assert!(!cursor.has_remaining());
    }
}
