use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::kind::MessageKind;
use crate::subsystem::Subsystem;

/// Start-of-frame marker.
pub const SOF: u8 = 0xFE;

/// Frame header: SOF (1) + length (1) + cmd0 (1) + cmd1 (1) = 4 bytes.
pub const HEADER_SIZE: usize = 4;

/// Frame trailer: checksum (1).
pub const TRAILER_SIZE: usize = 1;

/// Maximum payload size allowed by the protocol.
pub const MAX_PAYLOAD: usize = 250;

/// A protocol message: kind, subsystem, command id and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Message kind (POLL, SREQ, AREQ, SRSP).
    pub kind: MessageKind,
    /// Functional area the command belongs to.
    pub subsystem: Subsystem,
    /// Command id within the subsystem.
    pub command_id: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(
        kind: MessageKind,
        subsystem: Subsystem,
        command_id: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            kind,
            subsystem,
            command_id,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }

    /// Command header byte combining kind and subsystem.
    pub fn cmd0(&self) -> u8 {
        (self.kind.to_wire() << 5) | self.subsystem.id()
    }

    /// Encode this frame into a freshly allocated buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut buf)?;
        Ok(buf.freeze())
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬────────┬──────────────────┬────────┬───────────┬──────┐
/// │ SOF  │ Length │ Cmd0             │ Cmd1   │ Payload   │ FCS  │
/// │ 0xFE │ (1B)   │ kind<<5 | subsys │ cmd id │ (Length)  │ XOR  │
/// └──────┴────────┴──────────────────┴────────┴───────────┴──────┘
/// ```
///
/// The checksum covers everything between SOF and FCS.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: frame.payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(frame.wire_size());
    let start = dst.len();
    dst.put_u8(SOF);
    dst.put_u8(frame.payload.len() as u8);
    dst.put_u8(frame.cmd0());
    dst.put_u8(frame.command_id);
    dst.put_slice(&frame.payload);
    let fcs = checksum(&dst[start + 1..]);
    dst.put_u8(fcs);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Bytes ahead of the next start-of-frame marker are discarded. A frame that
/// fails validation is consumed before the error is returned, so the next call
/// starts on a fresh boundary.
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<Frame>> {
    match src.iter().position(|&b| b == SOF) {
        Some(0) => {}
        Some(skip) => {
            trace!(skip, "discarding bytes before start of frame");
            src.advance(skip);
        }
        None => {
            if !src.is_empty() {
                trace!(skip = src.len(), "discarding bytes without start of frame");
                src.clear();
            }
            return Ok(None);
        }
    }

    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let payload_len = src[1] as usize;
    if payload_len > MAX_PAYLOAD {
        // The length byte is garbage; drop the marker and resync on the next one.
        src.advance(1);
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: MAX_PAYLOAD,
        });
    }

    let total = HEADER_SIZE + payload_len + TRAILER_SIZE;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    let expected = checksum(&src[1..total - 1]);
    let actual = src[total - 1];
    if expected != actual {
        src.advance(total);
        return Err(FrameError::ChecksumMismatch { expected, actual });
    }

    let cmd0 = src[2];
    let command_id = src[3];
    let kind = match MessageKind::from_wire(cmd0 >> 5) {
        Ok(kind) => kind,
        Err(err) => {
            src.advance(total);
            return Err(err);
        }
    };

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    src.advance(TRAILER_SIZE);

    Ok(Some(Frame {
        kind,
        subsystem: Subsystem::new(cmd0),
        command_id,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areq_zdo() -> Frame {
        Frame::new(
            MessageKind::AsyncRequest,
            Subsystem::ZDO,
            1,
            Bytes::from_static(&[0x78]),
        )
    }

    #[test]
    fn test_encode_matches_wire_layout() {
        let mut buf = BytesMut::new();
        encode_frame(&areq_zdo(), &mut buf).unwrap();

        // cmd0 = AREQ(2) << 5 | ZDO(5) = 0x45; fcs = 0x01 ^ 0x45 ^ 0x01 ^ 0x78.
        assert_eq!(buf.as_ref(), &[0xFE, 0x01, 0x45, 0x01, 0x78, 0x3D]);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let frame = areq_zdo();
        encode_frame(&frame, &mut buf).unwrap();
        assert_eq!(buf.len(), frame.wire_size());

        let decoded = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let frame = Frame::new(
            MessageKind::SyncRequest,
            Subsystem::SYS,
            2,
            vec![0u8; MAX_PAYLOAD + 1],
        );
        let mut buf = BytesMut::new();
        let err = encode_frame(&frame, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 251, .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[SOF, 0x01][..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(&areq_zdo(), &mut buf).unwrap();
        buf.truncate(HEADER_SIZE);

        assert!(decode_frame(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_skips_leading_garbage() {
        let mut buf = BytesMut::from(&[0x00, 0x13, 0x37][..]);
        encode_frame(&areq_zdo(), &mut buf).unwrap();

        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame, areq_zdo());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_discards_buffer_without_sof() {
        let mut buf = BytesMut::from(&[0x01, 0x02, 0x03][..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_checksum_mismatch_consumes_frame_and_keeps_framing() {
        let mut buf = BytesMut::new();
        encode_frame(&areq_zdo(), &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        let good = Frame::new(MessageKind::Poll, Subsystem::SYS, 2, Bytes::new());
        encode_frame(&good, &mut buf).unwrap();

        let err = decode_frame(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        let next = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(next, good);
    }

    #[test]
    fn test_unknown_kind_is_consumed() {
        // cmd0 with kind bits = 7.
        let body = [0x00u8, 0xE1, 0x02];
        let mut buf = BytesMut::new();
        buf.put_u8(SOF);
        buf.put_slice(&body);
        buf.put_u8(checksum(&body));

        let err = decode_frame(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::UnknownKind(7)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_impossible_length_resyncs() {
        let mut buf = BytesMut::from(&[SOF, 0xFF, 0x00, 0x00][..]);
        encode_frame(&areq_zdo(), &mut buf).unwrap();

        let err = decode_frame(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 255, .. }));

        let frame = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(frame, areq_zdo());
    }

    #[test]
    fn test_multiple_frames_and_empty_payload() {
        let first = areq_zdo();
        let second = Frame::new(MessageKind::SyncResponse, Subsystem::SYS, 2, Bytes::new());
        let mut buf = BytesMut::new();
        encode_frame(&first, &mut buf).unwrap();
        encode_frame(&second, &mut buf).unwrap();

        assert_eq!(decode_frame(&mut buf).unwrap().unwrap(), first);
        let decoded = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, second);
        assert!(decoded.payload.is_empty());
        assert!(buf.is_empty());
    }
}
