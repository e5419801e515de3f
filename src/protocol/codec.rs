use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, ETHER_MIN_LEN};
use super::frame::Frame;

/// Frame codec for link-layer transports.
///
/// Link-layer reads deliver whole frames, so every non-empty read decodes
/// to exactly one [`Frame`]. Encoding pads short frames to the Ethernet
/// minimum.
#[derive(Clone, Default)]
pub struct FrameCodec;

impl FrameCodec {
    /// Creates a new frame codec
    pub fn new() -> Self {
        FrameCodec
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // Take the whole datagram
        let data = src.split();
        Frame::from_bytes(&data).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len();
        dst.reserve(len.max(ETHER_MIN_LEN));
        dst.extend_from_slice(item.as_bytes());

        // Pad to the minimum frame size
        if len < ETHER_MIN_LEN {
            dst.put_bytes(0, ETHER_MIN_LEN - len);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Config, MacAddress, MAX_FRAME_SIZE};
    use crate::protocol::loopback::build_lbm;
    use crate::protocol::Opcode;

    fn lbm() -> Frame {
        let config = Config {
            remote_mac: Some(MacAddress([0x02, 0, 0, 0, 0, 0x02])),
            ..Default::default()
        };
        build_lbm(&config, MacAddress([0x02, 0, 0, 0, 0, 0x01]), 99).unwrap()
    }

    #[test]
    fn test_encode_pads_short_frames() {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::new();
        let frame = lbm();
        let len = frame.len();
        assert!(len < ETHER_MIN_LEN);

        codec.encode(frame.clone(), &mut bytes).unwrap();
        assert_eq!(bytes.len(), ETHER_MIN_LEN);
        assert_eq!(&bytes[..len], frame.as_bytes());
        assert!(bytes[len..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_padded_frame() {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::new();
        codec.encode(lbm(), &mut bytes).unwrap();

        let decoded = codec.decode(&mut bytes).unwrap().unwrap();
        assert!(bytes.is_empty());
        assert_eq!(decoded.opcode().unwrap(), Opcode::Lbm);
        assert_eq!(decoded.transaction_id().unwrap(), 99);
        // padding reads as End TLVs
        assert_eq!(decoded.tlvs().unwrap().count(), 1);
        assert!(codec.decode(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_decode_oversized_frame() {
        let mut codec = FrameCodec::new();
        let mut bytes = BytesMut::from(&vec![0u8; MAX_FRAME_SIZE + 1][..]);
        assert!(matches!(codec.decode(&mut bytes), Err(Error::FrameTooLarge { .. })));
    }
}
