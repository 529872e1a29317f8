//! Async framing for record streams arriving over sockets or pipes.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{Record, RecordError, FRAME_HEADER_LEN};

/// # Record Codec
///
/// Plugs the heart protocol into `FramedRead`/`FramedWrite`. Same framing and
/// errors as the blocking reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordCodec;

impl Decoder for RecordCodec {
    type Item = Record;
    type Error = RecordError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Record>, RecordError> {
        if src.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let payload_len = usize::from(u16::from_be_bytes([src[1], src[2]]));
        let frame_len = FRAME_HEADER_LEN + payload_len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let tag = src[0];
        src.advance(FRAME_HEADER_LEN);
        let payload = src.split_to(payload_len);
        Record::decode_payload(tag, &payload).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Record>, RecordError> {
        match self.decode(src)? {
            Some(record) => Ok(Some(record)),
            None if src.is_empty() => Ok(None),
            None => Err(RecordError::UnexpectedEndOfStream { mid_frame: true }),
        }
    }
}

impl Encoder<Record> for RecordCodec {
    type Error = RecordError;

    fn encode(&mut self, record: Record, dst: &mut BytesMut) -> Result<(), RecordError> {
        record.encode_into(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tokio_util::codec::FramedRead;

    #[test]
    fn test_partial_frames_wait_for_more_bytes() {
        let bytes = Record::HeartData(vec![100, 200, 300]).encode();
        let mut codec = RecordCodec;
        let mut buf = BytesMut::new();

        for byte in &bytes[..bytes.len() - 1] {
            buf.extend_from_slice(&[*byte]);
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Record::HeartData(vec![100, 200, 300]))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_unknown_tag_surfaces() {
        let mut buf = BytesMut::from(&[99u8, 0, 0][..]);
        assert!(matches!(
            RecordCodec.decode(&mut buf),
            Err(RecordError::UnknownRecordType(99))
        ));
    }

    #[tokio::test]
    async fn test_framed_read_over_async_stream() {
        let mut bytes = Vec::new();
        bytes.extend(Record::Error("probe".into()).encode());
        bytes.extend(Record::HeartData(vec![1, 2]).encode());

        let frames: Vec<Record> = FramedRead::new(&bytes[..], RecordCodec)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(
            frames,
            vec![Record::Error("probe".into()), Record::HeartData(vec![1, 2])]
        );
    }

    #[tokio::test]
    async fn test_framed_read_truncated_tail() {
        let mut bytes = Record::HeartData(vec![1, 2]).encode();
        bytes.truncate(bytes.len() - 1);

        let mut frames = FramedRead::new(&bytes[..], RecordCodec);
        assert!(matches!(
            frames.next().await,
            Some(Err(RecordError::UnexpectedEndOfStream { mid_frame: true }))
        ));
    }
}
