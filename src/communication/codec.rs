use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::{
    communication::{CodecError, Envelope},
    Rank,
};

const HEADER_SIZE: usize = 8;

/// The serialized part of an [`Envelope`] that precedes the payload.
#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeHeader {
    src: Rank,
    tag: i32,
}

#[derive(Debug)]
enum DecodeStatus {
    Header,
    Metadata {
        metadata_size: usize,
        data_size: usize,
    },
    Data {
        data_size: usize,
    },
}

/// Encodes [`Envelope`]s into bytes, and decodes bytes into [`Envelope`]s.
///
/// For each message, the codec first writes the size of the serialized
/// envelope header and the size of the payload, then the header, and finally
/// the payload bytes.
#[derive(Debug)]
pub struct EnvelopeCodec {
    /// Current part of the message to decode.
    status: DecodeStatus,
    header: Option<EnvelopeHeader>,
}

impl EnvelopeCodec {
    pub fn new() -> EnvelopeCodec {
        EnvelopeCodec {
            status: DecodeStatus::Header,
            header: None,
        }
    }
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = CodecError;

    /// Decodes a sequence of bytes into an [`Envelope`].
    ///
    /// Reads the sizes, then the header, and finally the payload. Reserves
    /// memory for the entire message upon reading the sizes to reduce costly
    /// allocations.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Envelope>, CodecError> {
        match self.status {
            DecodeStatus::Header => {
                if buf.len() >= HEADER_SIZE {
                    let sizes = buf.split_to(HEADER_SIZE);
                    let metadata_size = NetworkEndian::read_u32(&sizes[0..4]) as usize;
                    let data_size = NetworkEndian::read_u32(&sizes[4..8]) as usize;
                    self.status = DecodeStatus::Metadata {
                        metadata_size,
                        data_size,
                    };
                    // Reserve space for the rest of the message and the next header.
                    buf.reserve(metadata_size + data_size + HEADER_SIZE);
                    self.decode(buf)
                } else {
                    Ok(None)
                }
            }
            DecodeStatus::Metadata {
                metadata_size,
                data_size,
            } => {
                if buf.len() >= metadata_size {
                    let header_bytes = buf.split_to(metadata_size);
                    let header: EnvelopeHeader =
                        bincode::deserialize(&header_bytes).map_err(CodecError::BincodeError)?;
                    self.header = Some(header);
                    self.status = DecodeStatus::Data { data_size };
                    self.decode(buf)
                } else {
                    Ok(None)
                }
            }
            DecodeStatus::Data { data_size } => {
                if buf.len() >= data_size {
                    let payload = buf.split_to(data_size).freeze();
                    let header = self.header.take().unwrap();
                    self.status = DecodeStatus::Header;
                    Ok(Some(Envelope {
                        src: header.src,
                        tag: header.tag,
                        payload,
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = CodecError;

    /// Encodes an [`Envelope`] into a buffer.
    ///
    /// First writes the header size and the payload size, then the
    /// serialized header, and finally the payload.
    fn encode(&mut self, envelope: Envelope, buf: &mut BytesMut) -> Result<(), CodecError> {
        let header = EnvelopeHeader {
            src: envelope.src,
            tag: envelope.tag,
        };
        let metadata = bincode::serialize(&header).map_err(CodecError::from)?;
        let mut sizes: Vec<u8> = Vec::with_capacity(HEADER_SIZE);
        sizes.write_u32::<NetworkEndian>(metadata.len() as u32)?;
        sizes.write_u32::<NetworkEndian>(envelope.payload.len() as u32)?;

        buf.reserve(HEADER_SIZE + metadata.len() + envelope.payload.len());
        buf.extend_from_slice(&sizes);
        buf.extend_from_slice(&metadata);
        buf.extend_from_slice(&envelope.payload);
        Ok(())
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::communication::MsgTag;

    #[test]
    fn decodes_across_partial_reads() {
        let mut codec = EnvelopeCodec::new();
        let envelope = Envelope {
            src: 2,
            tag: MsgTag::LogMessage.raw(),
            payload: Bytes::from_static(b"a log line"),
        };

        let mut wire = BytesMut::new();
        codec.encode(envelope, &mut wire).expect("encode failed");

        // Feed the bytes one half at a time; the decoder must wait for the
        // remainder before producing the envelope.
        let half = wire.len() / 2;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&wire[..half]);
        assert!(codec.decode(&mut buf).expect("decode failed").is_none());
        buf.extend_from_slice(&wire[half..]);
        let decoded = codec
            .decode(&mut buf)
            .expect("decode failed")
            .expect("expected a full envelope");
        assert_eq!(decoded.src, 2);
        assert_eq!(decoded.tag, MsgTag::LogMessage.raw());
        assert_eq!(&decoded.payload[..], b"a log line");
    }

    #[test]
    fn zero_byte_payloads_are_legal() {
        let mut codec = EnvelopeCodec::new();
        let envelope = Envelope {
            src: 0,
            tag: MsgTag::StopBlackboard.raw(),
            payload: Bytes::new(),
        };
        let mut wire = BytesMut::new();
        codec.encode(envelope, &mut wire).expect("encode failed");
        let decoded = codec
            .decode(&mut wire)
            .expect("decode failed")
            .expect("expected a full envelope");
        assert_eq!(decoded.payload.len(), 0);
        assert_eq!(decoded.tag, MsgTag::StopBlackboard.raw());
    }
}
