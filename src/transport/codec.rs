//! Frame codec for the raw stream transport.
//!
//! Every frame is self-delimiting (big-endian lengths):
//!
//! ```text
//! +--------+------+--------+------------+-----------+-------------+----+--------+-------+---------+
//! | "TMF1" | kind | id_len | source_len | topic_len | payload_len | id | source | topic | payload |
//! |   4    |  1   |   2    |     2      |     2     |      4      |    |        |       |         |
//! +--------+------+--------+------------+-----------+-------------+----+--------+-------+---------+
//! ```
//!
//! `decode` works on a reassembly buffer that may end in a partial frame. It
//! only ever consumes bytes it has either turned into a message or proven
//! invalid, so a valid frame following garbage is always recovered.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::broker::message::{Message, MessageKind};
use crate::utils::error::FrameError;

pub const MAGIC: &[u8; 4] = b"TMF1";
pub const HEADER_LEN: usize = 15;
pub const MAX_PAYLOAD_LEN: usize = 4 * 1024 * 1024;

/// Append the frame for `message` to `dst`.
pub fn encode(message: &Message, dst: &mut BytesMut) -> Result<(), FrameError> {
    let id_len = field_len("message_id", &message.message_id)?;
    let source_len = field_len("source", &message.source)?;
    let topic_len = field_len("topic", &message.topic)?;
    let payload_len = message.payload.len();
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            len: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    dst.reserve(HEADER_LEN + id_len as usize + source_len as usize + topic_len as usize + payload_len);
    dst.put_slice(MAGIC);
    dst.put_u8(message.kind.as_u8());
    dst.put_u16(id_len);
    dst.put_u16(source_len);
    dst.put_u16(topic_len);
    dst.put_u32(payload_len as u32);
    dst.put_slice(message.message_id.as_bytes());
    dst.put_slice(message.source.as_bytes());
    dst.put_slice(message.topic.as_bytes());
    dst.put_slice(&message.payload);
    Ok(())
}

pub fn encode_to_bytes(message: &Message) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::new();
    encode(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Take the next complete frame off the front of `src`.
///
/// - `Ok(Some(_))`: one frame consumed.
/// - `Ok(None)`: `src` holds at most a partial frame; it is left as is.
/// - `Err(_)`: invalid bytes were consumed; call again to continue.
pub fn decode(src: &mut BytesMut) -> Result<Option<Message>, FrameError> {
    match find_magic(src) {
        Some(0) => {}
        Some(skipped) => {
            src.advance(skipped);
            return Err(FrameError::Garbage { skipped });
        }
        None => {
            // keep a tail that could still be the start of a magic
            let keep = partial_magic_suffix(src);
            let skipped = src.len() - keep;
            if skipped == 0 {
                return Ok(None);
            }
            src.advance(skipped);
            return Err(FrameError::Garbage { skipped });
        }
    }

    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    let mut header = &src[MAGIC.len()..HEADER_LEN];
    let raw_kind = header.get_u8();
    let id_len = header.get_u16() as usize;
    let source_len = header.get_u16() as usize;
    let topic_len = header.get_u16() as usize;
    let payload_len = header.get_u32() as usize;

    let Some(kind) = MessageKind::from_u8(raw_kind) else {
        src.advance(MAGIC.len());
        return Err(FrameError::UnknownKind(raw_kind));
    };
    if payload_len > MAX_PAYLOAD_LEN {
        src.advance(MAGIC.len());
        return Err(FrameError::PayloadTooLarge {
            len: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    let frame_len = HEADER_LEN + id_len + source_len + topic_len + payload_len;
    if src.len() < frame_len {
        src.reserve(frame_len - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(frame_len);
    frame.advance(HEADER_LEN);
    let message_id = take_string(&mut frame, id_len, "message_id")?;
    let source = take_string(&mut frame, source_len, "source")?;
    let topic = take_string(&mut frame, topic_len, "topic")?;
    let payload = frame.split_to(payload_len).freeze();

    Ok(Some(Message {
        kind,
        message_id,
        source,
        topic,
        payload,
    }))
}

fn field_len(field: &'static str, value: &str) -> Result<u16, FrameError> {
    u16::try_from(value.len()).map_err(|_| FrameError::FieldTooLong {
        field,
        len: value.len(),
    })
}

fn take_string(frame: &mut BytesMut, len: usize, field: &'static str) -> Result<String, FrameError> {
    let raw = frame.split_to(len);
    String::from_utf8(raw.into()).map_err(|_| FrameError::InvalidUtf8 { field })
}

fn find_magic(src: &[u8]) -> Option<usize> {
    src.windows(MAGIC.len()).position(|w| w == MAGIC)
}

/// Length of the longest suffix of `src` that is a proper prefix of the magic.
fn partial_magic_suffix(src: &[u8]) -> usize {
    (1..MAGIC.len())
        .rev()
        .find(|&n| src.len() >= n && src[src.len() - n..] == MAGIC[..n])
        .unwrap_or(0)
}
