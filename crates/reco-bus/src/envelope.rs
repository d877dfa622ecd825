//! # Wire Envelope
//!
//! Every message crosses the transport as:
//!
//! ```text
//! ┌──────────┬──────────────┬────────┬──────────┬───────────────┬───────────┐
//! │ u16 len  │ name (utf-8) │ domain │ u16 len  │ source (utf8) │ payload.. │
//! └──────────┴──────────────┴────────┴──────────┴───────────────┴───────────┘
//! ```
//!
//! Lengths are big-endian. The payload runs to the end of the frame and is
//! produced by the configured [`Serializer`].

use crate::codec::Serializer;
use crate::error::{BusError, BusResult};
use crate::message::{Domain, Message};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// A decoded envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Message carried by the envelope.
    pub message: Message,
    /// Domain the message was sent in.
    pub domain: Domain,
    /// Name of the sending node.
    pub source: String,
}

impl Envelope {
    /// Encode a message for the wire.
    pub fn encode(
        message: &Message,
        domain: Domain,
        source: &str,
        serializer: &dyn Serializer,
    ) -> BusResult<Bytes> {
        let payload = serializer.serialize(message.payload())?;

        let mut buf = BytesMut::with_capacity(5 + message.name().len() + source.len() + payload.len());
        put_str(&mut buf, message.name())?;
        buf.put_u8(domain.code());
        put_str(&mut buf, source)?;
        buf.put_slice(&payload);
        Ok(buf.freeze())
    }

    /// Decode a frame received from the wire.
    pub fn decode(mut frame: Bytes, serializer: &dyn Serializer) -> BusResult<Self> {
        let name = get_str(&mut frame, "name")?;
        if !frame.has_remaining() {
            return Err(BusError::Decode("missing domain byte".into()));
        }
        let domain = Domain::from_code(frame.get_u8())?;
        let source = get_str(&mut frame, "source")?;
        let payload = serializer.deserialize(&frame)?;

        Ok(Self {
            message: Message::new(name, payload),
            domain,
            source,
        })
    }
}

fn put_str(buf: &mut BytesMut, s: &str) -> BusResult<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| BusError::Encode(format!("string of {} bytes exceeds frame field", s.len())))?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str(frame: &mut Bytes, field: &str) -> BusResult<String> {
    if frame.remaining() < 2 {
        return Err(BusError::Decode(format!("truncated {field} length")));
    }
    let len = usize::from(frame.get_u16());
    if frame.remaining() < len {
        return Err(BusError::Decode(format!(
            "truncated {field}: need {len} bytes, have {}",
            frame.remaining()
        )));
    }
    let raw = frame.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| BusError::Decode(format!("{field} is not utf-8")))
}
