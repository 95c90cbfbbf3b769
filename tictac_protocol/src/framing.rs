// Length-delimited JSON framing over any byte stream.
//
// Wire format: a 4-byte big-endian length prefix followed by that many bytes
// of UTF-8 JSON. `write_frame`/`read_frame` combine framing with serde so
// callers deal in message values; `write_raw`/`read_raw` expose the bare
// framing for tests that need to craft invalid payloads.
//
// Every message in this protocol is small (the largest is a `state` frame of
// well under 100 bytes), so `MAX_FRAME_SIZE` is tight. A length prefix above
// it is treated as a corrupt or hostile stream.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Maximum payload size accepted or produced (64 KiB).
pub const MAX_FRAME_SIZE: u32 = 64 * 1024;

/// Errors from reading or writing a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame too large: {len} bytes (max {max})")]
    TooLarge { len: usize, max: u32 },
}

impl FrameError {
    /// True when the peer closed the stream or the socket was torn down,
    /// as opposed to a protocol violation.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            ),
            Self::Json(_) | Self::TooLarge { .. } => false,
        }
    }
}

/// Write one length-prefixed payload and flush.
pub fn write_raw<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    let len = payload.len();
    let len_prefix = u32::try_from(len)
        .ok()
        .filter(|l| *l <= MAX_FRAME_SIZE)
        .ok_or(FrameError::TooLarge {
            len,
            max: MAX_FRAME_SIZE,
        })?;
    writer.write_all(&len_prefix.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed payload.
///
/// A stream that closes before or inside a frame yields an `Io` error of
/// kind `UnexpectedEof`.
pub fn read_raw<R: Read>(reader: &mut R) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            len: len as usize,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Serialize `message` to JSON and write it as one frame.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), FrameError> {
    let json = serde_json::to_vec(message)?;
    write_raw(writer, &json)
}

/// Read one frame and deserialize its JSON payload.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, FrameError> {
    let bytes = read_raw(reader)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::message::{ClientMessage, ServerMessage};
    use crate::types::Role;

    #[test]
    fn frame_has_big_endian_length_prefix() {
        let mut buf = Vec::new();
        write_raw(&mut buf, b"{}").unwrap();
        assert_eq!(buf, vec![0, 0, 0, 2, b'{', b'}']);
    }

    #[test]
    fn sequential_frames_decode_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &ClientMessage::Hello {
            session: "lobby".into(),
        })
        .unwrap();
        write_frame(&mut buf, &ClientMessage::Move { idx: 4 }).unwrap();
        write_frame(&mut buf, &ClientMessage::Restart).unwrap();

        let mut cursor = Cursor::new(buf);
        let first: ClientMessage = read_frame(&mut cursor).unwrap();
        let second: ClientMessage = read_frame(&mut cursor).unwrap();
        let third: ClientMessage = read_frame(&mut cursor).unwrap();
        assert_eq!(first, ClientMessage::Hello {
            session: "lobby".into()
        });
        assert_eq!(second, ClientMessage::Move { idx: 4 });
        assert_eq!(third, ClientMessage::Restart);
    }

    #[test]
    fn rejects_oversized_write() {
        let big = vec![b' '; MAX_FRAME_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_raw(&mut buf, &big).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
        assert!(buf.is_empty(), "nothing should be written on rejection");
    }

    #[test]
    fn rejects_oversized_length_prefix() {
        let prefix = (MAX_FRAME_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(prefix.to_vec());
        let err = read_raw(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn truncated_prefix_is_a_disconnect() {
        let mut cursor = Cursor::new(vec![0u8, 1]);
        let err = read_raw(&mut cursor).unwrap_err();
        assert!(err.is_disconnect(), "got {err:?}");
    }

    #[test]
    fn truncated_payload_is_a_disconnect() {
        let mut cursor = Cursor::new(vec![0u8, 0, 0, 10, b'{']);
        let err = read_raw(&mut cursor).unwrap_err();
        assert!(err.is_disconnect(), "got {err:?}");
    }

    #[test]
    fn malformed_json_is_not_a_disconnect() {
        let mut buf = Vec::new();
        write_raw(&mut buf, b"{\"action\": move}").unwrap();
        let mut cursor = Cursor::new(buf);
        let err = read_frame::<_, ClientMessage>(&mut cursor).unwrap_err();
        assert!(matches!(err, FrameError::Json(_)));
        assert!(!err.is_disconnect());
    }

    #[test]
    fn server_message_frame_decodes() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &ServerMessage::Role {
            role: Role::Spectator,
        })
        .unwrap();
        let mut cursor = Cursor::new(buf);
        let msg: ServerMessage = read_frame(&mut cursor).unwrap();
        assert_eq!(msg, ServerMessage::Role {
            role: Role::Spectator
        });
    }
}
