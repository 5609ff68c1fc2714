//! `Content-Length` framed JSON messages over a byte stream.

use anyhow::{bail, Context, Result};
use serde_json::Value as JsonValue;
use std::io::{BufRead, Write};

pub const MAX_FRAME_BYTES: usize = 1_048_576; // 1 MiB

/// Reads one frame at a time, reusing its header buffer between frames.
pub struct FrameReader<R> {
    inner: R,
    header: String,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            header: String::new(),
        }
    }

    /// `Ok(None)` on a clean end of stream.
    ///
    /// A frame whose body is not JSON is consumed in full before the error is
    /// returned, so the next call starts on the following frame.
    pub fn next_frame(&mut self) -> Result<Option<JsonValue>> {
        let Some(len) = self.body_len()? else {
            return Ok(None);
        };
        let mut body = vec![0_u8; len];
        self.inner
            .read_exact(&mut body)
            .context("frame body ended early")?;
        let value = serde_json::from_slice(&body).context("invalid JSON payload")?;
        Ok(Some(value))
    }

    fn body_len(&mut self) -> Result<Option<usize>> {
        let mut len = None;
        loop {
            self.header.clear();
            if self.inner.read_line(&mut self.header)? == 0 {
                return Ok(None);
            }
            let line = self.header.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("Content-Length") {
                len = Some(
                    value
                        .trim()
                        .parse::<usize>()
                        .context("invalid Content-Length")?,
                );
            }
        }

        let len = len.context("missing Content-Length header")?;
        if len > MAX_FRAME_BYTES {
            bail!("Content-Length {len} exceeds max allowed {MAX_FRAME_BYTES} bytes");
        }
        Ok(Some(len))
    }
}

pub fn write_frame<W: Write>(writer: &mut W, value: &JsonValue) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(&body)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn raw_frame(body: &str) -> String {
        format!("Content-Length: {}\r\n\r\n{body}", body.len())
    }

    #[test]
    fn rejects_oversized_frame() {
        let raw = format!("Content-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut reader = FrameReader::new(Cursor::new(raw.into_bytes()));
        let err = reader.next_frame().expect_err("oversized frame must fail");
        assert!(err.to_string().contains("exceeds max allowed"));
    }

    #[test]
    fn round_trips_and_ends_cleanly() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({ "id": 1, "method": "ping" })).unwrap();
        write_frame(&mut buf, &json!({ "id": 2, "method": "tools/list" })).unwrap();
        let mut reader = FrameReader::new(Cursor::new(buf));
        assert_eq!(reader.next_frame().unwrap().unwrap()["id"], 1);
        assert_eq!(reader.next_frame().unwrap().unwrap()["id"], 2);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn bad_body_does_not_desync_the_stream() {
        let raw = raw_frame("{not json") + &raw_frame(r#"{"id":3}"#);
        let mut reader = FrameReader::new(Cursor::new(raw.into_bytes()));
        assert!(reader.next_frame().is_err());
        assert_eq!(reader.next_frame().unwrap().unwrap()["id"], 3);
    }

    #[test]
    fn extra_headers_are_ignored() {
        let body = r#"{"id":4}"#;
        let raw = format!(
            "Content-Type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        let mut reader = FrameReader::new(Cursor::new(raw.into_bytes()));
        assert_eq!(reader.next_frame().unwrap().unwrap()["id"], 4);
    }

    #[test]
    fn missing_length_is_an_error() {
        let mut reader = FrameReader::new(Cursor::new(b"X-Other: 1\r\n\r\n{}".to_vec()));
        let err = reader.next_frame().unwrap_err();
        assert!(err.to_string().contains("missing Content-Length"));
    }

    #[test]
    fn short_body_is_an_error() {
        let mut reader = FrameReader::new(Cursor::new(b"Content-Length: 10\r\n\r\n{}".to_vec()));
        let err = reader.next_frame().unwrap_err();
        assert!(err.to_string().contains("ended early"));
    }
}
