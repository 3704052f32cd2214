//! Length-prefixed framing for delegation messages.
//!
//! A frame is one or more `Name: value` header lines ending with an empty
//! line, followed by exactly `Content-Length` bytes of UTF-8 JSON:
//!
//! ```text
//! Content-Length: 87\r\n
//! \r\n
//! {"kind":"reply","correlation_id":"...","payload":{...}}
//! ```
//!
//! Blank lines between frames are skipped, so a human typing replies by hand
//! can end the body with a newline. Header lines that are not UTF-8 or run past
//! [`MAX_HEADER_LINE`] come back as [`Frame::Malformed`] and reading resumes at
//! the next line.

use baton_common::WireMessage;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const CONTENT_LENGTH: &str = "Content-Length";

/// Largest body accepted from the executor.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Longest header line accepted, terminator included.
pub const MAX_HEADER_LINE: usize = 8 * 1024;

/// A frame read from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Message(WireMessage),
    /// Something arrived that could not be decoded; the reason is for logging.
    Malformed(String),
}

pub fn encode(message: &WireMessage) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("{}: {}\r\n\r\n", CONTENT_LENGTH, body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read the next frame. `Ok(None)` means the stream ended cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    let mut raw = Vec::with_capacity(64);

    loop {
        let line = match read_header_line(reader, &mut raw).await? {
            HeaderLine::Eof if saw_header => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside frame headers",
                ));
            }
            HeaderLine::Eof => return Ok(None),
            HeaderLine::Overlong => {
                return Ok(Some(Frame::Malformed(format!(
                    "header line longer than {} bytes",
                    MAX_HEADER_LINE
                ))));
            }
            HeaderLine::Complete => match std::str::from_utf8(&raw) {
                Ok(line) => line,
                Err(e) => {
                    return Ok(Some(Frame::Malformed(format!(
                        "header line is not UTF-8: {}",
                        e
                    ))));
                }
            },
        };

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }

        let Some((name, value)) = trimmed.split_once(':') else {
            return Ok(Some(Frame::Malformed(format!(
                "expected a header line, got '{}'",
                truncate(trimmed)
            ))));
        };
        saw_header = true;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            match value.trim().parse::<usize>() {
                Ok(len) => content_length = Some(len),
                Err(_) => {
                    return Ok(Some(Frame::Malformed(format!(
                        "invalid {} '{}'",
                        CONTENT_LENGTH,
                        value.trim()
                    ))));
                }
            }
        }
    }

    let Some(len) = content_length else {
        return Ok(Some(Frame::Malformed(format!(
            "frame without {} header",
            CONTENT_LENGTH
        ))));
    };

    if len > MAX_FRAME_BYTES {
        tokio::io::copy(&mut reader.take(len as u64), &mut tokio::io::sink()).await?;
        return Ok(Some(Frame::Malformed(format!(
            "frame of {} bytes exceeds the {} byte limit",
            len, MAX_FRAME_BYTES
        ))));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(match serde_json::from_slice::<WireMessage>(&body) {
        Ok(message) => Frame::Message(message),
        Err(e) => Frame::Malformed(format!("invalid frame body: {}", e)),
    }))
}

enum HeaderLine {
    Eof,
    Complete,
    /// The line hit the cap; the rest of it has been skipped.
    Overlong,
}

/// Read one line into `buf` without buffering more than [`MAX_HEADER_LINE`] bytes.
async fn read_header_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<HeaderLine>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader)
        .take(MAX_HEADER_LINE as u64)
        .read_until(b'\n', buf)
        .await?;
    if read == 0 {
        return Ok(HeaderLine::Eof);
    }
    if buf.ends_with(b"\n") || read < MAX_HEADER_LINE {
        return Ok(HeaderLine::Complete);
    }
    skip_line(reader).await?;
    buf.clear();
    Ok(HeaderLine::Overlong)
}

async fn skip_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

fn truncate(s: &str) -> String {
    const LIMIT: usize = 60;
    if s.chars().count() > LIMIT {
        format!("{}...", s.chars().take(LIMIT).collect::<String>())
    } else {
        s.to_string()
    }
}
