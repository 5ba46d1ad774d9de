// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `Content-Length` delimited framing over plain byte streams.
//!
//! The reader accepts any number of header lines (unknown headers such as
//! `Content-Type` are skipped) terminated by a blank line, then reads the
//! announced number of body bytes. The writer emits the minimal header.

use std::io::{self, BufRead, Write};

use log::trace;

use drpc_core::Frame;

const CONTENT_LENGTH: &str = "Content-Length:";

pub struct FrameReader<R> {
    reader: R,
    line: String,
}

impl<R: BufRead> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        FrameReader {
            reader,
            line: String::new(),
        }
    }

    /// Reads one frame body. Returns `Ok(None)` on clean end-of-stream at a
    /// frame boundary; EOF in the middle of a frame is an error.
    pub fn read(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut content_length: Option<usize> = None;
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return if content_length.is_none() {
                    Ok(None)
                } else {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a frame header",
                    ))
                };
            }
            let line = self.line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix(CONTENT_LENGTH) {
                let length = rest.trim().parse::<usize>().map_err(|err| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("bad Content-Length '{}': {err}", rest.trim()),
                    )
                })?;
                content_length = Some(length);
            }
            // Other headers are skipped.
        }

        let length = content_length.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "missing Content-Length header")
        })?;
        let mut body = vec![0; length];
        self.reader.read_exact(&mut body)?;
        trace!("received {} byte frame", body.len());
        Ok(Some(body))
    }
}

pub struct FrameWriter<W> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        FrameWriter {
            writer,
            buffer: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn write(&mut self, frame: &Frame) -> io::Result<()> {
        self.buffer.clear();
        serde_json::to_writer(&mut self.buffer, frame)?;
        trace!("sending frame: {}", String::from_utf8_lossy(&self.buffer));
        write!(self.writer, "Content-Length: {}\r\n\r\n", self.buffer.len())?;
        self.writer.write_all(&self.buffer)?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drpc_core::RequestId;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_write_then_read_round_trip() {
        let frame = Frame::Request {
            id: RequestId::Number(1),
            method: "askServer".to_string(),
            params: Some(json!({"value": true})),
        };
        let mut writer = FrameWriter::new(Vec::new());
        writer.write(&frame).unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        let body = reader.read().unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(Frame::parse(value).unwrap(), frame);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_reader_skips_unknown_headers() {
        let body = r#"{"jsonrpc":"2.0","method":"m"}"#;
        let input = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut reader = FrameReader::new(Cursor::new(input.into_bytes()));
        assert_eq!(reader.read().unwrap().unwrap(), body.as_bytes());
    }

    #[test]
    fn test_reader_requires_content_length() {
        let mut reader = FrameReader::new(Cursor::new(b"X-Header: 1\r\n\r\n{}".to_vec()));
        let err = reader.read().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_reader_rejects_bad_length() {
        let mut reader =
            FrameReader::new(Cursor::new(b"Content-Length: oops\r\n\r\n".to_vec()));
        let err = reader.read().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_eof_inside_header_is_an_error() {
        let mut reader = FrameReader::new(Cursor::new(b"Content-Length: 10\r\n".to_vec()));
        let err = reader.read().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_clean_eof_returns_none() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut writer = FrameWriter::new(Vec::new());
        writer
            .write(&Frame::Notification {
                method: "a".to_string(),
                params: None,
            })
            .unwrap();
        writer
            .write(&Frame::Notification {
                method: "b".to_string(),
                params: None,
            })
            .unwrap();

        let mut reader = FrameReader::new(Cursor::new(writer.into_inner()));
        assert!(reader.read().unwrap().is_some());
        assert!(reader.read().unwrap().is_some());
        assert!(reader.read().unwrap().is_none());
    }
}
