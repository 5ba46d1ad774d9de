// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory duplex plumbing for connecting two launchers in tests.

use std::cmp;
use std::io::{self, Read, Write};
use std::sync::mpsc::{channel, Receiver, Sender};

pub struct PipeReader {
    receiver: Receiver<Vec<u8>>,
    buffer: Vec<u8>,
    position: usize,
}

pub struct PipeWriter {
    sender: Sender<Vec<u8>>,
}

/// One directed byte channel; dropping the writer is end-of-stream.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (sender, receiver) = channel();
    (
        PipeWriter { sender },
        PipeReader {
            receiver,
            buffer: Vec::new(),
            position: 0,
        },
    )
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.position >= self.buffer.len() {
            match self.receiver.recv() {
                Ok(chunk) => {
                    self.buffer = chunk;
                    self.position = 0;
                }
                // Writer dropped: clean end-of-stream.
                Err(_) => return Ok(0),
            }
        }
        let n = cmp::min(buf.len(), self.buffer.len() - self.position);
        buf[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sender
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "reader side is gone"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
