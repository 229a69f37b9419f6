//! In-memory worker streams for tests

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use super::{ChannelOptions, ProcessChannel};

/// Hands out scripted chunks; blocks while the sender is alive and idle
pub struct ScriptedReader {
    chunks: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl ScriptedReader {
    pub fn new(chunks: Receiver<Vec<u8>>) -> Self {
        Self {
            chunks,
            pending: Vec::new(),
        }
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.chunks.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// Records everything written to the worker
#[derive(Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A channel whose worker answers with the given chunks, in order
///
/// Keep the returned sender alive to make further reads block instead of
/// hitting end of stream.
pub fn scripted(chunks: &[&[u8]], timeout: Duration) -> (ProcessChannel, SharedWriter, Sender<Vec<u8>>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    for chunk in chunks {
        tx.send(chunk.to_vec()).unwrap();
    }
    let writer = SharedWriter::default();
    let options = ChannelOptions::exiftool().with_response_timeout(Some(timeout));
    let channel = ProcessChannel::from_streams(writer.clone(), ScriptedReader::new(rx), options).unwrap();
    (channel, writer, tx)
}
