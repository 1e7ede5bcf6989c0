/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Line-feed framing over a byte stream.
//!
//! A record is everything up to a `\n`. Records are trimmed, blank records are
//! skipped, and a record split across reads is reassembled before it is
//! returned.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::RelayError;

/// Bytes reserved for each socket read.
const READ_CHUNK: usize = 8192;

/// Incremental decoder turning stream reads into complete records.
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_record_size: usize,
}

impl LineFramer {
    /// Creates a framer that rejects records longer than `max_record_size` bytes.
    #[must_use]
    pub fn new(max_record_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(READ_CHUNK),
            max_record_size,
        }
    }

    /// Feeds raw bytes and returns every record they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, RelayError> {
        self.buffer.extend_from_slice(bytes);
        self.drain_records()
    }

    /// Reads once from `reader` and returns the records completed by that read.
    ///
    /// Returns `Ok(None)` when the peer closed the stream. A trailing partial
    /// record left in the buffer at that point is discarded.
    ///
    /// Cancel safe: if the future is dropped before completion no bytes are lost.
    pub async fn read_records<R>(&mut self, reader: &mut R) -> Result<Option<Vec<String>>, RelayError>
    where
        R: AsyncRead + Unpin,
    {
        self.buffer.reserve(READ_CHUNK);
        let read = reader.read_buf(&mut self.buffer).await?;
        if read == 0 {
            self.buffer.clear();
            return Ok(None);
        }
        self.drain_records().map(Some)
    }

    /// Bytes of an incomplete record waiting for its delimiter.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn drain_records(&mut self) -> Result<Vec<String>, RelayError> {
        let mut records = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let raw = &self.buffer[start..end];
            if raw.len() > self.max_record_size {
                return Err(RelayError::RecordTooLarge {
                    size: raw.len(),
                    max: self.max_record_size,
                });
            }
            let record = String::from_utf8_lossy(raw);
            let record = record.trim();
            if !record.is_empty() {
                records.push(record.to_string());
            }
            start = end + 1;
        }

        self.buffer.drain(..start);

        if self.buffer.len() > self.max_record_size {
            return Err(RelayError::RecordTooLarge {
                size: self.buffer.len(),
                max: self.max_record_size,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_split_records() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"REGISTER|hou").unwrap().is_empty());
        assert_eq!(framer.pending(), 12);
        assert_eq!(framer.push(b"se001\n").unwrap(), vec!["REGISTER|house001"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn yields_every_record_of_a_single_read() {
        let mut framer = LineFramer::new(1024);
        let records = framer.push(b"one\ntwo\r\nthr").unwrap();
        assert_eq!(records, vec!["one", "two"]);
        assert_eq!(framer.push(b"ee\n").unwrap(), vec!["three"]);
    }

    #[test]
    fn skips_blank_records() {
        let mut framer = LineFramer::new(1024);
        let records = framer.push(b"\n   \n\t\nvalue  \n\n").unwrap();
        assert_eq!(records, vec!["value"]);
    }

    #[test]
    fn rejects_oversized_partial_records() {
        let mut framer = LineFramer::new(8);
        assert!(framer.push(b"12345678").unwrap().is_empty());
        assert!(matches!(
            framer.push(b"9"),
            Err(RelayError::RecordTooLarge { size: 9, max: 8 })
        ));
    }

    #[tokio::test]
    async fn reads_from_a_stream_until_eof() {
        let (mut client, mut server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, b"a\nb\npartial").await.unwrap();
        drop(client);

        let mut framer = LineFramer::new(1024);
        let mut records = Vec::new();
        while let Some(batch) = framer.read_records(&mut server).await.unwrap() {
            records.extend(batch);
        }
        assert_eq!(records, vec!["a", "b"]);
        assert_eq!(framer.pending(), 0);
    }
}
