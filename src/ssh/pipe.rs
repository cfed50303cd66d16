// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory byte pipes connecting a session's copy routine to its consumer.
//!
//! A pipe has exactly one writer (the channel task) and one reader (usually
//! the output parser). The writer never blocks, so a consumer that falls
//! behind cannot stall the remote command. The reader blocks until bytes
//! arrive and reports end of stream once the writer is dropped.

use bytes::Bytes;
use futures::stream::{self, Stream};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Create a connected writer/reader pair.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let chunks: ChunkStream = Box::pin(stream::poll_fn(move |cx| {
        rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }));
    (
        PipeWriter { tx },
        PipeReader {
            inner: StreamReader::new(chunks),
        },
    )
}

/// Producing half of a pipe.
#[derive(Debug, Clone)]
pub struct PipeWriter {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl PipeWriter {
    /// Append bytes. Returns false once the reader is gone.
    pub fn write(&self, data: &[u8]) -> bool {
        if data.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(Bytes::copy_from_slice(data)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consuming half of a pipe. Implements [`AsyncBufRead`].
pub struct PipeReader {
    inner: StreamReader<ChunkStream, Bytes>,
}

impl std::fmt::Debug for PipeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeReader").finish_non_exhaustive()
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncBufRead for PipeReader {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().inner).poll_fill_buf(cx)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.inner).consume(amt)
    }
}
