//! Scripted in-memory transport for driving a `Connection` by hand.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, IoSlice, Read, Write};

#[derive(Debug, Default)]
pub struct Scripted {
    /// Each read hands out (part of) the next chunk; an empty script blocks.
    reads: VecDeque<io::Result<Vec<u8>>>,
    /// Bytes accepted per write call; `0` blocks, an empty plan accepts all.
    write_plan: VecDeque<usize>,
    pub written: Vec<u8>,
    /// Number of slices offered to each write call.
    pub slices_per_write: Vec<usize>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk(mut self, bytes: &[u8]) -> Self {
        self.reads.push_back(Ok(bytes.to_vec()));
        self
    }

    pub fn chunks<'a>(mut self, chunks: impl IntoIterator<Item = &'a [u8]>) -> Self {
        for c in chunks {
            self.reads.push_back(Ok(c.to_vec()));
        }
        self
    }

    pub fn eof(mut self) -> Self {
        self.reads.push_back(Ok(Vec::new()));
        self
    }

    pub fn fail_read(mut self, kind: io::ErrorKind) -> Self {
        self.reads.push_back(Err(kind.into()));
        self
    }

    pub fn writes(mut self, plan: &[usize]) -> Self {
        self.write_plan.extend(plan);
        self
    }

    pub fn pending_reads(&self) -> usize {
        self.reads.len()
    }
}

impl Read for Scripted {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Err(io::ErrorKind::WouldBlock.into()),
            Some(Err(e)) => Err(e),
            Some(Ok(chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(Ok(chunk[n..].to_vec()));
                }
                Ok(n)
            }
        }
    }
}

impl Write for Scripted {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_vectored(&[IoSlice::new(buf)])
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        self.slices_per_write.push(bufs.len());
        let limit = match self.write_plan.pop_front() {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(n) => n,
            None => usize::MAX,
        };

        let mut n = 0;
        for b in bufs {
            let take = (limit - n).min(b.len());
            self.written.extend_from_slice(&b[..take]);
            n += take;
            if n == limit {
                break;
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
