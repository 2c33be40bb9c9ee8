//! Chunked copy with percentage accounting, used by the fetch action.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// Progress reported while chunks are still flowing never reaches 100;
/// only a fully consumed source does.
const IN_FLIGHT_CAP: u8 = 99;

#[derive(Clone, Debug)]
pub struct TransferSimulator {
    total: u64,
    chunk_size: usize,
    step: u8,
    delay: Duration,
}

impl TransferSimulator {
    /// Split `total` bytes into roughly 100 chunks.
    pub fn new(total: u64) -> Self {
        let chunk_size = total.div_ceil(100);
        let step = if total == 0 {
            100
        } else {
            ((chunk_size as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            total,
            chunk_size: chunk_size as usize,
            step,
            delay: Duration::ZERO,
        }
    }

    /// Pause after each chunk is written.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Percentage added per chunk.
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Copy `reader` into `writer` chunk by chunk.
    ///
    /// `on_progress` receives the running percentage and the bytes written so far
    /// after every chunk, and a final 100 once the reader is exhausted. On error
    /// the last reported percentage stands.
    pub fn run<R: Read, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
        mut on_progress: impl FnMut(u8, u64),
    ) -> io::Result<u64> {
        let mut copied = 0u64;
        if self.total == 0 {
            on_progress(100, copied);
            return Ok(copied);
        }

        let mut progress = 0u8;
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            let n = read_chunk(&mut reader, &mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            writer.flush()?;
            copied += n as u64;
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            progress = progress.saturating_add(self.step).min(IN_FLIGHT_CAP);
            on_progress(progress, copied);
        }
        on_progress(100, copied);
        Ok(copied)
    }
}

/// Fill `buf` unless the reader runs dry first.
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves `good` bytes, then fails.
    struct FailingReader {
        good: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.good == 0 {
                return Err(io::Error::new(io::ErrorKind::NotFound, "source vanished"));
            }
            let n = buf.len().min(self.good);
            buf[..n].fill(b'x');
            self.good -= n;
            Ok(n)
        }
    }

    fn run_sizes(total: usize) -> (Vec<u8>, Vec<u8>) {
        let data = vec![7u8; total];
        let mut out = Vec::new();
        let mut seen = Vec::new();
        TransferSimulator::new(total as u64)
            .run(data.as_slice(), &mut out, |p, _| seen.push(p))
            .unwrap();
        (out, seen)
    }

    #[test]
    fn chunk_size_is_ceil_of_one_percent() {
        assert_eq!(TransferSimulator::new(250).chunk_size(), 3);
        assert_eq!(TransferSimulator::new(250).step(), 1);
        assert_eq!(TransferSimulator::new(100).chunk_size(), 1);
        assert_eq!(TransferSimulator::new(101).chunk_size(), 2);
        assert_eq!(TransferSimulator::new(101).step(), 2);
        assert_eq!(TransferSimulator::new(1).step(), 100);
    }

    #[test]
    fn fully_consumed_source_ends_at_exactly_100() {
        for total in [1usize, 7, 99, 100, 101, 250, 1000, 4097] {
            let (out, seen) = run_sizes(total);
            assert_eq!(out.len(), total);
            assert_eq!(*seen.last().unwrap(), 100, "total {total}");
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "total {total}");
            assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1, "total {total}");
        }
    }

    #[test]
    fn empty_source_is_an_immediate_full_transfer() {
        let (out, seen) = run_sizes(0);
        assert!(out.is_empty());
        assert_eq!(seen, vec![100]);
    }

    #[test]
    fn failure_keeps_last_chunk_progress() {
        // 250 bytes in 3-byte chunks, 1% each; fail after 30 bytes = 10 chunks.
        let sim = TransferSimulator::new(250);
        let mut out = Vec::new();
        let mut last = 0;
        let err = sim
            .run(FailingReader { good: 30 }, &mut out, |p, _| last = p)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(out.len(), 30);
        assert_eq!(last, 10);
    }
}
