//! The double-SHA256 digest used for block, transaction, and merkle hashing.

use std::io;

use sha2::{Digest, Sha256};

/// An incremental writer that computes SHA256d (two rounds of SHA256) over
/// the bytes written to it.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the writer and return the double-SHA256 digest.
    pub fn finish(self) -> [u8; 32] {
        let first = self.hash.finalize();
        let second = Sha256::digest(&first);
        let mut buffer = [0u8; 32];
        buffer[..].copy_from_slice(&second);
        buffer
    }
}

/// One-shot SHA256d over a byte slice.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(&first);
    let mut buffer = [0u8; 32];
    buffer[..].copy_from_slice(&second);
    buffer
}
