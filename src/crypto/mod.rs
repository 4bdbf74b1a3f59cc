//! Single-byte XOR cipher used by SCUMM resource files.
//!
//! Every byte of an enciphered file (headers and payload alike) is XORed
//! with the grammar's key, so the transform is applied at the stream layer:
//! [`CipherStream`] wraps any reader or writer and the block codec above it
//! only ever sees plain bytes.  XOR is its own inverse; the same stream type
//! serves both directions.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Key used by v4 data files and by v5/v6 index and data files.
pub const SCUMM_XOR_KEY: u8 = 0x69;

/// XOR `buf` in place with `key`.  A `None` key leaves the bytes untouched.
#[inline]
pub fn apply(key: Option<u8>, buf: &mut [u8]) {
    if let Some(k) = key {
        for b in buf.iter_mut() {
            *b ^= k;
        }
    }
}

/// Seekable stream adapter that enciphers on write and deciphers on read.
///
/// Also keeps its own position so `stream_position()` never has to touch
/// the underlying handle (the backpatching writer asks for it constantly).
pub struct CipherStream<S> {
    inner:   S,
    key:     Option<u8>,
    pos:     u64,
    scratch: Vec<u8>,
}

impl<S> CipherStream<S> {
    pub fn new(inner: S, key: Option<u8>) -> Self {
        Self { inner, key, pos: 0, scratch: Vec::new() }
    }

    /// Current offset; the same value `stream_position()` reports.
    pub fn position(&self) -> u64 { self.pos }

    pub fn into_inner(self) -> S { self.inner }
}

impl<S: Read> Read for CipherStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        apply(self.key, &mut buf[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: Write> Write for CipherStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match self.key {
            None => self.inner.write(buf)?,
            Some(_) => {
                self.scratch.clear();
                self.scratch.extend_from_slice(buf);
                apply(self.key, &mut self.scratch);
                self.inner.write(&self.scratch)?
            }
        };
        self.pos += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<S: Seek> Seek for CipherStream<S> {
    fn seek(&mut self, to: SeekFrom) -> io::Result<u64> {
        self.pos = self.inner.seek(to)?;
        Ok(self.pos)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn null_key_is_passthrough() {
        let mut data = b"LECF".to_vec();
        apply(None, &mut data);
        assert_eq!(&data, b"LECF");
    }

    #[test]
    fn stream_enciphers_what_it_writes() {
        let mut s = CipherStream::new(Cursor::new(Vec::new()), Some(SCUMM_XOR_KEY));
        s.write_all(b"RO").unwrap();
        assert_eq!(s.stream_position().unwrap(), 2);
        assert_eq!(s.into_inner().into_inner(), vec![b'R' ^ 0x69, b'O' ^ 0x69]);
    }

    #[test]
    fn overwrite_after_seek_stays_enciphered() {
        let mut s = CipherStream::new(Cursor::new(Vec::new()), Some(0xFF));
        s.write_all(&[0, 0, 0, 0, 7]).unwrap();
        s.seek(SeekFrom::Start(1)).unwrap();
        s.write_all(&[1, 2]).unwrap();
        assert_eq!(s.stream_position().unwrap(), 3);
        let raw = s.into_inner().into_inner();
        assert_eq!(raw, vec![0xFF, 0xFE, 0xFD, 0xFF, 0xF8]);
    }

    proptest! {
        #[test]
        fn cipher_is_an_involution(key in any::<u8>(), payload in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut w = CipherStream::new(Cursor::new(Vec::new()), Some(key));
            w.write_all(&payload).unwrap();
            let raw = w.into_inner().into_inner();

            let mut r = CipherStream::new(Cursor::new(raw), Some(key));
            let mut back = Vec::new();
            r.read_to_end(&mut back).unwrap();
            prop_assert_eq!(back, payload);
        }
    }
}
