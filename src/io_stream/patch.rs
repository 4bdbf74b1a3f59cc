//! Backpatching writer capability.
//!
//! Container sizes and offset tables are only known after their contents
//! have been written.  The encoder therefore reserves the bytes first,
//! keeps going, and overwrites the reservation once the real values exist.

use std::io::{self, Seek, SeekFrom, Write};

/// A reserved, zero-filled span of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub at:  u64,
    pub len: usize,
}

pub trait PatchWrite: Write + Seek {
    /// Write `len` zero bytes and remember where they went.
    fn reserve(&mut self, len: usize) -> io::Result<Reservation> {
        let at = self.stream_position()?;
        self.write_all(&vec![0u8; len])?;
        Ok(Reservation { at, len })
    }

    /// Overwrite bytes at `at`, then return to the current end.
    fn patch(&mut self, at: u64, bytes: &[u8]) -> io::Result<()> {
        let resume = self.stream_position()?;
        self.seek(SeekFrom::Start(at))?;
        self.write_all(bytes)?;
        self.seek(SeekFrom::Start(resume))?;
        Ok(())
    }

    /// Fill a reservation; the bytes must fit it exactly.
    fn fill(&mut self, r: Reservation, bytes: &[u8]) -> io::Result<()> {
        if bytes.len() != r.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("patch of {} bytes does not match a {}-byte reservation", bytes.len(), r.len),
            ));
        }
        self.patch(r.at, bytes)
    }
}

impl<W: Write + Seek + ?Sized> PatchWrite for W {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn patch_returns_to_the_end() {
        let mut w = Cursor::new(Vec::new());
        let r = w.reserve(4).unwrap();
        w.write_all(b"body").unwrap();
        w.fill(r, b"head").unwrap();
        assert_eq!(w.stream_position().unwrap(), 8);
        assert_eq!(w.into_inner(), b"headbody");
    }

    #[test]
    fn fill_rejects_a_size_mismatch() {
        let mut w = Cursor::new(Vec::new());
        let r = w.reserve(2).unwrap();
        assert!(w.fill(r, b"abc").is_err());
    }
}
