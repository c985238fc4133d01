//! Streaming Views
//!
//! [`Source`] and [`Sink`] walk a region of a [`Mapping`] with a cursor, the way a file
//! handle walks a file. Both hold a shared borrow of the mapping, so it cannot be resized or
//! closed while a view is alive.



use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::{page_size, Error, Mapping, Result, SyncFlags};



/// The point a seek offset is measured from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    /// The end of the view's region.
    End,
}

/// A cursor over a bounded byte region.
///
/// Seeking never clamps. A position past the end is legal and simply has nothing left
/// to read or write.
pub trait RandomAccess {
    /// Moves the cursor and returns the new position.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64>;

    /// The current position.
    fn tell(&self) -> u64;
}



/// The window of a mapping a view covers, plus the view's cursor.
#[derive(Clone, Copy, Debug)]
struct Region {
    offset: usize,
    len: usize,
    position: u64,
}

impl Region {
    fn new(mapping: &Mapping, offset: usize, len: usize) -> Self {
        let offset = offset.min(mapping.size());
        Self {
            offset,
            len: len.min(mapping.size() - offset),
            position: 0,
        }
    }

    fn remaining(&self) -> usize {
        usize::try_from((self.len as u64).saturating_sub(self.position)).unwrap_or(0)
    }

    /// Offset into the mapping for the cursor. Only meaningful while `remaining() > 0`.
    fn absolute(&self) -> usize {
        let position = usize::try_from(self.position).unwrap_or(usize::MAX);
        self.offset.saturating_add(position)
    }

    fn advance(&mut self, count: usize) {
        self.position += count as u64;
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.position,
            Whence::End => self.len as u64,
        };
        self.position = base
            .checked_add_signed(offset)
            .ok_or(Error::InvalidSeek { offset, whence })?;
        Ok(self.position)
    }

    fn seek_from(&mut self, pos: SeekFrom) -> Result<u64> {
        match pos {
            SeekFrom::Start(position) => {
                self.position = position;
                Ok(position)
            }
            SeekFrom::Current(offset) => self.seek(offset, Whence::Current),
            SeekFrom::End(offset) => self.seek(offset, Whence::End),
        }
    }
}

fn chunk_buffer(size: usize) -> Box<[u8]> {
    vec![0; size.max(1)].into_boxed_slice()
}



/// Reads a mapping front to back.
pub struct Source<'a> {
    mapping: &'a Mapping,
    region: Region,
    buffer: Box<[u8]>,
}

impl<'a> Source<'a> {
    /// A view over the whole mapping, copying one page at a time.
    pub fn new(mapping: &'a Mapping) -> Self {
        Self::with_region(mapping, 0, mapping.size(), page_size())
    }

    /// A view over `len` bytes starting at `offset`, clipped to the mapping.
    pub fn with_region(mapping: &'a Mapping, offset: usize, len: usize, buffer_size: usize) -> Self {
        Self {
            mapping,
            region: Region::new(mapping, offset, len),
            buffer: chunk_buffer(buffer_size),
        }
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// Bytes between the cursor and the end of the region.
    pub fn remaining(&self) -> usize {
        self.region.remaining()
    }

    /// Copies up to `byte_count` bytes into `out`.
    ///
    /// Returns `None` once the cursor has reached the end of the region.
    pub fn read_at_most_to<W: Write + ?Sized>(
        &mut self,
        out: &mut W,
        byte_count: usize,
    ) -> Result<Option<usize>> {
        let remaining = self.region.remaining();
        if remaining == 0 {
            // Still report a closed or unreadable mapping.
            self.mapping.read_bytes(0, &mut [])?;
            return Ok(None);
        }

        let total = byte_count.min(remaining);
        let mut copied = 0;
        while copied < total {
            let chunk = (total - copied).min(self.buffer.len());
            let read = self
                .mapping
                .read_bytes(self.region.absolute(), &mut self.buffer[..chunk])?;
            out.write_all(&self.buffer[..read])?;
            self.region.advance(read);
            copied += read;
        }

        Ok(Some(copied))
    }
}

impl RandomAccess for Source<'_> {
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.region.seek(offset, whence)
    }

    fn tell(&self) -> u64 {
        self.region.position
    }
}

impl Read for Source<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.region.remaining());
        let read = self.mapping.read_bytes(self.region.absolute(), &mut buf[..count])?;
        self.region.advance(read);
        Ok(read)
    }
}

impl Seek for Source<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.region.seek_from(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.region.position)
    }
}



/// Writes into a mapping front to back.
///
/// A write that does not fit in the rest of the region is rejected whole; nothing is
/// written and the cursor stays put.
pub struct Sink<'a> {
    mapping: &'a Mapping,
    region: Region,
    buffer: Box<[u8]>,
}

impl<'a> Sink<'a> {
    /// A view over the whole mapping, copying one page at a time.
    pub fn new(mapping: &'a Mapping) -> Self {
        Self::with_region(mapping, 0, mapping.size(), page_size())
    }

    /// A view over `len` bytes starting at `offset`, clipped to the mapping.
    pub fn with_region(mapping: &'a Mapping, offset: usize, len: usize, buffer_size: usize) -> Self {
        Self {
            mapping,
            region: Region::new(mapping, offset, len),
            buffer: chunk_buffer(buffer_size),
        }
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    pub fn remaining(&self) -> usize {
        self.region.remaining()
    }

    fn reserve(&self, requested: usize) -> Result<()> {
        // An empty write still fails on a closed or read-only mapping.
        self.mapping.write_bytes(0, &[])?;
        let remaining = self.region.remaining();
        if requested > remaining {
            return Err(Error::InsufficientSpace { requested, remaining });
        }
        Ok(())
    }

    /// Pulls exactly `byte_count` bytes out of `reader` into the mapping.
    ///
    /// A reader that runs dry early fails with an `UnexpectedEof` I/O error; whatever was
    /// copied before that stays written and the cursor reflects it.
    pub fn write_from<R: Read + ?Sized>(&mut self, reader: &mut R, byte_count: usize) -> Result<usize> {
        self.reserve(byte_count)?;

        let mut copied = 0;
        while copied < byte_count {
            let chunk = (byte_count - copied).min(self.buffer.len());
            reader.read_exact(&mut self.buffer[..chunk])?;
            let written = self
                .mapping
                .write_bytes(self.region.absolute(), &self.buffer[..chunk])?;
            self.region.advance(written);
            copied += written;
        }

        Ok(copied)
    }

    /// Writes all of `data` at the cursor.
    pub fn write_slice(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        for chunk in data.chunks(self.buffer.len()) {
            let written = self.mapping.write_bytes(self.region.absolute(), chunk)?;
            self.region.advance(written);
        }
        Ok(())
    }

    /// Synchronously flushes the whole mapping to its backing store.
    pub fn flush(&mut self) -> Result<()> {
        self.mapping.sync(SyncFlags::SYNC)
    }
}

impl RandomAccess for Sink<'_> {
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.region.seek(offset, whence)
    }

    fn tell(&self) -> u64 {
        self.region.position
    }
}

impl Write for Sink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_slice(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(Sink::flush(self)?)
    }
}

impl Seek for Sink<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(self.region.seek_from(pos)?)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.region.position)
    }
}



impl Mapping {
    /// Reads the whole mapping from the start.
    pub fn source(&self) -> Source<'_> {
        Source::new(self)
    }

    /// Writes the whole mapping from the start.
    pub fn sink(&self) -> Sink<'_> {
        Sink::new(self)
    }

    pub fn source_region(&self, offset: usize, len: usize) -> Source<'_> {
        Source::with_region(self, offset, len, page_size())
    }

    pub fn sink_region(&self, offset: usize, len: usize) -> Sink<'_> {
        Sink::with_region(self, offset, len, page_size())
    }
}
