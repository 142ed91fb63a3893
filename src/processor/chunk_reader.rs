use std::fs::File;
use std::io;

use memchr::memrchr;

use crate::processor::ProcessorError;
use crate::processor::constants::LINE_TERMINATOR;

/// Sources that can be read at an absolute byte offset without shared
/// cursor state.
pub trait PositionalRead {
    /// Reads into `buf` starting at `offset`. Returning `Ok(0)` means end of
    /// input; short reads are allowed.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;
}

impl PositionalRead for File {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl PositionalRead for [u8] {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(self.len());
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl PositionalRead for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.as_slice().read_at(buf, offset)
    }
}

impl<T: PositionalRead + ?Sized> PositionalRead for &T {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// One record-aligned window of the input.
#[derive(Debug)]
pub struct Chunk {
    offset: u64,
    data: Vec<u8>,
    bytes_read: usize,
    last_newline: Option<usize>,
}

impl Chunk {
    /// Absolute file offset of the first byte
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes returned by the read, including any deferred partial line
    pub fn bytes_read(&self) -> usize {
        self.bytes_read
    }

    /// Index of the last line terminator in the bytes read
    pub fn last_newline(&self) -> Option<usize> {
        self.last_newline
    }

    /// True when the read returned no bytes at all
    pub fn is_eof(&self) -> bool {
        self.bytes_read == 0
    }

    /// Bytes this chunk owns; the caller's next offset is `offset + effective_len`.
    pub fn effective_len(&self) -> usize {
        self.data.len()
    }

    /// Complete records of this chunk
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Reads up to `requested_size` bytes at `start_offset` and cuts the window
/// after its last line terminator.
///
/// Bytes past the last terminator are left for the next read. At end of
/// input an unterminated last line stays in the chunk. A full window with no
/// terminator before end of input fails with [`ProcessorError::LineTooLong`].
/// Any I/O error is returned as is and is meant to end the run.
pub fn read_chunk<R>(
    source: &R,
    requested_size: usize,
    start_offset: u64,
) -> Result<Chunk, ProcessorError>
where
    R: PositionalRead + ?Sized,
{
    let mut data = vec![0u8; requested_size];
    let bytes_read = fill(source, &mut data, start_offset)?;
    data.truncate(bytes_read);

    let reached_end = bytes_read < requested_size;
    let last_newline = memrchr(LINE_TERMINATOR, &data);

    let effective_len = match last_newline {
        _ if reached_end => bytes_read,
        Some(idx) => idx + 1,
        None => {
            // The window may end exactly where the input does.
            let mut probe = [0u8; 1];
            if fill(source, &mut probe, start_offset + bytes_read as u64)? == 0 {
                bytes_read
            } else {
                return Err(ProcessorError::LineTooLong {
                    offset: start_offset,
                    chunk_size: requested_size,
                });
            }
        }
    };
    data.truncate(effective_len);

    Ok(Chunk {
        offset: start_offset,
        data,
        bytes_read,
        last_newline,
    })
}

/// Reads until `buf` is full or the source reports end of input.
fn fill<R>(source: &R, buf: &mut [u8], offset: u64) -> Result<usize, ProcessorError>
where
    R: PositionalRead + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProcessorError::Io(e)),
        }
    }
    Ok(filled)
}
