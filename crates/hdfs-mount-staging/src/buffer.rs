//! Staging buffer for random-access writes to remote objects.
//!
//! The remote store can only replace an object wholesale, so every open path
//! gets a buffer sized to the object's length. Writes land in the buffer,
//! gap ranges are filled from the remote on demand, and the complete buffer is
//! sent back on sync.
//!
//! The buffer lives either in memory or in an anonymous temporary file
//! ([`StagingMode::Disk`]), which keeps large objects out of the heap.

use serde::Deserialize;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

/// Where staging buffers keep their bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// Heap-allocated `Vec<u8>`.
    #[default]
    Memory,
    /// Anonymous temporary file, removed by the OS once closed.
    Disk,
}

/// A byte buffer that grows with zeros and reads back clamped to its length.
///
/// # Example
///
/// ```
/// use hdfs_mount_staging::{StagingBuffer, StagingMode};
///
/// let mut buf = StagingBuffer::new(StagingMode::Memory, 0).unwrap();
/// buf.write_at(0, b"Hello, World!").unwrap();
/// assert_eq!(buf.len(), 13);
/// assert_eq!(buf.read_at(0, 5).unwrap(), b"Hello");
/// ```
#[derive(Debug)]
pub enum StagingBuffer {
    /// In-memory content.
    Memory(Vec<u8>),
    /// Content spilled to an unlinked temporary file.
    Spill {
        /// Backing file.
        file: File,
        /// Logical length (mirrors the file length).
        len: u64,
    },
}

impl StagingBuffer {
    /// Creates a zero-filled buffer of `len` bytes.
    ///
    /// Content is not populated; callers fetch ranges as they need them.
    pub fn new(mode: StagingMode, len: u64) -> io::Result<Self> {
        match mode {
            StagingMode::Memory => {
                let len = usize::try_from(len)
                    .map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "object too large"))?;
                Ok(Self::Memory(vec![0; len]))
            }
            StagingMode::Disk => {
                let file = tempfile::tempfile()?;
                file.set_len(len)?;
                Ok(Self::Spill { file, len })
            }
        }
    }

    /// Current size of the buffer.
    #[inline]
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(content) => content.len() as u64,
            Self::Spill { len, .. } => *len,
        }
    }

    /// True if the buffer holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `data` at `offset`.
    ///
    /// The buffer is extended if the write ends past the current length; the
    /// space between the old end and `offset` is zero-filled. Uses 1.5x
    /// geometric growth for the in-memory variant.
    ///
    /// # Returns
    ///
    /// The number of bytes written (always `data.len()`).
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write past u64::MAX"))?;
        match self {
            Self::Memory(content) => {
                let start = to_usize(offset)?;
                let end = to_usize(end)?;
                if end > content.len() {
                    let new_capacity = std::cmp::max(end, (content.capacity() * 3) / 2);
                    if new_capacity > content.capacity() {
                        content.reserve(new_capacity - content.len());
                    }
                    content.resize(end, 0);
                }
                content[start..end].copy_from_slice(data);
            }
            Self::Spill { file, len } => {
                file.write_all_at(data, offset)?;
                if end > *len {
                    *len = end;
                }
            }
        }
        Ok(data.len())
    }

    /// Reads up to `size` bytes at `offset`.
    ///
    /// Returns fewer bytes when the range runs past the end, and nothing when
    /// `offset` is at or past the end.
    pub fn read_at(&self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let len = self.len();
        if offset >= len {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(size as u64).min(len);
        match self {
            Self::Memory(content) => Ok(content[to_usize(offset)?..to_usize(end)?].to_vec()),
            Self::Spill { file, .. } => {
                let mut out = vec![0; to_usize(end - offset)?];
                file.read_exact_at(&mut out, offset)?;
                Ok(out)
            }
        }
    }

    /// Resizes the buffer, zero-extending when growing.
    pub fn set_len(&mut self, new_len: u64) -> io::Result<()> {
        match self {
            Self::Memory(content) => content.resize(to_usize(new_len)?, 0),
            Self::Spill { file, len } => {
                file.set_len(new_len)?;
                *len = new_len;
            }
        }
        Ok(())
    }

    /// Copies the whole buffer out, for a whole-object rewrite.
    pub fn contents(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Memory(content) => Ok(content.clone()),
            Self::Spill { .. } => self.read_at(0, to_usize(self.len())?),
        }
    }
}

fn to_usize(value: u64) -> io::Result<usize> {
    usize::try_from(value)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space"))
}
