//! Paged fixed-record array store.
//!
//! Every dataset of an alignment container (segment arrays, sequence catalog,
//! packed DNA) is one of these: a flat file of `count` records of
//! `record_size` bytes behind a 32-byte header, accessed through a single
//! resident chunk of `chunk_records` records. Touching a record outside the
//! resident chunk writes the chunk back if dirty and pages in the chunk that
//! contains it.
//!
//! Arrays are written once through [`PagedArray::create`] and are read-only
//! ever after: [`PagedArray::load`] maps the file and refuses updates.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::error::{Result, StrataError};

/// File magic for paged array datasets.
const MAGIC: &[u8; 8] = b"STRATARR";

/// Header bytes before the first record.
const HEADER_LEN: u64 = 32;

enum Backend {
    /// Bulk-create path: positional reads and writes on an owned descriptor.
    Writable(File),
    /// Loaded path: the whole file mapped read-only.
    ReadOnly(Mmap),
}

/// A fixed-record-size array with a single-chunk page cache.
pub struct PagedArray {
    backend: Backend,
    path: PathBuf,
    record_size: usize,
    count: u64,
    chunk_records: u64,
    buf: Vec<u8>,
    buf_start: u64,
    buf_len: u64,
    resident: bool,
    dirty: bool,
}

fn normalize_chunk(chunk_size: u64, count: u64) -> Result<u64> {
    if chunk_size == 1 {
        return Err(StrataError::InvalidArgument(
            "chunk size of 1 is not supported".to_string(),
        ));
    }
    if count == 0 {
        return Ok(0);
    }
    // chunk 0 means "one chunk for the whole array"; larger-than-array
    // chunks are clamped.
    if chunk_size == 0 || chunk_size > count {
        Ok(count)
    } else {
        Ok(chunk_size)
    }
}

impl PagedArray {
    /// Create a new array of `count` records of `record_size` bytes at
    /// `path`, replacing any existing file. The array is writable until the
    /// handle is dropped.
    pub fn create<P: AsRef<Path>>(
        path: P,
        record_size: usize,
        count: u64,
        chunk_size: u64,
    ) -> Result<Self> {
        if record_size == 0 {
            return Err(StrataError::InvalidArgument(
                "record size must be positive".to_string(),
            ));
        }
        let chunk_records = normalize_chunk(chunk_size, count)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        let mut header = [0u8; HEADER_LEN as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..16].copy_from_slice(&(record_size as u64).to_le_bytes());
        header[16..24].copy_from_slice(&count.to_le_bytes());
        header[24..32].copy_from_slice(&chunk_records.to_le_bytes());
        file.write_all(&header)?;
        file.set_len(HEADER_LEN + count * record_size as u64)?;

        let buf = vec![0u8; chunk_records as usize * record_size];
        Ok(Self {
            backend: Backend::Writable(file),
            path: path.as_ref().to_path_buf(),
            record_size,
            count,
            chunk_records,
            buf,
            buf_start: 0,
            buf_len: 0,
            resident: false,
            dirty: false,
        })
    }

    /// Load an existing array read-only.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < HEADER_LEN as usize || &map[0..8] != MAGIC {
            return Err(StrataError::Schema(format!(
                "{}: not a paged array dataset",
                path.as_ref().display()
            )));
        }
        let record_size = u64::from_le_bytes(map[8..16].try_into().unwrap()) as usize;
        let count = u64::from_le_bytes(map[16..24].try_into().unwrap());
        let chunk_records = u64::from_le_bytes(map[24..32].try_into().unwrap());
        if record_size == 0 || (chunk_records == 1 && count > 1) {
            return Err(StrataError::Schema(format!(
                "{}: bad record or chunk size",
                path.as_ref().display()
            )));
        }
        let expected = HEADER_LEN + count * record_size as u64;
        if (map.len() as u64) < expected {
            return Err(StrataError::Schema(format!(
                "{}: truncated dataset ({} bytes, expected {})",
                path.as_ref().display(),
                map.len(),
                expected
            )));
        }
        let buf = vec![0u8; chunk_records as usize * record_size];
        Ok(Self {
            backend: Backend::ReadOnly(map),
            path: path.as_ref().to_path_buf(),
            record_size,
            count,
            chunk_records,
            buf,
            buf_start: 0,
            buf_len: 0,
            resident: false,
            dirty: false,
        })
    }

    /// Number of records.
    #[inline]
    pub fn len(&self) -> u64 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Record size in bytes.
    #[inline]
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    fn check_index(&self, index: i64) -> Result<u64> {
        if index < 0 || index as u64 >= self.count {
            return Err(StrataError::out_of_range(index, self.count));
        }
        Ok(index as u64)
    }

    /// Page the chunk containing record `i` into the resident buffer,
    /// writing back the current chunk first if it is dirty.
    fn page(&mut self, i: u64) -> Result<()> {
        if self.resident && i >= self.buf_start && i < self.buf_start + self.buf_len {
            return Ok(());
        }
        if self.dirty {
            self.write_back()?;
        }
        let chunk = self.chunk_records.max(1);
        self.buf_start = (i / chunk) * chunk;
        self.buf_len = chunk.min(self.count - self.buf_start);
        let byte_off = HEADER_LEN + self.buf_start * self.record_size as u64;
        let byte_len = self.buf_len as usize * self.record_size;
        match &mut self.backend {
            Backend::Writable(file) => {
                file.seek(SeekFrom::Start(byte_off))?;
                file.read_exact(&mut self.buf[..byte_len])?;
            }
            Backend::ReadOnly(map) => {
                let start = byte_off as usize;
                self.buf[..byte_len].copy_from_slice(&map[start..start + byte_len]);
            }
        }
        self.resident = true;
        self.dirty = false;
        Ok(())
    }

    fn write_back(&mut self) -> Result<()> {
        let byte_off = HEADER_LEN + self.buf_start * self.record_size as u64;
        let byte_len = self.buf_len as usize * self.record_size;
        match &mut self.backend {
            Backend::Writable(file) => {
                file.seek(SeekFrom::Start(byte_off))?;
                file.write_all(&self.buf[..byte_len])?;
            }
            Backend::ReadOnly(_) => {
                return Err(StrataError::Invariant(format!(
                    "{}: dirty chunk in read-only array",
                    self.path.display()
                )));
            }
        }
        self.dirty = false;
        Ok(())
    }

    /// Read view of record `i`. The borrow rules make the paging contract
    /// explicit: taking a new view invalidates all previous ones.
    pub fn get(&mut self, index: i64) -> Result<&[u8]> {
        let i = self.check_index(index)?;
        self.page(i)?;
        let off = (i - self.buf_start) as usize * self.record_size;
        Ok(&self.buf[off..off + self.record_size])
    }

    /// Write view of record `i`; marks the resident chunk dirty.
    pub fn get_update(&mut self, index: i64) -> Result<&mut [u8]> {
        if matches!(self.backend, Backend::ReadOnly(_)) {
            return Err(StrataError::InvalidArgument(format!(
                "{}: array was opened read-only",
                self.path.display()
            )));
        }
        let i = self.check_index(index)?;
        self.page(i)?;
        self.dirty = true;
        let off = (i - self.buf_start) as usize * self.record_size;
        Ok(&mut self.buf[off..off + self.record_size])
    }

    /// Write back any dirty chunk.
    pub fn flush(&mut self) -> Result<()> {
        if self.dirty {
            self.write_back()?;
        }
        Ok(())
    }

    // Typed field accessors. `offset` is a byte offset within the record.

    #[inline]
    pub fn read_i64(&mut self, index: i64, offset: usize) -> Result<i64> {
        let rec = self.get(index)?;
        Ok(i64::from_le_bytes(rec[offset..offset + 8].try_into().unwrap()))
    }

    #[inline]
    pub fn read_u64(&mut self, index: i64, offset: usize) -> Result<u64> {
        let rec = self.get(index)?;
        Ok(u64::from_le_bytes(rec[offset..offset + 8].try_into().unwrap()))
    }

    #[inline]
    pub fn read_u8(&mut self, index: i64, offset: usize) -> Result<u8> {
        let rec = self.get(index)?;
        Ok(rec[offset])
    }

    #[inline]
    pub fn write_i64(&mut self, index: i64, offset: usize, value: i64) -> Result<()> {
        let rec = self.get_update(index)?;
        rec[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    #[inline]
    pub fn write_u64(&mut self, index: i64, offset: usize, value: u64) -> Result<()> {
        let rec = self.get_update(index)?;
        rec[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, index: i64, offset: usize, value: u8) -> Result<()> {
        let rec = self.get_update(index)?;
        rec[offset] = value;
        Ok(())
    }
}

impl Drop for PagedArray {
    fn drop(&mut self) {
        if self.dirty {
            let _ = self.write_back();
        }
    }
}
