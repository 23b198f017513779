//! Disk Manager - low-level file I/O for table pages.
//!
//! The [`DiskManager`] handles direct file operations for one table
//! file: reading and writing 4KB frames and growing the file by one
//! slot at a time. It knows nothing about page contents; the tree file
//! layer owns the codec and the slot bookkeeping.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::Result;

/// Slot-addressed I/O over a single table file.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Slot 0  │ Slot 1  │ Slot 2  │  ...    │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │
/// └─────────┴─────────┴─────────┴─────────┘
/// ```
/// Slot N lives at byte offset `N × PAGE_SIZE`. Slot 0 is always the
/// root pointer and slot 1 the first header page; the tree file layer
/// enforces that convention.
///
/// # Thread Safety
/// `DiskManager` is single-threaded; the owning tree file serializes
/// access behind a mutex.
pub struct DiskManager {
    file: File,
    slot_count: u32,
}

impl DiskManager {
    /// Create a new table file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            slot_count: 0,
        })
    }

    /// Open an existing table file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let metadata = file.metadata()?;
        let slot_count = (metadata.len() / PAGE_SIZE as u64) as u32;

        Ok(Self { file, slot_count })
    }

    /// Read the frame stored in `slot`.
    ///
    /// The caller is responsible for bounds-checking against
    /// [`slot_count`](Self::slot_count); reads past the end of the file
    /// surface as I/O errors.
    pub fn read_slot(&mut self, slot: u32) -> Result<[u8; PAGE_SIZE]> {
        let offset = (slot as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut frame = [0u8; PAGE_SIZE];
        self.file.read_exact(&mut frame)?;
        Ok(frame)
    }

    /// Write a frame into an already-allocated `slot`, fsyncing for
    /// durability.
    pub fn write_slot(&mut self, slot: u32, frame: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = (slot as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(frame)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Grow the file by one zeroed slot, returning its number.
    pub fn allocate_slot(&mut self) -> Result<u32> {
        let slot = self.slot_count;

        let offset = (slot as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;
        self.file.sync_all()?;

        self.slot_count += 1;
        Ok(slot)
    }

    /// Number of slots in the file.
    #[inline]
    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }
}
