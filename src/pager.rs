//! Fixed-size paged file I/O.
//!
//! Mirrors `utec::disk::pagemanager`: a single backing file addressed in
//! `page_size`-byte blocks, with a create-vs-reopen policy decided once at
//! `open` time and exposed via `is_empty`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};

use crate::err;
use crate::error::Error;

pub struct PageManager {
    file: File,
    page_size: usize,
    empty: bool,
}

impl PageManager {
    /// Opens `path` for paged access. If `truncate` is set, the file is
    /// created fresh (or cleared) unconditionally. Otherwise an existing file
    /// is reopened for read/write; if none exists one is created, and
    /// `is_empty()` reports which case occurred.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize, truncate: bool) -> Result<Self, Error> {
        let path = path.as_ref();

        if truncate {
            debug!(path = %path.display(), page_size, "creating fresh page file");
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            return Ok(Self {
                file,
                page_size,
                empty: true,
            });
        }

        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => {
                let empty = file.metadata()?.len() == 0;
                debug!(path = %path.display(), empty, "reopened existing page file");
                Ok(Self {
                    file,
                    page_size,
                    empty,
                })
            }
            Err(_) => {
                debug!(path = %path.display(), page_size, "page file missing, creating");
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                Ok(Self {
                    file,
                    page_size,
                    empty: true,
                })
            }
        }
    }

    /// True iff `open` created this file rather than reopening existing content.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn check_len(&self, buf: &[u8]) -> Result<(), Error> {
        if buf.len() != self.page_size {
            return Err(err!(
                Storage,
                "page image is {} bytes, expected page_size {}",
                buf.len(),
                self.page_size
            ));
        }
        Ok(())
    }

    /// Writes exactly `page_size` bytes at the offset for `page_id`.
    pub fn save(&mut self, page_id: i64, buf: &[u8]) -> Result<(), Error> {
        self.check_len(buf)?;
        trace!(page_id, "save");
        let offset = page_id as u64 * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Reads exactly `page_size` bytes from the offset for `page_id` into `buf`.
    pub fn recover(&mut self, page_id: i64, buf: &mut [u8]) -> Result<(), Error> {
        self.check_len(buf)?;
        trace!(page_id, "recover");
        let offset = page_id as u64 * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file
            .read_exact(buf)
            .map_err(|e| err!(Storage, "short read recovering page {}: {}", page_id, e))
    }

    /// Overwrites the page with a zeroed image. No free-list reuse is promised.
    pub fn erase(&mut self, page_id: i64) -> Result<(), Error> {
        trace!(page_id, "erase");
        let zeros = vec![0u8; self.page_size];
        self.save(page_id, &zeros)
    }
}
