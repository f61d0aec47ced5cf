//! Disk manager for page-level file I/O.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tern_common::page::{PageId, PAGE_SIZE};
use tern_common::{Result, StorageConfig, TernError};

/// Manages reading and writing pages to the database file.
///
/// Pages live at `page_id * PAGE_SIZE` in a single flat file. The manager
/// is safe to call from multiple threads, but all operations serialize on
/// one file handle; the disk scheduler keeps at most one request in flight.
pub struct DiskManager {
    /// Configuration.
    config: StorageConfig,
    /// The database file.
    file: Mutex<File>,
}

impl DiskManager {
    /// Creates a new disk manager, opening or creating the database file.
    pub fn new(config: StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.db_path)?;

        Ok(Self {
            config,
            file: Mutex::new(file),
        })
    }

    /// Returns the path of the database file.
    pub fn db_path(&self) -> &Path {
        &self.config.db_path
    }

    /// Reads a page from disk into the provided buffer.
    ///
    /// A page that lies beyond the end of the file reads back as zeroes:
    /// callers may fetch pages that were allocated but never flushed.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(TernError::InvalidPageId { page_id });
        }

        let mut file = self.file.lock();
        let file_len = file.metadata()?.len();
        let offset = page_id.offset();

        if offset >= file_len {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        if offset + PAGE_SIZE as u64 <= file_len {
            file.read_exact(buf)?;
        } else {
            // Trailing partial page: read what exists, zero the rest.
            let avail = (file_len - offset) as usize;
            file.read_exact(&mut buf[..avail])?;
            buf[avail..].fill(0);
        }
        Ok(())
    }

    /// Writes a page to disk, extending the file as needed.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(TernError::InvalidPageId { page_id });
        }
        if data.len() != PAGE_SIZE {
            return Err(TernError::IoFailed(format!(
                "write of {} bytes to {} (expected {})",
                data.len(),
                page_id,
                PAGE_SIZE
            )));
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.offset()))?;
        file.write_all(data)?;

        if self.config.fsync_enabled {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Returns the number of pages currently materialized in the file.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        let file_len = file.metadata()?.len();
        Ok(file_len.div_ceil(PAGE_SIZE as u64) as u32)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_test_disk_manager() -> (DiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("test.db"),
            fsync_enabled: false,
        };
        let dm = DiskManager::new(config).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_disk_manager_new() {
        let (dm, _dir) = create_test_disk_manager();
        assert!(dm.db_path().exists());
        assert_eq!(dm.num_pages().unwrap(), 0);
    }

    #[test]
    fn test_disk_manager_write_read() {
        let (dm, _dir) = create_test_disk_manager();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        data[PAGE_SIZE - 1] = 0xEF;
        dm.write_page(PageId(0), &data).unwrap();

        let mut read_buf = [0u8; PAGE_SIZE];
        dm.read_page(PageId(0), &mut read_buf).unwrap();
        assert_eq!(read_buf[0], 0xAB);
        assert_eq!(read_buf[100], 0xCD);
        assert_eq!(read_buf[PAGE_SIZE - 1], 0xEF);
    }

    #[test]
    fn test_disk_manager_read_past_eof_zero_fills() {
        let (dm, _dir) = create_test_disk_manager();

        let mut buf = [0xFFu8; PAGE_SIZE];
        dm.read_page(PageId(7), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_write_extends_file() {
        let (dm, _dir) = create_test_disk_manager();

        let data = [0x11u8; PAGE_SIZE];
        dm.write_page(PageId(4), &data).unwrap();
        assert_eq!(dm.num_pages().unwrap(), 5);

        // Pages 0-3 were never written; they read back as zeroes.
        let mut buf = [0xFFu8; PAGE_SIZE];
        dm.read_page(PageId(2), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_overwrite_page() {
        let (dm, _dir) = create_test_disk_manager();

        let data1 = [0xAAu8; PAGE_SIZE];
        dm.write_page(PageId(1), &data1).unwrap();

        let data2 = [0xBBu8; PAGE_SIZE];
        dm.write_page(PageId(1), &data2).unwrap();

        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(PageId(1), &mut buf).unwrap();
        assert_eq!(buf[0], 0xBB);
    }

    #[test]
    fn test_disk_manager_invalid_page_id() {
        let (dm, _dir) = create_test_disk_manager();

        let mut buf = [0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(PageId::INVALID, &mut buf),
            Err(TernError::InvalidPageId { .. })
        ));
        assert!(matches!(
            dm.write_page(PageId(-5), &buf),
            Err(TernError::InvalidPageId { .. })
        ));
    }

    #[test]
    fn test_disk_manager_short_write_rejected() {
        let (dm, _dir) = create_test_disk_manager();

        let result = dm.write_page(PageId(0), &[0u8; 16]);
        assert!(matches!(result, Err(TernError::IoFailed(_))));
    }

    #[test]
    fn test_disk_manager_persistence() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("persist.db"),
            fsync_enabled: true,
        };

        {
            let dm = DiskManager::new(config.clone()).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0] = 0xFF;
            dm.write_page(PageId(3), &data).unwrap();
        }

        let dm = DiskManager::new(config).unwrap();
        let mut buf = [0u8; PAGE_SIZE];
        dm.read_page(PageId(3), &mut buf).unwrap();
        assert_eq!(buf[0], 0xFF);
    }

    #[test]
    fn test_disk_manager_flush() {
        let (dm, _dir) = create_test_disk_manager();
        dm.write_page(PageId(0), &[0u8; PAGE_SIZE]).unwrap();
        dm.flush().unwrap();
    }
}
