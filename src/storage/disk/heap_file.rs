use crate::access::schema::Schema;
use crate::storage::disk::PAGE_SIZE;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{HeapPage, PageId, TableId};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A relation's backing file: pages concatenated with no separators.
/// Pages are always read and written whole, and writes overwrite in place.
pub struct HeapFile {
    file: File,
    schema: Schema,
}

impl HeapFile {
    /// Creates a new empty heap file, truncating any existing one.
    pub fn create(path: &Path, schema: Schema) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, schema })
    }

    /// Opens an existing heap file.
    pub fn open(path: &Path, schema: Schema) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Page count: `ceil(file length / PAGE_SIZE)`.
    pub fn num_pages(&self) -> StorageResult<u32> {
        let len = self.file.metadata()?.len();
        Ok(len.div_ceil(PAGE_SIZE as u64) as u32)
    }

    /// Reads and deserializes page `pid.page_no`, which must lie in
    /// `[0, num_pages)`.
    pub fn read_page(&mut self, pid: PageId) -> StorageResult<HeapPage> {
        let page_count = self.num_pages()?;
        if pid.page_no >= page_count {
            return Err(StorageError::PageOutOfRange {
                table_id: pid.table_id,
                page_no: pid.page_no,
                page_count,
            });
        }

        self.file
            .seek(SeekFrom::Start(pid.page_no as u64 * PAGE_SIZE as u64))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        self.file.read_exact(&mut buf)?;
        HeapPage::from_bytes(pid, self.schema.clone(), &buf)
    }

    /// Serializes and writes the page in place. The page number may be at
    /// most `num_pages` (equality appends a whole new page).
    pub fn write_page(&mut self, page: &HeapPage) -> StorageResult<()> {
        let pid = page.pid();
        let page_count = self.num_pages()?;
        if pid.page_no > page_count {
            return Err(StorageError::PageOutOfRange {
                table_id: pid.table_id,
                page_no: pid.page_no,
                page_count,
            });
        }

        let bytes = page.to_bytes()?;
        self.file
            .seek(SeekFrom::Start(pid.page_no as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&bytes)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Appends a freshly zeroed page, extending the file immediately, and
    /// returns it.
    pub fn append_empty_page(&mut self, table_id: TableId) -> StorageResult<HeapPage> {
        let pid = PageId::new(table_id, self.num_pages()?);
        let page = HeapPage::empty(pid, self.schema.clone());
        self.write_page(&page)?;
        Ok(page)
    }
}
