use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use crate::common::types::{page_size, LockMode, Page, PageId, PagePtr, TableId, TransactionId};
use crate::storage::cache::{CacheError, PageCache};
use crate::storage::file::{StorageError, TableFile};
use crate::storage::heap::layout;
use crate::storage::heap::tuple::{RecordId, TableSchema, Tuple};

/// Heap of fixed-size slotted pages over a single file, in no particular
/// tuple order. One instance backs one table.
pub struct HeapFile {
    table_id: TableId,
    schema: TableSchema,
    file: Mutex<File>,
}

impl HeapFile {
    /// Open (or create) the backing file at `path`.
    pub fn open(
        table_id: TableId,
        schema: TableSchema,
        path: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            table_id,
            schema,
            file: Mutex::new(file),
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Extend the file with one zeroed page and return its page number.
    ///
    /// The new page carries no tuple data yet, so the extension itself
    /// never exposes uncommitted bytes; the tuple goes in through the
    /// cache and stays there until commit.
    fn allocate_page(&self) -> Result<u32, StorageError> {
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let page_no = (len / page_size() as u64) as u32;
        file.seek(SeekFrom::End(0))?;
        file.write_all(&vec![0u8; page_size()])?;
        file.flush()?;
        debug!("table {} extended to {} pages", self.table_id, page_no + 1);
        Ok(page_no)
    }
}

impl TableFile for HeapFile {
    fn table_id(&self) -> TableId {
        self.table_id
    }

    fn read_page(&self, pid: PageId) -> Result<Page, StorageError> {
        let offset = pid.page_no() as u64 * page_size() as u64;
        let mut data = vec![0u8; page_size()];

        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        if offset < len {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut data)?;
        }
        Ok(Page::new(pid, data))
    }

    fn write_page(&self, page: &Page) -> Result<(), StorageError> {
        let page_no = page.id().page_no();
        let offset = page_no as u64 * page_size() as u64;

        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        // Appending the next page is fine; seeking past it is not.
        if offset > len {
            return Err(StorageError::PageOutOfBounds(page.id()));
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(page.data())?;
        file.flush()?;
        Ok(())
    }

    fn num_pages(&self) -> Result<u32, StorageError> {
        let file = self.file.lock();
        let len = file.metadata()?.len();
        Ok(len.div_ceil(page_size() as u64) as u32)
    }

    fn insert_tuple(
        &self,
        cache: &PageCache,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PagePtr>, CacheError> {
        if !self.schema.matches(tuple) {
            return Err(StorageError::SchemaMismatch.into());
        }

        // Scan existing pages for a free slot.
        for page_no in 0..self.num_pages()? {
            let pid = PageId::new(self.table_id, page_no);
            let ptr = cache.fetch(tid, pid, LockMode::Exclusive)?;
            let placed = {
                let mut page = ptr.write();
                match layout::insert_tuple(&self.schema, &mut page, tuple) {
                    Ok(slot) => Some(slot),
                    Err(StorageError::PageFull(_)) => None,
                    Err(e) => return Err(e.into()),
                }
            };
            if let Some(slot) = placed {
                tuple.set_rid(RecordId::new(pid, slot));
                return Ok(vec![ptr]);
            }
        }

        // Every page is full: grow the file by one zeroed page and place
        // the tuple on it in memory.
        let page_no = self.allocate_page()?;
        let pid = PageId::new(self.table_id, page_no);
        let ptr = cache.fetch(tid, pid, LockMode::Exclusive)?;
        let slot = {
            let mut page = ptr.write();
            layout::insert_tuple(&self.schema, &mut page, tuple)?
        };
        tuple.set_rid(RecordId::new(pid, slot));
        Ok(vec![ptr])
    }

    fn delete_tuple(
        &self,
        cache: &PageCache,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PagePtr>, CacheError> {
        let rid = tuple.rid().ok_or(StorageError::TupleNotFound)?;
        if rid.page_id().table_id() != self.table_id {
            return Err(StorageError::TupleNotFound.into());
        }
        let ptr = cache.fetch(tid, rid.page_id(), LockMode::Exclusive)?;
        {
            let mut page = ptr.write();
            layout::delete_tuple(&self.schema, &mut page, rid.slot())?;
        }
        Ok(vec![ptr])
    }
}
