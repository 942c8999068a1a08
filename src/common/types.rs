use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Table ID type
pub type TableId = u32;

/// Default page size in bytes (4KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default page cache capacity in pages
pub const DEFAULT_CACHE_CAPACITY: usize = 50;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(DEFAULT_PAGE_SIZE);

/// Current process-wide page size in bytes.
pub fn page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// Override the process-wide page size.
///
/// THIS FUNCTION SHOULD ONLY BE USED FOR TESTING. Pages created before the
/// override keep their original size.
pub fn set_page_size(bytes: usize) {
    PAGE_SIZE.store(bytes, Ordering::Relaxed);
}

/// Restore the default page size. Testing counterpart of [`set_page_size`].
pub fn reset_page_size() {
    PAGE_SIZE.store(DEFAULT_PAGE_SIZE, Ordering::Relaxed);
}

/// Identity of one fixed-size page: the table it belongs to plus its page
/// number within that table's backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId {
    table_id: TableId,
    page_no: u32,
}

impl PageId {
    pub fn new(table_id: TableId, page_no: u32) -> Self {
        Self { table_id, page_no }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn page_no(&self) -> u32 {
        self.page_no
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table {} page {}", self.table_id, self.page_no)
    }
}

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque per-transaction token, minted once at transaction start.
///
/// Ordering follows mint order, which the deadlock detector uses to pick a
/// deterministic victim (the youngest transaction on a cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Mint a fresh, process-unique transaction ID.
    pub fn new() -> Self {
        Self(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn {}", self.0)
    }
}

/// Requested access level for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// One in-memory disk page.
///
/// A page is either clean or dirty with exactly one owning transaction; the
/// exclusive page lock enforces the single-writer assumption. The before
/// image holds the bytes as last read from (or flushed to) disk and backs
/// the in-memory revert on abort.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
    before_image: Vec<u8>,
    dirty: Option<TransactionId>,
}

impl Page {
    /// Wrap bytes freshly read from disk. The before image starts out as a
    /// copy of the same bytes.
    pub fn new(id: PageId, data: Vec<u8>) -> Self {
        let before_image = data.clone();
        Self {
            id,
            data,
            before_image,
            dirty: None,
        }
    }

    /// An all-zero page, the on-disk representation of a freshly allocated
    /// page.
    pub fn zeroed(id: PageId) -> Self {
        Self::new(id, vec![0; page_size()])
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The transaction that dirtied this page, if any.
    pub fn dirty_owner(&self) -> Option<TransactionId> {
        self.dirty
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    /// Tag this page as dirtied by `tid`.
    ///
    /// Panics if a different transaction already owns the page: two writers
    /// on one page without an intervening flush or discard means the lock
    /// protocol was bypassed.
    pub fn mark_dirty(&mut self, tid: TransactionId) {
        assert!(
            self.dirty.is_none() || self.dirty == Some(tid),
            "page {} already dirtied by {:?}, cannot be dirtied by {}",
            self.id,
            self.dirty,
            tid
        );
        self.dirty = Some(tid);
    }

    /// Clear the dirty tag after the page has been flushed to disk.
    pub fn mark_clean(&mut self) {
        self.dirty = None;
    }

    /// Bytes as last read from or flushed to disk.
    pub fn before_image(&self) -> &[u8] {
        &self.before_image
    }

    /// Snapshot the current bytes as the new before image. Called after a
    /// successful flush, when memory and disk agree again.
    pub fn set_before_image(&mut self) {
        self.before_image = self.data.clone();
    }

    /// Discard the in-memory mutation: restore the before image and clear
    /// the dirty tag. Never touches disk.
    pub fn restore_before_image(&mut self) {
        self.data = self.before_image.clone();
        self.dirty = None;
    }
}

/// Smart pointer to a page; repeated fetches of the same page hand out
/// clones of one instance so in-place mutation is visible to all holders.
pub type PagePtr = Arc<RwLock<Page>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_value_equality() {
        let a = PageId::new(3, 7);
        let b = PageId::new(3, 7);
        let c = PageId::new(3, 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.table_id(), 3);
        assert_eq!(a.page_no(), 7);
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_page_dirty_lifecycle() {
        let tid = TransactionId::new();
        let mut page = Page::zeroed(PageId::new(1, 0));
        assert!(!page.is_dirty());

        page.data_mut()[0] = 0xAB;
        page.mark_dirty(tid);
        assert_eq!(page.dirty_owner(), Some(tid));

        // Same owner may re-mark.
        page.mark_dirty(tid);

        page.restore_before_image();
        assert!(!page.is_dirty());
        assert_eq!(page.data()[0], 0);
    }

    #[test]
    #[should_panic]
    fn test_page_rejects_second_writer() {
        let mut page = Page::zeroed(PageId::new(1, 0));
        page.mark_dirty(TransactionId::new());
        page.mark_dirty(TransactionId::new());
    }

    #[test]
    fn test_before_image_tracks_flush() {
        let tid = TransactionId::new();
        let mut page = Page::zeroed(PageId::new(1, 0));
        page.data_mut()[10] = 42;
        page.mark_dirty(tid);
        page.mark_clean();
        page.set_before_image();

        // A later revert lands on the flushed bytes, not the zeroes.
        page.data_mut()[10] = 99;
        page.mark_dirty(tid);
        page.restore_before_image();
        assert_eq!(page.data()[10], 42);
    }
}
