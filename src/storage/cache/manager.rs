use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};

use crate::catalog::Catalog;
use crate::common::types::{
    DEFAULT_CACHE_CAPACITY, LockMode, PageId, PagePtr, TableId, TransactionId,
};
use crate::storage::cache::error::CacheError;
use crate::storage::file::{StorageError, TableFile};
use crate::storage::heap::tuple::Tuple;
use crate::transaction::locks::LockManager;

/// How a blocked fetch decides to give up on a lock.
///
/// Cycle detection aborts only genuinely deadlocked transactions; timeout
/// is simpler but can abort transactions that were merely slow under
/// contention. One policy is chosen at cache construction.
#[derive(Debug, Clone, Copy)]
pub enum DeadlockPolicy {
    /// Sleep `backoff` between retries; consult the wait-for graph and
    /// abort when this transaction is elected the deadlock victim.
    CycleDetection { backoff: Duration },
    /// Sleep `backoff` between retries; abort unconditionally once the
    /// total wait exceeds `limit`.
    Timeout { limit: Duration, backoff: Duration },
}

impl Default for DeadlockPolicy {
    fn default() -> Self {
        DeadlockPolicy::CycleDetection {
            backoff: Duration::from_millis(10),
        }
    }
}

/// Fixed-capacity cache of disk pages shared by concurrent transactions.
///
/// Every page access goes through the lock manager first (strict two-phase
/// locking: locks accumulate until commit or abort releases them all).
/// Pages are served from one shared map, loaded from the table's backing
/// file on miss, and evicted clean-only (no-steal): a dirty page stays
/// resident until its owning transaction finishes.
pub struct PageCache {
    capacity: usize,
    pages: Mutex<HashMap<PageId, PagePtr>>,
    lock_manager: Arc<LockManager>,
    catalog: Arc<Catalog>,
    policy: DeadlockPolicy,
}

impl PageCache {
    /// A cache of `DEFAULT_CACHE_CAPACITY` pages with the default
    /// deadlock policy.
    pub fn new(catalog: Arc<Catalog>, lock_manager: Arc<LockManager>) -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY, catalog, lock_manager)
    }

    pub fn with_capacity(
        capacity: usize,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
    ) -> Self {
        Self::with_policy(capacity, catalog, lock_manager, DeadlockPolicy::default())
    }

    pub fn with_policy(
        capacity: usize,
        catalog: Arc<Catalog>,
        lock_manager: Arc<LockManager>,
        policy: DeadlockPolicy,
    ) -> Self {
        Self {
            capacity,
            pages: Mutex::new(HashMap::with_capacity(capacity)),
            lock_manager,
            catalog,
            policy,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// Fetch a page on behalf of `tid` with the requested access mode,
    /// blocking until the page lock is granted.
    ///
    /// Fails with [`CacheError::TransactionAborted`] when the deadlock
    /// policy gives up on the wait; the caller must then roll the
    /// transaction back with [`PageCache::abort`].
    pub fn fetch(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<PagePtr, CacheError> {
        self.acquire_lock(tid, pid, mode)?;

        let mut pages = self.pages.lock();
        if let Some(ptr) = pages.get(&pid) {
            return Ok(ptr.clone());
        }

        let file = self
            .catalog
            .table_file(pid.table_id())
            .ok_or(CacheError::UnknownTable(pid.table_id()))?;
        let page = file.read_page(pid)?;
        if pages.len() >= self.capacity {
            self.evict_one(&mut pages)?;
        }
        trace!("{tid} loaded {pid}");
        let ptr: PagePtr = Arc::new(RwLock::new(page));
        pages.insert(pid, ptr.clone());
        Ok(ptr)
    }

    /// Retry a non-blocking acquire until granted or the policy aborts the
    /// wait. The lock manager's mutex is never held across a sleep; an
    /// uncontended first attempt returns without sleeping at all.
    fn acquire_lock(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<(), CacheError> {
        if self.lock_manager.acquire(tid, pid, mode) {
            return Ok(());
        }
        match self.policy {
            DeadlockPolicy::CycleDetection { backoff } => loop {
                thread::sleep(backoff);
                if self.lock_manager.deadlock_victim(tid) == Some(tid) {
                    warn!("{tid} aborted as deadlock victim waiting for {pid}");
                    return Err(CacheError::TransactionAborted(tid));
                }
                if self.lock_manager.acquire(tid, pid, mode) {
                    return Ok(());
                }
            },
            DeadlockPolicy::Timeout { limit, backoff } => {
                let start = Instant::now();
                loop {
                    thread::sleep(backoff);
                    if self.lock_manager.acquire(tid, pid, mode) {
                        return Ok(());
                    }
                    if start.elapsed() > limit {
                        warn!("{tid} timed out waiting for {pid}");
                        return Err(CacheError::TransactionAborted(tid));
                    }
                }
            }
        }
    }

    /// Add a tuple to `table_id` on behalf of `tid`.
    ///
    /// Tuple placement is delegated to the table's backing file, which
    /// fetches the pages it touches through this cache with exclusive
    /// locks. Every mutated page is marked dirty for `tid` and upserted
    /// into the cache, replacing any older copy.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        table_id: TableId,
        tuple: &mut Tuple,
    ) -> Result<(), CacheError> {
        let file = self
            .catalog
            .table_file(table_id)
            .ok_or(CacheError::UnknownTable(table_id))?;
        let touched = file.insert_tuple(self, tid, tuple)?;
        self.adopt_dirty(tid, touched)
    }

    /// Remove a tuple on behalf of `tid`. The tuple must carry the record
    /// ID it was assigned on insert.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<(), CacheError> {
        let table_id = tuple
            .rid()
            .ok_or(CacheError::Storage(StorageError::TupleNotFound))?
            .page_id()
            .table_id();
        let file = self
            .catalog
            .table_file(table_id)
            .ok_or(CacheError::UnknownTable(table_id))?;
        let touched = file.delete_tuple(self, tid, tuple)?;
        self.adopt_dirty(tid, touched)
    }

    /// Mark pages mutated by a tuple operation dirty and upsert them.
    fn adopt_dirty(&self, tid: TransactionId, touched: Vec<PagePtr>) -> Result<(), CacheError> {
        let mut pages = self.pages.lock();
        for ptr in touched {
            let pid = {
                let mut page = ptr.write();
                page.mark_dirty(tid);
                page.id()
            };
            if !pages.contains_key(&pid) && pages.len() >= self.capacity {
                self.evict_one(&mut pages)?;
            }
            pages.insert(pid, ptr.clone());
        }
        Ok(())
    }

    /// Release `tid`'s lock on one page without ending the transaction.
    ///
    /// Calling this is very risky: it breaks two-phase locking and no
    /// consistency recomputation is performed afterward. Think hard about
    /// who needs to call this and why.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    /// Whether `tid` holds a lock on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds(tid, pid)
    }

    /// Commit `tid`: flush every page it dirtied to the backing file, mark
    /// them clean, then release all of its locks.
    pub fn commit(&self, tid: TransactionId) -> Result<(), CacheError> {
        {
            let pages = self.pages.lock();
            for ptr in pages.values() {
                let mut page = ptr.write();
                if page.dirty_owner() == Some(tid) {
                    let file = self
                        .catalog
                        .table_file(page.id().table_id())
                        .ok_or(CacheError::UnknownTable(page.id().table_id()))?;
                    file.write_page(&page)?;
                    page.mark_clean();
                    page.set_before_image();
                    debug!("{tid} flushed {} at commit", page.id());
                }
            }
        }
        self.lock_manager.release_all(tid);
        Ok(())
    }

    /// Abort `tid`: revert every page it dirtied to the bytes the backing
    /// file holds, then release all of its locks. Disk state is never
    /// touched; the cache converges back to the on-disk truth.
    pub fn abort(&self, tid: TransactionId) {
        {
            let pages = self.pages.lock();
            for ptr in pages.values() {
                let mut page = ptr.write();
                if page.dirty_owner() == Some(tid) {
                    page.restore_before_image();
                    debug!("{tid} reverted {} at abort", page.id());
                }
            }
        }
        self.lock_manager.release_all(tid);
    }

    /// Drop a page from the cache without flushing it, dirty or not. Used
    /// when the page is known to be invalid at the file level.
    pub fn discard(&self, pid: PageId) {
        self.pages.lock().remove(&pid);
    }

    /// Flush every dirty page regardless of owner.
    ///
    /// Maintenance/shutdown path only: this writes uncommitted data to
    /// disk and therefore breaks the no-steal consistency policy.
    pub fn flush_all(&self) -> Result<(), CacheError> {
        let pages = self.pages.lock();
        for ptr in pages.values() {
            let mut page = ptr.write();
            if page.is_dirty() {
                let file = self
                    .catalog
                    .table_file(page.id().table_id())
                    .ok_or(CacheError::UnknownTable(page.id().table_id()))?;
                file.write_page(&page)?;
                page.mark_clean();
                page.set_before_image();
            }
        }
        Ok(())
    }

    /// Evict one clean page, in map iteration order. Dirty pages are
    /// pinned until their owner commits or aborts (no-steal); if nothing
    /// is clean the cache is exhausted.
    fn evict_one(&self, pages: &mut HashMap<PageId, PagePtr>) -> Result<(), CacheError> {
        let victim = pages
            .iter()
            .find(|(_, ptr)| !ptr.read().is_dirty())
            .map(|(&pid, _)| pid);
        match victim {
            Some(pid) => {
                pages.remove(&pid);
                debug!("evicted clean {pid}");
                Ok(())
            }
            None => Err(CacheError::CacheExhausted(self.capacity)),
        }
    }
}
