use anyhow::Result;

mod common;
use common::{create_test_db, test_tuple};

use rowandb::common::types::{LockMode, PageId, TransactionId};
use rowandb::storage::heap::layout;
use rowandb::{CacheError, TableFile};
use std::sync::Arc;

#[test]
fn test_fetch_returns_shared_instance() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();
    let pid = PageId::new(1, 0);

    let first = db.cache.fetch(tid, pid, LockMode::Shared)?;
    let second = db.cache.fetch(tid, pid, LockMode::Shared)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(db.cache.resident_pages(), 1);
    Ok(())
}

#[test]
fn test_capacity_one_evicts_clean_page() -> Result<()> {
    let db = create_test_db(1, 1)?;
    let tid = TransactionId::new();
    let a = PageId::new(1, 0);
    let b = PageId::new(1, 1);

    let first_a = db.cache.fetch(tid, a, LockMode::Shared)?;
    assert_eq!(db.cache.resident_pages(), 1);

    // Fetching B evicts the clean A; the cache now holds only B.
    let first_b = db.cache.fetch(tid, b, LockMode::Shared)?;
    assert_eq!(db.cache.resident_pages(), 1);
    assert!(Arc::ptr_eq(&first_b, &db.cache.fetch(tid, b, LockMode::Shared)?));

    // A was dropped: a refetch loads a fresh instance.
    let second_a = db.cache.fetch(tid, a, LockMode::Shared)?;
    assert!(!Arc::ptr_eq(&first_a, &second_a));
    Ok(())
}

#[test]
fn test_cache_bound_holds_under_many_fetches() -> Result<()> {
    let db = create_test_db(3, 1)?;
    let tid = TransactionId::new();
    for page_no in 0..20 {
        db.cache
            .fetch(tid, PageId::new(1, page_no), LockMode::Shared)?;
        assert!(db.cache.resident_pages() <= 3);
    }
    Ok(())
}

#[test]
fn test_exhausted_when_every_page_is_dirty() -> Result<()> {
    let db = create_test_db(1, 1)?;
    let tid = TransactionId::new();

    let mut tuple = test_tuple(1, "pinned");
    db.cache.insert_tuple(tid, 1, &mut tuple)?;
    assert_eq!(db.cache.resident_pages(), 1);

    // The only slot is dirty and pinned by the uncommitted transaction.
    let err = db
        .cache
        .fetch(tid, PageId::new(1, 1), LockMode::Shared)
        .unwrap_err();
    assert!(matches!(err, CacheError::CacheExhausted(1)));

    // Committing unpins; the fetch then succeeds.
    db.cache.commit(tid)?;
    db.cache.fetch(tid, PageId::new(1, 1), LockMode::Shared)?;
    Ok(())
}

#[test]
fn test_commit_flushes_and_releases() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();

    let mut tuple = test_tuple(7, "durable");
    db.cache.insert_tuple(tid, 1, &mut tuple)?;
    let rid = tuple.rid().expect("insert assigns a record id");
    assert!(db.cache.holds_lock(tid, rid.page_id()));

    db.cache.commit(tid)?;
    assert!(!db.cache.holds_lock(tid, rid.page_id()));

    // The tuple is on disk, bypassing the cache entirely.
    let file = db.catalog.table_file(1).unwrap();
    let on_disk = file.read_page(rid.page_id())?;
    let stored = layout::read_tuple(&common::test_schema(), &on_disk, rid.slot())?;
    assert_eq!(stored.values(), tuple.values());

    // And the cached copy is clean again.
    let page = db.cache.fetch(tid, rid.page_id(), LockMode::Shared)?;
    assert!(!page.read().is_dirty());
    Ok(())
}

#[test]
fn test_abort_reverts_cache_and_leaves_disk_untouched() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let schema = common::test_schema();
    let t1 = TransactionId::new();

    let mut tuple = test_tuple(9, "ghost");
    db.cache.insert_tuple(t1, 1, &mut tuple)?;
    let rid = tuple.rid().unwrap();

    db.cache.abort(t1);
    assert!(!db.cache.holds_lock(t1, rid.page_id()));

    // A fresh fetch by another transaction sees the pre-insert bytes.
    let t2 = TransactionId::new();
    let page = db.cache.fetch(t2, rid.page_id(), LockMode::Shared)?;
    assert_eq!(layout::used_slot_count(&schema, &page.read()), 0);

    // Disk was never written.
    let file = db.catalog.table_file(1).unwrap();
    let on_disk = file.read_page(rid.page_id())?;
    assert_eq!(layout::used_slot_count(&schema, &on_disk), 0);
    assert_eq!(on_disk.data(), page.read().data());
    Ok(())
}

#[test]
fn test_delete_tuple() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let schema = common::test_schema();
    let tid = TransactionId::new();

    let mut tuple = test_tuple(1, "here");
    db.cache.insert_tuple(tid, 1, &mut tuple)?;
    let rid = tuple.rid().unwrap();
    db.cache.commit(tid)?;

    let t2 = TransactionId::new();
    db.cache.delete_tuple(t2, &tuple)?;
    db.cache.commit(t2)?;

    let file = db.catalog.table_file(1).unwrap();
    let on_disk = file.read_page(rid.page_id())?;
    assert!(!layout::is_slot_used(&schema, &on_disk, rid.slot()));
    Ok(())
}

#[test]
fn test_delete_unplaced_tuple_fails() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();
    let tuple = test_tuple(1, "nowhere");
    let err = db.cache.delete_tuple(tid, &tuple).unwrap_err();
    assert!(matches!(err, CacheError::Storage(_)));
    Ok(())
}

#[test]
fn test_discard_drops_page_without_flush() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();

    let mut tuple = test_tuple(5, "volatile");
    db.cache.insert_tuple(tid, 1, &mut tuple)?;
    let rid = tuple.rid().unwrap();
    assert_eq!(db.cache.resident_pages(), 1);

    db.cache.discard(rid.page_id());
    assert_eq!(db.cache.resident_pages(), 0);

    // Nothing reached disk.
    let file = db.catalog.table_file(1).unwrap();
    let on_disk = file.read_page(rid.page_id())?;
    assert_eq!(
        layout::used_slot_count(&common::test_schema(), &on_disk),
        0
    );
    Ok(())
}

#[test]
fn test_flush_all_persists_uncommitted_data() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();

    let mut tuple = test_tuple(3, "stolen");
    db.cache.insert_tuple(tid, 1, &mut tuple)?;
    db.cache.flush_all()?;

    let rid = tuple.rid().unwrap();
    let file = db.catalog.table_file(1).unwrap();
    let on_disk = file.read_page(rid.page_id())?;
    assert!(layout::is_slot_used(
        &common::test_schema(),
        &on_disk,
        rid.slot()
    ));

    // Flushed pages are clean and therefore evictable again.
    let cached = db.cache.fetch(tid, rid.page_id(), LockMode::Shared)?;
    assert!(!cached.read().is_dirty());
    Ok(())
}

#[test]
fn test_insert_grows_file_when_pages_fill() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let schema = common::test_schema();
    let per_page = rowandb::storage::heap::layout::slots_per_page(&schema);
    let tid = TransactionId::new();

    for i in 0..(per_page + 1) {
        let mut tuple = test_tuple(i as i64, "row");
        db.cache.insert_tuple(tid, 1, &mut tuple)?;
    }
    db.cache.commit(tid)?;

    let file = db.catalog.table_file(1).unwrap();
    assert_eq!(file.num_pages()?, 2);
    Ok(())
}

#[test]
fn test_fetch_unknown_table() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();
    let err = db
        .cache
        .fetch(tid, PageId::new(99, 0), LockMode::Shared)
        .unwrap_err();
    assert!(matches!(err, CacheError::UnknownTable(99)));
    Ok(())
}

#[test]
fn test_release_forwards_to_lock_manager() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();
    let pid = PageId::new(1, 0);

    db.cache.fetch(tid, pid, LockMode::Exclusive)?;
    assert!(db.cache.holds_lock(tid, pid));
    db.cache.release(tid, pid);
    assert!(!db.cache.holds_lock(tid, pid));
    Ok(())
}

#[test]
fn test_upgrade_through_fetch() -> Result<()> {
    let db = create_test_db(10, 1)?;
    let tid = TransactionId::new();
    let pid = PageId::new(1, 0);

    db.cache.fetch(tid, pid, LockMode::Shared)?;
    db.cache.fetch(tid, pid, LockMode::Exclusive)?;
    assert_eq!(
        db.lock_manager.held_mode(tid, pid),
        Some(LockMode::Exclusive)
    );
    Ok(())
}
