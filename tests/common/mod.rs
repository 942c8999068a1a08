#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use rowandb::common::types::TableId;
use rowandb::storage::cache::DeadlockPolicy;
use rowandb::storage::heap::tuple::{Column, ColumnType, TableSchema, Tuple, Value};
use rowandb::{Catalog, HeapFile, LockManager, PageCache};

// Schema shared by most tests: an integer key plus a short text field.
pub fn test_schema() -> TableSchema {
    TableSchema::new(vec![
        Column::new("id", ColumnType::Int),
        Column::new("name", ColumnType::Text { width: 16 }),
    ])
}

pub fn test_tuple(id: i64, name: &str) -> Tuple {
    Tuple::new(vec![Value::Int(id), Value::Text(name.to_string())])
}

pub struct TestDb {
    pub cache: Arc<PageCache>,
    pub catalog: Arc<Catalog>,
    pub lock_manager: Arc<LockManager>,
    // Held so the table files outlive the test body.
    pub dir: TempDir,
}

/// A cache over `tables` freshly created heap files with IDs 1..=tables.
pub fn create_test_db(capacity: usize, tables: TableId) -> Result<TestDb> {
    create_test_db_with_policy(capacity, tables, DeadlockPolicy::default())
}

pub fn create_test_db_with_policy(
    capacity: usize,
    tables: TableId,
    policy: DeadlockPolicy,
) -> Result<TestDb> {
    let dir = TempDir::new()?;
    let catalog = Arc::new(Catalog::new());
    for table_id in 1..=tables {
        let path = dir.path().join(format!("table_{table_id}.dat"));
        let file = HeapFile::open(table_id, test_schema(), path)?;
        catalog.register(Arc::new(file));
    }
    let lock_manager = Arc::new(LockManager::new());
    let cache = Arc::new(PageCache::with_policy(
        capacity,
        catalog.clone(),
        lock_manager.clone(),
        policy,
    ));
    Ok(TestDb {
        cache,
        catalog,
        lock_manager,
        dir,
    })
}
