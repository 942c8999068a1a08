use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::common::types::TableId;
use crate::storage::file::TableFile;

/// Maps a table identifier to the backing file that stores it.
///
/// Owned by the caller and injected into the page cache at construction;
/// there is no process-wide singleton.
pub struct Catalog {
    tables: RwLock<HashMap<TableId, Arc<dyn TableFile>>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Register a table's backing file, replacing any previous file
    /// registered under the same table ID.
    pub fn register(&self, file: Arc<dyn TableFile>) {
        self.tables.write().insert(file.table_id(), file);
    }

    /// The backing file for `table_id`, if registered.
    pub fn table_file(&self, table_id: TableId) -> Option<Arc<dyn TableFile>> {
        self.tables.read().get(&table_id).cloned()
    }
}
