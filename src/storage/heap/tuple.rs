use std::fmt;

use crate::common::types::PageId;

/// Fixed-width column types. Text columns store at most `width` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Text { width: usize },
}

impl ColumnType {
    /// On-page width of a field of this type, in bytes.
    pub fn width(&self) -> usize {
        match self {
            // Big-endian i64.
            ColumnType::Int => 8,
            // u16 length prefix plus zero-padded bytes.
            ColumnType::Text { width } => 2 + width,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }
}

/// Column layout of one table; determines the fixed tuple width used by
/// the heap page layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// On-page width of one tuple of this schema, in bytes.
    pub fn tuple_size(&self) -> usize {
        self.columns.iter().map(|c| c.ty().width()).sum()
    }

    /// Whether `tuple` can be stored under this schema: matching arity and
    /// field types, text values within their column width.
    pub fn matches(&self, tuple: &Tuple) -> bool {
        if tuple.values().len() != self.columns.len() {
            return false;
        }
        self.columns
            .iter()
            .zip(tuple.values())
            .all(|(col, val)| match (col.ty(), val) {
                (ColumnType::Int, Value::Int(_)) => true,
                (ColumnType::Text { width }, Value::Text(s)) => s.len() <= width,
                _ => false,
            })
    }
}

/// One field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Where a stored tuple lives: its page and its slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordId {
    page: PageId,
    slot: u16,
}

impl RecordId {
    pub fn new(page: PageId, slot: u16) -> Self {
        Self { page, slot }
    }

    pub fn page_id(&self) -> PageId {
        self.page
    }

    pub fn slot(&self) -> u16 {
        self.slot
    }
}

/// One row. The record ID is set once the tuple has been placed on a
/// page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    values: Vec<Value>,
    rid: Option<RecordId>,
}

impl Tuple {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values, rid: None }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn rid(&self) -> Option<RecordId> {
        self.rid
    }

    pub fn set_rid(&mut self, rid: RecordId) {
        self.rid = Some(rid);
    }
}
