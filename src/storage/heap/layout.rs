//! Slotted heap-page layout.
//!
//! A heap page is a used-slot bitmap header followed by fixed-width tuple
//! slots. With `t` the tuple width in bytes, a page of `p` bytes holds
//! `floor(p * 8 / (t * 8 + 1))` slots: one bit of header per slot.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::common::types::Page;
use crate::storage::file::StorageError;
use crate::storage::heap::tuple::{ColumnType, TableSchema, Tuple, Value};

/// Number of tuple slots on one page of tuples of `schema`.
pub fn slots_per_page(schema: &TableSchema) -> usize {
    (crate::common::types::page_size() * 8) / (schema.tuple_size() * 8 + 1)
}

/// Bytes occupied by the used-slot bitmap.
pub fn header_size(schema: &TableSchema) -> usize {
    slots_per_page(schema).div_ceil(8)
}

fn slot_offset(schema: &TableSchema, slot: u16) -> usize {
    header_size(schema) + slot as usize * schema.tuple_size()
}

/// Whether `slot` holds a live tuple.
pub fn is_slot_used(schema: &TableSchema, page: &Page, slot: u16) -> bool {
    if slot as usize >= slots_per_page(schema) {
        return false;
    }
    page.data()[slot as usize / 8] & (1 << (slot % 8)) != 0
}

fn set_slot_used(page: &mut Page, slot: u16, used: bool) {
    let byte = &mut page.data_mut()[slot as usize / 8];
    if used {
        *byte |= 1 << (slot % 8);
    } else {
        *byte &= !(1 << (slot % 8));
    }
}

/// Number of live tuples on the page.
pub fn used_slot_count(schema: &TableSchema, page: &Page) -> usize {
    (0..slots_per_page(schema) as u16)
        .filter(|&s| is_slot_used(schema, page, s))
        .count()
}

/// Place a tuple in the first free slot. Fails with
/// [`StorageError::PageFull`] when every slot is used.
pub fn insert_tuple(
    schema: &TableSchema,
    page: &mut Page,
    tuple: &Tuple,
) -> Result<u16, StorageError> {
    let slot = (0..slots_per_page(schema) as u16)
        .find(|&s| !is_slot_used(schema, page, s))
        .ok_or(StorageError::PageFull(page.id()))?;

    let offset = slot_offset(schema, slot);
    let end = offset + schema.tuple_size();
    encode_tuple(schema, tuple, &mut page.data_mut()[offset..end])?;
    set_slot_used(page, slot, true);
    Ok(slot)
}

/// Clear a slot. The tuple bytes are left in place; the bitmap alone
/// decides liveness.
pub fn delete_tuple(schema: &TableSchema, page: &mut Page, slot: u16) -> Result<(), StorageError> {
    if !is_slot_used(schema, page, slot) {
        return Err(StorageError::TupleNotFound);
    }
    set_slot_used(page, slot, false);
    Ok(())
}

/// Decode the tuple stored in `slot`.
pub fn read_tuple(schema: &TableSchema, page: &Page, slot: u16) -> Result<Tuple, StorageError> {
    if !is_slot_used(schema, page, slot) {
        return Err(StorageError::TupleNotFound);
    }
    let offset = slot_offset(schema, slot);
    let end = offset + schema.tuple_size();
    decode_tuple(schema, &page.data()[offset..end])
}

fn encode_tuple(schema: &TableSchema, tuple: &Tuple, mut out: &mut [u8]) -> Result<(), StorageError> {
    if !schema.matches(tuple) {
        return Err(StorageError::SchemaMismatch);
    }
    for (column, value) in schema.columns().iter().zip(tuple.values()) {
        match (column.ty(), value) {
            (ColumnType::Int, Value::Int(v)) => out.write_i64::<BigEndian>(*v)?,
            (ColumnType::Text { width }, Value::Text(s)) => {
                out.write_u16::<BigEndian>(s.len() as u16)?;
                std::io::Write::write_all(&mut out, s.as_bytes())?;
                std::io::Write::write_all(&mut out, &vec![0u8; width - s.len()])?;
            }
            // matches() already ruled out type mismatches
            _ => return Err(StorageError::SchemaMismatch),
        }
    }
    Ok(())
}

fn decode_tuple(schema: &TableSchema, bytes: &[u8]) -> Result<Tuple, StorageError> {
    let mut cursor = Cursor::new(bytes);
    let mut values = Vec::with_capacity(schema.columns().len());
    for column in schema.columns() {
        match column.ty() {
            ColumnType::Int => values.push(Value::Int(cursor.read_i64::<BigEndian>()?)),
            ColumnType::Text { width } => {
                let len = cursor.read_u16::<BigEndian>()? as usize;
                let mut buf = vec![0u8; width];
                std::io::Read::read_exact(&mut cursor, &mut buf)?;
                if len > width {
                    return Err(StorageError::SchemaMismatch);
                }
                buf.truncate(len);
                let text =
                    String::from_utf8(buf).map_err(|_| StorageError::SchemaMismatch)?;
                values.push(Value::Text(text));
            }
        }
    }
    Ok(Tuple::new(values))
}
