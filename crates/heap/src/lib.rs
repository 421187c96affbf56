//! Heap file storage: header page + singly linked chain of data pages, no
//! slot array. Records are packed back to back within a data page and
//! located purely by walking the page from its data start to its recorded
//! free offset — there is no secondary index of any kind (see the spec's
//! Non-goals: heap scan is the only access path).
//!
//! Two small JSON documents round out persistence alongside `catalog.json`:
//! `table_files.json` remembers which page id is each table's header page,
//! since that's the one fact a freshly reopened database needs before it
//! can find anything else.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use buffer::BufferPool;
use catalog::{Column, TableMeta};
use common::{DbError, DbResult, PageId, RecordId};
use expr::PushedPredicate;
use storage::{Page, PAGE_SIZE};
use types::{SqlType, Value};

const HEADER_FIRST_DATA_PAGE_OFFSET: usize = 0;
const HEADER_COLUMN_COUNT_OFFSET: usize = 8;
const HEADER_COLUMNS_START: usize = 12;

const DATA_NEXT_PAGE_OFFSET: usize = 0;
const DATA_FREE_OFFSET_OFFSET: usize = 8;
const DATA_RECORDS_START: usize = 12;

const NO_PAGE: i64 = -1;

/// Maps table name to the `PageId` of its header page. One JSON document
/// for the whole database, rewritten on every table creation or drop.
pub struct TableDirectory {
    path: PathBuf,
    headers: HashMap<String, u64>,
}

impl TableDirectory {
    pub fn open(data_dir: impl AsRef<Path>) -> DbResult<Self> {
        let path = data_dir.as_ref().join("table_files.json");
        let headers = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            HashMap::new()
        };
        Ok(Self { path, headers })
    }

    fn save(&self) -> DbResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.headers)?)?;
        Ok(())
    }

    pub fn header_page_id(&self, table: &str) -> Option<PageId> {
        self.headers.get(&table.to_ascii_lowercase()).map(|&id| PageId(id))
    }

    pub fn register(&mut self, table: &str, header: PageId) -> DbResult<()> {
        self.headers.insert(table.to_ascii_lowercase(), header.0);
        self.save()
    }

    pub fn remove(&mut self, table: &str) -> DbResult<()> {
        self.headers.remove(&table.to_ascii_lowercase());
        self.save()
    }
}

/// Allocates a table's header page, writes the self-describing column
/// block, and registers it in `table_files.json`. `catalog.json` remains
/// the authoritative schema source; the header block exists only as a
/// redundant on-disk description of the same columns, mirroring the
/// original page format's `get_string`/`set_string` self-description.
pub fn create_table_storage(
    buffer: &mut BufferPool,
    dir: &mut TableDirectory,
    table: &TableMeta,
) -> DbResult<()> {
    let header_id = buffer.allocate_page()?;
    let mut header = buffer.fetch_mut(header_id)?.clone();
    write_header_page(&mut header, table.columns.as_slice());
    buffer.put(header)?;
    dir.register(&table.name, header_id)?;
    log::debug!("allocated heap storage for '{}' (header page {})", table.name, header_id.0);
    Ok(())
}

fn write_header_page(page: &mut Page, columns: &[Column]) {
    page.set_i64(HEADER_FIRST_DATA_PAGE_OFFSET, NO_PAGE);
    page.set_u32(HEADER_COLUMN_COUNT_OFFSET, columns.len() as u32);
    let mut cursor = HEADER_COLUMNS_START;
    for col in columns {
        cursor = page.set_string(cursor, &col.name);
        cursor = page.set_string(cursor, &col.sql_type.render());
    }
}

/// Reads the header block back, mostly useful for tests and for a future
/// `fsck`-style consistency check against `catalog.json`.
pub fn read_header_descriptor(page: &Page) -> Vec<(String, SqlType)> {
    let count = page.get_u32(HEADER_COLUMN_COUNT_OFFSET);
    let mut cursor = HEADER_COLUMNS_START;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (name, next) = page.get_string(cursor);
        cursor = next;
        let (type_str, next) = page.get_string(cursor);
        cursor = next;
        if let Some(ty) = SqlType::parse(&type_str) {
            out.push((name, ty));
        }
    }
    out
}

fn first_data_page(page: &Page) -> Option<PageId> {
    let id = page.get_i64(HEADER_FIRST_DATA_PAGE_OFFSET);
    if id < 0 {
        None
    } else {
        Some(PageId(id as u64))
    }
}

fn next_page(page: &Page) -> Option<PageId> {
    let id = page.get_i64(DATA_NEXT_PAGE_OFFSET);
    if id < 0 {
        None
    } else {
        Some(PageId(id as u64))
    }
}

/// Encodes one row's values in column order. Each field is preceded by a
/// one-byte null flag (0 = present, 1 = null) so `Value::Null` never has to
/// masquerade as a zero value of some other type.
fn encode_fields(columns: &[Column], values: &[Value]) -> DbResult<Vec<u8>> {
    if values.len() != columns.len() {
        return Err(DbError::Storage(format!(
            "expected {} values, got {}",
            columns.len(),
            values.len()
        )));
    }
    let mut buf = Vec::new();
    for (col, value) in columns.iter().zip(values) {
        if value.is_null() {
            buf.push(1u8);
            continue;
        }
        buf.push(0u8);
        match (&col.sql_type, value) {
            (SqlType::Int, Value::Int(i)) => buf.extend_from_slice(&i.to_le_bytes()),
            (SqlType::Float, Value::Float(f)) => buf.extend_from_slice(&f.to_le_bytes()),
            (SqlType::Float, Value::Int(i)) => buf.extend_from_slice(&(*i as f32).to_le_bytes()),
            (SqlType::Bool, Value::Bool(b)) => buf.push(if *b { 1 } else { 0 }),
            (SqlType::Varchar(_), Value::Varchar(s)) => {
                buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
            _ => {
                return Err(DbError::Storage(format!(
                    "value {value} does not match column '{}' of type {}",
                    col.name, col.sql_type
                )))
            }
        }
    }
    Ok(buf)
}

fn decode_fields(columns: &[Column], bytes: &[u8]) -> Vec<Value> {
    let mut cursor = 0usize;
    let mut out = Vec::with_capacity(columns.len());
    for col in columns {
        let is_null = bytes[cursor] == 1;
        cursor += 1;
        if is_null {
            out.push(Value::Null);
            continue;
        }
        match &col.sql_type {
            SqlType::Int => {
                let v = i32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
                cursor += 4;
                out.push(Value::Int(v));
            }
            SqlType::Float => {
                let v = f32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
                cursor += 4;
                out.push(Value::Float(v));
            }
            SqlType::Bool => {
                out.push(Value::Bool(bytes[cursor] != 0));
                cursor += 1;
            }
            SqlType::Varchar(_) => {
                let len = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
                cursor += 4;
                let s = String::from_utf8_lossy(&bytes[cursor..cursor + len]).into_owned();
                cursor += len;
                out.push(Value::Varchar(s));
            }
        }
    }
    out
}

/// Appends a new, empty data page to the front of the chain and returns its
/// id. Prepending keeps allocation O(1): the header only ever needs to
/// remember the single most-recently-added page, and every other page's
/// `next_page_id` already points further down the chain.
fn prepend_data_page(buffer: &mut BufferPool, header_id: PageId) -> DbResult<PageId> {
    let header = buffer.fetch(header_id)?.clone();
    let old_first = header.get_i64(HEADER_FIRST_DATA_PAGE_OFFSET);

    let new_id = buffer.allocate_page()?;
    let mut new_page = buffer.fetch_mut(new_id)?.clone();
    new_page.set_i64(DATA_NEXT_PAGE_OFFSET, old_first);
    new_page.set_u32(DATA_FREE_OFFSET_OFFSET, DATA_RECORDS_START as u32);
    buffer.put(new_page)?;

    let mut header = buffer.fetch_mut(header_id)?.clone();
    header.set_i64(HEADER_FIRST_DATA_PAGE_OFFSET, new_id.0 as i64);
    buffer.put(header)?;

    log::trace!("prepended data page {} to chain at header {}", new_id.0, header_id.0);
    Ok(new_id)
}

/// Inserts one row, scanning the existing chain for a page with enough free
/// space before allocating a new one.
pub fn insert_record(
    buffer: &mut BufferPool,
    dir: &TableDirectory,
    table: &TableMeta,
    values: &[Value],
) -> DbResult<RecordId> {
    let header_id = dir
        .header_page_id(&table.name)
        .ok_or_else(|| DbError::Storage(format!("table '{}' has no storage registered", table.name)))?;
    let payload = encode_fields(&table.columns, values)?;
    let entry_len = 1 + 4 + payload.len();

    let header = buffer.fetch(header_id)?.clone();
    let mut cursor = first_data_page(&header);
    while let Some(page_id) = cursor {
        let page = buffer.fetch(page_id)?;
        let free_offset = page.get_u32(DATA_FREE_OFFSET_OFFSET) as usize;
        if free_offset + entry_len <= PAGE_SIZE {
            let offset = free_offset as u32;
            let page = buffer.fetch_mut(page_id)?;
            page.set_bool(free_offset, false);
            page.set_u32(free_offset + 1, payload.len() as u32);
            page.set_bytes(free_offset + 5, &payload);
            page.set_u32(DATA_FREE_OFFSET_OFFSET, (free_offset + entry_len) as u32);
            return Ok(RecordId { page_id, offset });
        }
        let page = buffer.fetch(page_id)?;
        cursor = next_page(page);
    }

    let new_id = prepend_data_page(buffer, header_id)?;
    let offset = DATA_RECORDS_START as u32;
    let page = buffer.fetch_mut(new_id)?;
    page.set_bool(offset as usize, false);
    page.set_u32(offset as usize + 1, payload.len() as u32);
    page.set_bytes(offset as usize + 5, &payload);
    page.set_u32(DATA_FREE_OFFSET_OFFSET, offset + entry_len as u32);
    Ok(RecordId { page_id: new_id, offset })
}

/// Flags a record as deleted in place. Space is never reclaimed mid-page;
/// the scan simply skips tombstoned entries.
pub fn delete_record(buffer: &mut BufferPool, id: RecordId) -> DbResult<()> {
    let page = buffer.fetch_mut(id.page_id)?;
    page.set_bool(id.offset as usize, true);
    Ok(())
}

/// Scans every live record in the table's chain, applying the optional
/// storage-level predicate while still decoding raw column values (before
/// a `RowMap` exists). Returns each record's id alongside its decoded row
/// so callers can delete or update by id without re-scanning.
pub fn scan(
    buffer: &mut BufferPool,
    dir: &TableDirectory,
    table: &TableMeta,
    pushed: Option<&PushedPredicate>,
) -> DbResult<Vec<(RecordId, Vec<Value>)>> {
    let header_id = match dir.header_page_id(&table.name) {
        Some(id) => id,
        None => return Ok(Vec::new()),
    };
    let pushed_idx = pushed.and_then(|p| table.columns.iter().position(|c| c.name.eq_ignore_ascii_case(&p.column)));

    let header = buffer.fetch(header_id)?.clone();
    let mut cursor = first_data_page(&header);
    let mut out = Vec::new();

    while let Some(page_id) = cursor {
        let page = buffer.fetch(page_id)?.clone();
        let free_offset = page.get_u32(DATA_FREE_OFFSET_OFFSET) as usize;
        let mut offset = DATA_RECORDS_START;
        while offset < free_offset {
            let tombstoned = page.get_bool(offset);
            let payload_len = page.get_u32(offset + 1) as usize;
            let payload = page.get_bytes(offset + 5, payload_len);
            if !tombstoned {
                let values = decode_fields(&table.columns, payload);
                let keep = match (pushed, pushed_idx) {
                    (Some(p), Some(idx)) => p.matches(&values[idx]),
                    _ => true,
                };
                if keep {
                    out.push((RecordId { page_id, offset: offset as u32 }, values));
                }
            }
            offset += 1 + 4 + payload_len;
        }
        cursor = next_page(&page);
    }
    Ok(out)
}

pub fn count_live_rows(buffer: &mut BufferPool, dir: &TableDirectory, table: &TableMeta) -> DbResult<u64> {
    Ok(scan(buffer, dir, table, None)?.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::Column;
    use storage::PageManager;
    use tempfile::tempdir;

    fn students_table() -> TableMeta {
        TableMeta {
            name: "students".to_string(),
            columns: vec![
                Column { name: "id".into(), sql_type: SqlType::Int },
                Column { name: "name".into(), sql_type: SqlType::Varchar(Some(20)) },
                Column { name: "age".into(), sql_type: SqlType::Int },
            ],
            primary_key: Some("id".into()),
            foreign_keys: vec![],
            row_count: 0,
        }
    }

    #[test]
    fn insert_then_scan_round_trips() {
        let root = tempdir().unwrap();
        let pager = PageManager::open(root.path()).unwrap();
        let mut bp = BufferPool::open(pager, 16, common::ReplacementPolicy::Lru);
        let mut dir = TableDirectory::open(root.path()).unwrap();
        let table = students_table();
        create_table_storage(&mut bp, &mut dir, &table).unwrap();

        insert_record(&mut bp, &dir, &table, &[Value::Int(1), Value::Varchar("Alice".into()), Value::Int(21)]).unwrap();
        insert_record(&mut bp, &dir, &table, &[Value::Int(2), Value::Varchar("Bob".into()), Value::Int(19)]).unwrap();

        let rows = scan(&mut bp, &dir, &table, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1[1], Value::Varchar("Alice".into()));
    }

    #[test]
    fn deleted_records_are_skipped_on_scan() {
        let root = tempdir().unwrap();
        let pager = PageManager::open(root.path()).unwrap();
        let mut bp = BufferPool::open(pager, 16, common::ReplacementPolicy::Lru);
        let mut dir = TableDirectory::open(root.path()).unwrap();
        let table = students_table();
        create_table_storage(&mut bp, &mut dir, &table).unwrap();

        let id = insert_record(&mut bp, &dir, &table, &[Value::Int(1), Value::Varchar("Alice".into()), Value::Int(21)]).unwrap();
        insert_record(&mut bp, &dir, &table, &[Value::Int(2), Value::Varchar("Bob".into()), Value::Int(19)]).unwrap();
        delete_record(&mut bp, id).unwrap();

        let rows = scan(&mut bp, &dir, &table, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1[0], Value::Int(2));
    }

    #[test]
    fn pushed_predicate_filters_before_rowmap_exists() {
        let root = tempdir().unwrap();
        let pager = PageManager::open(root.path()).unwrap();
        let mut bp = BufferPool::open(pager, 16, common::ReplacementPolicy::Lru);
        let mut dir = TableDirectory::open(root.path()).unwrap();
        let table = students_table();
        create_table_storage(&mut bp, &mut dir, &table).unwrap();
        for (id, age) in [(1, 17), (2, 21), (3, 19)] {
            insert_record(&mut bp, &dir, &table, &[Value::Int(id), Value::Varchar("x".into()), Value::Int(age)]).unwrap();
        }
        let pred = PushedPredicate { column: "age".into(), op: expr::ComparisonOp::Gte, value: Value::Int(18) };
        let rows = scan(&mut bp, &dir, &table, Some(&pred)).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn data_survives_buffer_pool_reopen() {
        let root = tempdir().unwrap();
        let table = students_table();
        {
            let pager = PageManager::open(root.path()).unwrap();
            let mut bp = BufferPool::open(pager, 16, common::ReplacementPolicy::Lru);
            let mut dir = TableDirectory::open(root.path()).unwrap();
            create_table_storage(&mut bp, &mut dir, &table).unwrap();
            insert_record(&mut bp, &dir, &table, &[Value::Int(1), Value::Varchar("Alice".into()), Value::Int(21)]).unwrap();
            bp.flush_all().unwrap();
        }
        let pager = PageManager::open(root.path()).unwrap();
        let mut bp = BufferPool::open(pager, 16, common::ReplacementPolicy::Lru);
        let dir = TableDirectory::open(root.path()).unwrap();
        let rows = scan(&mut bp, &dir, &table, None).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
