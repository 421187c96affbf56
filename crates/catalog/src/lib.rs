//! Table metadata: columns, primary key, foreign keys, and row counts.
//! Persisted as a single `catalog.json` document under the data directory,
//! reloaded whole on `Catalog::open` and rewritten whole on every mutation —
//! there's exactly one writer (the engine is single-user) so there's no need
//! for anything fancier.

use std::collections::HashMap as StdHashMap;
use std::fs;
use std::path::{Path, PathBuf};

use common::{DbError, DbResult};
use types::SqlType;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TableMeta {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub row_count: u64,
}

impl TableMeta {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn foreign_keys_on(&self, column: &str) -> impl Iterator<Item = &ForeignKey> {
        self.foreign_keys.iter().filter(move |fk| fk.column.eq_ignore_ascii_case(column))
    }

    /// Foreign keys in *other* tables' catalogs that reference this table's
    /// primary key; used when resolving cascading updates, so this helper
    /// lives on `Catalog` instead (it needs the whole table set).
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.as_deref().map(|pk| pk.eq_ignore_ascii_case(column)).unwrap_or(false)
    }
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    tables: StdHashMap<String, TableMeta>,
}

pub struct Catalog {
    path: PathBuf,
    tables: StdHashMap<String, TableMeta>,
}

impl Catalog {
    pub fn open(data_dir: impl AsRef<Path>) -> DbResult<Self> {
        let path = data_dir.as_ref().join("catalog.json");
        let tables = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let doc: CatalogDocument = serde_json::from_str(&raw)?;
            doc.tables
        } else {
            StdHashMap::new()
        };
        Ok(Self { path, tables })
    }

    fn save(&self) -> DbResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let doc = CatalogDocument { tables: self.tables.clone() };
        let raw = serde_json::to_string_pretty(&doc)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&TableMeta> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.values().map(|t| t.name.as_str()).collect()
    }

    /// Creates a table, validating column names, varchar bounds, the primary
    /// key reference, and every foreign key reference against already
    /// existing tables. Nothing is persisted if validation fails.
    pub fn create_table(
        &mut self,
        name: &str,
        columns: Vec<Column>,
        primary_key: Option<String>,
        foreign_keys: Vec<ForeignKey>,
    ) -> DbResult<()> {
        let key = name.to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(DbError::Catalog(format!("table '{name}' already exists")));
        }
        if columns.is_empty() {
            return Err(DbError::Catalog(format!("table '{name}' must declare at least one column")));
        }

        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.to_ascii_lowercase()) {
                return Err(DbError::Catalog(format!("duplicate column '{}' in table '{name}'", col.name)));
            }
            if let SqlType::Varchar(Some(0)) = col.sql_type {
                return Err(DbError::Catalog(format!("column '{}' has zero-length VARCHAR(0)", col.name)));
            }
        }

        if let Some(pk) = &primary_key {
            if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(pk)) {
                return Err(DbError::Catalog(format!(
                    "primary key column '{pk}' is not declared on table '{name}'"
                )));
            }
        }

        for fk in &foreign_keys {
            if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(&fk.column)) {
                return Err(DbError::Catalog(format!(
                    "foreign key column '{}' is not declared on table '{name}'",
                    fk.column
                )));
            }
            let ref_table = self.get(&fk.ref_table).ok_or_else(|| {
                DbError::Catalog(format!(
                    "foreign key on '{}' references unknown table '{}'",
                    fk.column, fk.ref_table
                ))
            })?;
            if ref_table.column(&fk.ref_column).is_none() {
                return Err(DbError::Catalog(format!(
                    "foreign key on '{}' references unknown column '{}' on '{}'",
                    fk.column, fk.ref_column, fk.ref_table
                )));
            }
        }

        self.tables.insert(
            key,
            TableMeta { name: name.to_string(), columns, primary_key, foreign_keys, row_count: 0 },
        );
        log::info!("created table '{name}'");
        self.save()
    }

    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let key = name.to_ascii_lowercase();
        if self.tables.remove(&key).is_none() {
            return Err(DbError::Catalog(format!("table '{name}' does not exist")));
        }
        log::info!("dropped table '{name}'");
        self.save()
    }

    pub fn set_row_count(&mut self, name: &str, count: u64) -> DbResult<()> {
        let key = name.to_ascii_lowercase();
        let table = self
            .tables
            .get_mut(&key)
            .ok_or_else(|| DbError::Catalog(format!("table '{name}' does not exist")))?;
        table.row_count = count;
        self.save()
    }

    /// Every `(child_table, foreign_key)` pair whose foreign key points at
    /// `table_name`'s primary key — used to drive cascading updates when a
    /// keyed row's referenced value changes.
    pub fn referencing(&self, table_name: &str) -> Vec<(&TableMeta, &ForeignKey)> {
        self.tables
            .values()
            .flat_map(|t| t.foreign_keys.iter().map(move |fk| (t, fk)))
            .filter(|(_, fk)| fk.ref_table.eq_ignore_ascii_case(table_name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn int_col(name: &str) -> Column {
        Column { name: name.to_string(), sql_type: SqlType::Int }
    }

    #[test]
    fn create_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        {
            let mut cat = Catalog::open(dir.path()).unwrap();
            cat.create_table("students", vec![int_col("id"), int_col("age")], Some("id".into()), vec![])
                .unwrap();
        }
        let cat = Catalog::open(dir.path()).unwrap();
        assert!(cat.table_exists("students"));
        assert_eq!(cat.get("students").unwrap().columns.len(), 2);
    }

    #[test]
    fn duplicate_table_rejected() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path()).unwrap();
        cat.create_table("t", vec![int_col("id")], None, vec![]).unwrap();
        let err = cat.create_table("t", vec![int_col("id")], None, vec![]).unwrap_err();
        assert!(matches!(err, DbError::Catalog(_)));
    }

    #[test]
    fn foreign_key_may_reference_a_non_primary_key_column() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path()).unwrap();
        cat.create_table("students", vec![int_col("id")], None, vec![]).unwrap();
        cat.create_table(
            "enrollments",
            vec![int_col("student_id")],
            None,
            vec![ForeignKey { column: "student_id".into(), ref_table: "students".into(), ref_column: "id".into() }],
        )
        .unwrap();
        assert_eq!(cat.referencing("students").len(), 1);
    }

    #[test]
    fn foreign_key_against_unknown_column_rejected() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path()).unwrap();
        cat.create_table("students", vec![int_col("id")], None, vec![]).unwrap();
        let err = cat
            .create_table(
                "enrollments",
                vec![int_col("student_id")],
                None,
                vec![ForeignKey {
                    column: "student_id".into(),
                    ref_table: "students".into(),
                    ref_column: "ssn".into(),
                }],
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Catalog(_)));
    }

    #[test]
    fn foreign_key_against_declared_primary_key_succeeds() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path()).unwrap();
        cat.create_table("students", vec![int_col("id")], Some("id".into()), vec![]).unwrap();
        cat.create_table(
            "enrollments",
            vec![int_col("student_id")],
            None,
            vec![ForeignKey { column: "student_id".into(), ref_table: "students".into(), ref_column: "id".into() }],
        )
        .unwrap();
        assert_eq!(cat.referencing("students").len(), 1);
    }
}
