use crate::error::{AgentError, Result};
use crate::execution::engine::{open_read_only, quote_identifier, table_names};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

/// Outgoing reference: `column` in this table points at `referenced_table.referenced_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Incoming reference: `from_table.from_column` points at `column` in this table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReference {
    pub from_table: String,
    pub from_column: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    #[serde(default)]
    pub referenced_by: Vec<InboundReference>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Immutable snapshot of the store's tables and relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableDescriptor>,
}

impl SchemaDescriptor {
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Every foreign key must point at a table and column in this snapshot.
    pub fn validate(&self) -> Result<()> {
        for table in &self.tables {
            for fk in &table.foreign_keys {
                let target = self.table(&fk.referenced_table).ok_or_else(|| {
                    AgentError::CatalogUnavailable(format!(
                        "{}.{} references missing table {}",
                        table.name, fk.column, fk.referenced_table
                    ))
                })?;
                if target.column(&fk.referenced_column).is_none() {
                    return Err(AgentError::CatalogUnavailable(format!(
                        "{}.{} references missing column {}.{}",
                        table.name, fk.column, fk.referenced_table, fk.referenced_column
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compact text form used in oracle prompts.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        for table in &self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    let mut s = format!("{} {}", c.name, c.declared_type);
                    if c.primary_key {
                        s.push_str(" PK");
                    }
                    if !c.nullable {
                        s.push_str(" NOT NULL");
                    }
                    s
                })
                .collect();
            parts.push(format!("- {}({})", table.name, columns.join(", ")));
            for fk in &table.foreign_keys {
                parts.push(format!(
                    "    {}.{} -> {}.{}",
                    table.name, fk.column, fk.referenced_table, fk.referenced_column
                ));
            }
        }
        parts.join("\n")
    }
}

/// Introspects the relational store into a [`SchemaDescriptor`].
pub struct SchemaCatalog {
    database_path: PathBuf,
}

impl SchemaCatalog {
    pub fn new(database_path: impl AsRef<Path>) -> Self {
        Self {
            database_path: database_path.as_ref().to_path_buf(),
        }
    }

    /// Read the live schema. Calling again is the only refresh mechanism.
    pub fn describe(&self) -> Result<SchemaDescriptor> {
        let conn = open_read_only(&self.database_path)?;
        let schema = introspect(&conn).map_err(|e| match e {
            AgentError::CatalogUnavailable(_) => e,
            other => AgentError::CatalogUnavailable(other.to_string()),
        })?;
        info!("Schema catalog loaded: {} tables", schema.tables.len());
        Ok(schema)
    }
}

type RawForeignKey = (String, String, Option<String>);

fn introspect(conn: &Connection) -> Result<SchemaDescriptor> {
    let names = table_names(conn)?;
    let mut tables = Vec::with_capacity(names.len());
    let mut raw_fks: HashMap<String, Vec<RawForeignKey>> = HashMap::new();

    for name in &names {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(name)))?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnDescriptor {
                    name: row.get(1)?,
                    declared_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    nullable: row.get::<_, i64>(3)? == 0,
                    primary_key: row.get::<_, i64>(5)? > 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
            "PRAGMA foreign_key_list({})",
            quote_identifier(name)
        ))?;
        let fks = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw_fks.insert(name.clone(), fks);

        tables.push(TableDescriptor {
            name: name.clone(),
            columns,
            foreign_keys: Vec::new(),
            referenced_by: Vec::new(),
        });
    }

    let mut schema = SchemaDescriptor { tables };
    resolve_foreign_keys(&mut schema, raw_fks);
    schema.validate()?;
    Ok(schema)
}

/// Attach outgoing keys and their inbound mirrors. A key with no target column
/// refers to the target's primary key; dangling keys are dropped.
fn resolve_foreign_keys(schema: &mut SchemaDescriptor, raw: HashMap<String, Vec<RawForeignKey>>) {
    let mut resolved: Vec<(String, ForeignKeyDescriptor)> = Vec::new();

    for table in &schema.tables {
        let Some(fks) = raw.get(&table.name) else {
            continue;
        };
        for (column, target_table, target_column) in fks {
            let Some(target) = schema.table(target_table) else {
                warn!("Dropping dangling foreign key {}.{} -> {}", table.name, column, target_table);
                continue;
            };
            let target_column = match target_column {
                Some(c) => target.column(c).map(|col| col.name.clone()),
                None => target.columns.iter().find(|c| c.primary_key).map(|c| c.name.clone()),
            };
            let Some(target_column) = target_column else {
                warn!("Dropping foreign key {}.{} with unresolved target column", table.name, column);
                continue;
            };
            resolved.push((
                table.name.clone(),
                ForeignKeyDescriptor {
                    column: column.clone(),
                    referenced_table: target.name.clone(),
                    referenced_column: target_column,
                },
            ));
        }
    }

    for (owner, fk) in resolved {
        if let Some(target) = schema
            .tables
            .iter_mut()
            .find(|t| t.name == fk.referenced_table)
        {
            target.referenced_by.push(InboundReference {
                from_table: owner.clone(),
                from_column: fk.column.clone(),
                column: fk.referenced_column.clone(),
            });
        }
        if let Some(table) = schema.tables.iter_mut().find(|t| t.name == owner) {
            table.foreign_keys.push(fk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE Categories (CategoryID INTEGER PRIMARY KEY, CategoryName TEXT NOT NULL);
             CREATE TABLE Products (
                 ProductID INTEGER PRIMARY KEY,
                 ProductName TEXT NOT NULL,
                 CategoryID INTEGER,
                 FOREIGN KEY (CategoryID) REFERENCES Categories
             );
             CREATE TABLE Orphans (Id INTEGER, GhostID INTEGER REFERENCES Ghosts(Id));",
        )
        .unwrap();
        (dir, path)
    }

    #[test]
    fn test_describe_resolves_keys_both_directions() {
        let (_dir, path) = fixture();
        let schema = SchemaCatalog::new(&path).describe().unwrap();

        let products = schema.table("Products").unwrap();
        assert_eq!(
            products.foreign_keys,
            vec![ForeignKeyDescriptor {
                column: "CategoryID".to_string(),
                referenced_table: "Categories".to_string(),
                referenced_column: "CategoryID".to_string(),
            }]
        );
        assert!(!products.column("ProductName").unwrap().nullable);

        let categories = schema.table("Categories").unwrap();
        assert_eq!(categories.referenced_by.len(), 1);
        assert_eq!(categories.referenced_by[0].from_table, "Products");

        // Dangling key dropped rather than violating the snapshot invariant.
        assert!(schema.table("Orphans").unwrap().foreign_keys.is_empty());
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_describe_is_idempotent() {
        let (_dir, path) = fixture();
        let catalog = SchemaCatalog::new(&path);
        assert_eq!(catalog.describe().unwrap(), catalog.describe().unwrap());
    }

    #[test]
    fn test_missing_store_is_unavailable() {
        let catalog = SchemaCatalog::new("/nonexistent/northwind.db");
        assert!(matches!(catalog.describe(), Err(AgentError::CatalogUnavailable(_))));
    }

    #[test]
    fn test_render_lists_relationships() {
        let (_dir, path) = fixture();
        let text = SchemaCatalog::new(&path).describe().unwrap().render();
        assert!(text.contains("Products.CategoryID -> Categories.CategoryID"));
    }
}
