#![allow(dead_code)]

use northwind_agent::{provision_northwind, AgentConfig, Oracle, Orchestrator, ScriptedOracle};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Full-size Northwind product list lives in a temp dir for the duration of a test.
pub struct Northwind {
    _dir: TempDir,
    pub path: PathBuf,
}

pub const PRODUCT_COUNT: i64 = 77;

/// Provision the sample store and top Products up to the full 77 rows.
pub fn northwind() -> Result<Northwind, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("northwind.db");
    provision_northwind(&path)?;

    let conn = Connection::open(&path)?;
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM Products", [], |r| r.get(0))?;
    for id in existing + 1..=PRODUCT_COUNT {
        conn.execute(
            "INSERT INTO Products (ProductID, ProductName, CategoryID, SupplierID, UnitPrice, UnitsInStock)
             VALUES (?1, ?2, 1, 1, ?3, 10)",
            params![id, format!("Product {}", id), 5.0 + id as f64],
        )?;
    }

    Ok(Northwind { _dir: dir, path })
}

pub fn config(path: &Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.database_path = path.to_path_buf();
    config
}

pub fn orchestrator(config: &AgentConfig, oracle: &Arc<ScriptedOracle>) -> Orchestrator {
    let oracle: Arc<dyn Oracle> = oracle.clone();
    Orchestrator::from_config(config, oracle).expect("orchestrator")
}
