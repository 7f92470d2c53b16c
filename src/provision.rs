//! Northwind sample store provisioning
//!
//! The only code that writes to the store. Used by the `init` command and by
//! test fixtures; the orchestrator itself only ever reads.

use crate::error::{AgentError, Result};
use rusqlite::{params, Connection, Transaction};
use serde::Serialize;
use std::path::Path;
use tracing::info;

const SCHEMA: &[(&str, &str)] = &[
    (
        "Categories",
        "CREATE TABLE IF NOT EXISTS Categories (
            CategoryID INTEGER PRIMARY KEY,
            CategoryName TEXT NOT NULL,
            Description TEXT
        )",
    ),
    (
        "Suppliers",
        "CREATE TABLE IF NOT EXISTS Suppliers (
            SupplierID INTEGER PRIMARY KEY,
            CompanyName TEXT NOT NULL,
            ContactName TEXT,
            Country TEXT
        )",
    ),
    (
        "Products",
        "CREATE TABLE IF NOT EXISTS Products (
            ProductID INTEGER PRIMARY KEY,
            ProductName TEXT NOT NULL,
            CategoryID INTEGER,
            SupplierID INTEGER,
            UnitPrice REAL,
            UnitsInStock INTEGER,
            FOREIGN KEY (CategoryID) REFERENCES Categories(CategoryID),
            FOREIGN KEY (SupplierID) REFERENCES Suppliers(SupplierID)
        )",
    ),
    (
        "Customers",
        "CREATE TABLE IF NOT EXISTS Customers (
            CustomerID TEXT PRIMARY KEY,
            CompanyName TEXT NOT NULL,
            ContactName TEXT,
            Country TEXT,
            City TEXT
        )",
    ),
    (
        "Employees",
        "CREATE TABLE IF NOT EXISTS Employees (
            EmployeeID INTEGER PRIMARY KEY,
            FirstName TEXT NOT NULL,
            LastName TEXT NOT NULL,
            Title TEXT,
            HireDate DATE,
            Country TEXT
        )",
    ),
    (
        "Shippers",
        "CREATE TABLE IF NOT EXISTS Shippers (
            ShipperID INTEGER PRIMARY KEY,
            CompanyName TEXT NOT NULL,
            Phone TEXT
        )",
    ),
    (
        "Orders",
        "CREATE TABLE IF NOT EXISTS Orders (
            OrderID INTEGER PRIMARY KEY,
            CustomerID TEXT,
            EmployeeID INTEGER,
            OrderDate DATE,
            ShipperID INTEGER,
            ShipCountry TEXT,
            FOREIGN KEY (CustomerID) REFERENCES Customers(CustomerID),
            FOREIGN KEY (EmployeeID) REFERENCES Employees(EmployeeID),
            FOREIGN KEY (ShipperID) REFERENCES Shippers(ShipperID)
        )",
    ),
    (
        "OrderDetails",
        "CREATE TABLE IF NOT EXISTS OrderDetails (
            OrderID INTEGER,
            ProductID INTEGER,
            UnitPrice REAL,
            Quantity INTEGER,
            Discount REAL,
            PRIMARY KEY (OrderID, ProductID),
            FOREIGN KEY (OrderID) REFERENCES Orders(OrderID),
            FOREIGN KEY (ProductID) REFERENCES Products(ProductID)
        )",
    ),
    (
        "Region",
        "CREATE TABLE IF NOT EXISTS Region (
            RegionID INTEGER PRIMARY KEY,
            RegionDescription TEXT NOT NULL
        )",
    ),
    (
        "Territories",
        "CREATE TABLE IF NOT EXISTS Territories (
            TerritoryID TEXT PRIMARY KEY,
            TerritoryDescription TEXT NOT NULL,
            RegionID INTEGER,
            FOREIGN KEY (RegionID) REFERENCES Region(RegionID)
        )",
    ),
    (
        "EmployeeTerritories",
        "CREATE TABLE IF NOT EXISTS EmployeeTerritories (
            EmployeeID INTEGER,
            TerritoryID TEXT,
            PRIMARY KEY (EmployeeID, TerritoryID),
            FOREIGN KEY (EmployeeID) REFERENCES Employees(EmployeeID),
            FOREIGN KEY (TerritoryID) REFERENCES Territories(TerritoryID)
        )",
    ),
];

const CATEGORIES: &[(i64, &str, &str)] = &[
    (1, "Beverages", "Soft drinks, coffees, teas, beers, and ales"),
    (2, "Condiments", "Sweet and savory sauces, relishes, spreads, and seasonings"),
    (3, "Dairy Products", "Cheeses"),
    (4, "Grains/Cereals", "Breads, crackers, pasta, and cereal"),
    (5, "Seafood", "Seaweed and fish"),
];

const SUPPLIERS: &[(i64, &str, &str, &str)] = &[
    (1, "Exotic Liquids", "Charlotte Cooper", "UK"),
    (2, "New Orleans Cajun Delights", "Shelley Burke", "USA"),
    (3, "Tokyo Traders", "Yoshi Nagase", "Japan"),
    (4, "Nord-Ost-Fisch", "Sven Petersen", "Germany"),
    (5, "Formaggi Fortini", "Elio Rossi", "Italy"),
];

const PRODUCTS: &[(i64, &str, i64, i64, f64, i64)] = &[
    (1, "Chai", 1, 1, 18.0, 39),
    (2, "Chang", 1, 1, 19.0, 17),
    (3, "Aniseed Syrup", 2, 1, 10.0, 13),
    (4, "Chef Anton Cajun Seasoning", 2, 2, 22.0, 53),
    (5, "Gumbo Mix", 2, 2, 21.35, 0),
    (6, "Mozzarella di Giovanni", 3, 5, 34.8, 14),
    (7, "Gorgonzola Telino", 3, 5, 12.5, 0),
    (8, "Mascarpone Fabioli", 3, 5, 32.0, 9),
    (9, "Røgede sild", 5, 4, 9.65, 5),
    (10, "Spegesild", 5, 4, 12.0, 95),
];

const CUSTOMERS: &[(&str, &str, &str, &str, &str)] = &[
    ("ALFKI", "Alfreds Futterkiste", "Maria Anders", "Germany", "Berlin"),
    ("ANATR", "Ana Trujillo Emparedados", "Ana Trujillo", "Mexico", "México D.F."),
    ("BERGS", "Berglunds snabbköp", "Christina Berglund", "Sweden", "Luleå"),
    ("BLAUS", "Blauer See Delikatessen", "Hanna Moos", "Germany", "Mannheim"),
    ("BOLID", "Bólido Comidas", "Martín Sommer", "Spain", "Madrid"),
];

const EMPLOYEES: &[(i64, &str, &str, &str, &str, &str)] = &[
    (1, "Nancy", "Davolio", "Sales Representative", "1992-05-01", "USA"),
    (2, "Andrew", "Fuller", "Vice President, Sales", "1992-08-14", "USA"),
    (3, "Janet", "Leverling", "Sales Representative", "1992-04-01", "USA"),
    (4, "Margaret", "Peacock", "Sales Representative", "1993-05-03", "USA"),
    (5, "Steven", "Buchanan", "Sales Manager", "1993-10-17", "UK"),
];

const SHIPPERS: &[(i64, &str, &str)] = &[
    (1, "Speedy Express", "(503) 555-9831"),
    (2, "United Package", "(503) 555-3199"),
    (3, "Federal Shipping", "(503) 555-9931"),
];

const ORDERS: &[(i64, &str, i64, &str, i64, &str)] = &[
    (10248, "ALFKI", 5, "1996-07-04", 3, "Germany"),
    (10249, "BERGS", 6, "1996-07-05", 1, "Sweden"),
    (10250, "BLAUS", 4, "1996-07-08", 2, "Germany"),
];

const ORDER_DETAILS: &[(i64, i64, f64, i64, f64)] = &[
    (10248, 1, 18.0, 12, 0.0),
    (10248, 2, 19.0, 10, 0.0),
    (10249, 3, 10.0, 5, 0.0),
    (10250, 4, 22.0, 15, 0.15),
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisionReport {
    pub tables: usize,
    /// Rows actually inserted; rerunning against a seeded store reports zero.
    pub rows_inserted: usize,
}

/// Create the Northwind tables and seed the sample rows. Safe to rerun.
pub fn provision_northwind(path: &Path) -> Result<ProvisionReport> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path).map_err(provision_err)?;
    let tx = conn.transaction().map_err(provision_err)?;

    for (_, ddl) in SCHEMA {
        tx.execute_batch(ddl).map_err(provision_err)?;
    }
    let rows_inserted = seed(&tx).map_err(provision_err)?;
    tx.commit().map_err(provision_err)?;

    let report = ProvisionReport {
        tables: SCHEMA.len(),
        rows_inserted,
    };
    info!(
        "Provisioned {} ({} tables, {} new rows)",
        path.display(),
        report.tables,
        report.rows_inserted
    );
    Ok(report)
}

/// Names of the tables `provision_northwind` creates.
pub fn northwind_tables() -> Vec<&'static str> {
    SCHEMA.iter().map(|(name, _)| *name).collect()
}

fn seed(tx: &Transaction<'_>) -> rusqlite::Result<usize> {
    let mut inserted = 0;

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Categories VALUES (?1, ?2, ?3)")?;
    for (id, name, description) in CATEGORIES {
        inserted += stmt.execute(params![id, name, description])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Suppliers VALUES (?1, ?2, ?3, ?4)")?;
    for (id, company, contact, country) in SUPPLIERS {
        inserted += stmt.execute(params![id, company, contact, country])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Products VALUES (?1, ?2, ?3, ?4, ?5, ?6)")?;
    for (id, name, category, supplier, price, stock) in PRODUCTS {
        inserted += stmt.execute(params![id, name, category, supplier, price, stock])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Customers VALUES (?1, ?2, ?3, ?4, ?5)")?;
    for (id, company, contact, country, city) in CUSTOMERS {
        inserted += stmt.execute(params![id, company, contact, country, city])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Employees VALUES (?1, ?2, ?3, ?4, ?5, ?6)")?;
    for (id, first, last, title, hired, country) in EMPLOYEES {
        inserted += stmt.execute(params![id, first, last, title, hired, country])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Shippers VALUES (?1, ?2, ?3)")?;
    for (id, company, phone) in SHIPPERS {
        inserted += stmt.execute(params![id, company, phone])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO Orders VALUES (?1, ?2, ?3, ?4, ?5, ?6)")?;
    for (id, customer, employee, date, shipper, country) in ORDERS {
        inserted += stmt.execute(params![id, customer, employee, date, shipper, country])?;
    }

    let mut stmt = tx.prepare("INSERT OR IGNORE INTO OrderDetails VALUES (?1, ?2, ?3, ?4, ?5)")?;
    for (order, product, price, quantity, discount) in ORDER_DETAILS {
        inserted += stmt.execute(params![order, product, price, quantity, discount])?;
    }

    Ok(inserted)
}

fn provision_err(e: rusqlite::Error) -> AgentError {
    AgentError::Provision(e.to_string())
}
