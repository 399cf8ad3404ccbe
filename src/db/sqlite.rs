use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection};

use super::{FilteredProductRow, ProductRecord, QuarantineOutcome, QuarantineRow, Stats, Store};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS companies (
        id       INTEGER PRIMARY KEY,
        name     TEXT NOT NULL,
        address  TEXT,
        gst_no   TEXT UNIQUE
    );

    CREATE TABLE IF NOT EXISTS products (
        id          INTEGER PRIMARY KEY,
        product_id  TEXT UNIQUE,
        name        TEXT NOT NULL,
        description TEXT,
        company_id  INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_products_company ON products(company_id);

    -- quarantine rows outlive their product; the key is nulled on delete
    CREATE TABLE IF NOT EXISTS filtered_products (
        id          INTEGER PRIMARY KEY,
        product_id  TEXT REFERENCES products(product_id) ON DELETE SET NULL,
        name        TEXT NOT NULL,
        description TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_filtered_product_id ON filtered_products(product_id);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::open(":memory:").unwrap()
    }

    #[cfg(test)]
    pub fn insert_company(&self, name: &str, gst_no: Option<&str>) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO companies (name, gst_no) VALUES (?1, ?2)",
            params![name, gst_no],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub fn insert_product(
        &self,
        company_id: i64,
        product_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO products (product_id, name, description, company_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![product_id, name, description, company_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn init_schema(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    async fn fetch_products(&self) -> Result<Vec<ProductRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT product_id, name, description FROM products
             WHERE product_id IS NOT NULL
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ProductRecord {
                    product_id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn quarantine(&self, rows: &[QuarantineRow]) -> Result<Vec<QuarantineOutcome>> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let mut outcomes = Vec::with_capacity(rows.len());
        {
            let mut exists_stmt =
                tx.prepare("SELECT 1 FROM filtered_products WHERE product_id = ?1 LIMIT 1")?;
            let mut insert_stmt = tx.prepare(
                "INSERT INTO filtered_products (product_id, name, description) VALUES (?1, '', ?2)",
            )?;
            for r in rows {
                if exists_stmt.exists(params![r.product_id])? {
                    outcomes.push(QuarantineOutcome::AlreadyQuarantined);
                } else {
                    insert_stmt.execute(params![r.product_id, r.description])?;
                    outcomes.push(QuarantineOutcome::Inserted);
                }
            }
        }
        tx.commit()?;
        Ok(outcomes)
    }

    async fn fetch_quarantine(&self, limit: Option<usize>) -> Result<Vec<FilteredProductRow>> {
        let sql = match limit {
            Some(n) => format!(
                "SELECT id, product_id, name, description FROM filtered_products ORDER BY id LIMIT {}",
                n
            ),
            None => "SELECT id, product_id, name, description FROM filtered_products ORDER BY id"
                .to_string(),
        };
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FilteredProductRow {
                    id: row.get(0)?,
                    product_id: row.get(1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn delete_company(&self, company_id: i64) -> Result<Option<usize>> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let products = tx.execute("DELETE FROM products WHERE company_id = ?1", params![company_id])?;
        let companies = tx.execute("DELETE FROM companies WHERE id = ?1", params![company_id])?;
        if companies == 0 {
            // Nothing to cascade from; leave the store untouched.
            tx.rollback()?;
            return Ok(None);
        }
        tx.commit()?;
        Ok(Some(products))
    }

    async fn stats(&self) -> Result<Stats> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
            Ok(n as usize)
        };
        Ok(Stats {
            companies: count("companies")?,
            products: count("products")?,
            quarantined: count("filtered_products")?,
        })
    }
}
