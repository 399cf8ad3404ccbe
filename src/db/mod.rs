mod postgres;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use postgres::PgStore;
pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported connection string '{0}' (expected postgres://, postgresql:// or sqlite:)")]
    UnsupportedUrl(String),
}

/// A product as read for scanning. `product_id` is the business key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRecord {
    pub product_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// A row to quarantine. There is no name field: quarantine rows are always
/// written with an empty name.
#[derive(Debug, Clone)]
pub struct QuarantineRow {
    pub product_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuarantineOutcome {
    Inserted,
    AlreadyQuarantined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredProductRow {
    pub id: i64,
    pub product_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
}

pub struct Stats {
    pub companies: usize,
    pub products: usize,
    pub quarantined: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Create companies, products and filtered_products if absent.
    async fn init_schema(&self) -> Result<()>;

    /// Read every product carrying a business key, in insertion order.
    async fn fetch_products(&self) -> Result<Vec<ProductRecord>>;

    /// Insert each row unless one with the same product_id exists. Runs as a
    /// single transaction; outcomes are returned in input order.
    async fn quarantine(&self, rows: &[QuarantineRow]) -> Result<Vec<QuarantineOutcome>>;

    async fn fetch_quarantine(&self, limit: Option<usize>) -> Result<Vec<FilteredProductRow>>;

    /// Delete a company and its products. Returns the number of products removed,
    /// or `None` when the company does not exist.
    async fn delete_company(&self, company_id: i64) -> Result<Option<usize>>;

    async fn stats(&self) -> Result<Stats>;
}

/// Open a store for the given connection string, picking the backend by scheme.
pub fn open(url: &str) -> Result<Box<dyn Store>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Ok(Box::new(PgStore::connect_lazy(url)?));
    }
    if let Some(path) = url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        return Ok(Box::new(SqliteStore::open(path)?));
    }
    if url.ends_with(".sqlite") || url.ends_with(".db") {
        return Ok(Box::new(SqliteStore::open(url)?));
    }
    Err(StoreError::UnsupportedUrl(url.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_backend_by_scheme() {
        assert_eq!(open("sqlite::memory:").unwrap().backend(), "sqlite");
        assert!(open("mysql://localhost/db").is_err());
    }

    #[tokio::test]
    async fn postgres_url_opens_lazily() {
        // No server is contacted until the first query.
        let store = open("postgresql://user:pw@127.0.0.1:1/catalog").unwrap();
        assert_eq!(store.backend(), "postgres");
    }
}
