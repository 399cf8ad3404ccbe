use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{FilteredProductRow, ProductRecord, QuarantineOutcome, QuarantineRow, Stats, Store};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS companies (
        id       SERIAL PRIMARY KEY,
        name     VARCHAR NOT NULL,
        address  VARCHAR,
        gst_no   VARCHAR UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id          SERIAL PRIMARY KEY,
        product_id  VARCHAR UNIQUE,
        name        VARCHAR NOT NULL,
        description VARCHAR,
        company_id  INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_products_company ON products(company_id)",
    "CREATE TABLE IF NOT EXISTS filtered_products (
        id          SERIAL PRIMARY KEY,
        product_id  VARCHAR REFERENCES products(product_id) ON DELETE SET NULL,
        name        VARCHAR NOT NULL,
        description VARCHAR
    )",
    "CREATE INDEX IF NOT EXISTS idx_filtered_product_id ON filtered_products(product_id)",
];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Build a pool without connecting; an unreachable server surfaces on the
    /// first query instead.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy(url)
            .context("Invalid postgres connection string")?;
        Ok(Self { pool })
    }

    async fn count(&self, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n as usize)
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(*stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn fetch_products(&self) -> Result<Vec<ProductRecord>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT product_id, name, description FROM products
             WHERE product_id IS NOT NULL
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(product_id, name, description)| ProductRecord {
                product_id,
                name,
                description,
            })
            .collect())
    }

    async fn quarantine(&self, rows: &[QuarantineRow]) -> Result<Vec<QuarantineOutcome>> {
        let mut tx = self.pool.begin().await?;
        let mut outcomes = Vec::with_capacity(rows.len());
        for r in rows {
            let exists: Option<i32> =
                sqlx::query_scalar("SELECT 1 FROM filtered_products WHERE product_id = $1 LIMIT 1")
                    .bind(&r.product_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_some() {
                outcomes.push(QuarantineOutcome::AlreadyQuarantined);
                continue;
            }
            sqlx::query(
                "INSERT INTO filtered_products (product_id, name, description) VALUES ($1, '', $2)",
            )
            .bind(&r.product_id)
            .bind(&r.description)
            .execute(&mut *tx)
            .await?;
            outcomes.push(QuarantineOutcome::Inserted);
        }
        tx.commit().await?;
        Ok(outcomes)
    }

    async fn fetch_quarantine(&self, limit: Option<usize>) -> Result<Vec<FilteredProductRow>> {
        let limit = limit.map(|n| n as i64);
        let rows: Vec<(i32, Option<String>, String, Option<String>)> = sqlx::query_as(
            "SELECT id, product_id, name, description FROM filtered_products
             ORDER BY id
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, product_id, name, description)| FilteredProductRow {
                id: i64::from(id),
                product_id,
                name,
                description,
            })
            .collect())
    }

    async fn delete_company(&self, company_id: i64) -> Result<Option<usize>> {
        let id = i32::try_from(company_id).context("company id out of range")?;
        let mut tx = self.pool.begin().await?;
        let products = sqlx::query("DELETE FROM products WHERE company_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let companies = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if companies == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(products as usize))
    }

    async fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            companies: self.count("companies").await?,
            products: self.count("products").await?,
            quarantined: self.count("filtered_products").await?,
        })
    }
}

#[cfg(test)]
impl PgStore {
    async fn insert_company(&self, name: &str) -> Result<i64> {
        let id: i32 = sqlx::query_scalar("INSERT INTO companies (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(i64::from(id))
    }

    async fn insert_product(
        &self,
        company_id: i64,
        product_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (product_id, name, description, company_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(product_id)
        .bind(name)
        .bind(description)
        .bind(i32::try_from(company_id)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// These need a scratch server: DATABASE_URL=postgresql://... cargo test -- --ignored --test-threads=1
#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    async fn live_store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgStore::connect_lazy(&url).unwrap();
        store.init_schema().await.unwrap();
        store
    }

    fn unique(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{}-{}-{}", prefix, std::process::id(), nanos)
    }

    async fn seeded(store: &PgStore) -> (i64, String, String) {
        let company = store.insert_company(&unique("Acme")).await.unwrap();
        let (p1, p2) = (unique("P1"), unique("P2"));
        store
            .insert_product(company, &p1, "Acme Widget", Some("Contains lead paint"))
            .await
            .unwrap();
        store.insert_product(company, &p2, "Acme Gadget", None).await.unwrap();
        (company, p1, p2)
    }

    fn row(id: &str, desc: &str) -> QuarantineRow {
        QuarantineRow {
            product_id: id.to_string(),
            description: desc.to_string(),
        }
    }

    #[ignore]
    #[tokio::test]
    async fn quarantine_is_idempotent_and_redacted() {
        let store = live_store().await;
        let (company, p1, p2) = seeded(&store).await;

        let first = store
            .quarantine(&[row(&p1, "Contains lead paint")])
            .await
            .unwrap();
        assert_eq!(first, vec![QuarantineOutcome::Inserted]);
        let second = store
            .quarantine(&[row(&p1, "Contains lead paint"), row(&p2, "")])
            .await
            .unwrap();
        assert_eq!(
            second,
            vec![QuarantineOutcome::AlreadyQuarantined, QuarantineOutcome::Inserted]
        );

        let mine: Vec<FilteredProductRow> = store
            .fetch_quarantine(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| matches!(r.product_id.as_deref(), Some(id) if id == p1 || id == p2))
            .collect();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.name.is_empty()));
        assert_eq!(mine[0].description.as_deref(), Some("Contains lead paint"));

        store.delete_company(company).await.unwrap();
    }

    #[ignore]
    #[tokio::test]
    async fn unknown_product_rolls_back_the_batch() {
        let store = live_store().await;
        let (company, p1, _) = seeded(&store).await;

        let result = store
            .quarantine(&[row(&p1, ""), row(&unique("GONE"), "")])
            .await;
        assert!(result.is_err());
        let rows = store.fetch_quarantine(None).await.unwrap();
        assert!(rows.iter().all(|r| r.product_id.as_deref() != Some(p1.as_str())));

        store.delete_company(company).await.unwrap();
    }

    #[ignore]
    #[tokio::test]
    async fn delete_company_cascades_and_keeps_quarantine_rows() {
        let store = live_store().await;
        let (company, p1, p2) = seeded(&store).await;
        let marker = unique("lead paint");
        store.quarantine(&[row(&p1, &marker)]).await.unwrap();

        assert_eq!(store.delete_company(company).await.unwrap(), Some(2));
        let left = store.fetch_products().await.unwrap();
        assert!(left.iter().all(|p| p.product_id != p1 && p.product_id != p2));

        let kept: Vec<_> = store
            .fetch_quarantine(None)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.description.as_deref() == Some(marker.as_str()))
            .collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].product_id, None);

        assert_eq!(store.delete_company(company).await.unwrap(), None);
    }

    #[ignore]
    #[tokio::test]
    async fn fetch_quarantine_honours_limit() {
        let store = live_store().await;
        let (company, p1, p2) = seeded(&store).await;
        store.quarantine(&[row(&p1, ""), row(&p2, "")]).await.unwrap();

        assert_eq!(store.fetch_quarantine(Some(1)).await.unwrap().len(), 1);
        assert!(store.fetch_quarantine(None).await.unwrap().len() >= 2);

        store.delete_company(company).await.unwrap();
    }
}
