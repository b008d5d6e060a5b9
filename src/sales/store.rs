use std::sync::RwLock;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::repo_types::{SalesLine, SalesRecord};

/// Read/write access to the sales fact table.
///
/// The aggregation side only ever calls [`FactStore::records`]; the writers
/// are used by the bulk loader.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// All records in storage order (ascending surrogate id).
    async fn records(&self) -> anyhow::Result<Vec<SalesRecord>>;
    /// Inserts every line or none of them.
    async fn insert_batch(&self, lines: &[SalesLine]) -> anyhow::Result<u64>;
    /// Deletes every record, returning how many were removed.
    async fn wipe(&self) -> anyhow::Result<u64>;
    async fn count(&self) -> anyhow::Result<i64>;
}

#[derive(Clone)]
pub struct PgFactStore {
    db: PgPool,
}

impl PgFactStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn insert_line_tx(tx: &mut Transaction<'_, Postgres>, line: &SalesLine) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO superstore_sales (
            order_id, order_date, ship_date, ship_mode,
            customer_id, customer_name, segment,
            country, city, state, postal_code, region,
            product_id, category, sub_category, product_name,
            sales, quantity, discount, profit
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        "#,
    )
    .bind(&line.order_id)
    .bind(line.order_date)
    .bind(line.ship_date)
    .bind(&line.ship_mode)
    .bind(&line.customer_id)
    .bind(&line.customer_name)
    .bind(&line.segment)
    .bind(&line.country)
    .bind(&line.city)
    .bind(&line.state)
    .bind(line.postal_code)
    .bind(&line.region)
    .bind(&line.product_id)
    .bind(&line.category)
    .bind(&line.sub_category)
    .bind(&line.product_name)
    .bind(line.sales)
    .bind(line.quantity)
    .bind(line.discount)
    .bind(line.profit)
    .execute(&mut **tx)
    .await
    .with_context(|| format!("insert sales line for order {}", line.order_id))?;
    Ok(())
}

#[async_trait]
impl FactStore for PgFactStore {
    async fn records(&self) -> anyhow::Result<Vec<SalesRecord>> {
        let rows = sqlx::query_as::<_, SalesRecord>(
            r#"
            SELECT id, order_id, order_date, ship_date, ship_mode,
                   customer_id, customer_name, segment,
                   country, city, state, postal_code, region,
                   product_id, category, sub_category, product_name,
                   sales, quantity, discount, profit
              FROM superstore_sales
             ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("select sales records")?;
        debug!(rows = rows.len(), "fact table scanned");
        Ok(rows)
    }

    async fn insert_batch(&self, lines: &[SalesLine]) -> anyhow::Result<u64> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        for line in lines {
            if let Err(e) = insert_line_tx(&mut tx, line).await {
                tx.rollback().await.context("rollback tx")?;
                return Err(e);
            }
        }
        tx.commit().await.context("commit tx")?;
        Ok(lines.len() as u64)
    }

    async fn wipe(&self) -> anyhow::Result<u64> {
        let res = sqlx::query("DELETE FROM superstore_sales")
            .execute(&self.db)
            .await
            .context("wipe superstore_sales")?;
        Ok(res.rows_affected())
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM superstore_sales")
            .fetch_one(&self.db)
            .await
            .context("count superstore_sales")?;
        Ok(n)
    }
}

#[derive(Default)]
struct MemoryTable {
    rows: Vec<SalesRecord>,
    next_id: i64,
}

/// Fact table held in process memory. Used by tests and the fake app state.
#[derive(Default)]
pub struct MemoryFactStore {
    table: RwLock<MemoryTable>,
    failing_order_id: Option<String>,
}

impl MemoryFactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any batch containing a line with this order id fails as a whole.
    pub fn with_failing_order(order_id: impl Into<String>) -> Self {
        Self {
            failing_order_id: Some(order_id.into()),
            ..Self::default()
        }
    }

    pub fn with_lines(lines: Vec<SalesLine>) -> Self {
        let store = Self::default();
        if let Ok(mut table) = store.table.write() {
            for line in lines {
                table.next_id += 1;
                let id = table.next_id;
                table.rows.push(SalesRecord { id, line });
            }
        }
        store
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("memory fact table lock poisoned")
}

#[async_trait]
impl FactStore for MemoryFactStore {
    async fn records(&self) -> anyhow::Result<Vec<SalesRecord>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.rows.clone())
    }

    async fn insert_batch(&self, lines: &[SalesLine]) -> anyhow::Result<u64> {
        if let Some(bad) = &self.failing_order_id {
            if lines.iter().any(|l| &l.order_id == bad) {
                anyhow::bail!("insert rejected for order {}", bad);
            }
        }
        let mut table = self.table.write().map_err(poisoned)?;
        for line in lines {
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push(SalesRecord {
                id,
                line: line.clone(),
            });
        }
        Ok(lines.len() as u64)
    }

    async fn wipe(&self) -> anyhow::Result<u64> {
        let mut table = self.table.write().map_err(poisoned)?;
        let n = table.rows.len() as u64;
        table.rows.clear();
        Ok(n)
    }

    async fn count(&self) -> anyhow::Result<i64> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.rows.len() as i64)
    }
}
