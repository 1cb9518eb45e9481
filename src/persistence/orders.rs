//! MySQL-backed order repository and query service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::Row;

use crate::domain::{Order, OrderId};
use crate::persistence::{
    offset, DbContext, OrderQueryService, OrderRepository, Page, PersistenceError,
};

const SELECT_COLUMNS: &str = "SELECT id, name, count, paid, created_at, version FROM orders";

fn order_from_row(row: &MySqlRow) -> Result<Order, PersistenceError> {
    let id: String = row.try_get("id")?;
    let id = id
        .parse::<OrderId>()
        .map_err(|e| PersistenceError::Corrupt(format!("orders.id {id:?}: {e}")))?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Order {
        id,
        name: row.try_get("name")?,
        count: row.try_get("count")?,
        paid: row.try_get("paid")?,
        created_at,
        version: row.try_get("version")?,
    })
}

#[derive(Clone)]
pub struct MySqlOrderRepository {
    db: DbContext,
}

impl MySqlOrderRepository {
    pub fn new(db: DbContext) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderRepository for MySqlOrderRepository {
    async fn add(&self, order: &Order) -> Result<(), PersistenceError> {
        let mut uow = self.db.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, name, count, paid, created_at, version) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.to_string())
        .bind(&order.name)
        .bind(order.count)
        .bind(order.paid)
        .bind(order.created_at)
        .bind(order.version)
        .execute(uow.connection())
        .await?;
        uow.commit().await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, PersistenceError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update(&self, order: &mut Order) -> Result<(), PersistenceError> {
        let mut uow = self.db.begin().await?;
        let result = sqlx::query(
            "UPDATE orders SET name = ?, count = ?, paid = ?, version = version + 1 \
             WHERE id = ? AND version = ?",
        )
        .bind(&order.name)
        .bind(order.count)
        .bind(order.paid)
        .bind(order.id.to_string())
        .bind(order.version)
        .execute(uow.connection())
        .await?;

        if result.rows_affected() == 0 {
            uow.rollback().await?;
            return Err(PersistenceError::Concurrency {
                entity: "order",
                id: order.id.to_string(),
            });
        }

        uow.commit().await?;
        order.version += 1;
        Ok(())
    }
}

#[derive(Clone)]
pub struct MySqlOrderQueryService {
    db: DbContext,
}

impl MySqlOrderQueryService {
    pub fn new(db: DbContext) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderQueryService for MySqlOrderQueryService {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, PersistenceError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self, page: u32, page_size: u32) -> Result<Page<Order>, PersistenceError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(self.db.pool())
            .await?;

        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(u64::from(page_size))
        .bind(offset(page, page_size))
        .fetch_all(self.db.pool())
        .await?;

        let items = rows.iter().map(order_from_row).collect::<Result<_, _>>()?;
        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}
