//! Transaction scope shared by repository writes.

use sqlx::{MySql, MySqlConnection, Transaction};

use crate::persistence::PersistenceError;

/// A single database transaction.
///
/// Dropping without [`commit`](Self::commit) rolls back.
pub struct UnitOfWork {
    tx: Transaction<'static, MySql>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, MySql>) -> Self {
        Self { tx }
    }

    /// Connection bound to the open transaction.
    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<(), PersistenceError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), PersistenceError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
