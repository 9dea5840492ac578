/// SQLite operation store
use super::{CommitPlan, OpStore};
use crate::{
    db,
    error::{PlcError, PlcResult},
    operations::{IndexedOperation, Operation},
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libipld::Cid;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// Operation store backed by the `operations` table
#[derive(Clone)]
pub struct SqliteOpStore {
    db: SqlitePool,
}

impl SqliteOpStore {
    /// Wrap a pool whose migrations have already run
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl OpStore for SqliteOpStore {
    async fn indexed_ops_for_did(
        &self,
        did: &str,
        include_nullified: bool,
    ) -> PlcResult<Vec<IndexedOperation>> {
        let rows = sqlx::query(
            r#"
            SELECT did, cid, operation, nullified, created_at
            FROM operations
            WHERE did = ?1 AND (?2 OR nullified = 0)
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(did)
        .bind(include_nullified)
        .fetch_all(&self.db)
        .await
        .map_err(PlcError::Database)?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn last_op_for_did(&self, did: &str) -> PlcResult<Option<Operation>> {
        let row = sqlx::query(
            r#"
            SELECT operation
            FROM operations
            WHERE did = ?1 AND nullified = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(did)
        .fetch_optional(&self.db)
        .await
        .map_err(PlcError::Database)?;

        match row {
            Some(row) => Ok(Some(parse_operation(&row.try_get::<String, _>("operation")?)?)),
            None => Ok(None),
        }
    }

    async fn commit(&self, plan: CommitPlan) -> PlcResult<()> {
        let operation = serde_json::to_string(&plan.operation)
            .map_err(|e| PlcError::Encoding(format!("Failed to serialize operation: {}", e)))?;
        let cid = plan.cid.to_string();

        let mut tx = self.db.begin().await.map_err(PlcError::Database)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO operations (did, cid, operation, nullified, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            "#,
        )
        .bind(&plan.did)
        .bind(&cid)
        .bind(&operation)
        .bind(format_timestamp(&plan.created_at))
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    PlcError::Conflict(format!("{} is already stored for {}", cid, plan.did))
                }
                e => PlcError::Database(e),
            });
        }

        for nullified in &plan.nullified {
            let result = sqlx::query(
                r#"
                UPDATE operations
                SET nullified = 1
                WHERE did = ?1 AND cid = ?2 AND nullified = 0
                "#,
            )
            .bind(&plan.did)
            .bind(nullified.to_string())
            .execute(&mut *tx)
            .await
            .map_err(PlcError::Database)?;

            if result.rows_affected() != 1 {
                return Err(PlcError::Conflict(format!(
                    "{} is no longer active for {}",
                    nullified, plan.did
                )));
            }
        }

        let tail = sqlx::query(
            r#"
            SELECT cid
            FROM operations
            WHERE did = ?1 AND nullified = 0
            ORDER BY created_at DESC, id DESC
            LIMIT 2
            "#,
        )
        .bind(&plan.did)
        .fetch_all(&mut *tx)
        .await
        .map_err(PlcError::Database)?;

        let cids = tail
            .iter()
            .map(|row| row.try_get::<String, _>("cid").map_err(PlcError::Database))
            .collect::<PlcResult<Vec<_>>>()?;

        let expected_prev = plan.prev.map(|p| p.to_string());
        if cids.first() != Some(&cid) || cids.get(1) != expected_prev.as_ref() {
            // dropping the transaction rolls it back
            return Err(PlcError::Conflict(format!(
                "log tail for {} moved during validation",
                plan.did
            )));
        }

        tx.commit().await.map_err(PlcError::Database)?;
        Ok(())
    }

    async fn dids(&self, limit: usize, after: Option<&str>) -> PlcResult<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT did
            FROM operations
            WHERE did > ?1
            ORDER BY did ASC
            LIMIT ?2
            "#,
        )
        .bind(after.unwrap_or(""))
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await
        .map_err(PlcError::Database)?;

        rows.iter()
            .map(|row| row.try_get("did").map_err(PlcError::Database))
            .collect()
    }

    async fn health_check(&self) -> PlcResult<()> {
        db::test_connection(&self.db).await
    }
}

fn row_to_entry(row: &SqliteRow) -> PlcResult<IndexedOperation> {
    let cid: String = row.try_get("cid")?;
    Ok(IndexedOperation {
        did: row.try_get("did")?,
        operation: parse_operation(&row.try_get::<String, _>("operation")?)?,
        cid: Cid::try_from(cid.as_str())
            .map_err(|e| PlcError::Encoding(format!("Invalid stored cid {}: {}", cid, e)))?,
        nullified: row.try_get::<i64, _>("nullified")? != 0,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn parse_operation(json: &str) -> PlcResult<Operation> {
    serde_json::from_str(json)
        .map_err(|e| PlcError::Encoding(format!("Invalid stored operation: {}", e)))
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> PlcResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PlcError::Internal(format!("Invalid timestamp: {}", e)))
}
