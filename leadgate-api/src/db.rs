//! Database Connection Pool and Postgres Ledger
//!
//! PostgreSQL connection pooling via deadpool-postgres, plus [`DbClient`],
//! the Postgres implementation of the storage traits:
//! - `record_visit` is a single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//!   keyed on the `(user_id, lead_id)` unique constraint, so retries and
//!   concurrent callers converge on one row.
//! - The unlocked-leads query joins visits with leads in one round trip.
//!
//! Rows are parsed into typed records at this boundary; store errors are
//! mapped to [`LedgerError`] carrying the SQLSTATE code.

use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use leadgate_core::{
    normalize_pitch, EntityIdType, Lead, LeadId, LeadgateResult, LedgerError, Timestamp,
    UnlockedLead, UserId, VisitId, VisitRecord,
};
use leadgate_storage::{LeadCatalog, UnlockedLeadsSource, VisitLedger};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

/// Schema applied by [`DbClient::migrate`].
const SCHEMA_SQL: &str = include_str!("../migrations/V1__visits.sql");

const VISIT_COLUMNS: &str =
    "visit_id, user_id, lead_id, unlocked, pitch, created_at, updated_at";

const LEAD_COLUMNS: &str =
    "lead_id, name, event_name, industry, focus, image_url, unlock_type, unlock_value";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Timeout for acquiring, creating, and recycling connections
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "leadgate".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(10),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("LEADGATE_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("LEADGATE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("LEADGATE_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("LEADGATE_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("LEADGATE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("LEADGATE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("LEADGATE_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig {
            max_size: self.max_size,
            timeouts: Timeouts {
                wait: Some(self.timeout),
                create: Some(self.timeout),
                recycle: Some(self.timeout),
            },
            ..Default::default()
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Which side of the ledger an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

fn store_failure(access: Access, code: String, reason: String) -> LedgerError {
    match access {
        Access::Read => LedgerError::ReadFailed { code, reason },
        Access::Write => LedgerError::WriteFailed { code, reason },
    }
}

/// Map a Postgres error to the ledger taxonomy.
///
/// A foreign-key violation on a lead reference means the lead does not
/// exist; other server errors keep their SQLSTATE as the code.
fn map_pg_error(err: tokio_postgres::Error, access: Access, lead_id: Option<LeadId>) -> LedgerError {
    if let Some(db_error) = err.as_db_error() {
        if let Some(lead_id) = lead_id {
            if db_error.code() == &SqlState::FOREIGN_KEY_VIOLATION {
                return LedgerError::UnknownLead { lead_id };
            }
        }
        return store_failure(
            access,
            db_error.code().code().to_string(),
            db_error.message().to_string(),
        );
    }
    if err.is_closed() {
        return LedgerError::Unavailable {
            reason: "database connection closed".to_string(),
        };
    }
    LedgerError::Unavailable {
        reason: err.to_string(),
    }
}

fn map_pool_error(err: PoolError, timeout: Duration) -> LedgerError {
    match err {
        PoolError::Timeout(kind) => {
            tracing::warn!(?kind, "Timed out waiting for a database connection");
            LedgerError::Timeout { elapsed: timeout }
        }
        PoolError::Backend(e) => map_pg_error(e, Access::Read, None),
        PoolError::Closed => LedgerError::Unavailable {
            reason: "database connection pool is closed".to_string(),
        },
        other => LedgerError::Unavailable {
            reason: other.to_string(),
        },
    }
}

fn decode_error(err: tokio_postgres::Error) -> LedgerError {
    LedgerError::ReadFailed {
        code: "decode".to_string(),
        reason: err.to_string(),
    }
}

// ============================================================================
// ROW DTOS
// ============================================================================

/// A `lead_visits` row.
#[derive(Debug, Clone)]
pub struct VisitRow {
    pub visit_id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Uuid,
    pub unlocked: bool,
    pub pitch: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<&Row> for VisitRow {
    type Error = LedgerError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            visit_id: row.try_get("visit_id").map_err(decode_error)?,
            user_id: row.try_get("user_id").map_err(decode_error)?,
            lead_id: row.try_get("lead_id").map_err(decode_error)?,
            unlocked: row.try_get("unlocked").map_err(decode_error)?,
            pitch: row.try_get("pitch").map_err(decode_error)?,
            created_at: row.try_get("created_at").map_err(decode_error)?,
            updated_at: row.try_get("updated_at").map_err(decode_error)?,
        })
    }
}

impl From<VisitRow> for VisitRecord {
    fn from(row: VisitRow) -> Self {
        VisitRecord {
            visit_id: VisitId::new(row.visit_id),
            user_id: UserId::new(row.user_id),
            lead_id: LeadId::new(row.lead_id),
            unlocked: row.unlocked,
            pitch: row.pitch,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A `leads` row.
#[derive(Debug, Clone)]
pub struct LeadRow {
    pub lead_id: Uuid,
    pub name: String,
    pub event_name: Option<String>,
    pub industry: Option<String>,
    pub focus: Option<String>,
    pub image_url: Option<String>,
    pub unlock_type: Option<String>,
    pub unlock_value: Option<String>,
}

impl TryFrom<&Row> for LeadRow {
    type Error = LedgerError;

    fn try_from(row: &Row) -> Result<Self, Self::Error> {
        Ok(Self {
            lead_id: row.try_get("lead_id").map_err(decode_error)?,
            name: row.try_get("name").map_err(decode_error)?,
            event_name: row.try_get("event_name").map_err(decode_error)?,
            industry: row.try_get("industry").map_err(decode_error)?,
            focus: row.try_get("focus").map_err(decode_error)?,
            image_url: row.try_get("image_url").map_err(decode_error)?,
            unlock_type: row.try_get("unlock_type").map_err(decode_error)?,
            unlock_value: row.try_get("unlock_value").map_err(decode_error)?,
        })
    }
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Lead {
            lead_id: LeadId::new(row.lead_id),
            name: row.name,
            event_name: row.event_name,
            industry: row.industry,
            focus: row.focus,
            image_url: row.image_url,
            unlock_type: row.unlock_type,
            unlock_value: row.unlock_value,
        }
    }
}

fn visit_from_row(row: &Row) -> Result<VisitRecord, LedgerError> {
    VisitRow::try_from(row).map(VisitRecord::from)
}

fn lead_from_row(row: &Row) -> Result<Lead, LedgerError> {
    LeadRow::try_from(row).map(Lead::from)
}

/// Parse a joined visit + lead row into the unlocked-lead projection.
fn unlocked_from_row(row: &Row) -> Result<UnlockedLead, LedgerError> {
    let visit = visit_from_row(row)?;
    let lead = lead_from_row(row)?;
    Ok(UnlockedLead::from_parts(&visit, &lead))
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// Postgres-backed visit ledger and lead catalog.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
    timeout: Duration,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool, config.timeout))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Apply the schema. Safe to run on every startup.
    pub async fn migrate(&self) -> LeadgateResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA_SQL)
            .await
            .map_err(|e| map_pg_error(e, Access::Write, None))?;
        tracing::info!("Database schema up to date");
        Ok(())
    }

    /// Insert or replace a catalog row.
    pub async fn upsert_lead(&self, lead: &Lead) -> LeadgateResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO leads (lead_id, name, event_name, industry, focus, image_url, \
                                unlock_type, unlock_value) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (lead_id) DO UPDATE SET \
                name = EXCLUDED.name, event_name = EXCLUDED.event_name, \
                industry = EXCLUDED.industry, focus = EXCLUDED.focus, \
                image_url = EXCLUDED.image_url, unlock_type = EXCLUDED.unlock_type, \
                unlock_value = EXCLUDED.unlock_value",
            &[
                &lead.lead_id.as_uuid(),
                &lead.name,
                &lead.event_name,
                &lead.industry,
                &lead.focus,
                &lead.image_url,
                &lead.unlock_type,
                &lead.unlock_value,
            ],
        )
        .await
        .map_err(|e| map_pg_error(e, Access::Write, None))?;
        Ok(())
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, LedgerError> {
        self.pool
            .get()
            .await
            .map_err(|e| map_pool_error(e, self.timeout))
    }
}

#[async_trait]
impl VisitLedger for DbClient {
    async fn record_visit(
        &self,
        user_id: UserId,
        lead_id: LeadId,
        at: Timestamp,
    ) -> LeadgateResult<VisitRecord> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "INSERT INTO lead_visits ({VISIT_COLUMNS}) \
             VALUES ($1, $2, $3, TRUE, NULL, $4, $4) \
             ON CONFLICT (user_id, lead_id) DO UPDATE SET \
                updated_at = EXCLUDED.updated_at, \
                unlocked = TRUE \
             RETURNING {VISIT_COLUMNS}"
        );
        let row = conn
            .query_one(
                &sql,
                &[
                    &VisitId::now_v7().as_uuid(),
                    &user_id.as_uuid(),
                    &lead_id.as_uuid(),
                    &at,
                ],
            )
            .await
            .map_err(|e| map_pg_error(e, Access::Write, Some(lead_id)))?;

        let record = visit_from_row(&row)?;
        tracing::debug!(%user_id, %lead_id, visit_id = %record.visit_id, "Visit upserted");
        Ok(record)
    }

    async fn find_visit(
        &self,
        user_id: UserId,
        lead_id: LeadId,
    ) -> LeadgateResult<Option<VisitRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {VISIT_COLUMNS} FROM lead_visits WHERE user_id = $1 AND lead_id = $2"
        );
        let row = conn
            .query_opt(&sql, &[&user_id.as_uuid(), &lead_id.as_uuid()])
            .await
            .map_err(|e| map_pg_error(e, Access::Read, None))?;

        Ok(row.as_ref().map(visit_from_row).transpose()?)
    }

    async fn list_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<VisitRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {VISIT_COLUMNS} FROM lead_visits \
             WHERE user_id = $1 AND unlocked \
             ORDER BY updated_at DESC"
        );
        let rows = conn
            .query(&sql, &[&user_id.as_uuid()])
            .await
            .map_err(|e| map_pg_error(e, Access::Read, None))?;

        Ok(rows
            .iter()
            .map(visit_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn update_pitch(
        &self,
        user_id: UserId,
        lead_id: LeadId,
        pitch: Option<String>,
    ) -> LeadgateResult<VisitRecord> {
        let pitch = normalize_pitch(pitch)?;
        let conn = self.get_conn().await?;
        let sql = format!(
            "UPDATE lead_visits SET pitch = $3 \
             WHERE user_id = $1 AND lead_id = $2 \
             RETURNING {VISIT_COLUMNS}"
        );
        let row = conn
            .query_opt(&sql, &[&user_id.as_uuid(), &lead_id.as_uuid(), &pitch])
            .await
            .map_err(|e| map_pg_error(e, Access::Write, None))?
            .ok_or(LedgerError::VisitNotFound { user_id, lead_id })?;

        Ok(visit_from_row(&row)?)
    }

    async fn health_check(&self) -> LeadgateResult<bool> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[])
            .await
            .map_err(|e| map_pg_error(e, Access::Read, None))?;
        Ok(true)
    }
}

#[async_trait]
impl LeadCatalog for DbClient {
    async fn get_lead(&self, lead_id: LeadId) -> LeadgateResult<Option<Lead>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lead_id = $1");
        let row = conn
            .query_opt(&sql, &[&lead_id.as_uuid()])
            .await
            .map_err(|e| map_pg_error(e, Access::Read, None))?;

        Ok(row.as_ref().map(lead_from_row).transpose()?)
    }

    async fn get_leads(&self, lead_ids: &[LeadId]) -> LeadgateResult<Vec<Lead>> {
        if lead_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = lead_ids.iter().map(|id| id.as_uuid()).collect();
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leads WHERE lead_id = ANY($1)");
        let rows = conn
            .query(&sql, &[&ids])
            .await
            .map_err(|e| map_pg_error(e, Access::Read, None))?;

        Ok(rows
            .iter()
            .map(lead_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl UnlockedLeadsSource for DbClient {
    async fn fetch_unlocked(&self, user_id: UserId) -> LeadgateResult<Vec<UnlockedLead>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT v.visit_id, v.user_id, v.lead_id, v.unlocked, v.pitch, \
                        v.created_at, v.updated_at, \
                        l.name, l.event_name, l.industry, l.focus, l.image_url, \
                        l.unlock_type, l.unlock_value \
                 FROM lead_visits v \
                 JOIN leads l ON l.lead_id = v.lead_id \
                 WHERE v.user_id = $1 AND v.unlocked \
                 ORDER BY v.updated_at DESC",
                &[&user_id.as_uuid()],
            )
            .await
            .map_err(|e| map_pg_error(e, Access::Read, None))?;

        let leads = rows
            .iter()
            .map(unlocked_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::trace!(%user_id, count = leads.len(), "Fetched unlocked leads");
        Ok(leads)
    }
}
