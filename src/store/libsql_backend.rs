//! libSQL backend for `UserStore`. Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::onboarding::model::{NewUser, TherapyFrequency, UserRecord};
use crate::store::migrations;
use crate::store::traits::UserStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }
}

const USER_COLUMNS: &str = "id, external_id, preferred_name, therapy_frequency, \
                            onboarding_completed, created_at, updated_at";

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Map a libsql Row to a UserRecord. Column order matches USER_COLUMNS.
fn row_to_user(row: &libsql::Row) -> Result<UserRecord, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Serialization(format!("user row: {e}"));

    let id_str: String = row.get(0).map_err(parse)?;
    let id = Uuid::parse_str(&id_str)
        .map_err(|e| DatabaseError::Serialization(format!("user id {id_str}: {e}")))?;
    let frequency: Option<String> = row.get(3).ok();
    let completed: i64 = row.get(4).map_err(parse)?;
    let created: String = row.get(5).map_err(parse)?;
    let updated: String = row.get(6).map_err(parse)?;

    Ok(UserRecord {
        id,
        external_id: row.get(1).map_err(parse)?,
        preferred_name: row.get::<String>(2).ok(),
        therapy_frequency: frequency.and_then(|f| f.parse::<TherapyFrequency>().ok()),
        onboarding_completed: completed != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

#[async_trait]
impl UserStore for LibSqlBackend {
    async fn get_user(&self, external_id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE external_id = ?1"),
                params![external_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, DatabaseError> {
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            external_id: user.external_id,
            preferred_name: user.preferred_name,
            therapy_frequency: user.therapy_frequency,
            onboarding_completed: user.onboarding_completed,
            created_at: now,
            updated_at: now,
        };

        self.conn
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    record.id.to_string(),
                    record.external_id.clone(),
                    record.preferred_name.clone(),
                    record.therapy_frequency.map(|f| f.to_string()),
                    i64::from(record.onboarding_completed),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("UNIQUE") {
                    DatabaseError::Constraint(format!("create_user: {message}"))
                } else {
                    DatabaseError::Query(format!("create_user: {message}"))
                }
            })?;

        debug!(user_id = %record.id, external_id = %record.external_id, "Created user");
        Ok(record)
    }
}
