//! SQLite permission store implementation.

use crate::{Error, Result};
use authz::{
    Action, EntityId, ParameterBag, Permission, PermissionFilter, PermissionRecord,
    PermissionStore, RoleName, ScopeFilter,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

/// Entity column value for records that apply to the action generally.
///
/// Stored instead of NULL so the unique constraint covers unscoped records.
const UNSCOPED: &str = "";

const SELECT_COLUMNS: &str =
    "SELECT id, action, entity_id, role_name, permission, parameters FROM permissions";

/// SQLite-backed permission store.
pub struct SqliteStore {
    conn: Connection,
}

/// Bookkeeping timestamps of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTimes {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SqliteStore {
    /// Open or create a permission store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory permission store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS permissions (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                entity_id TEXT NOT NULL DEFAULT '',
                role_name TEXT NOT NULL,
                permission TEXT NOT NULL CHECK (permission IN ('grant', 'deny')),
                parameters TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (action, entity_id, role_name)
            );
            CREATE INDEX IF NOT EXISTS idx_permissions_action
                ON permissions(action, role_name);
            "#,
        )?;
        Ok(())
    }

    /// Creation and last-update times of a record, if it exists.
    pub fn times(&self, id: Uuid) -> Result<Option<RecordTimes>> {
        let row = self
            .conn
            .query_row(
                "SELECT created_at, updated_at FROM permissions WHERE id = ?1",
                [id.to_string()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        row.map(|(created, updated)| -> Result<RecordTimes> {
            Ok(RecordTimes {
                created_at: parse_time(id, &created)?,
                updated_at: parse_time(id, &updated)?,
            })
        })
        .transpose()
    }

    fn select(&self, filter: &PermissionFilter) -> Result<Vec<PermissionRecord>> {
        if filter.is_empty_match() {
            return Ok(Vec::new());
        }

        let (clause, args) = where_clause(filter);
        let sql = format!("{SELECT_COLUMNS}{clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), RawRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(rows = rows.len(), "queried permissions");

        rows.into_iter().map(RawRow::into_record).collect()
    }

    fn insert_record(&self, record: &PermissionRecord) -> Result<()> {
        let permission = stored_permission(record)?;
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT INTO permissions
                (id, action, entity_id, role_name, permission, parameters, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                record.id.to_string(),
                record.action.as_str(),
                entity_column(record),
                record.role.as_str(),
                permission,
                serde_json::to_string(&record.parameters)?,
                now,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => {
                warn!(id = %record.id, action = %record.action, role = %record.role, "duplicate permission");
                Err(record.key().duplicate().into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_record(&self, record: &PermissionRecord) -> Result<()> {
        let permission = stored_permission(record)?;
        let updated = self.conn.execute(
            "UPDATE permissions
             SET action = ?2, entity_id = ?3, role_name = ?4, permission = ?5,
                 parameters = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                record.id.to_string(),
                record.action.as_str(),
                entity_column(record),
                record.role.as_str(),
                permission,
                serde_json::to_string(&record.parameters)?,
                Utc::now().to_rfc3339(),
            ],
        );
        match updated {
            Ok(0) => Err(authz::Error::NotFound(record.id).into()),
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => Err(record.key().duplicate().into()),
            Err(err) => Err(err.into()),
        }
    }

    fn delete_records(&self, records: &[PermissionRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM permissions WHERE id = ?1")?;
            for record in records {
                removed += stmt.execute([record.id.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}

impl PermissionStore for SqliteStore {
    fn query(&self, filter: &PermissionFilter) -> authz::Result<Vec<PermissionRecord>> {
        Ok(self.select(filter)?)
    }

    fn insert(&self, record: PermissionRecord) -> authz::Result<PermissionRecord> {
        self.insert_record(&record)?;
        Ok(record)
    }

    fn update(&self, record: &PermissionRecord) -> authz::Result<()> {
        Ok(self.update_record(record)?)
    }

    fn delete(&self, records: &[PermissionRecord]) -> authz::Result<usize> {
        Ok(self.delete_records(records)?)
    }
}

/// Build a `WHERE` clause and its positional arguments.
fn where_clause(filter: &PermissionFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(action) = &filter.action {
        args.push(Value::Text(action.to_string()));
        conditions.push(format!("action = ?{}", args.len()));
    }
    if let Some(roles) = &filter.roles {
        let mut slots = Vec::with_capacity(roles.len());
        for role in roles {
            args.push(Value::Text(role.to_string()));
            slots.push(format!("?{}", args.len()));
        }
        conditions.push(format!("role_name IN ({})", slots.join(", ")));
    }
    match &filter.scope {
        ScopeFilter::Any => {}
        ScopeFilter::Unscoped => {
            args.push(Value::Text(UNSCOPED.to_string()));
            conditions.push(format!("entity_id = ?{}", args.len()));
        }
        ScopeFilter::Entity(id) => {
            args.push(Value::Text(id.to_string()));
            conditions.push(format!("entity_id = ?{}", args.len()));
        }
    }
    if let Some(permission) = filter.permission {
        args.push(Value::Text(permission.as_str().to_string()));
        conditions.push(format!("permission = ?{}", args.len()));
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

fn entity_column(record: &PermissionRecord) -> &str {
    record.entity.as_ref().map_or(UNSCOPED, EntityId::as_str)
}

fn stored_permission(record: &PermissionRecord) -> Result<&'static str> {
    match record.permission {
        Permission::None => Err(authz::Error::Invalid(format!(
            "record {} has no verdict to store",
            record.id
        ))
        .into()),
        permission => Ok(permission.as_str()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn parse_time(id: Uuid, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
}

/// Column values as read, before validation.
struct RawRow {
    id: String,
    action: String,
    entity_id: String,
    role_name: String,
    permission: String,
    parameters: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            action: row.get(1)?,
            entity_id: row.get(2)?,
            role_name: row.get(3)?,
            permission: row.get(4)?,
            parameters: row.get(5)?,
        })
    }

    fn into_record(self) -> Result<PermissionRecord> {
        let corrupt = |reason: String| Error::Corrupt {
            id: self.id.clone(),
            reason,
        };

        let id = self.id.parse::<Uuid>().map_err(|e| corrupt(e.to_string()))?;
        let entity = if self.entity_id == UNSCOPED {
            None
        } else {
            Some(EntityId::new(self.entity_id.as_str()).map_err(|e| corrupt(e.to_string()))?)
        };
        let parameters: ParameterBag = serde_json::from_str(&self.parameters)?;

        Ok(PermissionRecord {
            id,
            action: Action::new(self.action.as_str()).map_err(|e| corrupt(e.to_string()))?,
            entity,
            role: RoleName::new(self.role_name.as_str()).map_err(|e| corrupt(e.to_string()))?,
            permission: self
                .permission
                .parse::<Permission>()
                .map_err(|e| corrupt(e.to_string()))?,
            parameters,
        })
    }
}
