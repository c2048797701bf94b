//! The SQLite store.
//!
//! Uses a single connection behind a mutex. Every public method takes
//! the lock for one statement or one transaction, so callers never
//! observe partial writes.

use crate::error::{StoreError, StoreResult};
use argus_types::{
    FeatureFlagRecord, FeatureKey, InstallationId, LicenseRecord, OutcomeKind, ValidationAttempt,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const INSTALLATION_ID_KEY: &str = "installation_id";

/// A license record together with its storage revision.
///
/// The revision increments on every write; revision-checked updates use
/// it to detect concurrent writers on the same database file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredLicense {
    /// The cached record.
    pub record: LicenseRecord,
    /// Storage revision of this copy.
    pub revision: i64,
}

/// Persistent store backed by SQLite.
pub struct LicenseStore {
    conn: Arc<Mutex<Connection>>,
}

impl LicenseStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Storage(format!("failed to open license store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Storage(format!("failed to open in-memory store: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS license_record (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                license_key TEXT NOT NULL,
                entitlement TEXT NOT NULL,
                hardware_fingerprint TEXT NOT NULL,
                activated_at TEXT NOT NULL,
                last_successful_validation_at TEXT NOT NULL,
                grace_started_at TEXT,
                revoked INTEGER NOT NULL DEFAULT 0,
                revision INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS validation_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempted_at TEXT NOT NULL,
                outcome TEXT NOT NULL,
                detail TEXT,
                duration_ms INTEGER NOT NULL,
                license_key TEXT,
                hardware_id TEXT
            );

            CREATE TABLE IF NOT EXISTS feature_flags (
                feature_key TEXT PRIMARY KEY,
                available INTEGER NOT NULL,
                reason TEXT NOT NULL,
                computed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS system_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )
        .map_err(|e| StoreError::Storage(format!("failed to init schema: {e}")))?;
        Ok(())
    }

    // ── Installation identity ────────────────────────────────────

    /// Returns the installation identity, generating and persisting it
    /// on first call. Read-only thereafter.
    pub fn installation_id(&self) -> StoreResult<InstallationId> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM system_config WHERE key = ?1",
                params![INSTALLATION_ID_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::Storage(format!("failed to read installation id: {e}")))?;

        if let Some(value) = existing {
            return InstallationId::parse(&value)
                .map_err(|e| StoreError::Storage(format!("invalid stored installation id: {e}")));
        }

        let id = InstallationId::new();
        conn.execute(
            "INSERT INTO system_config (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![INSTALLATION_ID_KEY, id.to_string(), Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::Storage(format!("failed to persist installation id: {e}")))?;
        debug!(installation_id = %id, "generated installation identity");
        Ok(id)
    }

    // ── License record ───────────────────────────────────────────

    /// Loads the cached license record, if one exists.
    pub fn load_license(&self) -> StoreResult<Option<StoredLicense>> {
        let conn = self.conn.lock().unwrap();
        read_license(&conn)
    }

    /// Writes the license record wholesale, replacing any existing row.
    ///
    /// This is the activation path: a fresh activation overwrites the
    /// previous record. The revision still advances monotonically so
    /// stale revision-checked updates keep failing.
    pub fn save_license(&self, record: &LicenseRecord) -> StoreResult<StoredLicense> {
        let conn = self.conn.lock().unwrap();
        let current: Option<i64> = conn
            .query_row("SELECT revision FROM license_record WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| StoreError::Storage(format!("failed to read license revision: {e}")))?;
        let revision = current.unwrap_or(0) + 1;
        write_license(&conn, record, revision)?;
        Ok(StoredLicense {
            record: record.clone(),
            revision,
        })
    }

    /// Revision-checked in-place update of the license record.
    ///
    /// Runs inside one transaction: reloads the stored record, verifies
    /// its revision still matches `expected_revision`, applies `f`, and
    /// writes the result with the revision bumped. Fails with
    /// [`StoreError::RevisionConflict`] if another writer got there
    /// first, and with a storage error if no record exists.
    pub fn update_license<F>(&self, expected_revision: i64, f: F) -> StoreResult<StoredLicense>
    where
        F: FnOnce(&mut LicenseRecord),
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Storage(format!("failed to begin transaction: {e}")))?;

        let stored = read_license(&tx)?
            .ok_or_else(|| StoreError::Storage("no license record to update".to_string()))?;
        if stored.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                expected: expected_revision,
                found: stored.revision,
            });
        }

        let mut record = stored.record;
        f(&mut record);
        let revision = stored.revision + 1;
        write_license(&tx, &record, revision)?;
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("failed to commit license update: {e}")))?;
        Ok(StoredLicense { record, revision })
    }

    // ── Validation attempt log ───────────────────────────────────

    /// Appends one attempt row. Rows are never mutated or deleted here;
    /// retention is an external concern.
    pub fn append_attempt(&self, attempt: &ValidationAttempt) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO validation_attempts
                (attempted_at, outcome, detail, duration_ms, license_key, hardware_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attempt.attempted_at.to_rfc3339(),
                attempt.outcome.as_str(),
                attempt.detail,
                attempt.duration_ms as i64,
                attempt.license_key,
                attempt.hardware_id,
            ],
        )
        .map_err(|e| StoreError::Storage(format!("failed to append attempt: {e}")))?;
        Ok(())
    }

    /// Loads attempt rows newest-first with pagination.
    pub fn load_attempts(&self, limit: usize, offset: usize) -> StoreResult<Vec<ValidationAttempt>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT attempted_at, outcome, detail, duration_ms, license_key, hardware_id
                 FROM validation_attempts ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(|e| StoreError::Storage(format!("failed to prepare attempt query: {e}")))?;

        let rows = stmt
            .query_map(params![limit as i64, offset as i64], |row| {
                let attempted_at: String = row.get(0)?;
                let outcome: String = row.get(1)?;
                let detail: Option<String> = row.get(2)?;
                let duration_ms: i64 = row.get(3)?;
                let license_key: Option<String> = row.get(4)?;
                let hardware_id: Option<String> = row.get(5)?;
                Ok((attempted_at, outcome, detail, duration_ms, license_key, hardware_id))
            })
            .map_err(|e| StoreError::Storage(format!("failed to query attempts: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (attempted_at, outcome, detail, duration_ms, license_key, hardware_id) =
                row.map_err(|e| StoreError::Storage(format!("failed to read attempt row: {e}")))?;
            result.push(ValidationAttempt {
                attempted_at: parse_ts(&attempted_at)?,
                outcome: outcome
                    .parse::<OutcomeKind>()
                    .map_err(|e| StoreError::Storage(format!("invalid outcome in log: {e}")))?,
                detail,
                duration_ms: duration_ms as u64,
                license_key,
                hardware_id,
            });
        }
        Ok(result)
    }

    /// Returns the total number of logged attempts.
    pub fn attempt_count(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM validation_attempts", [], |row| row.get(0))
            .map_err(|e| StoreError::Storage(format!("failed to count attempts: {e}")))?;
        Ok(count as usize)
    }

    // ── Feature flag cache ───────────────────────────────────────

    /// Replaces the entire feature-flag cache in one transaction, so a
    /// reader never observes a mix of old and new decisions.
    pub fn replace_feature_flags(&self, flags: &[FeatureFlagRecord]) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Storage(format!("failed to begin transaction: {e}")))?;
        tx.execute("DELETE FROM feature_flags", [])
            .map_err(|e| StoreError::Storage(format!("failed to clear feature flags: {e}")))?;
        for flag in flags {
            tx.execute(
                "INSERT INTO feature_flags (feature_key, available, reason, computed_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    flag.feature_key.as_str(),
                    flag.available,
                    flag.reason,
                    flag.computed_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StoreError::Storage(format!("failed to write feature flag: {e}")))?;
        }
        tx.commit()
            .map_err(|e| StoreError::Storage(format!("failed to commit feature flags: {e}")))?;
        Ok(())
    }

    /// Loads all cached feature flags, ordered by key.
    pub fn load_feature_flags(&self) -> StoreResult<Vec<FeatureFlagRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT feature_key, available, reason, computed_at
                 FROM feature_flags ORDER BY feature_key",
            )
            .map_err(|e| StoreError::Storage(format!("failed to prepare flag query: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                let key: String = row.get(0)?;
                let available: bool = row.get(1)?;
                let reason: String = row.get(2)?;
                let computed_at: String = row.get(3)?;
                Ok((key, available, reason, computed_at))
            })
            .map_err(|e| StoreError::Storage(format!("failed to query feature flags: {e}")))?;

        let mut result = Vec::new();
        for row in rows {
            let (key, available, reason, computed_at) =
                row.map_err(|e| StoreError::Storage(format!("failed to read flag row: {e}")))?;
            result.push(FeatureFlagRecord {
                feature_key: FeatureKey::from(key),
                available,
                reason,
                computed_at: parse_ts(&computed_at)?,
            });
        }
        Ok(result)
    }

    /// Loads one cached feature flag by key.
    pub fn load_feature_flag(&self, key: &FeatureKey) -> StoreResult<Option<FeatureFlagRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT feature_key, available, reason, computed_at
             FROM feature_flags WHERE feature_key = ?1",
            params![key.as_str()],
            |row| {
                let key: String = row.get(0)?;
                let available: bool = row.get(1)?;
                let reason: String = row.get(2)?;
                let computed_at: String = row.get(3)?;
                Ok((key, available, reason, computed_at))
            },
        )
        .optional()
        .map_err(|e| StoreError::Storage(format!("failed to read feature flag: {e}")))?
        .map(|(key, available, reason, computed_at)| {
            Ok(FeatureFlagRecord {
                feature_key: FeatureKey::from(key),
                available,
                reason,
                computed_at: parse_ts(&computed_at)?,
            })
        })
        .transpose()
    }
}

fn read_license(conn: &Connection) -> StoreResult<Option<StoredLicense>> {
    conn.query_row(
        "SELECT license_key, entitlement, hardware_fingerprint, activated_at,
                last_successful_validation_at, grace_started_at, revoked, revision
         FROM license_record WHERE id = 1",
        [],
        |row| {
            let license_key: String = row.get(0)?;
            let entitlement: String = row.get(1)?;
            let hardware_fingerprint: String = row.get(2)?;
            let activated_at: String = row.get(3)?;
            let last_validated: String = row.get(4)?;
            let grace_started_at: Option<String> = row.get(5)?;
            let revoked: bool = row.get(6)?;
            let revision: i64 = row.get(7)?;
            Ok((
                license_key,
                entitlement,
                hardware_fingerprint,
                activated_at,
                last_validated,
                grace_started_at,
                revoked,
                revision,
            ))
        },
    )
    .optional()
    .map_err(|e| StoreError::Storage(format!("failed to read license record: {e}")))?
    .map(
        |(key, ent, fp, activated, validated, grace, revoked, revision)| {
            Ok(StoredLicense {
                record: LicenseRecord {
                    license_key: key,
                    entitlement: serde_json::from_str(&ent)?,
                    hardware_fingerprint: fp,
                    activated_at: parse_ts(&activated)?,
                    last_successful_validation_at: parse_ts(&validated)?,
                    grace_started_at: grace.as_deref().map(parse_ts).transpose()?,
                    revoked,
                },
                revision,
            })
        },
    )
    .transpose()
}

fn write_license(conn: &Connection, record: &LicenseRecord, revision: i64) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO license_record
            (id, license_key, entitlement, hardware_fingerprint, activated_at,
             last_successful_validation_at, grace_started_at, revoked, revision)
         VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.license_key,
            serde_json::to_string(&record.entitlement)?,
            record.hardware_fingerprint,
            record.activated_at.to_rfc3339(),
            record.last_successful_validation_at.to_rfc3339(),
            record.grace_started_at.map(|t| t.to_rfc3339()),
            record.revoked,
            revision,
        ],
    )
    .map_err(|e| StoreError::Storage(format!("failed to write license record: {e}")))?;
    Ok(())
}

fn parse_ts(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("invalid stored timestamp: {e}")))
}
