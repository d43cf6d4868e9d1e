//! libSQL implementation of `ProfileStore`.
//!
//! Supports local file and in-memory databases. Decimal amounts are stored
//! as text, nested records (card, collection account, waitlist) as JSON.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Transaction, params};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::profile::{CollectionAccount, CompletionKind, IssuedCard, UserProfile};
use crate::store::migrations;
use crate::store::traits::{CompletionWrite, ProfileMerge, ProfileStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations. Every
/// statement, reads included, runs under `conn_lock`: an open transaction
/// belongs to the whole connection, so an unlocked read could observe rows
/// that are later rolled back.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    conn_lock: Mutex<()>,
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

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            conn_lock: Mutex::new(()),
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

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

fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn to_json_column<T: Serialize>(value: &Option<T>) -> Result<libsql::Value, DatabaseError> {
    match value {
        Some(v) => serde_json::to_string(v)
            .map(libsql::Value::Text)
            .map_err(|e| DatabaseError::Serialization(e.to_string())),
        None => Ok(libsql::Value::Null),
    }
}

fn from_json_column<T: DeserializeOwned>(
    raw: Option<String>,
    column: &str,
) -> Result<Option<T>, DatabaseError> {
    raw.map(|s| {
        serde_json::from_str(&s)
            .map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
    })
    .transpose()
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal, DatabaseError> {
    raw.parse()
        .map_err(|e| DatabaseError::Serialization(format!("{column} '{raw}': {e}")))
}

const PROFILE_COLUMNS: &str = "handle, first_name, last_name, email, kyc_basic_completed, \
    funding_completed, identity_verified, card_active, funded_amount, balance, \
    collection_account, card, congratulated, congratulated_at, waitlist, created_at, updated_at";

/// Map a libsql Row to a UserProfile.
///
/// Column order matches PROFILE_COLUMNS.
fn row_to_profile(row: &libsql::Row) -> Result<UserProfile, DatabaseError> {
    let col = |e: libsql::Error| DatabaseError::Query(format!("profile row parse: {e}"));

    let funded_amount: String = row.get(8).map_err(col)?;
    let balance: Option<String> = row.get(9).ok();
    let congratulated_at: Option<String> = row.get(13).ok();
    let created_at: String = row.get(15).map_err(col)?;
    let updated_at: String = row.get(16).map_err(col)?;

    Ok(UserProfile {
        handle: row.get(0).map_err(col)?,
        first_name: row.get(1).ok(),
        last_name: row.get(2).ok(),
        email: row.get(3).ok(),
        kyc_basic_completed: row.get::<i64>(4).map_err(col)? != 0,
        funding_completed: row.get::<i64>(5).map_err(col)? != 0,
        identity_verified: row.get::<i64>(6).map_err(col)? != 0,
        card_active: row.get::<i64>(7).map_err(col)? != 0,
        funded_amount: parse_decimal(&funded_amount, "funded_amount")?,
        balance: balance
            .map(|b| parse_decimal(&b, "balance"))
            .transpose()?,
        collection_account: from_json_column(row.get(10).ok(), "collection_account")?,
        card: from_json_column(row.get(11).ok(), "card")?,
        congratulated: row.get::<i64>(12).map_err(col)? != 0,
        congratulated_at: congratulated_at.as_deref().map(parse_datetime),
        waitlist: from_json_column(row.get(14).ok(), "waitlist")?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

async fn query_profile(
    conn: &Connection,
    handle: &str,
) -> Result<Option<UserProfile>, DatabaseError> {
    let mut rows = conn
        .query(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE handle = ?1"),
            params![handle],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_profile(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("get_profile: {e}"))),
    }
}

/// Insert or fully overwrite a profile row. `created_at` is kept on update.
async fn write_profile(
    conn: &Connection,
    profile: &UserProfile,
    on_conflict_update: bool,
) -> Result<u64, DatabaseError> {
    let conflict = if on_conflict_update {
        "ON CONFLICT (handle) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            email = excluded.email,
            kyc_basic_completed = excluded.kyc_basic_completed,
            funding_completed = excluded.funding_completed,
            identity_verified = excluded.identity_verified,
            card_active = excluded.card_active,
            funded_amount = excluded.funded_amount,
            balance = excluded.balance,
            collection_account = excluded.collection_account,
            card = excluded.card,
            congratulated = excluded.congratulated,
            congratulated_at = excluded.congratulated_at,
            waitlist = excluded.waitlist,
            updated_at = excluded.updated_at"
    } else {
        "ON CONFLICT (handle) DO NOTHING"
    };

    let sql = format!(
        "INSERT INTO profiles ({PROFILE_COLUMNS})
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         {conflict}"
    );

    conn.execute(
        &sql,
        params![
            profile.handle.clone(),
            opt_text_owned(profile.first_name.clone()),
            opt_text_owned(profile.last_name.clone()),
            opt_text_owned(profile.email.clone()),
            profile.kyc_basic_completed as i64,
            profile.funding_completed as i64,
            profile.identity_verified as i64,
            profile.card_active as i64,
            profile.funded_amount.to_string(),
            opt_text_owned(profile.balance.map(|b| b.to_string())),
            to_json_column(&profile.collection_account)?,
            to_json_column(&profile.card)?,
            profile.congratulated as i64,
            opt_text_owned(profile.congratulated_at.map(|t| t.to_rfc3339())),
            to_json_column(&profile.waitlist)?,
            profile.created_at.to_rfc3339(),
            profile.updated_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("write_profile: {e}")))
}

async fn completion_exists(
    conn: &Connection,
    handle: &str,
    event_key: &str,
) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM completion_events WHERE handle = ?1 AND event_key = ?2",
            params![handle, event_key],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("has_completion: {e}")))?;

    match rows.next().await {
        Ok(row) => Ok(row.is_some()),
        Err(e) => Err(DatabaseError::Query(format!("has_completion: {e}"))),
    }
}

/// Commit `tx` when `outcome` asks for it, otherwise roll back.
/// Errors from the body always roll back before they are returned.
async fn finish<T>(
    tx: Transaction,
    op: &str,
    outcome: Result<(T, bool), DatabaseError>,
) -> Result<T, DatabaseError> {
    match outcome {
        Ok((value, true)) => {
            tx.commit()
                .await
                .map_err(|e| DatabaseError::Query(format!("{op} commit: {e}")))?;
            Ok(value)
        }
        Ok((value, false)) => {
            tx.rollback()
                .await
                .map_err(|e| DatabaseError::Query(format!("{op} rollback: {e}")))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(e) = tx.rollback().await {
                warn!(op, error = %e, "Rollback after failed statement also failed");
            }
            Err(err)
        }
    }
}

/// Body of `apply_completion`. The flag says whether to commit.
async fn apply_in_tx(
    tx: &Transaction,
    handle: &str,
    event_key: &str,
    kind: CompletionKind,
    merge: &ProfileMerge<'_>,
) -> Result<(CompletionWrite, bool), DatabaseError> {
    let current = query_profile(tx, handle).await?;

    if completion_exists(tx, handle, event_key).await? {
        debug!(handle, event_key, %kind, "Completion already applied");
        return Ok((CompletionWrite::AlreadyApplied(current), false));
    }

    let updated = match merge(current) {
        Ok(p) => p,
        Err(reason) => return Ok((CompletionWrite::Rejected(reason), false)),
    };

    write_profile(tx, &updated, true).await?;
    tx.execute(
        "INSERT INTO completion_events (handle, event_key, kind, applied_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![handle, event_key, kind.as_str(), Utc::now().to_rfc3339()],
    )
    .await
    .map_err(|e| DatabaseError::Query(format!("apply_completion record: {e}")))?;

    debug!(handle, event_key, %kind, "Completion applied");
    Ok((CompletionWrite::Applied(updated), true))
}

/// Body of `sync_remote_profile`. The flag says whether to commit.
async fn sync_in_tx(
    tx: &Transaction,
    remote: &UserProfile,
) -> Result<(UserProfile, bool), DatabaseError> {
    let Some(local) = query_profile(tx, &remote.handle).await? else {
        write_profile(tx, remote, false).await?;
        debug!(handle = %remote.handle, "Profile mirrored into local store");
        return Ok((remote.clone(), true));
    };

    let mut merged = local.clone();
    if !merged.absorb_remote(remote) {
        return Ok((local, false));
    }
    if let Err(violations) = merged.check_invariants() {
        warn!(
            handle = %remote.handle,
            ?violations,
            "Backend state would break profile invariants; keeping local row"
        );
        return Ok((local, false));
    }

    write_profile(tx, &merged, true).await?;
    debug!(handle = %remote.handle, "Local profile caught up with backend");
    Ok((merged, true))
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ProfileStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        migrations::run_migrations(self.conn()).await
    }

    // ── Profiles ────────────────────────────────────────────────────

    async fn get_profile(&self, handle: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        query_profile(self.conn(), handle).await
    }

    async fn insert_profile_if_absent(
        &self,
        profile: &UserProfile,
    ) -> Result<bool, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let inserted = write_profile(self.conn(), profile, false).await? > 0;
        if inserted {
            debug!(handle = %profile.handle, "Profile mirrored into local store");
        }
        Ok(inserted)
    }

    async fn sync_remote_profile(
        &self,
        remote: &UserProfile,
    ) -> Result<UserProfile, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("sync_remote_profile begin: {e}")))?;
        let outcome = sync_in_tx(&tx, remote).await;
        finish(tx, "sync_remote_profile", outcome).await
    }

    async fn list_awaiting_congratulation(&self) -> Result<Vec<UserProfile>, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM profiles
                     WHERE kyc_basic_completed = 1
                       AND funding_completed = 1
                       AND identity_verified = 1
                       AND congratulated = 0
                       AND handle != ''
                     ORDER BY updated_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_awaiting_congratulation: {e}")))?;

        let mut profiles = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_awaiting_congratulation: {e}")))?
        {
            profiles.push(row_to_profile(&row)?);
        }
        Ok(profiles)
    }

    async fn mark_congratulated(
        &self,
        handle: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let stamp = at.to_rfc3339();
        let count = self
            .conn()
            .execute(
                "UPDATE profiles SET congratulated = 1, congratulated_at = ?2, updated_at = ?2
                 WHERE handle = ?1 AND congratulated = 0",
                params![handle, stamp],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_congratulated: {e}")))?;
        Ok(count > 0)
    }

    // ── Completion events ───────────────────────────────────────────

    async fn has_completion(&self, handle: &str, event_key: &str) -> Result<bool, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        completion_exists(self.conn(), handle, event_key).await
    }

    async fn apply_completion(
        &self,
        handle: &str,
        event_key: &str,
        kind: CompletionKind,
        merge: &ProfileMerge<'_>,
    ) -> Result<CompletionWrite, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| DatabaseError::Query(format!("apply_completion begin: {e}")))?;

        let outcome = apply_in_tx(&tx, handle, event_key, kind, merge).await;
        finish(tx, "apply_completion", outcome).await
    }

    async fn attach_card_if_absent(
        &self,
        handle: &str,
        card: &IssuedCard,
    ) -> Result<Option<IssuedCard>, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let json =
            serde_json::to_string(card).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "UPDATE profiles SET card = ?2, updated_at = ?3
                 WHERE handle = ?1 AND card IS NULL AND funding_completed = 1",
                params![handle, json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("attach_card_if_absent: {e}")))?;

        Ok(query_profile(self.conn(), handle).await?.and_then(|p| p.card))
    }

    async fn attach_collection_account_if_absent(
        &self,
        handle: &str,
        account: &CollectionAccount,
    ) -> Result<Option<CollectionAccount>, DatabaseError> {
        let _guard = self.conn_lock.lock().await;
        let json = serde_json::to_string(account)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "UPDATE profiles SET collection_account = ?2, updated_at = ?3
                 WHERE handle = ?1 AND collection_account IS NULL",
                params![handle, json, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| {
                DatabaseError::Query(format!("attach_collection_account_if_absent: {e}"))
            })?;

        Ok(query_profile(self.conn(), handle)
            .await?
            .and_then(|p| p.collection_account))
    }
}
