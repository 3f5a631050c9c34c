//! SQLite-backed implementation of C2's durable store, grounded in the teacher's
//! `sqlite_brongnal.rs`: the same `PRAGMA` set, the same "atomic claim via a single
//! `UPDATE ... WHERE rowid = (SELECT ...) RETURNING`" shape as the teacher's
//! `pop_one_time_key`, generalized from one `pre_key` table to the full key-directory
//! schema in spec §6's persisted-state layout. Every public method runs its SQL on the
//! connection's dedicated thread via [`tokio_rusqlite::Connection::call`].

use crate::config::SigningAlgorithm;
use crate::error::{DirectoryError, Result};
use crate::model::*;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

fn unix(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn key_status_str(s: KeyStatus) -> &'static str {
    match s {
        KeyStatus::Active => "active",
        KeyStatus::Rotated => "rotated",
        KeyStatus::Revoked => "revoked",
    }
}

fn parse_key_status(s: &str) -> KeyStatus {
    match s {
        "rotated" => KeyStatus::Rotated,
        "revoked" => KeyStatus::Revoked,
        _ => KeyStatus::Active,
    }
}

fn spk_status_str(s: SignedPreKeyStatus) -> &'static str {
    match s {
        SignedPreKeyStatus::Active => "active",
        SignedPreKeyStatus::Rotated => "rotated",
        SignedPreKeyStatus::Expired => "expired",
    }
}

fn parse_spk_status(s: &str) -> SignedPreKeyStatus {
    match s {
        "rotated" => SignedPreKeyStatus::Rotated,
        "expired" => SignedPreKeyStatus::Expired,
        _ => SignedPreKeyStatus::Active,
    }
}

fn parse_prekey_status(s: &str) -> PreKeyStatus {
    match s {
        "used" => PreKeyStatus::Used,
        "expired" => PreKeyStatus::Expired,
        _ => PreKeyStatus::Available,
    }
}

fn update_type_str(t: KeyUpdateType) -> &'static str {
    match t {
        KeyUpdateType::Added => "added",
        KeyUpdateType::Updated => "updated",
        KeyUpdateType::Revoked => "revoked",
    }
}

fn parse_update_type(s: &str) -> KeyUpdateType {
    match s {
        "updated" => KeyUpdateType::Updated,
        "revoked" => KeyUpdateType::Revoked,
        _ => KeyUpdateType::Added,
    }
}

/// Inverse of `gossamer::prefix` at full depth: a 256-character `'0'`/`'1'` string
/// back into the 32 raw path bytes it was derived from.
fn bits_to_path(bits: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, c) in bits.chars().enumerate().take(256) {
        if c == '1' {
            out[i / 8] |= 1 << (7 - (i % 8));
        }
    }
    out
}

fn fp32(blob: Vec<u8>) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = blob.len().min(32);
    out[..n].copy_from_slice(&blob[..n]);
    out
}

fn algo_str(a: SigningAlgorithm) -> &'static str {
    match a {
        SigningAlgorithm::Ed25519 => "ed25519",
        SigningAlgorithm::P256 => "p256",
    }
}

fn parse_algo(s: &str) -> SigningAlgorithm {
    match s {
        "p256" => SigningAlgorithm::P256,
        _ => SigningAlgorithm::Ed25519,
    }
}

impl SqliteStore {
    pub async fn new(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "normal")?;
            conn.pragma_update(None, "foreign_keys", "on")?;

            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS identity_keys (
                    user_id TEXT NOT NULL,
                    public_key BLOB NOT NULL,
                    fingerprint BLOB NOT NULL,
                    version INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    rotated_at INTEGER,
                    PRIMARY KEY (user_id, version)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_identity_keys_active
                    ON identity_keys(user_id) WHERE status = 'active';

                CREATE TABLE IF NOT EXISTS signed_prekeys (
                    user_id TEXT NOT NULL,
                    key_id INTEGER NOT NULL,
                    pq_public_key BLOB NOT NULL,
                    ec_public_key BLOB,
                    signature BLOB NOT NULL,
                    fingerprint BLOB NOT NULL,
                    hybrid_version INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    PRIMARY KEY (user_id, key_id)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_signed_prekeys_active
                    ON signed_prekeys(user_id) WHERE status = 'active';

                CREATE TABLE IF NOT EXISTS one_time_prekeys (
                    user_id TEXT NOT NULL,
                    key_id INTEGER NOT NULL,
                    pq_public_key BLOB NOT NULL,
                    ec_public_key BLOB,
                    hybrid_version INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    used_by TEXT,
                    used_at INTEGER,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    PRIMARY KEY (user_id, key_id)
                );

                CREATE TABLE IF NOT EXISTS sealed_sender_keys (
                    user_id TEXT NOT NULL,
                    public_key BLOB NOT NULL,
                    fingerprint BLOB NOT NULL,
                    version INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    PRIMARY KEY (user_id, version)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_sealed_sender_keys_active
                    ON sealed_sender_keys(user_id) WHERE status = 'active';

                CREATE TABLE IF NOT EXISTS delivery_verifiers (
                    user_id TEXT PRIMARY KEY,
                    verifier BLOB NOT NULL
                );

                CREATE TABLE IF NOT EXISTS key_bundles (
                    user_id TEXT PRIMARY KEY,
                    bundle_version INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS key_rotation_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    key_kind TEXT NOT NULL,
                    old_fingerprint BLOB,
                    new_fingerprint BLOB NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sealed_envelopes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipient_id TEXT NOT NULL,
                    kem_ciphertext BLOB NOT NULL,
                    nonce BLOB NOT NULL,
                    encrypted_content BLOB NOT NULL,
                    timestamp_bucket INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sealed_sender_attempts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipient_id TEXT NOT NULL,
                    token_hash BLOB NOT NULL,
                    valid INTEGER,
                    ip TEXT,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sealed_message_keys (
                    message_id TEXT NOT NULL,
                    recipient_id TEXT NOT NULL,
                    sealed_content_key BLOB NOT NULL,
                    PRIMARY KEY (message_id, recipient_id)
                );

                CREATE TABLE IF NOT EXISTS merkle_nodes (
                    epoch INTEGER NOT NULL,
                    depth INTEGER NOT NULL,
                    path_prefix TEXT NOT NULL,
                    node_hash BLOB NOT NULL,
                    is_leaf INTEGER NOT NULL,
                    leaf_data BLOB,
                    PRIMARY KEY (epoch, depth, path_prefix)
                );

                CREATE TABLE IF NOT EXISTS transparency_epochs (
                    epoch_number INTEGER PRIMARY KEY,
                    root_hash BLOB NOT NULL,
                    tree_size INTEGER NOT NULL,
                    signature BLOB NOT NULL,
                    signing_key_fingerprint BLOB NOT NULL,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS key_directory_entries (
                    user_id TEXT PRIMARY KEY,
                    user_id_hash BLOB NOT NULL,
                    identity_fp BLOB NOT NULL,
                    signed_prekey_fp BLOB,
                    version INTEGER NOT NULL,
                    leaf_hash BLOB NOT NULL
                );

                CREATE TABLE IF NOT EXISTS transparency_pending_updates (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    update_type TEXT NOT NULL,
                    identity_fp BLOB NOT NULL,
                    signed_prekey_fp BLOB,
                    version INTEGER NOT NULL,
                    processed INTEGER NOT NULL DEFAULT 0,
                    processed_epoch INTEGER
                );

                CREATE TABLE IF NOT EXISTS transparency_audit_log (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    epoch INTEGER NOT NULL,
                    change_type TEXT NOT NULL,
                    user_id_commitment BLOB NOT NULL,
                    old_leaf_hash BLOB,
                    new_leaf_hash BLOB,
                    created_at INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS transparency_signing_keys (
                    fingerprint BLOB PRIMARY KEY,
                    public_key BLOB NOT NULL,
                    algorithm TEXT NOT NULL,
                    valid_from INTEGER NOT NULL,
                    valid_until INTEGER,
                    status TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS client_transparency_state (
                    user_id TEXT NOT NULL,
                    device_id TEXT NOT NULL,
                    epoch_number INTEGER NOT NULL,
                    root_hash BLOB NOT NULL,
                    PRIMARY KEY (user_id, device_id)
                );
                ",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(conn).await
    }

    // ---- identity keys (spec §4.2 store_identity_key) ----

    pub async fn store_identity_key(&self, user: UserId, public_key: Vec<u8>, fingerprint: [u8; 32]) -> Result<IdentityKey> {
        let now = Utc::now();
        let created_at = unix(now);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let prior_fp: Option<Vec<u8>> = tx
                    .query_row(
                        "SELECT fingerprint FROM identity_keys WHERE user_id = ?1 AND status = 'active'",
                        params![user.to_string()],
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.execute(
                    "UPDATE identity_keys SET status = 'rotated', rotated_at = ?2 WHERE user_id = ?1 AND status = 'active'",
                    params![user.to_string(), created_at],
                )?;
                let version: i64 = tx
                    .query_row(
                        "SELECT COALESCE(MAX(version), 0) + 1 FROM identity_keys WHERE user_id = ?1",
                        params![user.to_string()],
                        |row| row.get(0),
                    )?;
                tx.execute(
                    "INSERT INTO identity_keys (user_id, public_key, fingerprint, version, status, created_at, rotated_at)
                     VALUES (?1, ?2, ?3, ?4, 'active', ?5, NULL)",
                    params![user.to_string(), public_key, fingerprint.to_vec(), version, created_at],
                )?;
                tx.execute(
                    "INSERT INTO key_rotation_log (user_id, key_kind, old_fingerprint, new_fingerprint, created_at)
                     VALUES (?1, 'identity', ?2, ?3, ?4)",
                    params![user.to_string(), prior_fp, fingerprint.to_vec(), created_at],
                )?;
                tx.commit()?;
                Ok(IdentityKey {
                    user_id: user,
                    public_key,
                    fingerprint,
                    version,
                    status: KeyStatus::Active,
                    created_at: now,
                    rotated_at: None,
                })
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_identity_key(&self, user: UserId) -> Result<Option<IdentityKey>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT public_key, fingerprint, version, status, created_at, rotated_at
                     FROM identity_keys WHERE user_id = ?1 AND status = 'active'",
                    params![user.to_string()],
                    |row| Ok(row_to_identity_key(user, row)),
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- signed prekeys (spec §4.2 store_signed_prekey) ----

    #[allow(clippy::too_many_arguments)]
    pub async fn store_signed_prekey(
        &self,
        user: UserId,
        key_id: i64,
        pq_public_key: Vec<u8>,
        ec_public_key: Option<Vec<u8>>,
        signature: Vec<u8>,
        fingerprint: [u8; 32],
        hybrid_version: u8,
        ttl_secs: i64,
    ) -> Result<SignedPreKey> {
        let now = Utc::now();
        let created_at = unix(now);
        let expires_at = created_at + ttl_secs;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE signed_prekeys SET status = 'rotated' WHERE user_id = ?1 AND status = 'active'",
                    params![user.to_string()],
                )?;
                tx.execute(
                    "INSERT INTO signed_prekeys
                        (user_id, key_id, pq_public_key, ec_public_key, signature, fingerprint, hybrid_version, status, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?9)
                     ON CONFLICT(user_id, key_id) DO UPDATE SET
                        pq_public_key = excluded.pq_public_key,
                        ec_public_key = excluded.ec_public_key,
                        signature = excluded.signature,
                        fingerprint = excluded.fingerprint,
                        hybrid_version = excluded.hybrid_version,
                        status = 'active',
                        created_at = excluded.created_at,
                        expires_at = excluded.expires_at",
                    params![
                        user.to_string(),
                        key_id,
                        pq_public_key,
                        ec_public_key,
                        signature,
                        fingerprint.to_vec(),
                        hybrid_version,
                        created_at,
                        expires_at
                    ],
                )?;
                tx.execute(
                    "INSERT INTO key_rotation_log (user_id, key_kind, old_fingerprint, new_fingerprint, created_at)
                     VALUES (?1, 'signed_prekey', NULL, ?2, ?3)",
                    params![user.to_string(), fingerprint.to_vec(), created_at],
                )?;
                tx.commit()?;
                Ok(SignedPreKey {
                    user_id: user,
                    key_id,
                    pq_public_key,
                    ec_public_key,
                    signature,
                    fingerprint,
                    hybrid_version,
                    status: SignedPreKeyStatus::Active,
                    created_at: now,
                    expires_at: from_unix(expires_at),
                })
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_signed_prekey(&self, user: UserId) -> Result<Option<SignedPreKey>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT key_id, pq_public_key, ec_public_key, signature, fingerprint, hybrid_version, status, created_at, expires_at
                     FROM signed_prekeys WHERE user_id = ?1 AND status = 'active'",
                    params![user.to_string()],
                    |row| Ok(row_to_signed_prekey(user, row)),
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- one-time prekeys (spec §4.2 store_one_time_prekeys, §4.3 claim) ----

    pub async fn store_one_time_prekeys(
        &self,
        user: UserId,
        entries: Vec<(i64, Vec<u8>, Option<Vec<u8>>, u8)>,
        ttl_secs: i64,
    ) -> Result<usize> {
        let created_at = unix(Utc::now());
        let expires_at = created_at + ttl_secs;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0usize;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO one_time_prekeys
                            (user_id, key_id, pq_public_key, ec_public_key, hybrid_version, status, created_at, expires_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, 'available', ?6, ?7)
                         ON CONFLICT(user_id, key_id) DO NOTHING",
                    )?;
                    for (key_id, pq, ec, hybrid_version) in &entries {
                        let changed = stmt.execute(params![
                            user.to_string(),
                            key_id,
                            pq,
                            ec,
                            hybrid_version,
                            created_at,
                            expires_at
                        ])?;
                        inserted += changed;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
            .map_err(DirectoryError::from)
    }

    /// Atomically claim the oldest available, unexpired one-time prekey for `target`.
    /// Single-statement `UPDATE ... WHERE rowid = (SELECT ...) RETURNING`, the same
    /// shape as the teacher's `pop_one_time_key` DELETE — no SELECT-then-UPDATE race.
    pub async fn claim_one_time_prekey(&self, target: UserId, requester: UserId) -> Result<Option<OneTimePreKey>> {
        let now = Utc::now();
        let now_secs = unix(now);
        self.conn
            .call(move |conn| {
                let result = conn.query_row(
                    "UPDATE one_time_prekeys
                     SET status = 'used', used_by = ?1, used_at = ?2
                     WHERE rowid = (
                        SELECT rowid FROM one_time_prekeys
                        WHERE user_id = ?3 AND status = 'available' AND expires_at > ?2
                        ORDER BY created_at ASC LIMIT 1
                     )
                     RETURNING key_id, pq_public_key, ec_public_key, hybrid_version, created_at, expires_at",
                    params![requester.to_string(), now_secs, target.to_string()],
                    |row| {
                        Ok(OneTimePreKey {
                            user_id: target,
                            key_id: row.get(0)?,
                            pq_public_key: row.get(1)?,
                            ec_public_key: row.get(2)?,
                            hybrid_version: row.get::<_, i64>(3)? as u8,
                            status: PreKeyStatus::Used,
                            used_by: Some(requester),
                            used_at: Some(now),
                            created_at: from_unix(row.get(4)?),
                            expires_at: from_unix(row.get(5)?),
                        })
                    },
                );
                match result {
                    Ok(otk) => Ok(Some(otk)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn count_available_one_time_prekeys(&self, user: UserId) -> Result<u64> {
        let now_secs = unix(Utc::now());
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM one_time_prekeys WHERE user_id = ?1 AND status = 'available' AND expires_at > ?2",
                    params![user.to_string(), now_secs],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- sealed sender keys & delivery verifier ----

    pub async fn store_sealed_sender_key(&self, user: UserId, public_key: Vec<u8>, fingerprint: [u8; 32], ttl_secs: i64) -> Result<SealedSenderKey> {
        let now = Utc::now();
        let created_at = unix(now);
        let expires_at = created_at + ttl_secs;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE sealed_sender_keys SET status = 'rotated' WHERE user_id = ?1 AND status = 'active'",
                    params![user.to_string()],
                )?;
                let version: i64 = tx.query_row(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM sealed_sender_keys WHERE user_id = ?1",
                    params![user.to_string()],
                    |row| row.get(0),
                )?;
                tx.execute(
                    "INSERT INTO sealed_sender_keys (user_id, public_key, fingerprint, version, status, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, 'active', ?5, ?6)",
                    params![user.to_string(), public_key, fingerprint.to_vec(), version, created_at, expires_at],
                )?;
                tx.commit()?;
                Ok(SealedSenderKey {
                    user_id: user,
                    public_key,
                    fingerprint,
                    version,
                    status: KeyStatus::Active,
                    created_at: now,
                    expires_at: from_unix(expires_at),
                })
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_sealed_sender_key(&self, user: UserId) -> Result<Option<SealedSenderKey>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT public_key, fingerprint, version, status, created_at, expires_at
                     FROM sealed_sender_keys WHERE user_id = ?1 AND status = 'active'",
                    params![user.to_string()],
                    |row| {
                        Ok(SealedSenderKey {
                            user_id: user,
                            public_key: row.get(0)?,
                            fingerprint: fp32(row.get(1)?),
                            version: row.get(2)?,
                            status: parse_key_status(&row.get::<_, String>(3)?),
                            created_at: from_unix(row.get(4)?),
                            expires_at: from_unix(row.get(5)?),
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    /// First call materializes 32 random bytes (per spec §4.3 step 5); subsequent calls
    /// return the stored value unchanged.
    pub async fn get_or_create_delivery_verifier(&self, user: UserId, fresh: [u8; 32]) -> Result<[u8; 32]> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO delivery_verifiers (user_id, verifier) VALUES (?1, ?2)
                     ON CONFLICT(user_id) DO NOTHING",
                    params![user.to_string(), fresh.to_vec()],
                )?;
                let v: Vec<u8> = conn.query_row(
                    "SELECT verifier FROM delivery_verifiers WHERE user_id = ?1",
                    params![user.to_string()],
                    |row| row.get(0),
                )?;
                Ok(fp32(v))
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_cached_bundle_version(&self, user: UserId) -> Result<Option<u8>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT bundle_version FROM key_bundles WHERE user_id = ?1",
                    params![user.to_string()],
                    |row| row.get::<_, i64>(0).map(|v| v as u8),
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn set_cached_bundle_version(&self, user: UserId, version: u8) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO key_bundles (user_id, bundle_version) VALUES (?1, ?2)
                     ON CONFLICT(user_id) DO UPDATE SET bundle_version = excluded.bundle_version",
                    params![user.to_string(), version],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- rotation log readback ----

    pub async fn get_rotation_history(&self, user: UserId) -> Result<Vec<RotationLogEntry>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, key_kind, old_fingerprint, new_fingerprint, created_at
                     FROM key_rotation_log WHERE user_id = ?1 ORDER BY created_at ASC",
                )?;
                let rows = stmt.query_map(params![user.to_string()], |row| {
                    Ok(RotationLogEntry {
                        user_id: user,
                        key_kind: row.get(1)?,
                        old_fingerprint: row.get::<_, Option<Vec<u8>>>(2)?.map(fp32),
                        new_fingerprint: fp32(row.get(3)?),
                        created_at: from_unix(row.get(4)?),
                    })
                })?;
                rows.collect()
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- pending key updates (C7) ----

    pub async fn append_pending_key_update(
        &self,
        user: UserId,
        update_type: KeyUpdateType,
        identity_fp: [u8; 32],
        signed_prekey_fp: Option<[u8; 32]>,
        version: i64,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO transparency_pending_updates
                        (user_id, update_type, identity_fp, signed_prekey_fp, version, processed, processed_epoch)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)",
                    params![
                        user.to_string(),
                        update_type_str(update_type),
                        identity_fp.to_vec(),
                        signed_prekey_fp.map(|f| f.to_vec()),
                        version
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn fetch_unprocessed_pending_updates(&self) -> Result<Vec<PendingKeyUpdate>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_id, update_type, identity_fp, signed_prekey_fp, version, processed, processed_epoch
                     FROM transparency_pending_updates WHERE processed = 0 ORDER BY id ASC",
                )?;
                let rows = stmt.query_map([], |row| Ok(row_to_pending_update(row)))?;
                rows.collect()
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn mark_pending_updates_processed(&self, ids: Vec<i64>, epoch: u64) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt =
                        tx.prepare("UPDATE transparency_pending_updates SET processed = 1, processed_epoch = ?2 WHERE id = ?1")?;
                    for id in &ids {
                        stmt.execute(params![id, epoch as i64])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- key directory entries / merkle tree (C6) ----

    pub async fn upsert_key_directory_entry(&self, entry: KeyDirectoryEntry) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO key_directory_entries (user_id, user_id_hash, identity_fp, signed_prekey_fp, version, leaf_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(user_id) DO UPDATE SET
                        user_id_hash = excluded.user_id_hash,
                        identity_fp = excluded.identity_fp,
                        signed_prekey_fp = excluded.signed_prekey_fp,
                        version = excluded.version,
                        leaf_hash = excluded.leaf_hash",
                    params![
                        entry.user_id.to_string(),
                        entry.user_id_hash.to_vec(),
                        entry.identity_fp.to_vec(),
                        entry.signed_prekey_fp.map(|f| f.to_vec()),
                        entry.version,
                        entry.leaf_hash.to_vec()
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_key_directory_entry(&self, user: UserId) -> Result<Option<KeyDirectoryEntry>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT user_id_hash, identity_fp, signed_prekey_fp, version, leaf_hash
                     FROM key_directory_entries WHERE user_id = ?1",
                    params![user.to_string()],
                    |row| {
                        Ok(KeyDirectoryEntry {
                            user_id: user,
                            user_id_hash: fp32(row.get(0)?),
                            identity_fp: fp32(row.get(1)?),
                            signed_prekey_fp: row.get::<_, Option<Vec<u8>>>(2)?.map(fp32),
                            version: row.get(3)?,
                            leaf_hash: fp32(row.get(4)?),
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_merkle_node(&self, epoch: u64, depth: u16, path_prefix: String) -> Result<Option<[u8; 32]>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT node_hash FROM merkle_nodes WHERE epoch = ?1 AND depth = ?2 AND path_prefix = ?3",
                    params![epoch as i64, depth as i64, path_prefix],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()
                .map(|opt| opt.map(fp32))
            })
            .await
            .map_err(DirectoryError::from)
    }

    /// The node hash for `(depth, path_prefix)` as of `epoch`: the most recent write at
    /// or before `epoch`, since untouched subtrees carry their value forward implicitly
    /// rather than being rewritten every epoch. Falls back to the caller-supplied
    /// canonical empty-subtree hash if the prefix has never been written.
    pub async fn get_merkle_node_as_of(&self, epoch: u64, depth: u16, path_prefix: String) -> Result<Option<[u8; 32]>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT node_hash FROM merkle_nodes
                     WHERE depth = ?1 AND path_prefix = ?2 AND epoch <= ?3
                     ORDER BY epoch DESC LIMIT 1",
                    params![depth as i64, path_prefix, epoch as i64],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()
                .map(|opt| opt.map(fp32))
            })
            .await
            .map_err(DirectoryError::from)
    }

    /// The distinct leaf paths (full 256-bit depth) written anywhere in `[from_epoch,
    /// to_epoch]` — the leaves a consistency proof between two epochs must account for.
    pub async fn leaf_paths_touched_in_range(&self, from_epoch: u64, to_epoch: u64) -> Result<Vec<[u8; 32]>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT path_prefix FROM merkle_nodes
                     WHERE depth = 256 AND epoch BETWEEN ?1 AND ?2",
                )?;
                let rows = stmt.query_map(params![from_epoch as i64, to_epoch as i64], |row| row.get::<_, String>(0))?;
                let mut out = Vec::new();
                for bits in rows {
                    out.push(bits_to_path(&bits?));
                }
                Ok(out)
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn put_merkle_node(&self, epoch: u64, depth: u16, path_prefix: String, node_hash: [u8; 32], is_leaf: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO merkle_nodes (epoch, depth, path_prefix, node_hash, is_leaf, leaf_data)
                     VALUES (?1, ?2, ?3, ?4, ?5, NULL)
                     ON CONFLICT(epoch, depth, path_prefix) DO UPDATE SET node_hash = excluded.node_hash",
                    params![epoch as i64, depth as i64, path_prefix, node_hash.to_vec(), is_leaf as i64],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn insert_transparency_epoch(&self, epoch: TransparencyEpoch) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO transparency_epochs (epoch_number, root_hash, tree_size, signature, signing_key_fingerprint, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        epoch.epoch_number as i64,
                        epoch.root_hash.to_vec(),
                        epoch.tree_size as i64,
                        epoch.signature,
                        epoch.signing_key_fingerprint.to_vec(),
                        unix(epoch.created_at)
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_epoch(&self, epoch_number: u64) -> Result<Option<TransparencyEpoch>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT root_hash, tree_size, signature, signing_key_fingerprint, created_at
                     FROM transparency_epochs WHERE epoch_number = ?1",
                    params![epoch_number as i64],
                    |row| Ok(row_to_epoch(epoch_number, row)),
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_latest_epoch(&self) -> Result<Option<TransparencyEpoch>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT epoch_number, root_hash, tree_size, signature, signing_key_fingerprint, created_at
                     FROM transparency_epochs ORDER BY epoch_number DESC LIMIT 1",
                    [],
                    |row| {
                        Ok(TransparencyEpoch {
                            epoch_number: row.get::<_, i64>(0)? as u64,
                            root_hash: fp32(row.get(1)?),
                            tree_size: row.get::<_, i64>(2)? as u64,
                            signature: row.get(3)?,
                            signing_key_fingerprint: fp32(row.get(4)?),
                            created_at: from_unix(row.get(5)?),
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn append_audit_log_entry(&self, entry: AuditLogEntry) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO transparency_audit_log (epoch, change_type, user_id_commitment, old_leaf_hash, new_leaf_hash, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.epoch as i64,
                        update_type_str(entry.change_type),
                        entry.user_id_commitment.to_vec(),
                        entry.old_leaf_hash.map(|h| h.to_vec()),
                        entry.new_leaf_hash.map(|h| h.to_vec()),
                        unix(entry.created_at)
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_audit_log(&self, from_epoch: u64, to_epoch: u64) -> Result<Vec<AuditLogEntry>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT epoch, change_type, user_id_commitment, old_leaf_hash, new_leaf_hash, created_at
                     FROM transparency_audit_log WHERE epoch BETWEEN ?1 AND ?2 ORDER BY epoch ASC, id ASC",
                )?;
                let rows = stmt.query_map(params![from_epoch as i64, to_epoch as i64], |row| {
                    Ok(AuditLogEntry {
                        epoch: row.get::<_, i64>(0)? as u64,
                        change_type: parse_update_type(&row.get::<_, String>(1)?),
                        user_id_commitment: fp32(row.get(2)?),
                        old_leaf_hash: row.get::<_, Option<Vec<u8>>>(3)?.map(fp32),
                        new_leaf_hash: row.get::<_, Option<Vec<u8>>>(4)?.map(fp32),
                        created_at: from_unix(row.get(5)?),
                    })
                })?;
                rows.collect()
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- transparency signing keys ----

    pub async fn insert_signing_key(&self, key: TransparencySigningKey) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO transparency_signing_keys (fingerprint, public_key, algorithm, valid_from, valid_until, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        key.fingerprint.to_vec(),
                        key.public_key,
                        algo_str(key.algorithm),
                        unix(key.valid_from),
                        key.valid_until.map(unix),
                        key_status_str(key.status)
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_signing_keys(&self) -> Result<Vec<TransparencySigningKey>> {
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT fingerprint, public_key, algorithm, valid_from, valid_until, status
                     FROM transparency_signing_keys WHERE status != 'revoked' ORDER BY valid_from ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok(TransparencySigningKey {
                        fingerprint: fp32(row.get(0)?),
                        public_key: row.get(1)?,
                        algorithm: parse_algo(&row.get::<_, String>(2)?),
                        valid_from: from_unix(row.get(3)?),
                        valid_until: row.get::<_, Option<i64>>(4)?.map(from_unix),
                        status: parse_key_status(&row.get::<_, String>(5)?),
                    })
                })?;
                rows.collect()
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- client transparency monitoring state ----

    pub async fn record_client_checkpoint(&self, checkpoint: ClientTransparencyCheckpoint) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO client_transparency_state (user_id, device_id, epoch_number, root_hash)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(user_id, device_id) DO UPDATE SET epoch_number = excluded.epoch_number, root_hash = excluded.root_hash",
                    params![
                        checkpoint.user_id.to_string(),
                        checkpoint.device_id,
                        checkpoint.epoch_number as i64,
                        checkpoint.root_hash.to_vec()
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_client_checkpoint(&self, user: UserId, device_id: String) -> Result<Option<ClientTransparencyCheckpoint>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT epoch_number, root_hash FROM client_transparency_state WHERE user_id = ?1 AND device_id = ?2",
                    params![user.to_string(), device_id.clone()],
                    |row| {
                        Ok(ClientTransparencyCheckpoint {
                            user_id: user,
                            device_id: device_id.clone(),
                            epoch_number: row.get::<_, i64>(0)? as u64,
                            root_hash: fp32(row.get(1)?),
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- sealed-sender envelopes & rate limiting (C4) ----

    pub async fn store_sealed_envelope(&self, envelope: StoredSealedEnvelope) -> Result<()> {
        let created_at = unix(Utc::now());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sealed_envelopes (recipient_id, kem_ciphertext, nonce, encrypted_content, timestamp_bucket, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        envelope.recipient_id.to_string(),
                        envelope.kem_ciphertext,
                        envelope.nonce.to_vec(),
                        envelope.encrypted_content,
                        envelope.timestamp_bucket as i64,
                        created_at
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    /// Appends an attempt and opportunistically prunes rows older than 7 days, per spec §4.4.
    pub async fn record_delivery_attempt(&self, attempt: DeliveryAttempt) -> Result<()> {
        let now_secs = unix(Utc::now());
        const SEVEN_DAYS_SECS: i64 = 7 * 24 * 3600;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO sealed_sender_attempts (recipient_id, token_hash, valid, ip, created_at)
                     VALUES (?1, ?2, ?3, NULL, ?4)",
                    params![
                        attempt.recipient_id.to_string(),
                        attempt.token_hash.to_vec(),
                        attempt.valid.map(|v| v as i64),
                        now_secs
                    ],
                )?;
                tx.execute(
                    "DELETE FROM sealed_sender_attempts WHERE created_at < ?1",
                    params![now_secs - SEVEN_DAYS_SECS],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn count_invalid_attempts_last_hour(&self, recipient: UserId) -> Result<u64> {
        let now_secs = unix(Utc::now());
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sealed_sender_attempts
                     WHERE recipient_id = ?1 AND valid = 0 AND created_at > ?2",
                    params![recipient.to_string(), now_secs - 3600],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(DirectoryError::from)
    }

    // ---- group fanout sealed message keys ----

    pub async fn store_sealed_message_key(&self, message_id: String, recipient: UserId, sealed_content_key: Vec<u8>) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO sealed_message_keys (message_id, recipient_id, sealed_content_key) VALUES (?1, ?2, ?3)
                     ON CONFLICT(message_id, recipient_id) DO UPDATE SET sealed_content_key = excluded.sealed_content_key",
                    params![message_id, recipient.to_string(), sealed_content_key],
                )?;
                Ok(())
            })
            .await
            .map_err(DirectoryError::from)
    }

    pub async fn get_sealed_message_key(&self, message_id: String, recipient: UserId) -> Result<Option<Vec<u8>>> {
        self.conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT sealed_content_key FROM sealed_message_keys WHERE message_id = ?1 AND recipient_id = ?2",
                    params![message_id, recipient.to_string()],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(DirectoryError::from)
    }
}

fn row_to_identity_key(user: Uuid, row: &Row) -> IdentityKey {
    IdentityKey {
        user_id: user,
        public_key: row.get(0).unwrap_or_default(),
        fingerprint: fp32(row.get(1).unwrap_or_default()),
        version: row.get(2).unwrap_or_default(),
        status: parse_key_status(&row.get::<_, String>(3).unwrap_or_default()),
        created_at: from_unix(row.get(4).unwrap_or_default()),
        rotated_at: row.get::<_, Option<i64>>(5).unwrap_or_default().map(from_unix),
    }
}

fn row_to_signed_prekey(user: Uuid, row: &Row) -> SignedPreKey {
    SignedPreKey {
        user_id: user,
        key_id: row.get(0).unwrap_or_default(),
        pq_public_key: row.get(1).unwrap_or_default(),
        ec_public_key: row.get(2).unwrap_or_default(),
        signature: row.get(3).unwrap_or_default(),
        fingerprint: fp32(row.get(4).unwrap_or_default()),
        hybrid_version: row.get::<_, i64>(5).unwrap_or_default() as u8,
        status: parse_spk_status(&row.get::<_, String>(6).unwrap_or_default()),
        created_at: from_unix(row.get(7).unwrap_or_default()),
        expires_at: from_unix(row.get(8).unwrap_or_default()),
    }
}

fn row_to_pending_update(row: &Row) -> rusqlite::Result<PendingKeyUpdate> {
    Ok(PendingKeyUpdate {
        id: row.get(0)?,
        user_id: row.get::<_, String>(1)?.parse().unwrap_or_default(),
        update_type: parse_update_type(&row.get::<_, String>(2)?),
        identity_fp: fp32(row.get(3)?),
        signed_prekey_fp: row.get::<_, Option<Vec<u8>>>(4)?.map(fp32),
        version: row.get(5)?,
        processed: row.get::<_, i64>(6)? != 0,
        processed_epoch: row.get::<_, Option<i64>>(7)?.map(|e| e as u64),
    })
}

fn row_to_epoch(epoch_number: u64, row: &Row) -> TransparencyEpoch {
    TransparencyEpoch {
        epoch_number,
        root_hash: fp32(row.get(0).unwrap_or_default()),
        tree_size: row.get::<_, i64>(1).unwrap_or_default() as u64,
        signature: row.get(2).unwrap_or_default(),
        signing_key_fingerprint: fp32(row.get(3).unwrap_or_default()),
        created_at: from_unix(row.get(4).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_get_identity_key_round_trips() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let key = store.store_identity_key(user, vec![1; 1952], [9u8; 32]).await.unwrap();
        assert_eq!(key.version, 1);
        let fetched = store.get_identity_key(user).await.unwrap().unwrap();
        assert_eq!(fetched.fingerprint, [9u8; 32]);
    }

    #[tokio::test]
    async fn rotating_identity_key_leaves_exactly_one_active_row() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        store.store_identity_key(user, vec![1; 1952], [1u8; 32]).await.unwrap();
        let second = store.store_identity_key(user, vec![2; 1952], [2u8; 32]).await.unwrap();
        assert_eq!(second.version, 2);
        let active = store.get_identity_key(user).await.unwrap().unwrap();
        assert_eq!(active.fingerprint, [2u8; 32]);
    }

    #[tokio::test]
    async fn claiming_with_empty_pool_returns_none() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let target = Uuid::new_v4();
        let requester = Uuid::new_v4();
        assert!(store.claim_one_time_prekey(target, requester).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claiming_never_dispenses_the_same_key_twice() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let target = Uuid::new_v4();
        store
            .store_one_time_prekeys(target, vec![(1, vec![0u8; 1568], None, 1)], 30 * 24 * 3600)
            .await
            .unwrap();
        let r1 = Uuid::new_v4();
        let r2 = Uuid::new_v4();
        let first = store.claim_one_time_prekey(target, r1).await.unwrap();
        assert!(first.is_some());
        let second = store.claim_one_time_prekey(target, r2).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn one_time_prekey_upload_is_idempotent_on_key_id() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let user = Uuid::new_v4();
        let inserted = store
            .store_one_time_prekeys(user, vec![(1, vec![0u8; 1568], None, 1)], 30 * 24 * 3600)
            .await
            .unwrap();
        assert_eq!(inserted, 1);
        let second = store
            .store_one_time_prekeys(user, vec![(1, vec![0u8; 1568], None, 1)], 30 * 24 * 3600)
            .await
            .unwrap();
        assert_eq!(second, 0);
        assert_eq!(store.count_available_one_time_prekeys(user).await.unwrap(), 1);
    }
}
