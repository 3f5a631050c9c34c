//! C6: the transparency log. A sparse Merkle tree over the 256-bit `SHA-256(user_id)`
//! path space, batched into signed epochs by [`crate::queue`]. Grounded in the
//! teacher's own naming for this component — its `main.rs` wires an `InMemoryGossamer`
//! behind a `GossamerServer` transport service — generalized from an append-only log
//! into a persisted key-transparency Merkle tree, since the teacher's own
//! implementation file was not part of the retrieved reference pack; the tree
//! mechanics themselves follow the standard sparse-Merkle-tree / key-transparency
//! construction (CONIKS-style canonical empty subtrees, RFC 6962-style signed tree
//! heads) described in spec §3's `TransparencyEpoch`/`KeyDirectoryEntry` types.

use crate::config::SigningAlgorithm;
use crate::error::{DirectoryError, Result};
use crate::model::*;
use crate::persistence::SqliteStore;
use chrono::Utc;
use ed25519_dalek::{Signer as _, SigningKey as EdSigningKey, Verifier as _, VerifyingKey as EdVerifyingKey};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use protocol::pqc::fingerprint::fingerprint;
use protocol::rand::fill_random;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// 256 bits of `SHA-256(user_id)`; depth 0 is the root, depth 256 is a leaf.
pub const TREE_DEPTH: usize = 256;

fn combine(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// The canonical hash of an empty subtree at each depth, computed once and shared by
/// every lookup that falls off the persisted node set. `table[256]` is the hash of an
/// absent leaf; `table[d]` for `d < 256` is `combine(table[d+1], table[d+1])`.
fn empty_hash(depth: usize) -> [u8; 32] {
    static TABLE: OnceLock<[[u8; 32]; TREE_DEPTH + 1]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [[0u8; 32]; TREE_DEPTH + 1];
        table[TREE_DEPTH] = Sha256::digest(b"gossamer-empty-leaf-v1").into();
        for d in (0..TREE_DEPTH).rev() {
            table[d] = combine(&table[d + 1], &table[d + 1]);
        }
        table
    })[depth]
}

/// The leaf's path through the tree: `SHA-256(user_id)`, read most-significant-bit first.
pub fn user_path(user_id: UserId) -> [u8; 32] {
    Sha256::digest(user_id.as_bytes()).into()
}

fn bit_at(path: &[u8; 32], depth: usize) -> bool {
    (path[depth / 8] >> (7 - (depth % 8))) & 1 == 1
}

/// The first `depth` bits of `path`, as a `'0'`/`'1'` string — the node key used
/// throughout `merkle_nodes`. Root is `""`, a leaf is 256 characters long.
fn prefix(path: &[u8; 32], depth: usize) -> String {
    (0..depth).map(|i| if bit_at(path, i) { '1' } else { '0' }).collect()
}

fn sibling_prefix(leaf_prefix: &str, depth: usize) -> String {
    let mut chars: Vec<char> = leaf_prefix.chars().take(depth).collect();
    let last = depth - 1;
    chars[last] = if chars[last] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}

/// `leaf_hash = SHA-256(user_id || identity_fp || signed_prekey_fp_or_∅ || version || ts)`
/// (spec §3's `KeyDirectoryEntry`).
pub fn compute_leaf_hash(user_id: UserId, identity_fp: [u8; 32], signed_prekey_fp: Option<[u8; 32]>, version: i64, ts_epoch_sec: i64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(identity_fp);
    if let Some(fp) = signed_prekey_fp {
        hasher.update(fp);
    }
    hasher.update(version.to_be_bytes());
    hasher.update(ts_epoch_sec.to_be_bytes());
    hasher.finalize().into()
}

enum SigningMaterial {
    Ed25519(EdSigningKey),
    P256(P256SigningKey),
}

impl SigningMaterial {
    fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            SigningMaterial::Ed25519(sk) => sk.verifying_key().to_bytes().to_vec(),
            SigningMaterial::P256(sk) => sk.verifying_key().to_sec1_bytes().to_vec(),
        }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            SigningMaterial::Ed25519(sk) => sk.sign(message).to_bytes().to_vec(),
            SigningMaterial::P256(sk) => {
                let sig: P256Signature = sk.sign(message);
                sig.to_bytes().to_vec()
            }
        }
    }
}

/// One sibling on an inclusion/consistency path, together with enough context to
/// recompute an ancestor hash without touching storage again.
#[derive(Debug, Clone)]
pub struct ConsistencyProof {
    pub from_epoch: u64,
    pub to_epoch: u64,
    pub from_root: [u8; 32],
    pub to_root: [u8; 32],
    /// Leaves that differ between `from_epoch` and `to_epoch`: `(user_id_hash, leaf hash as of from_epoch)`.
    pub touched_leaves: Vec<([u8; 32], [u8; 32])>,
    /// Sibling hashes (as of `to_epoch`) needed to recompute `from_root` from the
    /// touched leaves' old values, keyed by `(depth, prefix)`.
    pub sibling_hashes: HashMap<(usize, String), [u8; 32]>,
}

/// C6: owns the signed epoch chain and the sparse Merkle tree beneath it. Does not
/// decide *when* to cut an epoch — that's [`crate::queue`]'s job; `cut_epoch` is the
/// mechanism the worker drives.
pub struct Gossamer {
    store: Arc<SqliteStore>,
    signing: SigningMaterial,
    algorithm: SigningAlgorithm,
    signing_fingerprint: [u8; 32],
}

impl Gossamer {
    /// Generates a fresh signing keypair and registers it in `transparency_signing_keys`.
    /// A real deployment loads this from a secret store instead of generating one at
    /// startup; that's an operational concern outside this crate's persistence layer.
    pub async fn generate(store: Arc<SqliteStore>, algorithm: SigningAlgorithm) -> Result<Self> {
        let signing = match algorithm {
            SigningAlgorithm::Ed25519 => SigningMaterial::Ed25519(EdSigningKey::from_bytes(&fill_random::<32>())),
            SigningAlgorithm::P256 => {
                SigningMaterial::P256(P256SigningKey::from_slice(&fill_random::<32>()).map_err(|e| DirectoryError::SigningFailure(e.to_string()))?)
            }
        };
        let public_key = signing.public_key_bytes();
        let signing_fingerprint = fingerprint(&public_key);
        store
            .insert_signing_key(TransparencySigningKey {
                fingerprint: signing_fingerprint,
                public_key,
                algorithm,
                valid_from: Utc::now(),
                valid_until: None,
                status: KeyStatus::Active,
            })
            .await?;
        info!(fingerprint = %hex::encode(signing_fingerprint), ?algorithm, "transparency signing key generated");
        Ok(Self { store, signing, algorithm, signing_fingerprint })
    }

    /// `GetEpoch(epoch_number)` (spec §6). Epoch 0 is the all-zero genesis sentinel and
    /// is synthesized rather than read back from storage.
    pub async fn get_epoch(&self, epoch_number: u64) -> Result<TransparencyEpoch> {
        if epoch_number == 0 {
            return Ok(genesis_epoch());
        }
        self.store.get_epoch(epoch_number).await?.ok_or(DirectoryError::NoSuchEpoch(epoch_number))
    }

    /// `GetLatestEpoch` — falls back to the genesis sentinel before the first epoch cut.
    pub async fn get_latest_epoch(&self) -> Result<TransparencyEpoch> {
        Ok(self.store.get_latest_epoch().await?.unwrap_or_else(genesis_epoch))
    }

    /// `GetSigningKeys` (SPEC_FULL §SUPPLEMENTED FEATURES).
    pub async fn get_signing_keys(&self) -> Result<Vec<TransparencySigningKey>> {
        self.store.get_signing_keys().await
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// `GetAuditLog(from_epoch, to_epoch)` (SPEC_FULL §SUPPLEMENTED FEATURES).
    pub async fn get_audit_log(&self, from_epoch: u64, to_epoch: u64) -> Result<Vec<AuditLogEntry>> {
        self.store.get_audit_log(from_epoch, to_epoch).await
    }

    /// `RecordClientCheckpoint` (SPEC_FULL §SUPPLEMENTED FEATURES): a device pins the
    /// last epoch it verified, so a future `GetConsistencyProofFromCheckpoint` can prove
    /// nothing was rewritten underneath it.
    pub async fn record_client_checkpoint(&self, user: UserId, device_id: String, epoch_number: u64) -> Result<()> {
        let epoch = self.get_epoch(epoch_number).await?;
        self.store
            .record_client_checkpoint(ClientTransparencyCheckpoint { user_id: user, device_id, epoch_number, root_hash: epoch.root_hash })
            .await
    }

    /// `GetConsistencyProofFromCheckpoint(user, device_id)`: reads the device's pinned
    /// epoch and produces a proof from there to the current latest epoch.
    pub async fn get_consistency_proof_from_checkpoint(&self, user: UserId, device_id: String) -> Result<ConsistencyProof> {
        let checkpoint = self
            .store
            .get_client_checkpoint(user, device_id)
            .await?
            .ok_or(DirectoryError::NoSuchEpoch(0))?;
        let latest = self.get_latest_epoch().await?;
        self.get_consistency_proof(checkpoint.epoch_number, latest.epoch_number).await
    }

    /// `GetInclusionProof(user, epoch_number)` (spec §6). 256 sibling hashes, one per
    /// level from the leaf up to the root, each tagged with which side it sits on.
    pub async fn get_inclusion_proof(&self, user: UserId, epoch_number: u64) -> Result<InclusionProof> {
        if epoch_number == 0 {
            return Err(DirectoryError::GenesisProofRequested);
        }
        self.get_epoch(epoch_number).await?; // confirms the epoch exists before walking it
        let path = user_path(user);
        let leaf_prefix = prefix(&path, TREE_DEPTH);
        let leaf_hash = self.node_as_of(epoch_number, TREE_DEPTH, &leaf_prefix).await?;

        let mut steps = Vec::with_capacity(TREE_DEPTH);
        for depth in (1..=TREE_DEPTH).rev() {
            let sib_prefix = sibling_prefix(&leaf_prefix, depth);
            let sibling = self.node_as_of(epoch_number, depth, &sib_prefix).await?;
            let sibling_on_right = bit_at(&path, depth - 1);
            steps.push(InclusionProofStep { sibling, sibling_on_right: !sibling_on_right });
        }

        Ok(InclusionProof { leaf_hash, path: steps })
    }

    /// `GetConsistencyProof(e1, e2)` (spec §6), `e1 < e2`. Every leaf that changed in
    /// `(e1, e2]` is identified via the audit log, then each is given its `from_epoch`
    /// value plus the untouched sibling hashes along its `to_epoch` path — enough to
    /// recompute `from_root` without a second tree walk. See
    /// [`verify_consistency_proof`] for how a holder of this proof checks it offline.
    pub async fn get_consistency_proof(&self, e1: u64, e2: u64) -> Result<ConsistencyProof> {
        if e1 == 0 || e2 == 0 {
            return Err(DirectoryError::GenesisProofRequested);
        }
        if e1 >= e2 {
            return Err(DirectoryError::NoSuchEpoch(e2));
        }
        let from = self.get_epoch(e1).await?;
        let to = self.get_epoch(e2).await?;

        let mut leaves = Vec::new();
        let mut sibling_hashes = HashMap::new();
        for path in self.touched_leaf_paths(e1, e2).await? {
            let leaf_prefix = prefix(&path, TREE_DEPTH);
            let from_leaf = self.node_as_of(e1, TREE_DEPTH, &leaf_prefix).await?;
            leaves.push((path, from_leaf));
            for depth in (1..=TREE_DEPTH).rev() {
                let sib_prefix = sibling_prefix(&leaf_prefix, depth);
                let key = (depth, sib_prefix.clone());
                if sibling_hashes.contains_key(&key) {
                    continue;
                }
                let hash = self.node_as_of(e2, depth, &sib_prefix).await?;
                sibling_hashes.insert(key, hash);
            }
        }

        Ok(ConsistencyProof { from_epoch: e1, to_epoch: e2, from_root: from.root_hash, to_root: to.root_hash, touched_leaves: leaves, sibling_hashes })
    }

    /// Leaves whose `merkle_nodes` row at full depth changed somewhere in `(e1, e2]`.
    async fn touched_leaf_paths(&self, e1: u64, e2: u64) -> Result<Vec<[u8; 32]>> {
        self.store.leaf_paths_touched_in_range(e1 + 1, e2).await
    }

    async fn node_as_of(&self, epoch: u64, depth: usize, prefix: &str) -> Result<[u8; 32]> {
        Ok(self.store.get_merkle_node_as_of(epoch, depth as u16, prefix.to_string()).await?.unwrap_or_else(|| empty_hash(depth)))
    }

    /// Applies a batch of pending key updates on top of the latest committed epoch and
    /// commits a new signed epoch. Returns `None` if `updates` is empty — an epoch with
    /// no content is never cut (spec §4.6: "an empty interval produces no epoch").
    ///
    /// The whole batch commits or none of it does: `updates` are only marked processed
    /// after the new epoch row and every touched Merkle node are written, and a signing
    /// failure leaves every update in this batch pending for the next interval (spec
    /// §4.6's partial-batch prohibition).
    pub async fn cut_epoch(&self, updates: Vec<PendingKeyUpdate>) -> Result<Option<TransparencyEpoch>> {
        if updates.is_empty() {
            return Ok(None);
        }
        let prev = self.get_latest_epoch().await?;
        let new_epoch_number = prev.epoch_number + 1;
        let now = Utc::now();
        let now_secs = now.timestamp();

        // In-epoch write-through cache: two updates in the same batch that share a
        // sibling subtree must see each other's writes before either is persisted.
        let mut cache: HashMap<(usize, String), [u8; 32]> = HashMap::new();
        let mut tree_size_delta: i64 = 0;
        let mut audit_entries = Vec::with_capacity(updates.len());

        for update in &updates {
            let path = user_path(update.user_id);
            let leaf_prefix = prefix(&path, TREE_DEPTH);
            let old_leaf = self.node_as_of(prev.epoch_number, TREE_DEPTH, &leaf_prefix).await?;
            let new_leaf = compute_leaf_hash(update.user_id, update.identity_fp, update.signed_prekey_fp, update.version, now_secs);

            if old_leaf == empty_hash(TREE_DEPTH) && !matches!(update.update_type, KeyUpdateType::Revoked) {
                tree_size_delta += 1;
            }

            self.store
                .upsert_key_directory_entry(KeyDirectoryEntry {
                    user_id: update.user_id,
                    user_id_hash: path,
                    identity_fp: update.identity_fp,
                    signed_prekey_fp: update.signed_prekey_fp,
                    version: update.version,
                    leaf_hash: new_leaf,
                })
                .await?;

            cache.insert((TREE_DEPTH, leaf_prefix.clone()), new_leaf);

            let salt = fingerprint(format!("epoch-{new_epoch_number}").as_bytes());
            let mut commitment_input = update.user_id.as_bytes().to_vec();
            commitment_input.extend_from_slice(&salt);
            audit_entries.push(AuditLogEntry {
                epoch: new_epoch_number,
                change_type: update.update_type,
                user_id_commitment: fingerprint(&commitment_input),
                old_leaf_hash: Some(old_leaf),
                new_leaf_hash: Some(new_leaf),
                created_at: now,
            });
        }

        // Recompute every touched path from the leaves up, one level at a time, so
        // siblings shared between two touched leaves in this batch are only combined
        // once each is known.
        for depth in (1..TREE_DEPTH).rev() {
            let parents_to_update: Vec<String> =
                cache.keys().filter(|(d, _)| *d == depth + 1).map(|(_, p)| p[..depth].to_string()).collect();
            let mut seen_parents = std::collections::HashSet::new();
            for parent_prefix in parents_to_update {
                if !seen_parents.insert(parent_prefix.clone()) {
                    continue;
                }
                let left_prefix = format!("{parent_prefix}0");
                let right_prefix = format!("{parent_prefix}1");
                let left = match cache.get(&(depth + 1, left_prefix.clone())) {
                    Some(h) => *h,
                    None => self.node_as_of(prev.epoch_number, depth + 1, &left_prefix).await?,
                };
                let right = match cache.get(&(depth + 1, right_prefix.clone())) {
                    Some(h) => *h,
                    None => self.node_as_of(prev.epoch_number, depth + 1, &right_prefix).await?,
                };
                cache.insert((depth, parent_prefix), combine(&left, &right));
            }
        }

        // The loop above only fills depths 1..TREE_DEPTH; the root itself is the final combine.
        let left = match cache.get(&(1, "0".to_string())) {
            Some(h) => *h,
            None => self.node_as_of(prev.epoch_number, 1, "0").await?,
        };
        let right = match cache.get(&(1, "1".to_string())) {
            Some(h) => *h,
            None => self.node_as_of(prev.epoch_number, 1, "1").await?,
        };
        let root_hash = combine(&left, &right);

        let new_tree_size = (prev.tree_size as i64 + tree_size_delta).max(0) as u64;
        let signature_message = signed_message(new_epoch_number, &root_hash, new_tree_size, now_secs);
        let signature = self.signing.sign(&signature_message);

        let epoch = TransparencyEpoch {
            epoch_number: new_epoch_number,
            root_hash,
            tree_size: new_tree_size,
            signature,
            signing_key_fingerprint: self.signing_fingerprint,
            created_at: now,
        };

        for ((depth, node_prefix), hash) in &cache {
            self.store.put_merkle_node(new_epoch_number, *depth as u16, node_prefix.clone(), *hash, *depth == TREE_DEPTH).await?;
        }
        self.store.insert_transparency_epoch(epoch.clone()).await?;
        for entry in audit_entries {
            self.store.append_audit_log_entry(entry).await?;
        }
        self.store.mark_pending_updates_processed(updates.iter().map(|u| u.id).collect(), new_epoch_number).await?;

        info!(epoch = new_epoch_number, tree_size = new_tree_size, updates = updates.len(), "epoch cut");
        Ok(Some(epoch))
    }
}

fn signed_message(epoch_number: u64, root_hash: &[u8; 32], tree_size: u64, created_at_sec: i64) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + 32 + 8 + 8);
    msg.extend_from_slice(&epoch_number.to_be_bytes());
    msg.extend_from_slice(root_hash);
    msg.extend_from_slice(&tree_size.to_be_bytes());
    msg.extend_from_slice(&created_at_sec.to_be_bytes());
    msg
}

fn genesis_epoch() -> TransparencyEpoch {
    TransparencyEpoch {
        epoch_number: 0,
        root_hash: [0u8; 32],
        tree_size: 0,
        signature: Vec::new(),
        signing_key_fingerprint: [0u8; 32],
        created_at: chrono::DateTime::<Utc>::UNIX_EPOCH,
    }
}

/// Verifies an Ed25519/P-256 signed tree head over `epoch_number || root_hash || tree_size || created_at_sec`.
pub fn verify_epoch_signature(epoch: &TransparencyEpoch, signing_key: &TransparencySigningKey) -> Result<bool> {
    let message = signed_message(epoch.epoch_number, &epoch.root_hash, epoch.tree_size, epoch.created_at.timestamp());
    match signing_key.algorithm {
        SigningAlgorithm::Ed25519 => {
            let key_bytes: [u8; 32] =
                signing_key.public_key.clone().try_into().map_err(|_| DirectoryError::SigningFailure("bad ed25519 key length".into()))?;
            let vk = EdVerifyingKey::from_bytes(&key_bytes).map_err(|e| DirectoryError::SigningFailure(e.to_string()))?;
            let sig_bytes: [u8; 64] =
                epoch.signature.clone().try_into().map_err(|_| DirectoryError::SigningFailure("bad ed25519 signature length".into()))?;
            Ok(vk.verify(&message, &ed25519_dalek::Signature::from_bytes(&sig_bytes)).is_ok())
        }
        SigningAlgorithm::P256 => {
            let vk = P256VerifyingKey::from_sec1_bytes(&signing_key.public_key).map_err(|e| DirectoryError::SigningFailure(e.to_string()))?;
            let sig =
                P256Signature::try_from(epoch.signature.as_slice()).map_err(|e| DirectoryError::SigningFailure(e.to_string()))?;
            Ok(vk.verify(&message, &sig).is_ok())
        }
    }
}

/// Offline verification of a [`ConsistencyProof`]: recomputes `from_root` from the
/// touched leaves' old values plus the embedded sibling hashes, and checks it matches.
/// Client-side proof verification otherwise lives outside this crate (boundary
/// adapters/client ratchet are spec'd as documented-only); this helper exists because
/// an operator or test still needs to check a proof this crate just generated.
pub fn verify_consistency_proof(proof: &ConsistencyProof) -> bool {
    let mut frontier: HashMap<(usize, String), [u8; 32]> = HashMap::new();
    for (path, leaf_hash) in &proof.touched_leaves {
        frontier.insert((TREE_DEPTH, prefix(path, TREE_DEPTH)), *leaf_hash);
    }
    if frontier.is_empty() {
        return proof.from_root == proof.to_root;
    }

    for depth in (1..=TREE_DEPTH).rev() {
        let parents: Vec<String> =
            frontier.keys().filter(|(d, _)| *d == depth).map(|(_, p)| p[..depth - 1].to_string()).collect();
        let mut done = std::collections::HashSet::new();
        let mut next = HashMap::new();
        for parent_prefix in parents {
            if !done.insert(parent_prefix.clone()) {
                continue;
            }
            let left_prefix = format!("{parent_prefix}0");
            let right_prefix = format!("{parent_prefix}1");
            let left = frontier
                .get(&(depth, left_prefix.clone()))
                .copied()
                .or_else(|| proof.sibling_hashes.get(&(depth, left_prefix)).copied())
                .unwrap_or_else(|| empty_hash(depth));
            let right = frontier
                .get(&(depth, right_prefix.clone()))
                .copied()
                .or_else(|| proof.sibling_hashes.get(&(depth, right_prefix)).copied())
                .unwrap_or_else(|| empty_hash(depth));
            next.insert((depth - 1, parent_prefix), combine(&left, &right));
        }
        // carry forward any depth-(>current) entries untouched by this level (there are none,
        // since every frontier key at `depth` is consumed into `next` above)
        frontier = next;
    }

    frontier.get(&(0, String::new())).copied() == Some(proof.from_root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteStore;

    async fn gossamer() -> Gossamer {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        Gossamer::generate(store, SigningAlgorithm::Ed25519).await.unwrap()
    }

    fn pending(id: i64, user: UserId) -> PendingKeyUpdate {
        PendingKeyUpdate {
            id,
            user_id: user,
            update_type: KeyUpdateType::Added,
            identity_fp: fingerprint(user.as_bytes()),
            signed_prekey_fp: None,
            version: 1,
            processed: false,
            processed_epoch: None,
        }
    }

    #[tokio::test]
    async fn cutting_with_no_pending_updates_produces_no_epoch() {
        let g = gossamer().await;
        assert!(g.cut_epoch(vec![]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn genesis_epoch_rejects_inclusion_and_consistency_proofs() {
        let g = gossamer().await;
        let user = UserId::new_v4();
        assert!(matches!(g.get_inclusion_proof(user, 0).await, Err(DirectoryError::GenesisProofRequested)));
        assert!(matches!(g.get_consistency_proof(0, 1).await, Err(DirectoryError::GenesisProofRequested)));
    }

    #[tokio::test]
    async fn a_single_update_produces_epoch_one_with_tree_size_one() {
        let g = gossamer().await;
        let user = UserId::new_v4();
        let epoch = g.cut_epoch(vec![pending(1, user)]).await.unwrap().unwrap();
        assert_eq!(epoch.epoch_number, 1);
        assert_eq!(epoch.tree_size, 1);
        assert_ne!(epoch.root_hash, [0u8; 32]);
        assert!(!epoch.signature.is_empty());
    }

    #[tokio::test]
    async fn inclusion_proof_recomputes_the_epoch_root() {
        let g = gossamer().await;
        let user = UserId::new_v4();
        let epoch = g.cut_epoch(vec![pending(1, user)]).await.unwrap().unwrap();

        let proof = g.get_inclusion_proof(user, epoch.epoch_number).await.unwrap();
        let mut acc = proof.leaf_hash;
        for step in &proof.path {
            acc = if step.sibling_on_right { combine(&acc, &step.sibling) } else { combine(&step.sibling, &acc) };
        }
        assert_eq!(acc, epoch.root_hash);
    }

    #[tokio::test]
    async fn second_epoch_has_greater_tree_size_than_first() {
        let g = gossamer().await;
        let u1 = UserId::new_v4();
        let u2 = UserId::new_v4();
        let e1 = g.cut_epoch(vec![pending(1, u1)]).await.unwrap().unwrap();
        let e2 = g.cut_epoch(vec![pending(2, u2)]).await.unwrap().unwrap();
        assert_eq!(e1.tree_size, 1);
        assert_eq!(e2.tree_size, 2);
        assert_ne!(e1.root_hash, e2.root_hash);
    }

    #[tokio::test]
    async fn consistency_proof_between_two_epochs_verifies() {
        let g = gossamer().await;
        let u1 = UserId::new_v4();
        let u2 = UserId::new_v4();
        g.cut_epoch(vec![pending(1, u1)]).await.unwrap().unwrap();
        g.cut_epoch(vec![pending(2, u2)]).await.unwrap().unwrap();

        let proof = g.get_consistency_proof(1, 2).await.unwrap();
        assert!(verify_consistency_proof(&proof));
    }

    #[tokio::test]
    async fn signing_key_is_registered_and_verifies_the_epoch() {
        let g = gossamer().await;
        let user = UserId::new_v4();
        let epoch = g.cut_epoch(vec![pending(1, user)]).await.unwrap().unwrap();
        let keys = g.get_signing_keys().await.unwrap();
        let key = keys.iter().find(|k| k.fingerprint == epoch.signing_key_fingerprint).unwrap();
        assert!(verify_epoch_signature(&epoch, key).unwrap());
    }
}
