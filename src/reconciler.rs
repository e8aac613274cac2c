//! Off-chain mint records.
//!
//! A record is written only after the mint transaction is confirmed and is
//! keyed by the mint address, so repeating `record_mint` converges on one
//! row. `verified` moves from false to true and never back. Records still
//! unverified form the queue drained by [`crate::verifier::VerificationService::reconcile_pending`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{MintError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    #[serde(with = "pubkey_string")]
    pub mint_address: Pubkey,
    pub image_reference: String,
    #[serde(with = "pubkey_string")]
    pub requester: Pubkey,
    pub verified: bool,
    /// Unix seconds.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_record_id: Option<String>,
}

mod pubkey_string {
    use std::str::FromStr;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use solana_program::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&key.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let value = String::deserialize(deserializer)?;
        Pubkey::from_str(&value).map_err(D::Error::custom)
    }
}

/// Database seam. Every operation is keyed by the mint address.
#[allow(async_fn_in_trait)]
pub trait MintRecordStore {
    /// Returns false when a record for the mint already exists.
    async fn insert_if_absent(&self, record: MintRecord) -> Result<bool>;

    /// Returns false when the record was already verified.
    async fn set_verified(&self, mint: &Pubkey) -> Result<bool>;

    async fn get(&self, mint: &Pubkey) -> Result<Option<MintRecord>>;

    async fn link_image(&self, mint: &Pubkey, image_record_id: &str) -> Result<()>;

    async fn unverified(&self) -> Result<Vec<MintRecord>>;
}

type Records = BTreeMap<String, MintRecord>;

fn insert_into(records: &mut Records, record: MintRecord) -> bool {
    let key = record.mint_address.to_string();
    if records.contains_key(&key) {
        return false;
    }
    records.insert(key, record);
    true
}

fn verify_in(records: &mut Records, mint: &Pubkey) -> Result<bool> {
    let record = records
        .get_mut(&mint.to_string())
        .ok_or_else(|| MintError::RecordNotFound(mint.to_string()))?;
    if record.verified {
        return Ok(false);
    }
    record.verified = true;
    Ok(true)
}

fn link_in(records: &mut Records, mint: &Pubkey, image_record_id: &str) -> Result<()> {
    let record = records
        .get_mut(&mint.to_string())
        .ok_or_else(|| MintError::RecordNotFound(mint.to_string()))?;
    record.image_record_id = Some(image_record_id.to_string());
    Ok(())
}

fn pending(records: &Records) -> Vec<MintRecord> {
    records.values().filter(|r| !r.verified).cloned().collect()
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

impl MintRecordStore for MemoryStore {
    async fn insert_if_absent(&self, record: MintRecord) -> Result<bool> {
        Ok(insert_into(&mut *self.records.lock().await, record))
    }

    async fn set_verified(&self, mint: &Pubkey) -> Result<bool> {
        verify_in(&mut *self.records.lock().await, mint)
    }

    async fn get(&self, mint: &Pubkey) -> Result<Option<MintRecord>> {
        Ok(self.records.lock().await.get(&mint.to_string()).cloned())
    }

    async fn link_image(&self, mint: &Pubkey, image_record_id: &str) -> Result<()> {
        link_in(&mut *self.records.lock().await, mint, image_record_id)
    }

    async fn unverified(&self) -> Result<Vec<MintRecord>> {
        Ok(pending(&*self.records.lock().await))
    }
}

/// Records kept in a single JSON file. Writes go to a sibling temp file
/// which then replaces the original.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Records> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Records::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &Records) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

impl MintRecordStore for JsonFileStore {
    async fn insert_if_absent(&self, record: MintRecord) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let inserted = insert_into(&mut records, record);
        if inserted {
            self.save(&records).await?;
        }
        Ok(inserted)
    }

    async fn set_verified(&self, mint: &Pubkey) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let changed = verify_in(&mut records, mint)?;
        if changed {
            self.save(&records).await?;
        }
        Ok(changed)
    }

    async fn get(&self, mint: &Pubkey) -> Result<Option<MintRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(&mint.to_string()))
    }

    async fn link_image(&self, mint: &Pubkey, image_record_id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        link_in(&mut records, mint, image_record_id)?;
        self.save(&records).await
    }

    async fn unverified(&self) -> Result<Vec<MintRecord>> {
        let _guard = self.lock.lock().await;
        Ok(pending(&self.load().await?))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub struct Reconciler<S> {
    store: Arc<S>,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: MintRecordStore> Reconciler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a confirmed mint. Calling again for the same mint keeps the
    /// first record and returns it.
    pub async fn record_mint(
        &self,
        mint: &Pubkey,
        image_reference: &str,
        requester: &Pubkey,
    ) -> Result<MintRecord> {
        let record = MintRecord {
            mint_address: *mint,
            image_reference: image_reference.to_string(),
            requester: *requester,
            verified: false,
            created_at: unix_now(),
            image_record_id: None,
        };
        if self.store.insert_if_absent(record.clone()).await? {
            info!("Recorded mint {}", mint);
            return Ok(record);
        }
        debug!("Mint {} already recorded", mint);
        self.store
            .get(mint)
            .await?
            .ok_or_else(|| MintError::RecordNotFound(mint.to_string()))
    }

    pub async fn mark_verified(&self, mint: &Pubkey) -> Result<()> {
        if self.store.set_verified(mint).await? {
            info!("Marked {} verified", mint);
        }
        Ok(())
    }

    pub async fn link_image(&self, mint: &Pubkey, image_record_id: &str) -> Result<()> {
        self.store.link_image(mint, image_record_id).await?;
        debug!("Linked image record {} to {}", image_record_id, mint);
        Ok(())
    }

    pub async fn unverified(&self) -> Result<Vec<MintRecord>> {
        self.store.unverified().await
    }
}
