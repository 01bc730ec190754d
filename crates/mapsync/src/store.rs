//! The asset store boundary.
//!
//! Character sprites live in an external persistence service. The router
//! only needs one query from it: "character assets for these user ids".
//! [`AssetStore`] is that query; [`MemoryAssetStore`] is an in-process
//! implementation used by the binary and by tests.
//!
//! Pixel data is kept as serialized bytes and decoded on every read, so a
//! corrupt record surfaces as [`StoreError::WrongFormat`] at query time,
//! the same way a document store would report it.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use mapsync_protocol::{CharacterAsset, PixelData};

/// Errors reported by an [`AssetStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// None of the requested users has a character asset.
    #[error("no character assets for {0}")]
    NotFound(String),

    /// A stored asset's pixel data could not be decoded.
    #[error("asset {0} has the wrong format")]
    WrongFormat(String),

    /// The store itself could not be reached or read.
    #[error("asset store unavailable: {0}")]
    Unavailable(String),
}

/// Read access to users' character sprites.
///
/// Only the four `player_*` asset types are returned. Users with no
/// sprites are simply absent from the result.
pub trait AssetStore: Send + Sync + 'static {
    /// Fetches every character asset belonging to any of `user_ids`.
    ///
    /// # Errors
    /// - [`StoreError::NotFound`] if nothing matched at all.
    /// - [`StoreError::WrongFormat`] if a record's pixels don't decode.
    fn player_characters(
        &self,
        user_ids: &[String],
    ) -> impl Future<Output = Result<Vec<CharacterAsset>, StoreError>> + Send;
}

struct StoredAsset {
    /// Everything except the pixels (`data` is left empty).
    record: CharacterAsset,
    pixels: Vec<u8>,
}

/// An [`AssetStore`] backed by a `HashMap` keyed by user id.
#[derive(Default)]
pub struct MemoryAssetStore {
    by_user: RwLock<HashMap<String, Vec<StoredAsset>>>,
}

impl MemoryAssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from decoded assets.
    pub fn from_assets(assets: impl IntoIterator<Item = CharacterAsset>) -> Result<Self, StoreError> {
        let store = Self::new();
        for asset in assets {
            store.insert(asset)?;
        }
        Ok(store)
    }

    /// Loads a JSON array of asset records from `path`.
    ///
    /// # Errors
    /// [`StoreError::Unavailable`] if the file can't be read,
    /// [`StoreError::WrongFormat`] if it isn't an array of assets.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {e}", path.display())))?;
        let assets: Vec<CharacterAsset> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::WrongFormat(format!("{}: {e}", path.display())))?;

        let count = assets.len();
        let store = Self::from_assets(assets)?;
        tracing::info!(path = %path.display(), count, "asset store seeded");
        Ok(store)
    }

    /// Stores `asset`, serializing its pixel data.
    pub fn insert(&self, mut asset: CharacterAsset) -> Result<(), StoreError> {
        let pixels = serde_json::to_vec(&asset.data)
            .map_err(|e| StoreError::WrongFormat(format!("{}: {e}", asset.name)))?;
        asset.data = PixelData::new();
        self.insert_encoded(asset, pixels);
        Ok(())
    }

    /// Stores `record` with already-serialized pixel bytes. The bytes are
    /// not validated until they are read back.
    pub fn insert_encoded(&self, mut record: CharacterAsset, pixels: Vec<u8>) {
        record.data = PixelData::new();
        self.by_user
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(record.user_id.clone())
            .or_default()
            .push(StoredAsset { record, pixels });
    }

    /// Number of stored assets across all users.
    pub fn len(&self) -> usize {
        self.by_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AssetStore for MemoryAssetStore {
    async fn player_characters(&self, user_ids: &[String]) -> Result<Vec<CharacterAsset>, StoreError> {
        let by_user = self.by_user.read().unwrap_or_else(PoisonError::into_inner);

        let mut found = Vec::new();
        for stored in user_ids
            .iter()
            .filter_map(|id| by_user.get(id))
            .flatten()
            .filter(|s| s.record.asset_type.is_character())
        {
            let data: PixelData = serde_json::from_slice(&stored.pixels).map_err(|e| {
                tracing::debug!(asset = %stored.record.name, error = %e, "undecodable pixels");
                StoreError::WrongFormat(stored.record.name.clone())
            })?;
            found.push(CharacterAsset {
                data,
                ..stored.record.clone()
            });
        }

        if found.is_empty() {
            return Err(StoreError::NotFound(user_ids.join(",")));
        }
        Ok(found)
    }
}
