//! Persistent storage using RocksDB.

use crate::error::{Error, Result};
use crate::grid_store::GridStore;
use ed25519_dalek::SigningKey;
use rand::Rng;
use rocksdb::{Options, DB};
use std::path::Path;
use tessera_core::AccessRequest;

const GRID_STATE_KEY: &[u8] = b"grid:state";
const DEPLOYMENT_NONCE_KEY: &[u8] = b"grid:nonce";
const OWNER_KEY: &[u8] = b"node:owner_key";
const ACCESS_REQUEST_SEQ_KEY: &[u8] = b"access_request_seq";
const ACCESS_REQUEST_PREFIX: &[u8] = b"access_request:";

/// Storage backend for ledger data.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    // --- Grid state ---

    /// Store the full grid state.
    pub fn put_grid(&self, store: &GridStore) -> Result<()> {
        let value = serde_json::to_vec(store)?;
        self.db.put(GRID_STATE_KEY, value)?;
        Ok(())
    }

    /// Load the grid state, if a grid was ever deployed here.
    pub fn get_grid(&self) -> Result<Option<GridStore>> {
        match self.db.get(GRID_STATE_KEY)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Get or create the nonce that makes this deployment's grid id unique.
    pub fn get_or_create_deployment_nonce(&self) -> Result<u64> {
        if let Some(data) = self.db.get(DEPLOYMENT_NONCE_KEY)? {
            let bytes: [u8; 8] = data
                .as_slice()
                .try_into()
                .map_err(|_| Error::Storage("Invalid stored deployment nonce".into()))?;
            return Ok(u64::from_be_bytes(bytes));
        }
        let nonce: u64 = rand::thread_rng().gen();
        self.db.put(DEPLOYMENT_NONCE_KEY, nonce.to_be_bytes())?;
        Ok(nonce)
    }

    // --- Access requests ---

    /// Append an access request; returns its sequence number.
    pub fn put_access_request(&self, request: &AccessRequest) -> Result<u64> {
        let seq = match self.db.get(ACCESS_REQUEST_SEQ_KEY)? {
            Some(data) => {
                let bytes: [u8; 8] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Invalid access request counter".into()))?;
                u64::from_be_bytes(bytes) + 1
            }
            None => 1,
        };

        let mut key = ACCESS_REQUEST_PREFIX.to_vec();
        key.extend_from_slice(&seq.to_be_bytes());
        self.db.put(key, serde_json::to_vec(request)?)?;
        self.db.put(ACCESS_REQUEST_SEQ_KEY, seq.to_be_bytes())?;
        Ok(seq)
    }

    /// List all access requests in arrival order.
    pub fn list_access_requests(&self) -> Result<Vec<AccessRequest>> {
        let mut requests = Vec::new();

        let iter = self.db.prefix_iterator(ACCESS_REQUEST_PREFIX);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(ACCESS_REQUEST_PREFIX) {
                requests.push(serde_json::from_slice(&value)?);
            } else {
                break;
            }
        }

        Ok(requests)
    }

    // --- Owner identity ---

    /// Get or create the owner's signing key (persistent identity).
    pub fn get_or_create_owner_key(&self) -> Result<SigningKey> {
        if let Some(data) = self.db.get(OWNER_KEY)? {
            // Load existing key
            let bytes: [u8; 32] = data
                .as_slice()
                .try_into()
                .map_err(|_| Error::Storage("Invalid stored key".into()))?;
            Ok(SigningKey::from_bytes(&bytes))
        } else {
            // Generate new key and persist it
            let mut rng = rand::thread_rng();
            let signing_key = SigningKey::generate(&mut rng);
            self.db.put(OWNER_KEY, signing_key.as_bytes())?;
            Ok(signing_key)
        }
    }
}
