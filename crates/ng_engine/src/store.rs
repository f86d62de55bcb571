//! Volatile key-material store for the crypto execution context.
//!
//! A capability object with a fixed method set, not an open map: callers can
//! only touch the record kinds named here. Contents live in context memory
//! only and are seeded from the vault via [`LoadedMaterial`]; nothing here
//! persists anything.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ng_crypto::material::{
    IdentityRecord, OneTimePreKeyRecord, PreKeyRecordSet, SignedPreKeyRecord,
};

/// Vault-shaped material handed to the context in one typed operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedMaterial {
    pub identity: IdentityRecord,
    #[serde(rename = "preKeys")]
    pub pre_keys: PreKeyRecordSet,
}

#[derive(Default)]
pub struct MaterialStore {
    identity: Option<IdentityRecord>,
    signed_pre_keys: BTreeMap<u32, SignedPreKeyRecord>,
    one_time_pre_keys: BTreeMap<u32, OneTimePreKeyRecord>,
}

impl MaterialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&IdentityRecord> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, record: IdentityRecord) {
        self.identity = Some(record);
    }

    pub fn signed_pre_key(&self, key_id: u32) -> Option<&SignedPreKeyRecord> {
        self.signed_pre_keys.get(&key_id)
    }

    pub fn put_signed_pre_key(&mut self, record: SignedPreKeyRecord) {
        self.signed_pre_keys.insert(record.key_id, record);
    }

    pub fn put_one_time_pre_key(&mut self, record: OneTimePreKeyRecord) {
        self.one_time_pre_keys.insert(record.key_id, record);
    }

    /// One-time pre-keys are consumed on use so a second handshake cannot
    /// reuse the same secret.
    pub fn take_one_time_pre_key(&mut self, key_id: u32) -> Option<OneTimePreKeyRecord> {
        self.one_time_pre_keys.remove(&key_id)
    }

    pub fn signed_pre_key_ids(&self) -> Vec<u32> {
        self.signed_pre_keys.keys().copied().collect()
    }

    pub fn one_time_pre_key_ids(&self) -> Vec<u32> {
        self.one_time_pre_keys.keys().copied().collect()
    }

    pub fn load(&mut self, material: LoadedMaterial) {
        self.identity = Some(material.identity);
        self.put_signed_pre_key(material.pre_keys.signed_pre_key);
        for otp in material.pre_keys.one_time_pre_keys {
            self.put_one_time_pre_key(otp);
        }
    }

    pub fn clear(&mut self) {
        self.identity = None;
        self.signed_pre_keys.clear();
        self.one_time_pre_keys.clear();
    }
}
