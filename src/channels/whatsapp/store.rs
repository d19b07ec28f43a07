//! WhatsApp Session Store
//!
//! Persists the multi-device keys and the paired device record in one SQLite
//! file through `sqlx`. Every record lives in a single `(kind, scope, key)`
//! table; `scope` is empty for records that only need one key. One file can
//! hold several accounts, each under its own `device_id`, and `wa_accounts`
//! maps the operator phone a device was opened for to that id.

use crate::channels::PairingIdentity;
use crate::error::BotError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use wacore::appstate::hash::HashState;
use wacore::appstate::processor::AppStateMutationMAC;
use wacore::store::Device;
use wacore::store::error::{Result, StoreError, db_err};
use wacore::store::traits::{
    AppStateSyncKey, AppSyncStore, DeviceListRecord, DeviceStore, LidPnMappingEntry, ProtocolStore,
    SignalStore,
};

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS wa_records (
        kind      TEXT NOT NULL,
        scope     TEXT NOT NULL,
        key       TEXT NOT NULL,
        device_id INTEGER NOT NULL,
        value     BLOB NOT NULL,
        PRIMARY KEY (kind, scope, key, device_id)
    )",
    "CREATE TABLE IF NOT EXISTS wa_accounts (
        phone     TEXT PRIMARY KEY,
        device_id INTEGER NOT NULL
    )",
];

mod kind {
    pub const DEVICE: &str = "device";
    pub const IDENTITY: &str = "identity";
    pub const SESSION: &str = "session";
    pub const PREKEY: &str = "prekey";
    pub const SIGNED_PREKEY: &str = "signed_prekey";
    pub const SENDER_KEY: &str = "sender_key";
    pub const SYNC_KEY: &str = "sync_key";
    pub const SYNC_VERSION: &str = "sync_version";
    pub const MUTATION_MAC: &str = "mutation_mac";
    pub const SKDM: &str = "skdm";
    pub const LID: &str = "lid";
    pub const PN: &str = "pn";
    pub const BASE_KEY: &str = "base_key";
    pub const DEVICE_LIST: &str = "device_list";
    pub const FORGET: &str = "forget_sender_key";
}

fn serialization(e: impl ToString) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Serialized form of a LID to phone-number mapping.
#[derive(Serialize, Deserialize)]
struct LidRecord {
    lid: String,
    phone_number: String,
    created_at: i64,
    updated_at: i64,
    learning_source: String,
}

impl From<&LidPnMappingEntry> for LidRecord {
    fn from(e: &LidPnMappingEntry) -> Self {
        Self {
            lid: e.lid.clone(),
            phone_number: e.phone_number.clone(),
            created_at: e.created_at,
            updated_at: e.updated_at,
            learning_source: e.learning_source.clone(),
        }
    }
}

impl From<LidRecord> for LidPnMappingEntry {
    fn from(r: LidRecord) -> Self {
        Self {
            lid: r.lid,
            phone_number: r.phone_number,
            created_at: r.created_at,
            updated_at: r.updated_at,
            learning_source: r.learning_source,
        }
    }
}

fn store_err(e: impl ToString) -> BotError {
    BotError::SessionStore(e.to_string())
}

/// Session records of one account. Clones share the pool and the device.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    device_id: i32,
}

impl SessionStore {
    /// Open or create the session file at `path` and select the device kept
    /// for `phone`, reserving a fresh one when the file has none.
    pub async fn open(path: &Path, phone: &str) -> std::result::Result<Self, BotError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = Self::connect(opts).await?;
        Self::load_or_create(pool, phone).await
    }

    #[cfg(test)]
    pub(crate) async fn in_memory() -> std::result::Result<Self, BotError> {
        let pool = Self::connect(SqliteConnectOptions::new().in_memory(true)).await?;
        Self::load_or_create(pool, "5550000").await
    }

    async fn connect(opts: SqliteConnectOptions) -> std::result::Result<SqlitePool, BotError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(store_err)?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(store_err)?;
        }
        Ok(pool)
    }

    async fn load_or_create(pool: SqlitePool, phone: &str) -> std::result::Result<Self, BotError> {
        if let Some(device_id) = Self::lookup(&pool, phone).await? {
            tracing::debug!("WhatsApp: using device {} for {}", device_id, phone);
            return Ok(Self { pool, device_id });
        }

        let row = sqlx::query(
            "SELECT MAX(id) AS last FROM (
                SELECT device_id AS id FROM wa_records
                UNION ALL SELECT device_id AS id FROM wa_accounts
            )",
        )
        .fetch_one(&pool)
        .await
        .map_err(store_err)?;
        let device_id = row.get::<Option<i32>, _>("last").unwrap_or(0) + 1;

        sqlx::query("INSERT INTO wa_accounts (phone, device_id) VALUES (?, ?)")
            .bind(phone)
            .bind(device_id)
            .execute(&pool)
            .await
            .map_err(store_err)?;
        tracing::info!("WhatsApp: new device {} reserved for {}", device_id, phone);
        Ok(Self { pool, device_id })
    }

    /// Device kept for `phone`: the one reserved for it, else a stored device
    /// already paired as that number.
    async fn lookup(pool: &SqlitePool, phone: &str) -> std::result::Result<Option<i32>, BotError> {
        let reserved = sqlx::query("SELECT device_id FROM wa_accounts WHERE phone = ?")
            .bind(phone)
            .fetch_optional(pool)
            .await
            .map_err(store_err)?;
        if let Some(row) = reserved {
            return Ok(Some(row.get("device_id")));
        }

        let devices = sqlx::query(
            "SELECT device_id, value FROM wa_records WHERE kind = ? ORDER BY device_id",
        )
        .bind(kind::DEVICE)
        .fetch_all(pool)
        .await
        .map_err(store_err)?;
        for row in devices {
            let bytes: Vec<u8> = row.get("value");
            let paired = rmp_serde::from_slice::<Device>(&bytes)
                .ok()
                .and_then(|d| d.pn)
                .is_some_and(|jid| jid.user == phone);
            if paired {
                let device_id: i32 = row.get("device_id");
                sqlx::query("INSERT OR REPLACE INTO wa_accounts (phone, device_id) VALUES (?, ?)")
                    .bind(phone)
                    .bind(device_id)
                    .execute(pool)
                    .await
                    .map_err(store_err)?;
                return Ok(Some(device_id));
            }
        }
        Ok(None)
    }

    /// Device id kept for `phone` in this file, if any.
    pub async fn device_for_phone(
        &self,
        phone: &str,
    ) -> std::result::Result<Option<i32>, BotError> {
        Self::lookup(&self.pool, phone).await
    }

    /// Phone number of the paired account, if a usable device record exists.
    pub async fn paired_identity(&self) -> std::result::Result<Option<PairingIdentity>, BotError> {
        let device = self.load_device().await.map_err(store_err)?;
        Ok(device
            .and_then(|d| d.pn)
            .map(|jid| PairingIdentity::new(&jid.user)))
    }

    /// Forget this device's credentials, forcing a fresh pairing on next start.
    /// Other accounts in the same file are untouched.
    pub async fn clear(&self) -> std::result::Result<(), BotError> {
        sqlx::query("DELETE FROM wa_records WHERE device_id = ?")
            .bind(self.device_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM wa_accounts WHERE device_id = ?")
            .bind(self.device_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        tracing::info!("WhatsApp: session credentials cleared for device {}", self.device_id);
        Ok(())
    }

    async fn put(&self, kind: &str, scope: &str, key: &str, value: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO wa_records (kind, scope, key, device_id, value) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(kind, scope, key, device_id) DO UPDATE SET value = excluded.value",
        )
        .bind(kind)
        .bind(scope)
        .bind(key)
        .bind(self.device_id)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, kind: &str, scope: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query(
            "SELECT value FROM wa_records WHERE kind = ? AND scope = ? AND key = ? AND device_id = ?",
        )
        .bind(kind)
        .bind(scope)
        .bind(key)
        .bind(self.device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn delete(&self, kind: &str, scope: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM wa_records WHERE kind = ? AND scope = ? AND key = ? AND device_id = ?")
            .bind(kind)
            .bind(scope)
            .bind(key)
            .bind(self.device_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// `(key, value)` pairs of a kind within a scope, in key order.
    async fn list(&self, kind: &str, scope: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let rows = sqlx::query(
            "SELECT key, value FROM wa_records WHERE kind = ? AND scope = ? AND device_id = ? ORDER BY key",
        )
        .bind(kind)
        .bind(scope)
        .bind(self.device_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| (r.get("key"), r.get("value"))).collect())
    }

    async fn delete_scope(&self, kind: &str, scope: &str) -> Result<()> {
        sqlx::query("DELETE FROM wa_records WHERE kind = ? AND scope = ? AND device_id = ?")
            .bind(kind)
            .bind(scope)
            .bind(self.device_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn put_json<T: Serialize + Sync>(&self, kind: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value).map_err(serialization)?;
        self.put(kind, "", key, &bytes).await
    }

    async fn get_json<T: DeserializeOwned + Send>(&self, kind: &str, key: &str) -> Result<Option<T>> {
        match self.get(kind, "", key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(serialization),
            None => Ok(None),
        }
    }

    async fn load_device(&self) -> Result<Option<Device>> {
        let Some(bytes) = self.get(kind::DEVICE, "", "").await? else {
            return Ok(None);
        };
        match rmp_serde::from_slice::<Device>(&bytes) {
            Ok(device) => Ok(Some(device)),
            Err(e) => {
                tracing::warn!("WhatsApp: unreadable device record, pairing again: {}", e);
                self.delete(kind::DEVICE, "", "").await?;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl SignalStore for SessionStore {
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<()> {
        self.put(kind::IDENTITY, "", address, &key).await
    }

    async fn load_identity(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(kind::IDENTITY, "", address).await
    }

    async fn delete_identity(&self, address: &str) -> Result<()> {
        self.delete(kind::IDENTITY, "", address).await
    }

    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(kind::SESSION, "", address).await
    }

    async fn put_session(&self, address: &str, session: &[u8]) -> Result<()> {
        self.put(kind::SESSION, "", address, session).await
    }

    async fn delete_session(&self, address: &str) -> Result<()> {
        self.delete(kind::SESSION, "", address).await
    }

    async fn store_prekey(&self, id: u32, record: &[u8], _uploaded: bool) -> Result<()> {
        self.put(kind::PREKEY, "", &id.to_string(), record).await
    }

    async fn load_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        self.get(kind::PREKEY, "", &id.to_string()).await
    }

    async fn remove_prekey(&self, id: u32) -> Result<()> {
        self.delete(kind::PREKEY, "", &id.to_string()).await
    }

    async fn store_signed_prekey(&self, id: u32, record: &[u8]) -> Result<()> {
        self.put(kind::SIGNED_PREKEY, "", &id.to_string(), record).await
    }

    async fn load_signed_prekey(&self, id: u32) -> Result<Option<Vec<u8>>> {
        self.get(kind::SIGNED_PREKEY, "", &id.to_string()).await
    }

    async fn load_all_signed_prekeys(&self) -> Result<Vec<(u32, Vec<u8>)>> {
        self.list(kind::SIGNED_PREKEY, "")
            .await?
            .into_iter()
            .map(|(key, record)| {
                key.parse::<u32>()
                    .map(|id| (id, record))
                    .map_err(serialization)
            })
            .collect()
    }

    async fn remove_signed_prekey(&self, id: u32) -> Result<()> {
        self.delete(kind::SIGNED_PREKEY, "", &id.to_string()).await
    }

    async fn put_sender_key(&self, address: &str, record: &[u8]) -> Result<()> {
        self.put(kind::SENDER_KEY, "", address, record).await
    }

    async fn get_sender_key(&self, address: &str) -> Result<Option<Vec<u8>>> {
        self.get(kind::SENDER_KEY, "", address).await
    }

    async fn delete_sender_key(&self, address: &str) -> Result<()> {
        self.delete(kind::SENDER_KEY, "", address).await
    }
}

#[async_trait]
impl AppSyncStore for SessionStore {
    async fn get_sync_key(&self, key_id: &[u8]) -> Result<Option<AppStateSyncKey>> {
        self.get_json(kind::SYNC_KEY, &hex(key_id)).await
    }

    async fn set_sync_key(&self, key_id: &[u8], key: AppStateSyncKey) -> Result<()> {
        self.put_json(kind::SYNC_KEY, &hex(key_id), &key).await
    }

    async fn get_version(&self, name: &str) -> Result<HashState> {
        Ok(self
            .get_json(kind::SYNC_VERSION, name)
            .await?
            .unwrap_or_default())
    }

    async fn set_version(&self, name: &str, state: HashState) -> Result<()> {
        self.put_json(kind::SYNC_VERSION, name, &state).await
    }

    async fn put_mutation_macs(
        &self,
        name: &str,
        _version: u64,
        mutations: &[AppStateMutationMAC],
    ) -> Result<()> {
        for m in mutations {
            self.put(kind::MUTATION_MAC, name, &hex(&m.index_mac), &m.value_mac)
                .await?;
        }
        Ok(())
    }

    async fn get_mutation_mac(&self, name: &str, index_mac: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get(kind::MUTATION_MAC, name, &hex(index_mac)).await
    }

    async fn delete_mutation_macs(&self, name: &str, index_macs: &[Vec<u8>]) -> Result<()> {
        for mac in index_macs {
            self.delete(kind::MUTATION_MAC, name, &hex(mac)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolStore for SessionStore {
    async fn get_skdm_recipients(&self, group_jid: &str) -> Result<Vec<String>> {
        Ok(self
            .list(kind::SKDM, group_jid)
            .await?
            .into_iter()
            .map(|(jid, _)| jid)
            .collect())
    }

    async fn add_skdm_recipients(&self, group_jid: &str, device_jids: &[String]) -> Result<()> {
        for jid in device_jids {
            self.put(kind::SKDM, group_jid, jid, &[]).await?;
        }
        Ok(())
    }

    async fn clear_skdm_recipients(&self, group_jid: &str) -> Result<()> {
        self.delete_scope(kind::SKDM, group_jid).await
    }

    async fn get_lid_mapping(&self, lid: &str) -> Result<Option<LidPnMappingEntry>> {
        Ok(self
            .get_json::<LidRecord>(kind::LID, lid)
            .await?
            .map(Into::into))
    }

    async fn get_pn_mapping(&self, phone: &str) -> Result<Option<LidPnMappingEntry>> {
        match self.get(kind::PN, "", phone).await? {
            Some(lid) => {
                let lid = String::from_utf8(lid).map_err(serialization)?;
                self.get_lid_mapping(&lid).await
            }
            None => Ok(None),
        }
    }

    async fn put_lid_mapping(&self, entry: &LidPnMappingEntry) -> Result<()> {
        self.put_json(kind::LID, &entry.lid, &LidRecord::from(entry))
            .await?;
        self.put(kind::PN, "", &entry.phone_number, entry.lid.as_bytes())
            .await
    }

    async fn get_all_lid_mappings(&self) -> Result<Vec<LidPnMappingEntry>> {
        self.list(kind::LID, "")
            .await?
            .into_iter()
            .map(|(_, bytes)| {
                serde_json::from_slice::<LidRecord>(&bytes)
                    .map(Into::into)
                    .map_err(serialization)
            })
            .collect()
    }

    async fn save_base_key(&self, address: &str, message_id: &str, base_key: &[u8]) -> Result<()> {
        self.put(kind::BASE_KEY, address, message_id, base_key).await
    }

    async fn has_same_base_key(
        &self,
        address: &str,
        message_id: &str,
        current_base_key: &[u8],
    ) -> Result<bool> {
        Ok(self
            .get(kind::BASE_KEY, address, message_id)
            .await?
            .is_some_and(|stored| stored == current_base_key))
    }

    async fn delete_base_key(&self, address: &str, message_id: &str) -> Result<()> {
        self.delete(kind::BASE_KEY, address, message_id).await
    }

    async fn update_device_list(&self, record: DeviceListRecord) -> Result<()> {
        self.put_json(kind::DEVICE_LIST, &record.user, &record).await
    }

    async fn get_devices(&self, user: &str) -> Result<Option<DeviceListRecord>> {
        self.get_json(kind::DEVICE_LIST, user).await
    }

    async fn mark_forget_sender_key(&self, group_jid: &str, participant: &str) -> Result<()> {
        self.put(kind::FORGET, group_jid, participant, &[]).await
    }

    async fn consume_forget_marks(&self, group_jid: &str) -> Result<Vec<String>> {
        let participants: Vec<String> = self
            .list(kind::FORGET, group_jid)
            .await?
            .into_iter()
            .map(|(participant, _)| participant)
            .collect();
        if !participants.is_empty() {
            self.delete_scope(kind::FORGET, group_jid).await?;
        }
        Ok(participants)
    }
}

#[async_trait]
impl DeviceStore for SessionStore {
    async fn save(&self, device: &Device) -> Result<()> {
        let bytes = rmp_serde::to_vec(device).map_err(serialization)?;
        self.put(kind::DEVICE, "", "", &bytes).await
    }

    async fn load(&self) -> Result<Option<Device>> {
        self.load_device().await
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.get(kind::DEVICE, "", "").await?.is_some())
    }

    async fn create(&self) -> Result<i32> {
        Ok(self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SessionStore {
        SessionStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_identity_and_session_records() {
        let store = store().await;
        store.put_identity("521234@s.whatsapp.net", [7u8; 32]).await.unwrap();
        store.put_session("521234@s.whatsapp.net", b"ratchet").await.unwrap();

        assert_eq!(
            store.load_identity("521234@s.whatsapp.net").await.unwrap(),
            Some(vec![7u8; 32])
        );
        assert_eq!(
            store.get_session("521234@s.whatsapp.net").await.unwrap().as_deref(),
            Some(&b"ratchet"[..])
        );

        store.delete_session("521234@s.whatsapp.net").await.unwrap();
        assert!(store.get_session("521234@s.whatsapp.net").await.unwrap().is_none());
        // other kinds under the same key are untouched
        assert!(store.load_identity("521234@s.whatsapp.net").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_signed_prekeys_listing() {
        let store = store().await;
        store.store_signed_prekey(3, b"c").await.unwrap();
        store.store_signed_prekey(1, b"a").await.unwrap();
        store.store_prekey(2, b"not-signed", true).await.unwrap();

        let mut all = store.load_all_signed_prekeys().await.unwrap();
        all.sort();
        assert_eq!(all, vec![(1, b"a".to_vec()), (3, b"c".to_vec())]);
    }

    #[tokio::test]
    async fn test_scoped_records() {
        let store = store().await;
        store
            .add_skdm_recipients("g1@g.us", &["a:1@s.whatsapp.net".into(), "b:2@s.whatsapp.net".into()])
            .await
            .unwrap();
        store
            .add_skdm_recipients("g2@g.us", &["c:1@s.whatsapp.net".into()])
            .await
            .unwrap();
        assert_eq!(store.get_skdm_recipients("g1@g.us").await.unwrap().len(), 2);

        store.clear_skdm_recipients("g1@g.us").await.unwrap();
        assert!(store.get_skdm_recipients("g1@g.us").await.unwrap().is_empty());
        assert_eq!(store.get_skdm_recipients("g2@g.us").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forget_marks_are_consumed_once() {
        let store = store().await;
        store.mark_forget_sender_key("g@g.us", "p1").await.unwrap();
        store.mark_forget_sender_key("g@g.us", "p2").await.unwrap();
        assert_eq!(store.consume_forget_marks("g@g.us").await.unwrap(), vec!["p1", "p2"]);
        assert!(store.consume_forget_marks("g@g.us").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lid_mapping_both_directions() {
        let store = store().await;
        let entry = LidPnMappingEntry {
            lid: "99887766".into(),
            phone_number: "521234".into(),
            created_at: 1,
            updated_at: 2,
            learning_source: "usync".into(),
        };
        store.put_lid_mapping(&entry).await.unwrap();

        assert_eq!(
            store.get_pn_mapping("521234").await.unwrap().unwrap().lid,
            "99887766"
        );
        assert_eq!(
            store.get_lid_mapping("99887766").await.unwrap().unwrap().phone_number,
            "521234"
        );
        assert_eq!(store.get_all_lid_mappings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_base_key_comparison() {
        let store = store().await;
        store.save_base_key("addr", "m1", b"k1").await.unwrap();
        assert!(store.has_same_base_key("addr", "m1", b"k1").await.unwrap());
        assert!(!store.has_same_base_key("addr", "m1", b"k2").await.unwrap());
        assert!(!store.has_same_base_key("addr", "m2", b"k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_mutation_macs() {
        let store = store().await;
        let macs = vec![AppStateMutationMAC {
            index_mac: vec![0xAB, 0x01],
            value_mac: vec![9],
        }];
        store.put_mutation_macs("regular", 3, &macs).await.unwrap();
        assert_eq!(
            store.get_mutation_mac("regular", &[0xAB, 0x01]).await.unwrap(),
            Some(vec![9])
        );
        store
            .delete_mutation_macs("regular", &[vec![0xAB, 0x01]])
            .await
            .unwrap();
        assert!(store.get_mutation_mac("regular", &[0xAB, 0x01]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_defaults_when_missing() {
        let store = store().await;
        assert_eq!(store.get_version("critical_block").await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_unpaired_store_has_no_identity() {
        let store = store().await;
        assert!(!store.exists().await.unwrap());
        assert_eq!(store.paired_identity().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_device_record_is_discarded() {
        let store = store().await;
        store.put(kind::DEVICE, "", "", b"{not msgpack").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_device_reserved_per_phone() {
        let first = store().await;
        let second = SessionStore::load_or_create(first.pool.clone(), "777").await.unwrap();
        assert_ne!(first.device_id, second.device_id);
        assert_eq!(first.device_for_phone("777").await.unwrap(), Some(second.device_id));
        assert_eq!(first.device_for_phone("5550000").await.unwrap(), Some(first.device_id));
        assert_eq!(first.device_for_phone("123").await.unwrap(), None);

        let again = SessionStore::load_or_create(first.pool.clone(), "777").await.unwrap();
        assert_eq!(again.device_id, second.device_id);
        assert_eq!(again.create().await.unwrap(), second.device_id);
    }

    #[tokio::test]
    async fn test_clear_keeps_other_accounts() {
        let first = store().await;
        let second = SessionStore::load_or_create(first.pool.clone(), "777").await.unwrap();
        first.put_identity("a", [1u8; 32]).await.unwrap();
        second.put_identity("a", [2u8; 32]).await.unwrap();
        second.put_session("a", b"s").await.unwrap();

        first.clear().await.unwrap();

        assert!(first.load_identity("a").await.unwrap().is_none());
        assert_eq!(second.load_identity("a").await.unwrap(), Some(vec![2u8; 32]));
        assert!(second.get_session("a").await.unwrap().is_some());
        assert_eq!(second.device_for_phone("5550000").await.unwrap(), None);
        assert_eq!(second.device_for_phone("777").await.unwrap(), Some(second.device_id));
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let store = store().await;
        store.put_identity("a", [1u8; 32]).await.unwrap();
        store.put_session("a", b"s").await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load_identity("a").await.unwrap().is_none());
        assert!(store.get_session("a").await.unwrap().is_none());
    }

    #[test]
    fn test_hex() {
        assert_eq!(hex(&[0x00, 0xAB, 0x10]), "00ab10");
    }
}
