use rounddrop_core::error::DistributionError;
use rounddrop_core::event::LedgerEvent;
use rounddrop_core::round::{LedgerConfig, LedgerState, RoundRecord};
use rounddrop_core::types::{AccountId, RoundIndex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;

const CONFIG_KEY: &[u8] = b"config";
const STATE_KEY: &[u8] = b"state";
const LATCHED: &[u8] = &[1];

/// Persistent ledger storage backed by sled (pure-Rust, no C dependencies).
///
/// Named trees (analogous to column families):
///   rounds   — round index (u64 BE)          → bincode(RoundRecord)
///   claims   — AccountId ‖ round index (BE)   → [1] (one-way latch)
///   meta     — "config" / "state"             → bincode(LedgerConfig / LedgerState)
///   events   — event id (u64 BE)              → bincode(LedgerEvent)
///
/// The token reference implementation opens its own trees on the same database.
pub struct LedgerDb {
    db: sled::Db,
    rounds: sled::Tree,
    claims: sled::Tree,
    meta: sled::Tree,
    events: sled::Tree,
}

/// Writes that must land together or not at all.
#[derive(Default)]
pub struct ChangeSet {
    pub config: Option<LedgerConfig>,
    pub state: Option<LedgerState>,
    pub rounds: Vec<(RoundIndex, RoundRecord)>,
    pub latch: Vec<(AccountId, RoundIndex)>,
    pub unlatch: Vec<(AccountId, RoundIndex)>,
    pub events: Vec<(u64, LedgerEvent)>,
    pub drop_events: Vec<u64>,
}

impl LedgerDb {
    /// Open or create the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DistributionError> {
        let db = sled::open(path).map_err(storage)?;
        let rounds = db.open_tree("rounds").map_err(storage)?;
        let claims = db.open_tree("claims").map_err(storage)?;
        let meta = db.open_tree("meta").map_err(storage)?;
        let events = db.open_tree("events").map_err(storage)?;
        Ok(Self { db, rounds, claims, meta, events })
    }

    /// Open an auxiliary named tree on the same database.
    pub fn open_tree(&self, name: &str) -> Result<sled::Tree, DistributionError> {
        self.db.open_tree(name).map_err(storage)
    }

    // ── Meta ──────────────────────────────────────────────────────────────────

    pub fn get_config(&self) -> Result<Option<LedgerConfig>, DistributionError> {
        self.get_decoded(&self.meta, CONFIG_KEY)
    }

    pub fn get_state(&self) -> Result<Option<LedgerState>, DistributionError> {
        self.get_decoded(&self.meta, STATE_KEY)
    }

    // ── Rounds ────────────────────────────────────────────────────────────────

    /// Unconfigured indices read as the zero record.
    pub fn get_round(&self, index: RoundIndex) -> Result<RoundRecord, DistributionError> {
        Ok(self
            .get_decoded(&self.rounds, &index.to_be_bytes())?
            .unwrap_or_default())
    }

    /// All configured rounds in index order.
    pub fn iter_rounds(&self) -> Result<Vec<(RoundIndex, RoundRecord)>, DistributionError> {
        let mut out = Vec::new();
        for item in self.rounds.iter() {
            let (key, value) = item.map_err(storage)?;
            let index = RoundIndex::from_be_bytes(key_array(&key)?);
            out.push((index, decode(&value)?));
        }
        Ok(out)
    }

    // ── Claim latches ─────────────────────────────────────────────────────────

    pub fn has_claimed(&self, user: &AccountId, round: RoundIndex) -> Result<bool, DistributionError> {
        self.claims
            .contains_key(claim_key(user, round))
            .map_err(storage)
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Reserve a fresh, monotonically increasing event id.
    pub fn next_event_id(&self) -> Result<u64, DistributionError> {
        self.db.generate_id().map_err(storage)
    }

    pub fn events(&self) -> Result<Vec<(u64, LedgerEvent)>, DistributionError> {
        let mut out = Vec::new();
        for item in self.events.iter() {
            let (key, value) = item.map_err(storage)?;
            out.push((u64::from_be_bytes(key_array(&key)?), decode(&value)?));
        }
        Ok(out)
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    /// Apply every write in `changes` in one multi-tree transaction.
    pub fn commit(&self, changes: &ChangeSet) -> Result<(), DistributionError> {
        let config = changes.config.as_ref().map(encode).transpose()?;
        let state = changes.state.as_ref().map(encode).transpose()?;
        let rounds = changes
            .rounds
            .iter()
            .map(|(i, r)| Ok((i.to_be_bytes(), encode(r)?)))
            .collect::<Result<Vec<_>, DistributionError>>()?;
        let events = changes
            .events
            .iter()
            .map(|(id, e)| Ok((id.to_be_bytes(), encode(e)?)))
            .collect::<Result<Vec<_>, DistributionError>>()?;
        let latch: Vec<[u8; 40]> = changes.latch.iter().map(|(u, r)| claim_key(u, *r)).collect();
        let unlatch: Vec<[u8; 40]> = changes.unlatch.iter().map(|(u, r)| claim_key(u, *r)).collect();

        (&self.rounds, &self.claims, &self.meta, &self.events)
            .transaction(|(rounds_t, claims_t, meta_t, events_t)| {
                if let Some(bytes) = &config {
                    meta_t.insert(CONFIG_KEY, bytes.as_slice())?;
                }
                if let Some(bytes) = &state {
                    meta_t.insert(STATE_KEY, bytes.as_slice())?;
                }
                for (key, bytes) in &rounds {
                    rounds_t.insert(&key[..], bytes.as_slice())?;
                }
                for key in &latch {
                    claims_t.insert(&key[..], LATCHED)?;
                }
                for key in &unlatch {
                    claims_t.remove(&key[..])?;
                }
                for (key, bytes) in &events {
                    events_t.insert(&key[..], bytes.as_slice())?;
                }
                for id in &changes.drop_events {
                    events_t.remove(&id.to_be_bytes()[..])?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e: TransactionError<()>| DistributionError::Storage(format!("{e:?}")))
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), DistributionError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }

    fn get_decoded<T: DeserializeOwned>(
        &self,
        tree: &sled::Tree,
        key: &[u8],
    ) -> Result<Option<T>, DistributionError> {
        match tree.get(key).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn claim_key(user: &AccountId, round: RoundIndex) -> [u8; 40] {
    let mut key = [0u8; 40];
    key[..32].copy_from_slice(user.as_bytes());
    key[32..].copy_from_slice(&round.to_be_bytes());
    key
}

fn key_array(key: &[u8]) -> Result<[u8; 8], DistributionError> {
    key.try_into()
        .map_err(|_| DistributionError::Storage(format!("malformed key of {} bytes", key.len())))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, DistributionError> {
    bincode::serialize(value).map_err(|e| DistributionError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DistributionError> {
    bincode::deserialize(bytes).map_err(|e| DistributionError::Serialization(e.to_string()))
}

fn storage(e: sled::Error) -> DistributionError {
    DistributionError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> LedgerDb {
        let dir = std::env::temp_dir().join(format!("rounddrop_db_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        LedgerDb::open(&dir).unwrap()
    }

    #[test]
    fn unknown_round_reads_as_zero_record() {
        let db = temp_db("zero_round");
        assert_eq!(db.get_round(7).unwrap(), RoundRecord::default());
        assert!(db.get_state().unwrap().is_none());
    }

    #[test]
    fn commit_writes_and_unlatch_removes() {
        let db = temp_db("commit");
        let user = AccountId::from_bytes([4; 32]);
        let id = db.next_event_id().unwrap();
        db.commit(&ChangeSet {
            rounds: vec![(0, RoundRecord::new(10, 5)), (1, RoundRecord::new(20, 6))],
            latch: vec![(user.clone(), 1)],
            events: vec![(id, LedgerEvent::DeadlineUpdated { deadline: 99 })],
            ..Default::default()
        })
        .unwrap();

        assert!(db.has_claimed(&user, 1).unwrap());
        assert!(!db.has_claimed(&user, 0).unwrap());
        let rounds = db.iter_rounds().unwrap();
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[1], (1, RoundRecord::new(20, 6)));
        assert_eq!(db.events().unwrap().len(), 1);

        db.commit(&ChangeSet {
            unlatch: vec![(user.clone(), 1)],
            drop_events: vec![id],
            ..Default::default()
        })
        .unwrap();
        assert!(!db.has_claimed(&user, 1).unwrap());
        assert!(db.events().unwrap().is_empty());
    }

    #[test]
    fn event_ids_increase() {
        let db = temp_db("event_ids");
        let a = db.next_event_id().unwrap();
        let b = db.next_event_id().unwrap();
        assert!(b > a);
    }
}
