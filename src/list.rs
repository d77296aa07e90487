//! The medicine collection: a stateless view over the ledger handle
use super::error::ContractError;
use super::event::Event;
use super::ledger::{CompositeKey, Ledger};
use super::medicine::{MEDICINE_OBJECT_TYPE, Medicine, MedicineKey};
use std::rc::Rc;
use tracing::{debug, warn};

/// Keyed access to medicine records for one invocation.
pub trait RecordCollection {
    /// Whether a record is committed under `key`, failing if the ledger
    /// cannot tell. Anything that writes on the answer uses this.
    fn contains(&self, key: &MedicineKey) -> Result<bool, ContractError>;
    /// True iff a record is committed under `key`. Never fails: a read error
    /// is logged and counts as absent.
    fn exists(&self, key: &MedicineKey) -> bool {
        self.contains(key).unwrap_or_else(|err| {
            warn!(key = %key, error = %err, "existence check failed, treating as absent");
            false
        })
    }
    fn get(&self, key: &MedicineKey) -> Result<Medicine, ContractError>;
    /// Writes the full record, history included, as a single ledger mutation.
    fn put(&self, key: &MedicineKey, medicine: &Medicine) -> Result<(), ContractError>;
    /// Events acted by `identity` across all records, in ascending commit order.
    fn history(&self, identity: &str) -> Result<Vec<Event>, ContractError>;
}

/// Ledger-backed [`RecordCollection`]. Holds no records of its own.
pub struct MedicineList {
    ledger: Rc<dyn Ledger>,
}

impl MedicineList {
    pub fn new(ledger: Rc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// Commit hook for [`SledLedger::commit_with`](super::ledger::SledLedger::commit_with):
    /// gives the pending events of a medicine record their commit position.
    /// Values of other object types pass through untouched.
    pub fn stamp_committed(key: &[u8], value: &[u8], position: u64) -> Result<Vec<u8>, ContractError> {
        if CompositeKey::from_bytes(key)?.object_type() != MEDICINE_OBJECT_TYPE {
            return Ok(value.to_vec());
        }
        let mut medicine = Medicine::decode(value)?;
        medicine.stamp_pending(position);
        medicine.encode()
    }
}

impl RecordCollection for MedicineList {
    fn contains(&self, key: &MedicineKey) -> Result<bool, ContractError> {
        Ok(self.ledger.get_state(&key.composite())?.is_some())
    }

    fn get(&self, key: &MedicineKey) -> Result<Medicine, ContractError> {
        let bytes = self
            .ledger
            .get_state(&key.composite())?
            .ok_or_else(|| ContractError::NotFound(key.clone()))?;

        Medicine::decode(&bytes)
    }

    fn put(&self, key: &MedicineKey, medicine: &Medicine) -> Result<(), ContractError> {
        let bytes = medicine.encode()?;
        self.ledger.put_state(&key.composite(), bytes)
    }

    fn history(&self, identity: &str) -> Result<Vec<Event>, ContractError> {
        let mut events = vec![];

        // Range results arrive in key order, and events within a record in
        // append order, so the stable sort below only reorders by position.
        for (key, bytes) in self
            .ledger
            .get_state_by_partial_key(MEDICINE_OBJECT_TYPE, &[])?
        {
            let medicine = Medicine::decode(&bytes).map_err(|err| {
                ContractError::Serialization(format!("record {key}: {err}"))
            })?;
            events.extend(
                medicine
                    .events
                    .into_iter()
                    .filter(|event| event.actor == identity),
            );
        }

        events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        debug!(identity, events = events.len(), "history scanned");
        Ok(events)
    }
}
