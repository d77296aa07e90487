//! Ledger handle: composite keys, the per-invocation read/write sets and the
//! conflict-checked commit onto sled.
use super::error::ContractError;
use sled::IVec;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Reserved key holding the last committed position (big-endian u64).
/// Composite keys always start with a NUL byte so they never collide with it.
/// It is never part of a read set: positions are assigned inside the commit.
pub const POSITION_KEY: &[u8] = b"ledger/position";

const SEPARATOR: char = '\u{0}';

/// Key formed from an object type and an ordered list of attributes,
/// laid out as `\0type\0attr1\0attr2\0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositeKey {
    object_type: String,
    attributes: Vec<String>,
}

/// Transaction-scoped access to world state.
pub trait Ledger {
    /// Deterministic id of the invocation this handle belongs to.
    fn tx_id(&self) -> &str;
    fn get_state(&self, key: &CompositeKey) -> Result<Option<Vec<u8>>, ContractError>;
    fn put_state(&self, key: &CompositeKey, value: Vec<u8>) -> Result<(), ContractError>;
    /// Every committed entry whose key starts with `object_type` and `attributes`,
    /// in ascending key order.
    fn get_state_by_partial_key(
        &self,
        object_type: &str,
        attributes: &[&str],
    ) -> Result<Vec<(CompositeKey, Vec<u8>)>, ContractError>;
}

/// Ledger handle for one invocation over a sled tree.
///
/// Reads see committed state only. The first value observed for each key is
/// remembered, and [`SledLedger::commit_with`] refuses to apply the buffered
/// writes if any of those values changed in the meantime. Invocations whose
/// read sets are untouched by each other commit independently.
#[derive(Debug)]
pub struct SledLedger {
    tree: sled::Tree,
    tx_id: String,
    reads: RefCell<BTreeMap<Vec<u8>, Option<IVec>>>,
    writes: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl CompositeKey {
    pub fn new<'a>(object_type: &str, attributes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            object_type: object_type.to_string(),
            attributes: attributes.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut key = String::new();
        key.push(SEPARATOR);
        key.push_str(&self.object_type);
        key.push(SEPARATOR);
        for attribute in &self.attributes {
            key.push_str(attribute);
            key.push(SEPARATOR);
        }
        key.into_bytes()
    }

    /// Inverse of [`CompositeKey::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ContractError> {
        let invalid = || ContractError::Serialization(format!("malformed composite key {}", hex::encode(bytes)));

        let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
        let inner = text
            .strip_prefix(SEPARATOR)
            .and_then(|rest| rest.strip_suffix(SEPARATOR))
            .ok_or_else(invalid)?;

        let mut parts = inner.split(SEPARATOR);
        let object_type = parts.next().ok_or_else(invalid)?.to_string();
        let attributes = parts.map(str::to_string).collect();

        Ok(Self {
            object_type,
            attributes,
        })
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.object_type)?;
        for attribute in &self.attributes {
            write!(f, ":{attribute}")?;
        }
        Ok(())
    }
}

/// Partial key prefix: same layout as a full key for the given leading attributes.
fn partial_key(object_type: &str, attributes: &[&str]) -> Vec<u8> {
    CompositeKey::new(object_type, attributes.iter().copied()).to_bytes()
}

fn decode_position(value: Option<&IVec>) -> Result<u64, ContractError> {
    match value {
        None => Ok(0),
        Some(bytes) => {
            let raw = <[u8; 8]>::try_from(&bytes[..]).map_err(|_| {
                ContractError::Serialization(format!(
                    "commit position is {} bytes, expected 8",
                    bytes.len()
                ))
            })?;
            Ok(u64::from_be_bytes(raw))
        }
    }
}

impl SledLedger {
    /// Opens a handle over the committed state of `tree`.
    pub fn begin(tree: sled::Tree, tx_id: impl Into<String>) -> Result<Self, ContractError> {
        let tx_id = tx_id.into();
        Self::begin_with(tree, |_| Ok(tx_id))
    }

    /// Like [`SledLedger::begin`], deriving the transaction id from the
    /// committed position the handle was opened at.
    pub fn begin_with<F>(tree: sled::Tree, tx_id: F) -> Result<Self, ContractError>
    where
        F: FnOnce(u64) -> Result<String, ContractError>,
    {
        let height = Self::committed_position(&tree)?;
        let tx_id = tx_id(height)?;

        Ok(Self {
            tree,
            tx_id,
            reads: RefCell::new(BTreeMap::new()),
            writes: RefCell::new(BTreeMap::new()),
        })
    }

    /// Last committed position of `tree`, 0 for an empty ledger.
    pub fn committed_position(tree: &sled::Tree) -> Result<u64, ContractError> {
        decode_position(tree.get(POSITION_KEY)?.as_ref())
    }

    pub fn is_read_only(&self) -> bool {
        self.writes.borrow().is_empty()
    }

    fn observe(&self, key: Vec<u8>, value: Option<IVec>) {
        self.reads.borrow_mut().entry(key).or_insert(value);
    }

    /// Applies the write set unchanged. See [`SledLedger::commit_with`].
    pub fn commit(self) -> Result<Option<u64>, ContractError> {
        self.commit_with(|_, value, _| Ok(value.to_vec()))
    }

    /// Applies the write set atomically, provided every read is still current.
    ///
    /// The next commit position is taken inside the transaction and every
    /// buffered value is passed through `stamp` with it before being written.
    /// Returns that position, or `None` when there was nothing to write.
    pub fn commit_with<F>(self, stamp: F) -> Result<Option<u64>, ContractError>
    where
        F: Fn(&[u8], &[u8], u64) -> Result<Vec<u8>, ContractError>,
    {
        let reads = self.reads.into_inner();
        let writes = self.writes.into_inner();

        if writes.is_empty() {
            debug!(tx_id = %self.tx_id, "read-only invocation, nothing to commit");
            return Ok(None);
        }

        let outcome = self.tree.transaction(|tx| {
            for (key, seen) in &reads {
                if tx.get(key.as_slice())? != *seen {
                    return Err(ConflictableTransactionError::Abort(
                        ContractError::LedgerConflict {
                            key: hex::encode(key),
                        },
                    ));
                }
            }

            let committed =
                decode_position(tx.get(POSITION_KEY)?.as_ref()).map_err(ConflictableTransactionError::Abort)?;
            let position = committed + 1;

            for (key, value) in &writes {
                let stamped = stamp(key, value, position).map_err(ConflictableTransactionError::Abort)?;
                tx.insert(key.as_slice(), stamped)?;
            }
            tx.insert(POSITION_KEY, &position.to_be_bytes()[..])?;
            Ok(position)
        });

        match outcome {
            Ok(position) => {
                info!(
                    tx_id = %self.tx_id,
                    position,
                    writes = writes.len(),
                    "committed invocation"
                );
                Ok(Some(position))
            }
            Err(TransactionError::Abort(err)) => {
                warn!(tx_id = %self.tx_id, error = %err, "rejected invocation at commit");
                Err(err)
            }
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }
}

impl Ledger for SledLedger {
    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn get_state(&self, key: &CompositeKey) -> Result<Option<Vec<u8>>, ContractError> {
        let raw = key.to_bytes();
        let value = self.tree.get(&raw)?;
        debug!(key = %key, found = value.is_some(), "get_state");

        let result = value.as_ref().map(|v| v.to_vec());
        self.observe(raw, value);
        Ok(result)
    }

    fn put_state(&self, key: &CompositeKey, value: Vec<u8>) -> Result<(), ContractError> {
        debug!(key = %key, bytes = value.len(), "put_state");
        self.writes.borrow_mut().insert(key.to_bytes(), value);
        Ok(())
    }

    fn get_state_by_partial_key(
        &self,
        object_type: &str,
        attributes: &[&str],
    ) -> Result<Vec<(CompositeKey, Vec<u8>)>, ContractError> {
        let prefix = partial_key(object_type, attributes);
        let mut entries = vec![];

        for item in self.tree.scan_prefix(&prefix) {
            let (raw, value) = item?;
            let key = CompositeKey::from_bytes(&raw)?;
            entries.push((key, value.to_vec()));
            self.observe(raw.to_vec(), Some(value));
        }

        debug!(object_type, matched = entries.len(), "get_state_by_partial_key");
        Ok(entries)
    }
}
