use super::medicine::MedicineKey;

/// One lifecycle transition, appended to a record and never rewritten.
#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Event {
    #[n(0)]
    pub key: MedicineKey, // record the event belongs to
    #[n(1)]
    pub actor: String, // enrollment id of the invoking identity
    #[n(2)]
    pub position: Option<u64>, // commit position, None until the invocation commits
    #[n(3)]
    pub tx_id: String,
    #[n(4)]
    pub kind: EventKind,
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum EventKind {
    #[n(0)]
    Issue,
    #[n(1)]
    Request {
        #[n(0)]
        requester: String,
    },
    #[n(2)]
    Approve,
}

impl Event {
    /// A pending event; the ledger assigns its position when the invocation commits.
    pub fn new(key: MedicineKey, actor: String, tx_id: String, kind: EventKind) -> Self {
        Self {
            key,
            actor,
            position: None,
            tx_id,
            kind,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.position.is_none()
    }

    /// Ordering used by history queries: commit position, then record key.
    pub fn sort_key(&self) -> (Option<u64>, &MedicineKey) {
        (self.position, &self.key)
    }
}
