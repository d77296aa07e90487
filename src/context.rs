//! Per-invocation capability context
use super::identity::Identity;
use super::ledger::{Ledger, SledLedger};
use super::list::{MedicineList, RecordCollection};
use std::cell::OnceCell;
use std::rc::Rc;

/// Everything a contract operation may touch during one invocation.
///
/// Repeated calls return the same underlying resources. Nothing obtained
/// here may be kept once the invocation returns.
pub trait TransactionContext {
    fn client_identity(&self) -> &Identity;
    fn stub(&self) -> &dyn Ledger;
    fn medicine_list(&self) -> &dyn RecordCollection;
}

/// Production context over a [`SledLedger`].
pub struct ChainContext {
    identity: Identity,
    stub: Rc<SledLedger>,
    list: OnceCell<MedicineList>,
}

impl ChainContext {
    pub fn new(identity: Identity, stub: Rc<SledLedger>) -> Self {
        Self {
            identity,
            stub,
            list: OnceCell::new(),
        }
    }
}

impl TransactionContext for ChainContext {
    fn client_identity(&self) -> &Identity {
        &self.identity
    }

    fn stub(&self) -> &dyn Ledger {
        &*self.stub
    }

    fn medicine_list(&self) -> &dyn RecordCollection {
        self.list.get_or_init(|| {
            let ledger: Rc<dyn Ledger> = self.stub.clone();
            MedicineList::new(ledger)
        })
    }
}
