//! Service layer: executes proposals against the contract and commits them
use super::context::ChainContext;
use super::contract::{Function, MedicineContract};
use super::error::ContractError;
use super::identity::{ApproverPolicy, Identity, MspPolicy};
use super::ledger::{Ledger, SledLedger};
use super::list::MedicineList;
use super::medicine::Medicine;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Name of the sled tree holding world state.
pub const LEDGER_TREE: &str = "medical-supply";

/// What a client asks the contract to do, and who is asking.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Proposal {
    #[n(0)]
    pub function: String,
    #[n(1)]
    pub args: Vec<String>,
    #[n(2)]
    pub creator: Identity,
}

/// A proposal that ran to completion but has not been committed yet.
#[derive(Debug)]
pub struct Simulated {
    pub tx_id: String,
    pub payload: Vec<u8>,
    function: Function,
    ledger: SledLedger,
}

pub struct MedicineService<P = MspPolicy> {
    instance: Arc<sled::Db>,
    tree: sled::Tree,
    contract: MedicineContract<P>,
}

impl Proposal {
    pub fn new(creator: &Identity, function: &str, args: &[&str]) -> Self {
        Self {
            function: function.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            creator: creator.clone(),
        }
    }

    /// Same proposal over the same committed height always yields the same id.
    /// Two committed invocations never share one: both would have read the
    /// keys they write from the same state, so the later one conflicts.
    pub fn tx_id(&self, height: u64) -> Result<String, ContractError> {
        let mut cbor = minicbor::to_vec(self)?;
        cbor.extend_from_slice(&height.to_be_bytes());
        Ok(sha256::digest(&cbor))
    }
}

impl MedicineService<MspPolicy> {
    /// Service approving only members of the regulators' organisation.
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, ContractError> {
        Self::with_contract(instance, MedicineContract::default())
    }
}

impl<P: ApproverPolicy> MedicineService<P> {
    pub fn with_contract(
        instance: Arc<sled::Db>,
        contract: MedicineContract<P>,
    ) -> Result<Self, ContractError> {
        let tree = instance.open_tree(LEDGER_TREE)?;
        Ok(Self {
            instance,
            tree,
            contract,
        })
    }

    /// Last committed position.
    pub fn height(&self) -> Result<u64, ContractError> {
        SledLedger::committed_position(&self.tree)
    }

    /// Runs a proposal against a fresh ledger handle without committing.
    #[instrument(skip(self, creator, args), fields(creator = creator.id()))]
    pub fn simulate(
        &self,
        creator: &Identity,
        function: &str,
        args: &[&str],
    ) -> Result<Simulated, ContractError> {
        let proposal = Proposal::new(creator, function, args);
        let parsed: Function = function.parse()?;
        let ledger = SledLedger::begin_with(self.tree.clone(), |height| proposal.tx_id(height))?;
        let tx_id = ledger.tx_id().to_string();

        let ledger = Rc::new(ledger);
        let ctx = ChainContext::new(proposal.creator, Rc::clone(&ledger));
        let payload = self.contract.invoke(&ctx, function, &proposal.args)?;
        drop(ctx);

        let ledger = Rc::try_unwrap(ledger).map_err(|_| ContractError::ContextLeaked)?;
        debug!(tx_id = %tx_id, read_only = ledger.is_read_only(), "proposal simulated");

        Ok(Simulated {
            tx_id,
            payload,
            function: parsed,
            ledger,
        })
    }

    /// Commits a simulated proposal, unless something it read has changed since.
    /// A returned record carries the position its new event was committed at.
    pub fn commit(&self, simulated: Simulated) -> Result<Vec<u8>, ContractError> {
        let Simulated {
            function,
            payload,
            ledger,
            ..
        } = simulated;

        let committed = ledger.commit_with(MedicineList::stamp_committed)?;
        self.instance.flush()?;

        match committed {
            Some(position) if function.returns_record() => {
                let mut medicine = Medicine::decode(&payload)?;
                medicine.stamp_pending(position);
                medicine.encode()
            }
            _ => Ok(payload),
        }
    }

    /// Simulates and commits in one step.
    pub fn submit(
        &self,
        creator: &Identity,
        function: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ContractError> {
        let simulated = self.simulate(creator, function, args)?;
        self.commit(simulated)
    }

    /// Runs a query; never writes, even if the function would.
    pub fn evaluate(
        &self,
        creator: &Identity,
        function: &str,
        args: &[&str],
    ) -> Result<Vec<u8>, ContractError> {
        let parsed: Function = function.parse()?;
        if !parsed.is_query() {
            debug!(function, "evaluating a mutating function, writes are discarded");
        }
        Ok(self.simulate(creator, function, args)?.payload)
    }
}
