//! The medicine lifecycle contract: Issued -> Requested -> Approved
use super::context::TransactionContext;
use super::error::ContractError;
use super::event::{Event, EventKind};
use super::identity::{ApproverPolicy, MspPolicy};
use super::medicine::{Medicine, MedicineDetails, MedicineKey, MedicineState};
use std::fmt;
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// Records seeded by [`MedicineContract::init_ledger`]:
/// name, id, category, date, price.
pub const SAMPLE_MEDICINES: [[&str; 5]; 3] = [
    ["Aspirin", "00001", "Pain management", "2022.05.09", "$10"],
    ["Synthroid", "00002", "Thyroid deficiency", "2023.01.15", "$25"],
    ["Amoxil", "00003", "Bacterial infections", "2022.11.30", "$12.50"],
];

/// Functions a client can name when invoking the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    InitLedger,
    Issue,
    Request,
    Approve,
    CheckHistory,
    ReadMedicine,
}

pub struct MedicineContract<P = MspPolicy> {
    approvers: P,
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::InitLedger => "InitLedger",
            Function::Issue => "Issue",
            Function::Request => "Request",
            Function::Approve => "Approve",
            Function::CheckHistory => "CheckHistory",
            Function::ReadMedicine => "ReadMedicine",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::InitLedger => 0,
            Function::Issue => 5,
            Function::Request => 3,
            Function::Approve | Function::ReadMedicine => 2,
            Function::CheckHistory => 1,
        }
    }

    /// Read-only functions never write, so there is nothing to commit.
    pub fn is_query(&self) -> bool {
        matches!(self, Function::CheckHistory | Function::ReadMedicine)
    }

    /// Functions whose result is a single medicine record.
    pub fn returns_record(&self) -> bool {
        matches!(
            self,
            Function::Issue | Function::Request | Function::Approve | Function::ReadMedicine
        )
    }
}

impl FromStr for Function {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "InitLedger" | "Initialize" => Ok(Function::InitLedger),
            "Issue" => Ok(Function::Issue),
            "Request" => Ok(Function::Request),
            "Approve" => Ok(Function::Approve),
            "CheckHistory" => Ok(Function::CheckHistory),
            "ReadMedicine" => Ok(Function::ReadMedicine),
            other => Err(ContractError::UnknownFunction(other.to_string())),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for MedicineContract<MspPolicy> {
    fn default() -> Self {
        Self::new(MspPolicy::default())
    }
}

impl<P: ApproverPolicy> MedicineContract<P> {
    pub fn new(approvers: P) -> Self {
        Self { approvers }
    }

    /// Dispatches a named function with string arguments and returns the
    /// CBOR encoding of its result.
    pub fn invoke(
        &self,
        ctx: &dyn TransactionContext,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, ContractError> {
        let function: Function = function.parse()?;
        if args.len() != function.arity() {
            return Err(ContractError::InvalidArgument(format!(
                "{function} takes {} arguments, got {}",
                function.arity(),
                args.len()
            )));
        }
        let arg = |i: usize| args[i].as_str();

        match function {
            Function::InitLedger => {
                self.init_ledger(ctx)?;
                Ok(vec![])
            }
            Function::Issue => self
                .issue(ctx, arg(0), arg(1), arg(2), arg(3), arg(4))?
                .encode(),
            Function::Request => self.request(ctx, arg(0), arg(1), arg(2))?.encode(),
            Function::Approve => self.approve(ctx, arg(0), arg(1))?.encode(),
            Function::CheckHistory => Ok(minicbor::to_vec(self.check_history(ctx, arg(0))?)?),
            Function::ReadMedicine => self.read_medicine(ctx, arg(0), arg(1))?.encode(),
        }
    }

    /// Seeds [`SAMPLE_MEDICINES`]. A one-time bootstrap: if any sample
    /// already exists the whole invocation fails and nothing is written.
    #[instrument(skip_all)]
    pub fn init_ledger(&self, ctx: &dyn TransactionContext) -> Result<(), ContractError> {
        for [name, id, category, date, price] in SAMPLE_MEDICINES {
            let details = MedicineDetails::new()
                .set_name(name)
                .set_id(id)
                .set_category(category)
                .set_date(date)
                .set_price(price);
            self.issue_details(ctx, &details)?;
        }
        info!(seeded = SAMPLE_MEDICINES.len(), "ledger initialised");
        Ok(())
    }

    #[instrument(skip(self, ctx, category, date, price))]
    pub fn issue(
        &self,
        ctx: &dyn TransactionContext,
        name: &str,
        id: &str,
        category: &str,
        date: &str,
        price: &str,
    ) -> Result<Medicine, ContractError> {
        let details = MedicineDetails::new()
            .set_name(name)
            .set_id(id)
            .set_category(category)
            .set_date(date)
            .set_price(price);

        self.issue_details(ctx, &details)
    }

    fn issue_details(
        &self,
        ctx: &dyn TransactionContext,
        details: &MedicineDetails,
    ) -> Result<Medicine, ContractError> {
        let caller = ctx.client_identity().id().to_string();
        let mut medicine = details.validate_and_finalise(&caller)?;
        let key = medicine.key();

        let list = ctx.medicine_list();
        if list.contains(&key)? {
            return Err(ContractError::AlreadyExists(key));
        }

        let stub = ctx.stub();
        medicine.append_event(Event::new(
            key.clone(),
            caller,
            stub.tx_id().to_string(),
            EventKind::Issue,
        ));
        list.put(&key, &medicine)?;

        info!(key = %key, owner = %medicine.owner, "medicine issued");
        Ok(medicine)
    }

    #[instrument(skip(self, ctx))]
    pub fn request(
        &self,
        ctx: &dyn TransactionContext,
        name: &str,
        id: &str,
        requester: &str,
    ) -> Result<Medicine, ContractError> {
        let key = MedicineKey::new(name, id)?;
        if requester.is_empty() {
            return Err(ContractError::InvalidArgument("requester is empty".into()));
        }

        let list = ctx.medicine_list();
        let mut medicine = list.get(&key)?;
        medicine.ensure_state(MedicineState::Issued, "request")?;

        let caller = ctx.client_identity().id().to_string();
        let stub = ctx.stub();
        medicine.requester = Some(requester.to_string());
        medicine.state = MedicineState::Requested;
        medicine.append_event(Event::new(
            key.clone(),
            caller,
            stub.tx_id().to_string(),
            EventKind::Request {
                requester: requester.to_string(),
            },
        ));
        list.put(&key, &medicine)?;

        info!(key = %key, requester, "medicine requested");
        Ok(medicine)
    }

    #[instrument(skip(self, ctx))]
    pub fn approve(
        &self,
        ctx: &dyn TransactionContext,
        name: &str,
        id: &str,
    ) -> Result<Medicine, ContractError> {
        let key = MedicineKey::new(name, id)?;

        let list = ctx.medicine_list();
        let mut medicine = list.get(&key)?;
        medicine.ensure_state(MedicineState::Requested, "approve")?;

        let caller = ctx.client_identity();
        if !self.approvers.permits(caller) {
            warn!(key = %key, caller = caller.id(), msp_id = caller.msp_id(), "approval refused");
            return Err(ContractError::Authorization {
                identity: caller.id().to_string(),
                msp_id: caller.msp_id().to_string(),
                operation: "approve",
            });
        }

        let stub = ctx.stub();
        medicine.state = MedicineState::Approved;
        medicine.append_event(Event::new(
            key.clone(),
            caller.id().to_string(),
            stub.tx_id().to_string(),
            EventKind::Approve,
        ));
        list.put(&key, &medicine)?;

        info!(key = %key, approver = caller.id(), "medicine approved");
        Ok(medicine)
    }

    /// Events acted by `identity`, oldest first. Unknown identities get an empty list.
    #[instrument(skip(self, ctx))]
    pub fn check_history(
        &self,
        ctx: &dyn TransactionContext,
        identity: &str,
    ) -> Result<Vec<Event>, ContractError> {
        ctx.medicine_list().history(identity)
    }

    #[instrument(skip(self, ctx))]
    pub fn read_medicine(
        &self,
        ctx: &dyn TransactionContext,
        name: &str,
        id: &str,
    ) -> Result<Medicine, ContractError> {
        let key = MedicineKey::new(name, id)?;
        ctx.medicine_list().get(&key)
    }
}
