//! Walks the medicine lifecycle end to end against a local ledger:
//! init, issue, request, history, approve, then a small issue workload.
//!
//! `MEDSUPPLY_LEDGER_PATH` chooses the sled directory; `RUST_LOG` the verbosity.
use anyhow::Context;
use medical_supply::{
    config::{self, ClientConfig},
    error::ContractError,
    event::Event,
    identity::{DEFAULT_REGULATOR_MSP, Identity},
    medicine::Medicine,
    service::MedicineService,
    utils,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const MEDICINE_NAMES: [&str; 11] = [
    "aspirin", "vicodin", "synthroid", "delasone", "amoxil", "neurontin", "zestril", "lipitor",
    "glucophage", "zofran", "ibuprofen",
];
const CONDITIONS: [&str; 9] = [
    "Pain management",
    "Thyroid deficiency",
    "Arthritis",
    "Bacterial infections",
    "Seizures",
    "Blood pressure",
    "High cholesterol",
    "Type 2 diabetes",
    "Fever",
];

fn print_medicine(payload: &[u8]) -> anyhow::Result<()> {
    let medicine = Medicine::decode(payload)?;
    info!(
        medicine = %medicine.key(),
        state = %medicine.state,
        price = %medicine.price,
        date = %medicine.date,
        requester = ?medicine.requester,
        "{}",
        hex::encode(payload)
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("============ Application starts ============");
    let config = config::init(ClientConfig::from_env()?)?;
    info!(
        channel = %config.channel_name,
        chaincode = %config.chaincode_name,
        discovery_as_localhost = config.discovery_as_localhost,
        "client configured"
    );

    let db = Arc::new(sled::open(&config.ledger_path).context("failed to open ledger")?);
    let service = MedicineService::new(db)?;

    let customer = Identity::new(&config.msp_id, &config.app_user);
    let regulator = utils::enroll(DEFAULT_REGULATOR_MSP, "regulator_")?;

    info!("--> Submit Transaction: InitLedger, creates the initial set of medical supply");
    match service.submit(&customer, "InitLedger", &[]) {
        Ok(_) => info!("ledger initialised"),
        Err(ContractError::AlreadyExists(key)) => warn!(%key, "ledger was already initialised"),
        Err(err) => return Err(err.into()),
    }

    info!("--> Submit Transaction: Issue, issues a medicine");
    match service.submit(
        &customer,
        "Issue",
        &["Aspirin", "00012", "Pain management", "2022.05.09", "$10"],
    ) {
        Ok(payload) => print_medicine(&payload)?,
        Err(ContractError::AlreadyExists(key)) => warn!(%key, "medicine was already issued"),
        Err(err) => return Err(err.into()),
    }

    info!("--> Submit Transaction: Request, requests a medicine");
    match service.submit(&customer, "Request", &["Aspirin", "00001", "Alice"]) {
        Ok(payload) => print_medicine(&payload)?,
        Err(err @ ContractError::InvalidStateTransition { .. }) => warn!(error = %err, "already requested"),
        Err(err) => return Err(anyhow::Error::new(err).context("Failed to submit Request")),
    }

    info!("--> Evaluate Transaction: CheckHistory, shows history");
    let payload = service.evaluate(&customer, "CheckHistory", &[config.app_user.as_str()])?;
    let history: Vec<Event> = minicbor::decode(&payload)?;
    if history.is_empty() {
        info!("Ledger has no transaction history.");
    }
    for event in &history {
        info!(position = ?event.position, medicine = %event.key, kind = ?event.kind, tx_id = %event.tx_id);
    }

    info!("--> Submit Transaction: Approve, approves a medicine and changes its state");
    match service.submit(&regulator, "Approve", &["Aspirin", "00001"]) {
        Ok(payload) => print_medicine(&payload)?,
        Err(err @ ContractError::InvalidStateTransition { .. }) => warn!(error = %err, "already approved"),
        Err(err) => return Err(anyhow::Error::new(err).context("Failed to submit Approve")),
    }

    info!("--> Issue workload, simulated together then committed");
    let mut pending = vec![];
    for (index, name) in MEDICINE_NAMES.into_iter().enumerate() {
        let condition = CONDITIONS[index % CONDITIONS.len()];
        let number = utils::new_enrollment_id("med")?;
        let date = format!(
            "{}.{:02}.{:02}",
            2020 + index % 10,
            (index * 5) % 12 + 1,
            (index * 11) % 31 + 1
        );
        let price = ((index * 97) % 1000).to_string();

        let args = [name, number.as_str(), condition, date.as_str(), price.as_str()];
        pending.push(service.simulate(&customer, "Issue", &args)?);
    }
    for simulated in pending {
        print_medicine(&service.commit(simulated)?)?;
    }
    info!(height = service.height()?, "workload committed");

    info!("============ Application ends ============");
    Ok(())
}
