//! End-to-end scenarios through the service: proposals are simulated against
//! a sled-backed ledger and committed with conflict detection.
use anyhow::Context;
use medical_supply::{
    error::ContractError,
    event::{Event, EventKind},
    identity::Identity,
    medicine::{Medicine, MedicineKey, MedicineState},
    service::{LEDGER_TREE, MedicineService},
};
use sled::open;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

// Sled locks its directory, so every test gets its own database on temp.
fn open_service(name: &str) -> anyhow::Result<(TempDir, Arc<sled::Db>, MedicineService)> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join(name))?);
    let service = MedicineService::new(db.clone())?;
    Ok((temp_dir, db, service))
}

fn alice() -> Identity {
    Identity::new("Org1MSP", "Alice")
}

fn regulator() -> Identity {
    Identity::new("Org2MSP", "regulator")
}

fn read(service: &MedicineService, name: &str, id: &str) -> anyhow::Result<Medicine> {
    let payload = service.evaluate(&alice(), "ReadMedicine", &[name, id])?;
    Ok(Medicine::decode(&payload)?)
}

fn raw_value(db: &sled::Db, name: &str, id: &str) -> anyhow::Result<Option<Vec<u8>>> {
    let key = MedicineKey::new(name, id)?.composite().to_bytes();
    Ok(db.open_tree(LEDGER_TREE)?.get(key)?.map(|v| v.to_vec()))
}

const ASPIRIN: [&str; 5] = ["Aspirin", "00012", "Pain management", "2022.05.09", "$10"];

#[test]
fn issue_request_approve_and_history() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("lifecycle.db")?;

    // 1. issue
    let payload = service
        .submit(&alice(), "Issue", &ASPIRIN)
        .context("Medicine failed on Issue: ")?;
    let issued = Medicine::decode(&payload)?;
    assert_eq!(issued.state, MedicineState::Issued);
    assert_eq!(issued.owner, "Alice");
    assert_eq!(issued.category, "Pain management");
    assert_eq!(issued.date, "2022.05.09");
    assert_eq!(issued.price, "$10");
    assert_eq!(issued.events[0].position, Some(1));
    assert_eq!(read(&service, "Aspirin", "00012")?, issued);

    // 2. request
    let payload = service
        .submit(&alice(), "Request", &["Aspirin", "00012", "Alice"])
        .context("Medicine failed on Request: ")?;
    let requested = Medicine::decode(&payload)?;
    assert_eq!(requested.state, MedicineState::Requested);
    assert_eq!(requested.requester.as_deref(), Some("Alice"));

    // 3. a customer cannot approve
    let err = service
        .submit(&alice(), "Approve", &["Aspirin", "00012"])
        .unwrap_err();
    assert!(matches!(err, ContractError::Authorization { .. }));
    assert!(!err.is_retryable());
    assert_eq!(read(&service, "Aspirin", "00012")?.state, MedicineState::Requested);

    // 4. the regulator can
    let payload = service
        .submit(&regulator(), "Approve", &["Aspirin", "00012"])
        .context("Medicine failed on Approval: ")?;
    let approved = Medicine::decode(&payload)?;
    assert_eq!(approved.state, MedicineState::Approved);
    assert_eq!(approved.requester.as_deref(), Some("Alice"));
    assert_eq!(approved.events.len(), 3);
    assert_eq!(approved.derived_state(), Some(MedicineState::Approved));

    // 5. history of the requester
    let payload = service.evaluate(&alice(), "CheckHistory", &["Alice"])?;
    let history: Vec<Event> = minicbor::decode(&payload)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].kind, EventKind::Issue);
    assert_eq!(
        history[1].kind,
        EventKind::Request {
            requester: "Alice".into()
        }
    );
    assert!(history.windows(2).all(|w| w[0].position <= w[1].position));

    let payload = service.evaluate(&alice(), "CheckHistory", &["regulator"])?;
    let history: Vec<Event> = minicbor::decode(&payload)?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EventKind::Approve);

    // the rejected approval never committed
    assert_eq!(service.height()?, 3);

    Ok(())
}

#[test]
fn request_for_unissued_id_is_not_found() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("unissued.db")?;

    service.submit(&alice(), "Issue", &ASPIRIN)?;

    let err = service
        .submit(&alice(), "Request", &["Aspirin", "00001", "Alice"])
        .unwrap_err();
    assert!(matches!(err, ContractError::NotFound(ref key) if key.id == "00001"));

    let err = service
        .submit(&regulator(), "Approve", &["Aspirin", "00001"])
        .unwrap_err();
    assert!(matches!(err, ContractError::NotFound(_)));

    Ok(())
}

#[test]
fn seeded_record_can_be_requested_after_init() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("seeded.db")?;

    let payload = service.submit(&alice(), "InitLedger", &[])?;
    assert!(payload.is_empty());
    service.submit(&alice(), "Issue", &ASPIRIN)?;

    let payload = service.submit(&alice(), "Request", &["Aspirin", "00001", "Alice"])?;
    assert_eq!(Medicine::decode(&payload)?.state, MedicineState::Requested);

    let payload = service.submit(&regulator(), "Approve", &["Aspirin", "00001"])?;
    assert_eq!(Medicine::decode(&payload)?.state, MedicineState::Approved);

    // the separately issued 00012 is untouched
    assert_eq!(read(&service, "Aspirin", "00012")?.state, MedicineState::Issued);

    Ok(())
}

#[test]
fn init_is_a_one_time_bootstrap() -> anyhow::Result<()> {
    let (_dir, db, service) = open_service("init_twice.db")?;

    service.submit(&alice(), "Initialize", &[])?;
    let height = service.height()?;
    let before = raw_value(&db, "Synthroid", "00002")?;
    assert!(before.is_some());

    let err = service.submit(&regulator(), "InitLedger", &[]).unwrap_err();
    assert!(matches!(err, ContractError::AlreadyExists(_)));
    assert_eq!(service.height()?, height);
    assert_eq!(raw_value(&db, "Synthroid", "00002")?, before);

    Ok(())
}

#[test]
fn duplicate_issue_leaves_ledger_unchanged() -> anyhow::Result<()> {
    let (_dir, db, service) = open_service("duplicate.db")?;

    service.submit(&alice(), "Issue", &ASPIRIN)?;
    let before = raw_value(&db, "Aspirin", "00012")?;

    let err = service
        .submit(
            &regulator(),
            "Issue",
            &["Aspirin", "00012", "Fever", "2024.01.01", "$99"],
        )
        .unwrap_err();

    assert!(matches!(err, ContractError::AlreadyExists(_)));
    assert_eq!(raw_value(&db, "Aspirin", "00012")?, before);
    assert_eq!(read(&service, "Aspirin", "00012")?.owner, "Alice");

    Ok(())
}

#[test]
fn approved_record_cannot_be_requested_again() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("approved.db")?;

    service.submit(&alice(), "Issue", &ASPIRIN)?;
    service.submit(&alice(), "Request", &["Aspirin", "00012", "Alice"])?;
    service.submit(&regulator(), "Approve", &["Aspirin", "00012"])?;

    let err = service
        .submit(&alice(), "Request", &["Aspirin", "00012", "Bob"])
        .unwrap_err();
    assert!(matches!(
        err,
        ContractError::InvalidStateTransition {
            actual: MedicineState::Approved,
            expected: MedicineState::Issued,
            ..
        }
    ));

    // requester stays bound to the first request
    assert_eq!(
        read(&service, "Aspirin", "00012")?.requester.as_deref(),
        Some("Alice")
    );

    Ok(())
}

#[test]
fn approve_before_request_is_rejected() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("early_approve.db")?;

    service.submit(&alice(), "Issue", &ASPIRIN)?;
    let err = service
        .submit(&regulator(), "Approve", &["Aspirin", "00012"])
        .unwrap_err();

    assert!(matches!(err, ContractError::InvalidStateTransition { .. }));
    assert_eq!(read(&service, "Aspirin", "00012")?.state, MedicineState::Issued);

    Ok(())
}

#[test]
fn concurrent_requests_conflict() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("conflict.db")?;
    let bob = Identity::new("Org1MSP", "Bob");

    service.submit(&alice(), "Issue", &ASPIRIN)?;

    // both read the same committed record before either commits
    let first = service.simulate(&alice(), "Request", &["Aspirin", "00012", "Alice"])?;
    let second = service.simulate(&bob, "Request", &["Aspirin", "00012", "Bob"])?;
    assert_ne!(first.tx_id, second.tx_id);

    service.commit(first)?;
    let err = service.commit(second).unwrap_err();

    assert!(matches!(err, ContractError::LedgerConflict { .. }));
    assert!(err.is_retryable());
    assert_eq!(
        read(&service, "Aspirin", "00012")?.requester.as_deref(),
        Some("Alice")
    );

    // a retry sees the new state and fails for a business reason instead
    let err = service
        .submit(&bob, "Request", &["Aspirin", "00012", "Bob"])
        .unwrap_err();
    assert!(matches!(err, ContractError::InvalidStateTransition { .. }));

    Ok(())
}

#[test]
fn concurrent_issues_of_distinct_medicines_both_commit() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("distinct.db")?;
    let bob = Identity::new("Org1MSP", "Bob");

    let aspirin = service.simulate(&alice(), "Issue", &["Aspirin", "1", "Pain management", "2022.05.09", "$10"])?;
    let zofran = service.simulate(&bob, "Issue", &["Zofran", "2", "Nausea", "2023.07.01", "$4"])?;

    let aspirin = Medicine::decode(&service.commit(aspirin)?)?;
    let zofran = Medicine::decode(&service.commit(zofran)?)?;

    assert_eq!(aspirin.events[0].position, Some(1));
    assert_eq!(zofran.events[0].position, Some(2));
    assert_eq!(read(&service, "Zofran", "2")?, zofran);
    assert_eq!(service.height()?, 2);

    Ok(())
}

#[test]
fn issued_fields_are_stored_as_submitted() -> anyhow::Result<()> {
    let (_dir, db, service) = open_service("verbatim.db")?;

    service.submit(
        &alice(),
        "Issue",
        &["Aspirin", "00012", "Pain management", "2021.02.30", "537"],
    )?;
    service.submit(
        &alice(),
        "Issue",
        &["Zofran", "00013", "Nausea", "2022.5.9", "$4.5"],
    )?;

    let aspirin = read(&service, "Aspirin", "00012")?;
    assert_eq!(aspirin.date, "2021.02.30");
    assert_eq!(aspirin.price, "537");
    assert_eq!(aspirin.reference_date(), None);
    assert_eq!(aspirin.price_value().map(|p| p.cents()), Some(53_700));

    let zofran = read(&service, "Zofran", "00013")?;
    assert_eq!(zofran.date, "2022.5.9");
    assert_eq!(zofran.price, "$4.5");

    // the stored bytes decode to exactly what was read back
    let raw = raw_value(&db, "Aspirin", "00012")?.context("record missing")?;
    assert_eq!(Medicine::decode(&raw)?, aspirin);

    Ok(())
}

#[test]
fn evaluate_never_writes() -> anyhow::Result<()> {
    let (_dir, db, service) = open_service("evaluate.db")?;

    let payload = service.evaluate(&alice(), "Issue", &ASPIRIN)?;
    assert_eq!(Medicine::decode(&payload)?.state, MedicineState::Issued);

    assert_eq!(raw_value(&db, "Aspirin", "00012")?, None);
    assert_eq!(service.height()?, 0);

    Ok(())
}

#[test]
fn history_of_unknown_identity_is_empty() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("empty_history.db")?;

    service.submit(&alice(), "InitLedger", &[])?;
    let payload = service.evaluate(&alice(), "CheckHistory", &["nobody"])?;
    let history: Vec<Event> = minicbor::decode(&payload)?;

    assert!(history.is_empty());

    Ok(())
}

#[test]
fn bad_invocations_are_classified() -> anyhow::Result<()> {
    let (_dir, _db, service) = open_service("bad_invocations.db")?;

    let err = service.submit(&alice(), "Burn", &[]).unwrap_err();
    assert!(matches!(err, ContractError::UnknownFunction(_)));

    let err = service.submit(&alice(), "Issue", &["Aspirin"]).unwrap_err();
    assert!(matches!(err, ContractError::InvalidArgument(_)));

    let err = service
        .submit(
            &alice(),
            "Issue",
            &["Aspirin", "", "Pain management", "2022.05.09", "$10"],
        )
        .unwrap_err();
    assert!(matches!(err, ContractError::InvalidArgument(_)));

    assert_eq!(service.height()?, 0);

    Ok(())
}
