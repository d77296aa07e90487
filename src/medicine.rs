//! Medicine records, their keys and typed attributes
use super::error::ContractError;
use super::event::{Event, EventKind};
use super::ledger::CompositeKey;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Object type prefix shared by every medicine composite key.
pub const MEDICINE_OBJECT_TYPE: &str = "medicine";

const DATE_FORMAT: &str = "%Y.%m.%d";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MedicineKey {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub id: String,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedicineState {
    #[n(0)]
    Issued,
    #[n(1)]
    Requested,
    #[n(2)]
    Approved,
}

/// Manufacture or expiry date in `YYYY.MM.DD` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReferenceDate(NaiveDate);

/// Price in minor units (cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Price(u64);

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Medicine {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub id: String,
    #[n(2)]
    pub category: String,
    #[n(3)]
    pub date: String, // as submitted, see Medicine::reference_date
    #[n(4)]
    pub price: String, // as submitted, see Medicine::price_value
    #[n(5)]
    pub state: MedicineState,
    #[n(6)]
    pub owner: String, // enrollment id of the issuer
    #[n(7)]
    pub requester: Option<String>,
    #[n(8)]
    pub events: Vec<Event>,
}

// Raw issue arguments, validated into a Medicine on finalise
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MedicineDetails {
    name: Option<String>,
    id: Option<String>,
    category: Option<String>,
    date: Option<String>,
    price: Option<String>,
}

impl MedicineKey {
    pub fn new(name: &str, id: &str) -> Result<Self, ContractError> {
        for (field, value) in [("name", name), ("id", id)] {
            if value.is_empty() {
                return Err(ContractError::InvalidArgument(format!(
                    "medicine {field} is empty"
                )));
            }
            if value.contains('\u{0}') {
                return Err(ContractError::InvalidArgument(format!(
                    "medicine {field} contains a NUL character"
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            id: id.to_string(),
        })
    }

    pub fn composite(&self) -> CompositeKey {
        CompositeKey::new(MEDICINE_OBJECT_TYPE, [self.name.as_str(), self.id.as_str()])
    }
}

impl fmt::Display for MedicineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.id)
    }
}

impl MedicineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MedicineState::Issued => "Issued",
            MedicineState::Requested => "Requested",
            MedicineState::Approved => "Approved",
        }
    }
}

impl fmt::Display for MedicineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ReferenceDate {
    pub fn to_naive_date(&self) -> NaiveDate {
        self.0
    }
}

impl FromStr for ReferenceDate {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(ReferenceDate)
            .map_err(|e| ContractError::InvalidArgument(format!("date {s:?}: {e}")))
    }
}

impl fmt::Display for ReferenceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl From<NaiveDate> for ReferenceDate {
    fn from(value: NaiveDate) -> Self {
        ReferenceDate(value)
    }
}

impl Price {
    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }
    pub fn cents(&self) -> u64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = ContractError;

    /// Accepts `10`, `$10`, `$10.5` and `$10.50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ContractError::InvalidArgument(format!("price {s:?}"));

        let amount = s.trim();
        let amount = amount.strip_prefix('$').unwrap_or(amount);
        let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if amount.ends_with('.') {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(cents))
            .map(Price)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl MedicineDetails {
    /// Construct a new builder object, this becomes the basis for an issue
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn set_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
    pub fn set_date(mut self, date: &str) -> Self {
        self.date = Some(date.to_string());
        self
    }
    pub fn set_price(mut self, price: &str) -> Self {
        self.price = Some(price.to_string());
        self
    }
    /// Checks the key and that every field is set, then returns a freshly
    /// issued record with no events yet. Category, date and price are kept
    /// exactly as given.
    pub fn validate_and_finalise(&self, owner: &str) -> Result<Medicine, ContractError> {
        let missing = |field: &str| ContractError::InvalidArgument(format!("{field} is not set"));

        let name = self.name.as_deref().ok_or_else(|| missing("name"))?;
        let id = self.id.as_deref().ok_or_else(|| missing("id"))?;
        let key = MedicineKey::new(name, id)?;

        let category = self.category.clone().ok_or_else(|| missing("category"))?;
        let date = self.date.clone().ok_or_else(|| missing("date"))?;
        let price = self.price.clone().ok_or_else(|| missing("price"))?;

        Ok(Medicine {
            name: key.name,
            id: key.id,
            category,
            date,
            price,
            state: MedicineState::Issued,
            owner: owner.to_string(),
            requester: None,
            events: vec![],
        })
    }
}

impl Medicine {
    pub fn key(&self) -> MedicineKey {
        MedicineKey {
            name: self.name.clone(),
            id: self.id.clone(),
        }
    }

    /// The reference date, if it is a real calendar date in `YYYY.MM.DD` form.
    pub fn reference_date(&self) -> Option<ReferenceDate> {
        self.date.parse().ok()
    }

    /// The price in cents, if it reads as an amount like `$10` or `10.50`.
    pub fn price_value(&self) -> Option<Price> {
        self.price.parse().ok()
    }

    /// Fails unless the record is currently in `expected`.
    pub fn ensure_state(
        &self,
        expected: MedicineState,
        operation: &'static str,
    ) -> Result<(), ContractError> {
        if self.state != expected {
            return Err(ContractError::InvalidStateTransition {
                key: self.key(),
                operation,
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub fn append_event(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Assigns `position` to every event still waiting for its commit.
    pub fn stamp_pending(&mut self, position: u64) {
        for event in self.events.iter_mut().filter(|event| event.is_pending()) {
            event.position = Some(position);
        }
    }

    /// State implied by the latest event, `None` for a record with no history.
    pub fn derived_state(&self) -> Option<MedicineState> {
        self.events.last().map(|event| match event.kind {
            EventKind::Issue => MedicineState::Issued,
            EventKind::Request { .. } => MedicineState::Requested,
            EventKind::Approve => MedicineState::Approved,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ContractError> {
        Ok(minicbor::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ContractError> {
        Ok(minicbor::decode(bytes)?)
    }
}
