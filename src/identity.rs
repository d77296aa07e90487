//! Caller identities and the policies that decide who may approve
use std::collections::BTreeMap;

/// Organisation of the regulators, who alone approve requests by default.
pub const DEFAULT_REGULATOR_MSP: &str = "Org2MSP";

/// Authenticated principal behind an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct Identity {
    #[n(0)]
    msp_id: String, // membership service provider, i.e. the organisation
    #[n(1)]
    id: String, // enrollment id
    #[n(2)]
    attributes: BTreeMap<String, String>,
}

/// Predicate deciding whether an identity may approve a requested medicine.
pub trait ApproverPolicy {
    fn permits(&self, identity: &Identity) -> bool;
}

/// Permits members of one organisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspPolicy {
    msp_id: String,
}

/// Permits identities carrying `attribute` with exactly `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePolicy {
    attribute: String,
    value: String,
}

impl Identity {
    pub fn new(msp_id: &str, id: &str) -> Self {
        Self {
            msp_id: msp_id.to_string(),
            id: id.to_string(),
            attributes: BTreeMap::new(),
        }
    }
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }
    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
    pub fn assert_attribute(&self, name: &str, value: &str) -> bool {
        self.attribute(name) == Some(value)
    }
}

impl MspPolicy {
    pub fn new(msp_id: &str) -> Self {
        Self {
            msp_id: msp_id.to_string(),
        }
    }
}

impl Default for MspPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REGULATOR_MSP)
    }
}

impl ApproverPolicy for MspPolicy {
    fn permits(&self, identity: &Identity) -> bool {
        identity.msp_id() == self.msp_id
    }
}

impl AttributePolicy {
    pub fn new(attribute: &str, value: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            value: value.to_string(),
        }
    }
}

impl ApproverPolicy for AttributePolicy {
    fn permits(&self, identity: &Identity) -> bool {
        identity.assert_attribute(&self.attribute, &self.value)
    }
}

impl<F> ApproverPolicy for F
where
    F: Fn(&Identity) -> bool,
{
    fn permits(&self, identity: &Identity) -> bool {
        self(identity)
    }
}
