//! Client-side helpers. Nothing here may run inside the contract: these
//! produce fresh values on every call.
use super::identity::Identity;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique enrollment id then encode using bech32
pub fn new_enrollment_id(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Enrolls a new member of `msp_id` under a fresh enrollment id.
pub fn enroll(msp_id: &str, hrp: &str) -> anyhow::Result<Identity> {
    Ok(Identity::new(msp_id, &new_enrollment_id(hrp)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_ids_are_unique() {
        let first = new_enrollment_id("user_").unwrap();
        let second = new_enrollment_id("user_").unwrap();

        assert!(first.starts_with("user_1"));
        assert_ne!(first, second);
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_enrollment_id("").is_err());
        assert!(enroll("Org1MSP", "").is_err());
    }
}
