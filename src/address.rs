use ethers::types::Address;
use ethers::utils::to_checksum;

/// Parses a candidate address. Returns `None` for anything that is not a
/// `0x`-prefixed 20-byte hex string, or for mixed-case input whose EIP-55
/// checksum does not match.
pub fn is_address(candidate: &str) -> Option<Address> {
    let digits = candidate.strip_prefix("0x")?;
    if digits.len() != 40 {
        return None;
    }
    let bytes = hex::decode(digits).ok()?;
    let address = Address::from_slice(&bytes);

    let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && checksum(&address) != candidate {
        return None;
    }
    Some(address)
}

pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    #[test]
    fn lowercase_address_is_normalised() {
        let address = is_address(&CHECKSUMMED.to_lowercase()).unwrap();
        assert_eq!(checksum(&address), CHECKSUMMED);
    }

    #[test]
    fn checksummed_address_is_accepted() {
        assert!(is_address(CHECKSUMMED).is_some());
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let broken = CHECKSUMMED.replace("aAeb", "AAeb");
        assert!(is_address(&broken).is_none());
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(is_address("").is_none());
        assert!(is_address("0x1234").is_none());
        assert!(is_address(&CHECKSUMMED[2..]).is_none());
        assert!(is_address("0xzzzeb6053f3e94c9b9a09f33669435e7ef1beaed").is_none());
    }
}
