//! Frame Check Sequence
//!
//! Single-byte XOR over `CMD0..DATA`. The start marker and the FCS byte
//! itself are never part of the input.

/// XOR-fold `bytes`; an empty slice yields 0
#[must_use]
pub fn compute_fcs(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}

/// Continue an FCS over another chunk of the same frame
#[must_use]
pub fn update_fcs(fcs: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(fcs, |acc, &b| acc ^ b)
}

/// Check a received FCS against `bytes`
#[must_use]
pub fn verify_fcs(bytes: &[u8], claimed: u8) -> bool {
    compute_fcs(bytes) == claimed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(compute_fcs(&[]), 0);
    }

    #[test]
    fn chunked_matches_whole() {
        let data = [0x41, 0x05, 0xAA, 0xBB];
        assert_eq!(update_fcs(compute_fcs(&data[..2]), &data[2..]), compute_fcs(&data));
    }
}
