use sha2::{Digest, Sha256};

/// Derives a deterministic 31-bit seed for a stage within a run.
///
/// The seed is the first eight bytes of `sha256("<run_id>:<stage>")` read as
/// a big-endian integer and masked to 31 bits, so it fits every common RNG
/// seeding API.
#[must_use]
pub fn seed_for(run_id: &str, stage: &str) -> u64 {
    let digest = Sha256::digest(format!("{run_id}:{stage}").as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head) & 0x7FFF_FFFF
}
