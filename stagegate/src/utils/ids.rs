use std::fmt::Write;
use uuid::Uuid;

/// Generates a fresh run identifier of the form `run-<uuid v7>`.
///
/// Version 7 ids sort by creation time, which keeps checkpoint listings in
/// run order.
#[must_use]
pub fn generate_run_id() -> String {
    format!("run-{}", Uuid::now_v7())
}

/// Encodes a run id for use in a filename.
///
/// `[A-Za-z0-9.-]` pass through; every other byte, `_` included, becomes
/// `_XX` in uppercase hex. Distinct ids never share an encoding, and an
/// encoded id never contains `__`.
#[must_use]
pub fn encode_run_id(run_id: &str) -> String {
    let mut encoded = String::with_capacity(run_id.len());
    for byte in run_id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'.' | b'-' => encoded.push(char::from(byte)),
            _ => {
                let _ = write!(encoded, "_{byte:02X}");
            }
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_run_id() {
        assert_eq!(encode_run_id("run-1"), "run-1");
        assert_eq!(encode_run_id("a/b:c"), "a_2Fb_3Ac");
        assert_eq!(encode_run_id("r_x"), "r_5Fx");
        assert_eq!(encode_run_id("é"), "_C3_A9");
    }

    #[test]
    fn test_encode_run_id_keeps_ids_apart() {
        let ids = ["team/a", "team:a", "team_a", "team\\a", "teama", "team a"];
        let encoded: std::collections::HashSet<_> = ids.iter().map(|id| encode_run_id(id)).collect();
        assert_eq!(encoded.len(), ids.len());
        assert!(encoded.iter().all(|e| !e.contains("__")));
    }
}
