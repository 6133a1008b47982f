/// Metric rows are keyed by their id in big-endian so that sled's
/// lexicographic order matches insertion order.
pub fn metric_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub fn parse_metric_key(key: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = key.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}
