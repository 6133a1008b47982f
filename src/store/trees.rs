pub const METRICS: &str = "metrics";
pub const CONFIG_VERSIONS: &str = "config_versions";
