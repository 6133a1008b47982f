use crate::store::keys;
use crate::store::operations::metrics::MetricRecord;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_metric_key_check", m002_metric_key_check),
    ]
}

/// 执行所有未应用的数据库迁移。
///
/// - 每个迁移函数必须幂等：进程可能在 func() 成功、set_version() 之前崩溃。
/// - 版本号在每个迁移成功后立即持久化。
/// - 仅向前：set_version 拒绝降级。
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.config_versions.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().unwrap_or([0; 4]);
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store
        .config_versions
        .insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Every metric key must be the big-endian form of the row id it stores.
fn m002_metric_key_check(store: &Store) -> Result<(), StoreError> {
    for item in store.metrics.iter() {
        let (key, value) = item?;
        let record: MetricRecord = Store::deserialize(&value)?;
        if keys::parse_metric_key(&key) != Some(record.id) {
            return Err(StoreError::Migration {
                version: 2,
                message: format!("metric row {} stored under a foreign key", record.id),
            });
        }
    }
    Ok(())
}
