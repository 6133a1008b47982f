use crate::store::Store;

pub async fn run(store: &Store) {
    tracing::debug!("store_flush: start");
    match store.flush() {
        Ok(()) => tracing::debug!(snapshots = store.count_blink_snapshots(), "store_flush: done"),
        Err(e) => tracing::error!(error = %e, "store_flush failed"),
    }
}
