use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once at least `threshold` events have been appended since the last
/// compaction. Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    debug!(appends, "WAL over threshold, compacting");
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            error!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that keeps the WAL from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Patient;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("clinicd_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn register(engine: &Engine, n: usize) {
        for i in 0..n {
            engine
                .register_patient(Patient {
                    id: Ulid::new(),
                    name: format!("Patient {i}"),
                    phone: None,
                    email: None,
                    birth_date: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let engine = Engine::open(path.clone()).unwrap();

        register(&engine, 3).await;
        assert!(!compact_if_due(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        register(&engine, 2).await;
        assert!(compact_if_due(&engine, 5).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        engine.close().await.unwrap();
        let reopened = Engine::open(path).unwrap();
        assert_eq!(reopened.patient_count(), 5);
    }

    #[tokio::test]
    async fn closed_engine_is_never_due() {
        let engine = Engine::open(test_wal_path("closed.wal")).unwrap();
        engine.close().await.unwrap();
        assert!(!compact_if_due(&engine, 0).await);
    }
}
