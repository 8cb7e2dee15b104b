use tracing::info;

use crate::engine::{Engine, EngineError};

/// Compact the journal once it has grown past `threshold` appends.
/// A threshold of zero disables compaction.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    if threshold == 0 {
        return Ok(false);
    }
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    info!(appends, "journal compacted after {appends} appends");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::roster::InMemoryRoster;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rotaplan_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let roster = Arc::new(InMemoryRoster::new());
        let engine = Engine::new(path, roster, Arc::new(NotifyHub::new())).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

        engine.assign_label(date, RoomId::Salle16, "A B - J").await.unwrap();
        assert!(!maybe_compact(&engine, 10).await.unwrap());
        assert!(!maybe_compact(&engine, 0).await.unwrap());

        for i in 0..10 {
            let label = format!("A B - J{i}");
            engine.assign_label(date, RoomId::Salle16, &label).await.unwrap();
        }
        assert!(maybe_compact(&engine, 10).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(
            engine.slot_occupant(date, RoomId::Salle16).await.unwrap().as_deref(),
            Some("A B - J9")
        );
    }
}
