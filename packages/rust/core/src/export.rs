//! JSON file persistence for run results.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tracing::info;

use bitfunnel_shared::{FunnelError, PersistenceSink, ProcessingRecord, Result};

/// Suffix of every result file name.
const FILE_SUFFIX: &str = "_analysis_result.json";

/// Writes each batch to `<dir>/<YYYYmmdd_HHMMSS>_analysis_result.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        self.dir.join(format!("{stamp}{FILE_SUFFIX}"))
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn persist(&self, records: &[ProcessingRecord]) -> Result<String> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FunnelError::io(&self.dir, e))?;

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| FunnelError::Persistence(format!("failed to serialize records: {e}")))?;

        let path = self.next_path();
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| FunnelError::io(&path, e))?;

        info!(path = %path.display(), records = records.len(), "results saved");
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;
    use bitfunnel_shared::{QualityVerdict, ScreeningVerdict};
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("bf-export-test-{}", Uuid::now_v7()))
    }

    fn record() -> ProcessingRecord {
        ProcessingRecord {
            candidate: candidate("a"),
            screening_verdict: ScreeningVerdict::rejected("n/a"),
            final_artifact: Vec::new(),
            final_quality_verdict: QualityVerdict::default(),
            attempt_count: 1,
            degraded: true,
            processed_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn writes_timestamped_json_file() {
        let dir = temp_dir();
        let sink = JsonFileSink::new(&dir);
        assert_eq!(sink.dir(), dir.as_path());
        let location = sink.persist(&[record()]).await.unwrap();

        let path = PathBuf::from(&location);
        assert!(path.starts_with(&dir));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with(FILE_SUFFIX));
        assert_eq!(name.len(), "YYYYmmdd_HHMMSS".len() + FILE_SUFFIX.len());

        let saved: Vec<ProcessingRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].degraded);

        std::fs::remove_dir_all(&dir).ok();
    }
}
