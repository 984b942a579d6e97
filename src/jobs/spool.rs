//! Spool directory job sink
//!
//! One JSON file per job. Files are written under a hidden temporary name
//! and renamed, so a watcher never sees a partial job.

use async_trait::async_trait;
use log::debug;
use std::path::PathBuf;

use super::{Job, JobError, JobSink};

pub struct SpoolDirectory {
    dir: PathBuf,
}

impl SpoolDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl JobSink for SpoolDirectory {
    async fn submit(&self, job: &Job) -> Result<(), JobError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let payload = serde_json::to_vec_pretty(job)?;
        let tmp_path = self.dir.join(format!(".{}.json.tmp", job.id));
        let final_path = self.dir.join(format!("{}.json", job.id));

        tokio::fs::write(&tmp_path, payload).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        debug!("Job {} spooled to {:?}", job.id, final_path);
        Ok(())
    }
}
