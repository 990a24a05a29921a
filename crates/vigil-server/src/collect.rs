//! File collectors: one task per input file, all feeding one intake queue.
//!
//! Each file is read as JSON lines and normalized line by line. A line that
//! cannot become a candidate is still sent, as a rejection tagged with its
//! `path:line`, so the batch report accounts for every line.

use std::path::PathBuf;

use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;
use vigil_engine::Intake;
use vigil_ingest::SourceDescriptor;

use crate::error::{Error, Result};

/// Spawn one collector per file. The queue closes once every collector is
/// done, which in turn lets the worker finish.
pub fn spawn(
  files: Vec<PathBuf>,
  source: SourceDescriptor,
  intake: mpsc::Sender<Intake>,
  cancel: CancellationToken,
) -> JoinSet<Result<usize>> {
  let mut tasks = JoinSet::new();
  for path in files {
    tasks.spawn(collect_file(path, source.clone(), intake.clone(), cancel.clone()));
  }
  tasks
}

/// Read one file into the queue. Returns the number of lines sent.
pub async fn collect_file(
  path: PathBuf,
  source: SourceDescriptor,
  intake: mpsc::Sender<Intake>,
  cancel: CancellationToken,
) -> Result<usize> {
  let content = tokio::fs::read_to_string(&path)
    .await
    .map_err(|source| Error::Io { path: path.clone(), source })?;

  let mut sent = 0;
  for (line, result) in vigil_ingest::normalize_lines(&content, &source) {
    if cancel.is_cancelled() {
      break;
    }
    let item = result.map_err(|e| e.into_incomplete(format!("{}:{line}", path.display())));
    if intake.send(item).await.is_err() {
      // The worker has stopped; nothing more will be read.
      break;
    }
    sent += 1;
  }

  tracing::info!(path = %path.display(), lines = sent, "collector finished");
  Ok(sent)
}
