//! The single-writer queue consumer.
//!
//! Collectors run concurrently and push [`Intake`] items into one bounded
//! queue; exactly one [`Worker`] drains it, so two reports of the same
//! incident can never race each other into two canonical events.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vigil_core::{similarity::SimilarityScorer, store::EventStore};

use crate::{BatchReport, Engine, Intake, Result};

/// Default queue depth between collectors and the worker.
pub const DEFAULT_CAPACITY: usize = 256;

/// Create the intake queue.
pub fn channel(capacity: usize) -> (mpsc::Sender<Intake>, mpsc::Receiver<Intake>) {
  mpsc::channel(capacity.max(1))
}

pub struct Worker<S, M> {
  engine: Engine<S, M>,
  intake: mpsc::Receiver<Intake>,
  cancel: CancellationToken,
}

impl<S: EventStore, M: SimilarityScorer> Worker<S, M> {
  pub fn new(engine: Engine<S, M>, intake: mpsc::Receiver<Intake>, cancel: CancellationToken) -> Self {
    Self { engine, intake, cancel }
  }

  /// Drain the queue in arrival order until every sender is dropped or the
  /// token is cancelled.
  ///
  /// Cancellation is only observed between candidates; a merge that has
  /// started always runs to completion.
  pub async fn run(mut self) -> Result<BatchReport, S::Error> {
    self.engine.refresh_mappings().await?;
    let mut report = BatchReport::default();

    loop {
      let item = tokio::select! {
        biased;
        _ = self.cancel.cancelled() => {
          report.cancelled = true;
          break;
        }
        next = self.intake.recv() => match next {
          Some(item) => item,
          None => break,
        },
      };
      self.engine.handle(item, &mut report).await?;
    }

    // Anything still queued after cancellation is dropped unprocessed.
    self.intake.close();
    tracing::info!(%report, "worker finished");
    Ok(report)
  }
}
