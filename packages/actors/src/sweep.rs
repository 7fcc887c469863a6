//! Periodic sweep actor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use db::{Database, DbError, StorageOptions};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::messages::{SweepKind, SweepMessage};

/// Future type for one sweep run. Resolves to the number of documents handled.
pub type SweepFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, DbError>> + Send + 'a>>;

/// A unit of background maintenance.
pub trait Sweep: Send + Sync + 'static {
    fn kind(&self) -> SweepKind;

    /// How often the sweep runs.
    fn interval(&self, options: &StorageOptions) -> Duration;

    /// Run the sweep once.
    fn run<'a>(&'a self, db: &'a Database, options: &'a StorageOptions) -> SweepFuture<'a>;
}

/// Sweep actor arguments.
pub struct SweepArgs {
    pub sweep: Arc<dyn Sweep>,
    pub db: Database,
    pub options: StorageOptions,
}

/// State for the sweep actor.
pub struct SweepState {
    sweep: Arc<dyn Sweep>,
    db: Database,
    options: StorageOptions,
    ticker: Option<JoinHandle<()>>,
}

impl SweepState {
    async fn run_once(&self) -> Result<u64, DbError> {
        let kind = self.sweep.kind();
        tracing::debug!("Running {}", kind);
        let handled = self.sweep.run(&self.db, &self.options).await?;
        if handled > 0 {
            tracing::info!("{} handled {} documents", kind, handled);
        }
        Ok(handled)
    }
}

/// Runs one [`Sweep`] on its interval. Messages are handled one at a time, so
/// runs of the same sweep never overlap within a process.
pub struct SweepActor;

impl Actor for SweepActor {
    type Msg = SweepMessage;
    type State = SweepState;
    type Arguments = SweepArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        // tokio intervals reject a zero period
        let period = args.sweep.interval(&args.options).max(Duration::from_millis(1));
        tracing::info!("Starting {} (every {:?})", args.sweep.kind(), period);

        // Start periodic tick
        let myself_clone = myself.clone();
        let ticker = tokio::spawn(async move {
            // First run one period after start
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if myself_clone.send_message(SweepMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(SweepState {
            sweep: args.sweep,
            db: args.db,
            options: args.options,
            ticker: Some(ticker),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SweepMessage::Tick => {
                // One bad run must not stop the next ones
                if let Err(e) = state.run_once().await {
                    tracing::warn!("{} failed: {}", state.sweep.kind(), e);
                }
            }

            SweepMessage::RunNow { reply } => {
                let result = state.run_once().await.map_err(|e| e.to_string());
                let _ = reply.send(result);
            }

            SweepMessage::Shutdown => {
                tracing::info!("Stopping {}", state.sweep.kind());
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        Ok(())
    }
}
