//! Supervisor actor owning the background sweeps.

use std::collections::HashMap;
use std::sync::Arc;

use db::{Database, StorageOptions};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};

use crate::aggregator::CountersAggregator;
use crate::expiration::ExpirationManager;
use crate::messages::{SupervisorMessage, SweepKind, SweepMessage};
use crate::sweep::{Sweep, SweepActor, SweepArgs};

/// Supervisor arguments.
pub struct SupervisorArgs {
    pub db: Database,
    pub options: StorageOptions,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    /// Sweep actors by kind.
    pub sweeps: HashMap<SweepKind, ActorRef<SweepMessage>>,
}

/// Supervisor actor that spawns and owns one actor per sweep.
pub struct SweepSupervisor;

impl Actor for SweepSupervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting sweep supervisor");

        let sweeps: [Arc<dyn Sweep>; 2] = [Arc::new(CountersAggregator), Arc::new(ExpirationManager)];
        let mut state = SupervisorState {
            sweeps: HashMap::new(),
        };

        for sweep in sweeps {
            let kind = sweep.kind();
            let sweep_args = SweepArgs {
                sweep,
                db: args.db.clone(),
                options: args.options.clone(),
            };

            // Actor names are global; several storages may share a process
            let name = format!("{}-{}", kind, myself.get_id());
            let (actor, _handle) =
                Actor::spawn_linked(Some(name), SweepActor, sweep_args, myself.get_cell())
                    .await
                    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn {}: {}", kind, e)))?;

            state.sweeps.insert(kind, actor);
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::RunSweep { kind, reply } => {
                let Some(sweep_ref) = state.sweeps.get(&kind) else {
                    let _ = reply.send(Err(format!("{} is not running", kind)));
                    return Ok(());
                };

                let (tx, rx) = ractor::concurrency::oneshot();
                sweep_ref.send_message(SweepMessage::RunNow { reply: tx.into() })?;
                match rx.await {
                    Ok(result) => {
                        let _ = reply.send(result);
                    }
                    Err(_) => {
                        let _ = reply.send(Err(format!("{} did not answer", kind)));
                    }
                }
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down sweep supervisor");
                for sweep_ref in state.sweeps.values() {
                    let _ = sweep_ref.send_message(SweepMessage::Shutdown);
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::info!(
                    "Sweep actor {} terminated: {:?}",
                    cell.get_name().unwrap_or_default(),
                    reason
                );
                state.sweeps.retain(|_, sweep_ref| sweep_ref.get_id() != cell.get_id());
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                tracing::warn!(
                    "Sweep actor {} failed: {}",
                    cell.get_name().unwrap_or_default(),
                    error
                );
                state.sweeps.retain(|_, sweep_ref| sweep_ref.get_id() != cell.get_id());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor and its sweeps.
pub async fn start_supervisor(
    db: Database,
    options: StorageOptions,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (actor, handle) = Actor::spawn(None, SweepSupervisor, SupervisorArgs { db, options }).await?;

    Ok((actor, handle))
}
