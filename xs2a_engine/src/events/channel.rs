//! Delivery of SCA status changes to the hook registered at start-up.
//!
//! The flow APIs publish through [`ScaEventProducer`]s onto a bounded queue. A single [`ScaEventDispatcher`] drains
//! the queue and runs the hook for each event on its own task. Once every producer has been dropped, the dispatcher
//! waits for the hook calls still in flight and returns.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::{
    sync::mpsc::{self, error::SendError},
    task::{JoinError, JoinSet},
};

use crate::{db_types::AuthorisationId, events::ScaStatusChangedEvent};

pub type ScaEventHook =
    Arc<dyn Fn(ScaStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct ScaEventDispatcher {
    listener: mpsc::Receiver<ScaStatusChangedEvent>,
    sender: mpsc::Sender<ScaStatusChangedEvent>,
    hook: ScaEventHook,
}

impl ScaEventDispatcher {
    pub fn new(buffer_size: usize, hook: ScaEventHook) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, hook }
    }

    pub fn subscribe(&self) -> ScaEventProducer {
        ScaEventProducer::new(self.sender.clone())
    }

    /// Runs until every producer is gone and every hook call has finished.
    pub async fn run(mut self) {
        debug!("📬️ SCA event dispatcher started");
        // Only the producers may keep the queue open
        drop(self.sender);
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                event = self.listener.recv() => match event {
                    Some(event) => {
                        trace!("📬️ {} moved to {}", event.authorisation_id, event.new_status);
                        let hook = Arc::clone(&self.hook);
                        let id = event.authorisation_id.clone();
                        in_flight.spawn(async move {
                            (hook)(event).await;
                            id
                        });
                    },
                    None => break,
                },
                Some(done) = in_flight.join_next(), if !in_flight.is_empty() => log_hook_result(done),
            }
        }
        if !in_flight.is_empty() {
            debug!("📬️ Waiting for {} SCA event hooks to finish", in_flight.len());
        }
        while let Some(done) = in_flight.join_next().await {
            log_hook_result(done);
        }
        debug!("📬️ SCA event dispatcher has shut down");
    }
}

fn log_hook_result(result: Result<AuthorisationId, JoinError>) {
    match result {
        Ok(id) => trace!("📬️ Hook finished for {id}"),
        Err(e) if e.is_panic() => error!("📬️ The SCA event hook panicked: {e}"),
        Err(e) => warn!("📬️ An SCA event hook was cancelled: {e}"),
    }
}

#[derive(Clone)]
pub struct ScaEventProducer {
    sender: mpsc::Sender<ScaStatusChangedEvent>,
}

impl ScaEventProducer {
    pub fn new(sender: mpsc::Sender<ScaStatusChangedEvent>) -> Self {
        Self { sender }
    }

    /// Queues the event, waiting if the queue is full. The event is dropped, with a warning, if the dispatcher has
    /// stopped.
    pub async fn publish(&self, event: ScaStatusChangedEvent) {
        if let Err(SendError(event)) = self.sender.send(event).await {
            warn!(
                "📬️ No SCA event dispatcher is running. Dropped the move of {} from {} to {}",
                event.authorisation_id, event.old_status, event.new_status
            );
        }
    }
}
