use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{ScaEventDispatcher, ScaEventHook, ScaEventProducer, ScaStatusChangedEvent};

/// The publishing ends handed to the SCA APIs. Empty when no hooks are registered.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub sca_status_changed_producer: Vec<ScaEventProducer>,
}

impl EventProducers {
    pub async fn publish_sca_status_changed(&self, event: ScaStatusChangedEvent) {
        for producer in &self.sca_status_changed_producer {
            producer.publish(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_sca_status_changed: Option<ScaEventDispatcher>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_sca_status_changed = hooks.on_sca_status_changed.map(|f| ScaEventDispatcher::new(buffer_size, f));
        Self { on_sca_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(dispatcher) = &self.on_sca_status_changed {
            result.sca_status_changed_producer.push(dispatcher.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(dispatcher) = self.on_sca_status_changed {
            tokio::spawn(dispatcher.run());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_sca_status_changed: Option<ScaEventHook>,
}

impl EventHooks {
    pub fn on_sca_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ScaStatusChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_sca_status_changed = Some(Arc::new(f));
        self
    }
}
