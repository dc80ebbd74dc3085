use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use converge_core::{EngineError, PropertyMap, Urn};
use converge_generator::Registration;
use converge_grpc::{RegistrationOutcome, RegistrationSink};

use crate::driver::Job;

/// Forwards `MonitorService` calls into the update driver's job channel,
/// blocking the caller until the driver has actually planned and executed
/// the registration's step(s). Cheaply `Clone`able so a `MonitorService<S>`
/// can hold its own `Arc` alongside whatever else needs to reach the driver.
#[derive(Clone)]
pub struct EngineSink {
    tx: mpsc::Sender<Job>,
}

impl EngineSink {
    pub(crate) fn new(tx: mpsc::Sender<Job>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl RegistrationSink for EngineSink {
    async fn submit(&self, reg: Registration) -> Result<RegistrationOutcome, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::Register { reg, reply })
            .await
            .map_err(|_| EngineError::Cancelled)?;
        rx.await.map_err(|_| EngineError::Cancelled)?
    }

    async fn register_outputs(&self, urn: Urn, outputs: PropertyMap) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job::RegisterOutputs { urn, outputs, reply })
            .await
            .map_err(|_| EngineError::Cancelled)?;
        rx.await.map_err(|_| EngineError::Cancelled)?
    }

    async fn resource_custom(&self, urn: &Urn) -> Option<bool> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Job::ResourceCustom { urn: urn.clone(), reply }).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }
}
