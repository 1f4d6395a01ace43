//! Device service: guard, dispatch, transaction numbering and reload.
//!
//! [`DeviceService`] implements `tower::Service<DeviceRequest>` so the HTTP
//! layer drives it like any other Tower service.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use alpaca_sim_core::{AlpacaError, DeviceIdentity, DeviceType, TransactionCounter};
use tower::Service;
use tracing::{debug, error, info, warn};

use super::config::{ConfigSource, ServerConfig, SharedCatalogue};
use super::domain::properties::{read, write};
use super::domain::{
    common, dome, effective_config, focuser, guide, rotator, switch, telescope, DeviceContext,
};
use super::operation::{panic_message, Operation, OperationError, OperationResponse};
use crate::exposure::{ExposureController, ImageSynthesizer};
use crate::storage::{SharedStore, StateStore};

/// One classified request against one addressed device.
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    /// `None` when the URL named an unknown device type.
    pub device_type: Option<DeviceType>,
    /// Raw lowercase type tag from the URL, used in `NotFound` messages.
    pub type_tag: String,
    pub device_number: u32,
    pub operation: Operation,
}

/// Shared device service. Cheap to clone.
#[derive(Clone)]
pub struct DeviceService {
    catalogue: SharedCatalogue,
    source: ConfigSource,
    store: SharedStore,
    transactions: Arc<TransactionCounter>,
    exposure: ExposureController,
    config: Arc<ServerConfig>,
}

impl DeviceService {
    #[must_use]
    pub fn new(
        catalogue: SharedCatalogue,
        source: ConfigSource,
        synthesizer: Arc<dyn ImageSynthesizer>,
        config: Arc<ServerConfig>,
    ) -> Self {
        let store: SharedStore = Arc::new(StateStore::new(Arc::clone(&catalogue)));
        let exposure = ExposureController::new(
            Arc::clone(&store),
            Arc::clone(&catalogue),
            synthesizer,
            Arc::clone(&config),
        );
        Self {
            catalogue,
            source,
            store,
            transactions: Arc::new(TransactionCounter::new()),
            exposure,
            config,
        }
    }

    /// Issues the next `ServerTransactionID`.
    #[must_use]
    pub fn next_transaction_id(&self) -> u32 {
        self.transactions.next_transaction_id()
    }

    #[must_use]
    pub fn catalogue(&self) -> &SharedCatalogue {
        &self.catalogue
    }

    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    #[must_use]
    pub fn exposure(&self) -> &ExposureController {
        &self.exposure
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Guard, then dispatch. Runs synchronously: no operation waits on I/O.
    ///
    /// # Errors
    ///
    /// `NotFound` for identities outside the registry, otherwise whatever
    /// the member handler returns.
    pub fn execute(&self, request: &DeviceRequest) -> Result<OperationResponse, OperationError> {
        let catalogue = self.catalogue.load();
        let id = match request.device_type {
            Some(t) => DeviceIdentity::new(t, request.device_number),
            None => {
                warn!(
                    device_type = %request.type_tag,
                    number = request.device_number,
                    "unknown device type"
                );
                return Err(AlpacaError::not_found(&request.type_tag, request.device_number).into());
            }
        };
        if !catalogue.registry.exists(id) {
            warn!(device = %id, "device not configured");
            return Err(AlpacaError::not_found(&request.type_tag, request.device_number).into());
        }

        let ctx = DeviceContext {
            id,
            config: effective_config(&catalogue.registry, id),
            store: &self.store,
        };
        drop(catalogue);
        debug!(device = %id, member = request.operation.name(), "dispatch");

        if let Some(response) = common::handle(&ctx, &request.operation) {
            return Ok(response);
        }

        let result = match &request.operation {
            Operation::StartExposure { duration, light } => self
                .exposure
                .start(&ctx, *duration, *light)
                .map(|()| OperationResponse::Empty),
            Operation::AbortExposure => {
                self.exposure.abort(&ctx).map(|()| OperationResponse::Empty)
            }
            Operation::StopExposure => self.exposure.stop(&ctx).map(|()| OperationResponse::Empty),
            Operation::GetImageArray => {
                self.exposure.take_image(&ctx).map(OperationResponse::Image)
            }
            Operation::MoveFocuser { position } => focuser::move_to(&ctx, *position),
            Operation::SlewToCoordinates {
                right_ascension,
                declination,
                ..
            } => telescope::slew(&ctx, *right_ascension, *declination),
            Operation::SyncToCoordinates {
                right_ascension,
                declination,
            } => telescope::sync(&ctx, *right_ascension, *declination),
            Operation::SlewToTarget { asynchronous } => {
                telescope::slew_to_target(&ctx, *asynchronous)
            }
            Operation::SyncToTarget => telescope::sync_to_target(&ctx),
            Operation::SlewToAltAz {
                azimuth,
                altitude,
                asynchronous,
            } => telescope::slew_to_alt_az(&ctx, *azimuth, *altitude, *asynchronous),
            Operation::SyncToAltAz { azimuth, altitude } => {
                telescope::sync_to_alt_az(&ctx, *azimuth, *altitude)
            }
            Operation::MoveAxis { axis, rate } => telescope::move_axis(&ctx, *axis, *rate),
            Operation::PulseGuide {
                direction,
                duration_ms,
            } => guide::pulse_guide(&ctx, *direction, *duration_ms),
            Operation::SetPark if id.device_type == DeviceType::Dome => dome::set_park(&ctx),
            Operation::SetPark => telescope::set_park(&ctx),
            Operation::Park if id.device_type == DeviceType::Dome => dome::park(&ctx),
            Operation::Park => telescope::park(&ctx),
            Operation::SlewToAzimuth { azimuth } => dome::slew_to_azimuth(&ctx, *azimuth),
            Operation::SlewToAltitude { altitude } => dome::slew_to_altitude(&ctx, *altitude),
            Operation::SyncToAzimuth { azimuth } => dome::sync_to_azimuth(&ctx, *azimuth),
            Operation::MoveRotator { mode, position } => rotator::move_to(&ctx, *mode, *position),
            Operation::SyncRotator { position } => rotator::sync(&ctx, *position),
            Operation::GetMaxSwitch => Ok(switch::max_switch(&ctx)),
            Operation::GetSwitch {
                id: switch_id,
                query,
            } => switch::query(&ctx, *switch_id, *query),
            Operation::SetSwitch {
                id: switch_id,
                change,
            } => switch::change(&ctx, *switch_id, change),
            Operation::Instant(action) => action.apply(&ctx),
            Operation::GetProperty { member } => read(&ctx, member),
            Operation::SetProperty { property, value } => write(&ctx, property, value),
            Operation::Unsupported { member } => Err(AlpacaError::not_implemented(format!(
                "Method {member} is not implemented for {}",
                id.device_type
            ))),
            other => Err(AlpacaError::not_implemented(format!(
                "{} is not implemented for {}",
                other.name(),
                id.device_type
            ))),
        };
        Ok(result?)
    }

    /// Re-reads the configuration source and swaps it in.
    ///
    /// On success every in-flight exposure is cancelled, the frame cache is
    /// rebuilt and all device state is dropped, so the next access re-derives
    /// it from the new document. On
    /// failure the current configuration stays in place.
    ///
    /// # Errors
    ///
    /// Returns the load error when the source cannot be read or parsed.
    pub fn reload(&self) -> anyhow::Result<()> {
        let config = self.source.load()?;
        let devices = config.registry.len();
        self.catalogue.store(Arc::new(config));
        self.exposure.cancel_all();
        self.exposure.reset_cache();
        self.store.reset_all();
        info!(source = %self.source, devices, "configuration reloaded");
        Ok(())
    }

    /// Stops background work ahead of process exit.
    pub fn shutdown(&self) {
        self.exposure.cancel_all();
    }
}

/// Runs `handler`, turning a panic into [`OperationError::Internal`].
fn run_guarded(
    member: &str,
    handler: impl FnOnce() -> Result<OperationResponse, OperationError>,
) -> Result<OperationResponse, OperationError> {
    panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref()).to_string();
        error!(member, panic = %message, "device operation panicked");
        Err(OperationError::Internal(anyhow::anyhow!(
            "{member} failed: {message}"
        )))
    })
}

impl Service<DeviceRequest> for DeviceService {
    type Response = OperationResponse;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: DeviceRequest) -> Self::Future {
        let result = run_guarded(request.operation.name(), || self.execute(&request));
        Box::pin(async move { result })
    }
}
