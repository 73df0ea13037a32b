// ── Request handling ──
//
// The operations behind the device-facing endpoints: read a sensor
// (ownership check, publish a read trigger, return the cached value) and
// push a reading (origin check, store, persist, forward). Every path ends
// in an explicit `ResponseStatus`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::connector::TransportConnector;
use crate::error::CoreError;
use crate::model::{DevicePush, SensorKind, SensorRecord};
use crate::persistence::{ConnectionPool, MemoryPool, SensorRepository, TransactionContext};
use crate::registry::{DeviceRegistry, OriginCheck};
use crate::store::SensorStore;

// ── Response types ───────────────────────────────────────────────

/// Outcome of a request, one variant per status code the endpoints use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseStatus {
    Ok,
    Unauthorized,
    Conflict,
    PreconditionFailed,
    InternalError,
}

impl ResponseStatus {
    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::Unauthorized => 401,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::InternalError => 500,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Ok => "OK",
            Self::Unauthorized => "Unauthorized",
            Self::Conflict => "Conflict",
            Self::PreconditionFailed => "Precondition Failed",
            Self::InternalError => "Internal Server Error",
        };
        write!(f, "{} {reason}", self.code())
    }
}

impl From<&CoreError> for ResponseStatus {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::AuthorizationDenied { .. } => Self::Unauthorized,
            _ => Self::InternalError,
        }
    }
}

impl From<OriginCheck> for ResponseStatus {
    fn from(check: OriginCheck) -> Self {
        match check {
            OriginCheck::Unregistered => Self::PreconditionFailed,
            OriginCheck::Conflict { .. } => Self::Conflict,
            OriginCheck::Valid => Self::Ok,
        }
    }
}

/// Result of a sensor read. `record` is `None` until the device has
/// reported at least once.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResponse {
    pub status: ResponseStatus,
    pub record: Option<SensorRecord>,
}

impl ReadResponse {
    fn failed(status: ResponseStatus) -> Self {
        Self {
            status,
            record: None,
        }
    }
}

// ── Collaborators ────────────────────────────────────────────────

/// Device-management lookup: does `device_id` exist under `owner`?
///
/// `Ok(false)` is a denial; `Err` means the lookup itself failed.
#[async_trait]
pub trait DeviceValidator: Send + Sync {
    async fn is_owned_by(&self, owner: &str, device_id: &str) -> Result<bool, CoreError>;
}

/// Downstream sink for accepted readings.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn forward(&self, owner: &str, record: &SensorRecord) -> Result<(), CoreError>;
}

/// Ownership backed by a local device-to-owner table.
#[derive(Debug, Default)]
pub struct RegistryOwnershipValidator {
    owners: DashMap<String, String>,
}

impl RegistryOwnershipValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device_id: impl Into<String>, owner: impl Into<String>) {
        self.owners.insert(device_id.into(), owner.into());
    }
}

#[async_trait]
impl DeviceValidator for RegistryOwnershipValidator {
    async fn is_owned_by(&self, owner: &str, device_id: &str) -> Result<bool, CoreError> {
        Ok(self
            .owners
            .get(device_id)
            .is_some_and(|o| o.value() == owner))
    }
}

/// Analytics sink that emits each reading as a structured log event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalyticsSink;

#[async_trait]
impl AnalyticsSink for TracingAnalyticsSink {
    async fn forward(&self, owner: &str, record: &SensorRecord) -> Result<(), CoreError> {
        info!(
            target: "cuplink::analytics",
            owner,
            device_id = %record.device_id,
            sensor = %record.sensor_kind,
            value = record.value,
            observed_at = record.observed_at_epoch_millis,
            "sensor reading"
        );
        Ok(())
    }
}

// ── CupContext ───────────────────────────────────────────────────

/// Everything a request needs, built once at process start.
pub struct CupContext<P: ConnectionPool = MemoryPool> {
    connector: TransportConnector,
    registry: Arc<DeviceRegistry>,
    store: Arc<SensorStore>,
    pool: Arc<P>,
    validator: Arc<dyn DeviceValidator>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl<P: ConnectionPool> CupContext<P> {
    /// Create a context with an empty registry and sensor store.
    pub fn new(
        connector: TransportConnector,
        pool: Arc<P>,
        validator: Arc<dyn DeviceValidator>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            connector,
            registry: Arc::new(DeviceRegistry::new()),
            store: Arc::new(SensorStore::new()),
            pool,
            validator,
            analytics,
        }
    }

    pub fn connector(&self) -> &TransportConnector {
        &self.connector
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SensorStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }
}

// ── CupService ───────────────────────────────────────────────────

/// Read and push operations over a shared [`CupContext`].
///
/// Cheaply cloneable; one clone per request worker.
pub struct CupService<P: ConnectionPool = MemoryPool> {
    ctx: Arc<CupContext<P>>,
}

impl<P: ConnectionPool> Clone for CupService<P> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
        }
    }
}

impl<P> CupService<P>
where
    P: ConnectionPool,
    P::Conn: SensorRepository,
{
    pub fn new(ctx: Arc<CupContext<P>>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &CupContext<P> {
        &self.ctx
    }

    /// Bind `device_id` to the address it will push from.
    pub fn register_device(&self, device_id: &str, address: &str) {
        if let Some(previous) = self.ctx.registry.bind(device_id, address) {
            if previous != address {
                info!(device_id, previous = %previous, address, "device rebound to new address");
            }
        }
    }

    /// Ask the device for a fresh reading and return whatever is cached.
    ///
    /// The read trigger is fire-and-forget: the value returned may predate
    /// the device's reply, or be absent if it never reported.
    pub async fn read_sensor(&self, owner: &str, device_id: &str, kind: SensorKind) -> ReadResponse {
        if let Err(e) = self.authorize(owner, device_id).await {
            warn!(owner, device_id, error = %e, "read rejected");
            return ReadResponse::failed(ResponseStatus::from(&e));
        }

        let resource = kind.resource_token();
        if let Err(e) = self
            .ctx
            .connector
            .publish(owner, device_id, &resource, "")
            .await
        {
            let err = CoreError::from(e);
            warn!(owner, device_id, sensor = %kind, error = %err, "read trigger publish failed");
            return ReadResponse::failed(ResponseStatus::from(&err));
        }

        match self.cached_or_persisted(device_id, kind) {
            Ok(record) => ReadResponse {
                status: ResponseStatus::Ok,
                record,
            },
            Err(e) => {
                warn!(device_id, sensor = %kind, error = %e, "sensor read failed");
                ReadResponse::failed(ResponseStatus::from(&e))
            }
        }
    }

    /// Accept a reading pushed by a device.
    ///
    /// Rejected with 412 for an unregistered device and 409 when the
    /// claimed origin differs from the bound address; nothing is stored in
    /// either case.
    pub async fn push_reading(&self, kind: SensorKind, push: DevicePush) -> ResponseStatus {
        let check = self.ctx.registry.validate_origin(&push.device_id, &push.reply);
        if !check.is_valid() {
            warn!(
                device_id = %push.device_id,
                origin = %push.reply,
                outcome = ?check,
                "push rejected"
            );
            return ResponseStatus::from(check);
        }

        let record = SensorRecord::now(push.device_id, kind, push.value);
        self.ctx.store.set_record(
            &record.device_id,
            kind,
            record.value,
            record.observed_at_epoch_millis,
        );

        if let Err(e) = self.persist(&record) {
            warn!(device_id = %record.device_id, sensor = %kind, error = %e, "persisting reading failed");
            return ResponseStatus::from(&e);
        }

        if let Err(e) = self.ctx.analytics.forward(&push.owner, &record).await {
            warn!(device_id = %record.device_id, sensor = %kind, error = %e, "forwarding reading failed");
            return ResponseStatus::from(&e);
        }

        debug!(device_id = %record.device_id, sensor = %kind, value = record.value, "reading accepted");
        ResponseStatus::Ok
    }

    // ── Internals ────────────────────────────────────────────────

    async fn authorize(&self, owner: &str, device_id: &str) -> Result<(), CoreError> {
        let owned = self
            .ctx
            .validator
            .is_owned_by(owner, device_id)
            .await
            .map_err(|e| CoreError::DeviceManagement {
                message: e.to_string(),
            })?;
        if owned {
            Ok(())
        } else {
            Err(CoreError::AuthorizationDenied {
                owner: owner.to_owned(),
                device_id: device_id.to_owned(),
            })
        }
    }

    fn persist(&self, record: &SensorRecord) -> Result<(), CoreError> {
        TransactionContext::scoped(Arc::clone(&self.ctx.pool), |conn: &mut P::Conn| {
            conn.upsert_reading(record)
        })
        .map_err(CoreError::from)
    }

    /// Cached value first; on a cold cache, the last persisted row read
    /// through an auto-commit connection.
    fn cached_or_persisted(
        &self,
        device_id: &str,
        kind: SensorKind,
    ) -> Result<Option<SensorRecord>, CoreError> {
        if let Some(record) = self.ctx.store.get_record(device_id, kind) {
            return Ok(Some(SensorRecord::clone(&record)));
        }

        let mut tx = TransactionContext::new(Arc::clone(&self.ctx.pool));
        let record = tx.current()?.latest_reading(device_id, kind)?;
        tx.release();
        Ok(record)
    }
}
