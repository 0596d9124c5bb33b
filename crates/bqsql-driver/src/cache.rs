//! Client and connection cache
//!
//! Clients and connections are expensive to build (each one authenticates),
//! so they are cached per tenant and reused until they are closed or the
//! tenant is reconfigured.
//!
//! Every key owns an async slot. The first caller for a key holds the slot's
//! lock while it constructs the entry; concurrent callers for the same key
//! wait on that lock and then reuse the result, so each key is constructed
//! at most once. Callers for different keys never wait on each other.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = Registry::new(Arc::new(BigQueryFactory::new()));
//! registry.register_settings(settings);
//!
//! let client = registry.client(1, "my-project", "EU").await?;
//! let datasets = client.list_datasets().await?;
//!
//! let cached = registry.connection(1, &ConnectionArgs::default()).await?;
//! let rows = cached.connection.query("SELECT 1", &cancel).await?;
//! ```

use crate::api::ApiClient;
use crate::connector::{Connection, Driver};
use crate::warehouse::WarehouseFactory;
use bqsql_core::{ConnectionArgs, ConnectionSettings, DatasourceSettings, DriverError, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::Mutex as AsyncMutex;

type Slot<V> = Arc<AsyncMutex<Option<V>>>;

/// Identity of a cached metadata client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub tenant: i64,
    pub project: String,
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.project)
    }
}

/// Identity of a cached connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub tenant: i64,
    pub project: String,
    pub dataset: String,
    pub location: String,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.tenant, self.project, self.dataset)?;
        if !self.location.is_empty() {
            write!(f, "@{}", self.location)?;
        }
        Ok(())
    }
}

/// A cached driver together with the connection it opened
#[derive(Debug, Clone)]
pub struct CachedConnection {
    pub driver: Arc<Driver>,
    pub connection: Connection,
}

impl CachedConnection {
    pub fn is_closed(&self) -> bool {
        self.driver.is_closed()
    }
}

/// Per-tenant registry of settings, metadata clients and connections
pub struct Registry {
    /// Builds authenticated warehouse clients
    factory: Arc<dyn WarehouseFactory>,

    /// Datasource settings by tenant id
    settings: RwLock<HashMap<i64, DatasourceSettings>>,

    /// Metadata clients by (tenant, project)
    clients: Mutex<HashMap<ClientKey, Slot<Arc<ApiClient>>>>,

    /// Connections by (tenant, project, dataset, location)
    connections: Mutex<HashMap<ConnectionKey, Slot<CachedConnection>>>,

    /// Projects discovered for tenants without a default project
    discovered: Mutex<HashMap<i64, String>>,
}

impl Registry {
    pub fn new(factory: Arc<dyn WarehouseFactory>) -> Self {
        Self {
            factory,
            settings: RwLock::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            discovered: Mutex::new(HashMap::new()),
        }
    }

    /// Register (or reconfigure) a tenant
    ///
    /// Changed settings drop every client and connection cached for the
    /// tenant, so the next request authenticates with the new settings.
    pub fn register_settings(&self, settings: DatasourceSettings) {
        let tenant = settings.id;
        let changed = match self.settings.write() {
            Ok(mut map) => map.insert(tenant, settings.clone()).map_or(false, |old| old != settings),
            Err(poisoned) => poisoned
                .into_inner()
                .insert(tenant, settings.clone())
                .map_or(false, |old| old != settings),
        };

        if changed {
            tracing::info!(datasource = tenant, "Datasource reconfigured, dropping cached clients");
            self.invalidate(tenant);
        } else {
            tracing::debug!(datasource = tenant, "Registered datasource settings");
        }
    }

    /// Settings of a tenant
    pub fn settings(&self, tenant: i64) -> Option<DatasourceSettings> {
        match self.settings.read() {
            Ok(map) => map.get(&tenant).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&tenant).cloned(),
        }
    }

    /// Get (or build) the metadata client of a tenant's project
    ///
    /// An empty `project` means the tenant's default project, discovered
    /// from its ambient identity when none is configured. The client's
    /// location is set to `location`, or to the tenant's processing location
    /// when `location` is empty, on every call.
    pub async fn client(&self, tenant: i64, project: &str, location: &str) -> Result<Arc<ApiClient>> {
        let settings = self.require_settings(tenant)?;

        let project = self.project_for(&settings, project).await?;
        let location = if location.is_empty() { settings.processing_location.as_str() } else { location };

        let key = ClientKey { tenant, project };
        let slot = slot(&self.clients, &key);
        let mut entry = slot.lock().await;

        if let Some(client) = entry.as_ref() {
            tracing::debug!(key = %key, location, "Reusing cached client");
            client.set_location(location);
            return Ok(Arc::clone(client));
        }

        tracing::info!(key = %key, location, "Creating client");
        let warehouse = self.factory.create(&settings, &key.project).await?;
        let client = Arc::new(ApiClient::new(warehouse, key.project.clone(), location));
        *entry = Some(Arc::clone(&client));

        Ok(client)
    }

    /// Get (or open) a connection for a tenant
    ///
    /// The connection settings are resolved from the tenant defaults and
    /// `args`. A cached connection that has been closed is replaced.
    pub async fn connection(&self, tenant: i64, args: &ConnectionArgs) -> Result<CachedConnection> {
        let settings = self.require_settings(tenant)?;
        let args = ConnectionArgs {
            project: self.project_for(&settings, &args.project).await?,
            ..args.clone()
        };
        let resolved = ConnectionSettings::resolve(&settings, &args);

        let key = ConnectionKey {
            tenant,
            project: resolved.project.clone(),
            dataset: resolved.dataset.clone(),
            location: resolved.location.clone(),
        };
        let slot = slot(&self.connections, &key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if !cached.is_closed() {
                tracing::debug!(key = %key, "Reusing cached connection");
                return Ok(cached.clone());
            }
            tracing::debug!(key = %key, "Cached connection was closed, reopening");
        }

        tracing::info!(key = %key, "Opening connection");
        let warehouse = self.factory.create(&settings, &resolved.project).await?;
        let driver = Arc::new(Driver::new(resolved, warehouse));
        let connection = driver.open();

        let cached = CachedConnection { driver, connection };
        *entry = Some(cached.clone());

        Ok(cached)
    }

    /// Project a tenant runs in when a request names none
    pub async fn default_project(&self, tenant: i64) -> Result<String> {
        let settings = self.require_settings(tenant)?;
        self.project_for(&settings, "").await
    }

    /// Drop every client, connection and discovered project of a tenant
    ///
    /// Connections already handed out stay usable until their holders drop
    /// them.
    pub fn invalidate(&self, tenant: i64) {
        lock(&self.clients).retain(|key, _| key.tenant != tenant);
        lock(&self.connections).retain(|key, _| key.tenant != tenant);
        lock(&self.discovered).remove(&tenant);
    }

    /// Number of constructed clients
    pub fn client_count(&self) -> usize {
        populated(&self.clients)
    }

    /// Number of constructed connections, open or closed
    pub fn connection_count(&self) -> usize {
        populated(&self.connections)
    }

    /// The requested project, else the tenant default, else a discovered one
    ///
    /// Discovery runs once per tenant; its result is kept until the tenant
    /// is invalidated.
    async fn project_for(&self, settings: &DatasourceSettings, requested: &str) -> Result<String> {
        if !requested.is_empty() {
            return Ok(requested.to_string());
        }
        if !settings.default_project.is_empty() {
            return Ok(settings.default_project.clone());
        }

        let cached = lock(&self.discovered).get(&settings.id).cloned();
        if let Some(project) = cached {
            return Ok(project);
        }

        let project = self.factory.default_project(settings).await?;
        tracing::info!(datasource = settings.id, project = %project, "Using discovered default project");
        lock(&self.discovered).insert(settings.id, project.clone());
        Ok(project)
    }

    fn require_settings(&self, tenant: i64) -> Result<DatasourceSettings> {
        self.settings(tenant)
            .ok_or_else(|| DriverError::Config(format!("no settings for datasource: {}", tenant)))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("clients", &self.client_count())
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

/// Get or create the slot of `key`; the map lock is never held across an await
fn slot<K: Eq + Hash + Clone, V>(map: &Mutex<HashMap<K, Slot<V>>>, key: &K) -> Slot<V> {
    let mut map = lock(map);

    Arc::clone(
        map.entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None))),
    )
}

/// Count slots holding a constructed entry; slots under construction count
fn populated<K, V>(map: &Mutex<HashMap<K, Slot<V>>>) -> usize {
    lock(map)
        .values()
        .filter(|slot| slot.try_lock().map_or(true, |entry| entry.is_some()))
        .count()
}

/// Lock a map, recovering it if a panicking holder poisoned the lock
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
