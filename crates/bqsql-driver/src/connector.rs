//! Driver, connector and connection
//!
//! A [`Driver`] owns the settings a connection is opened with and the
//! authenticated warehouse client. Opening it yields a [`Connection`], which
//! is either open or closed; closing is one-way and idempotent.

use crate::rows::Rows;
use crate::warehouse::{QueryJob, Warehouse};
use bqsql_core::{ConnectionSettings, DriverError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Entry point of a connection: settings plus an authenticated client
pub struct Driver {
    settings: ConnectionSettings,
    warehouse: Arc<dyn Warehouse>,
    connector: Mutex<Option<Arc<Connector>>>,
}

impl Driver {
    pub fn new(settings: ConnectionSettings, warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            settings,
            warehouse,
            connector: Mutex::new(None),
        }
    }

    /// Build a fresh connector sharing this driver's settings and client
    pub fn connector(&self) -> Arc<Connector> {
        Arc::new(Connector {
            settings: self.settings.clone(),
            warehouse: Arc::clone(&self.warehouse),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a connection and remember its connector
    pub fn open(&self) -> Connection {
        let connector = self.connector();
        let connection = connector.connect();

        match self.connector.lock() {
            Ok(mut slot) => *slot = Some(connector),
            Err(poisoned) => *poisoned.into_inner() = Some(connector),
        }

        tracing::debug!(
            project = %self.settings.project,
            dataset = %self.settings.dataset,
            location = %self.settings.location,
            "Opened connection"
        );

        connection
    }

    /// Whether the driver has no open connection
    ///
    /// True when no connector was ever opened or when its connection has
    /// been closed.
    pub fn is_closed(&self) -> bool {
        let slot = match self.connector.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        slot.as_ref().map_or(true, |c| c.is_closed())
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("settings", &self.settings)
            .field("warehouse", &self.warehouse.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Produces connections over one warehouse client
pub struct Connector {
    settings: ConnectionSettings,
    warehouse: Arc<dyn Warehouse>,
    closed: AtomicBool,
}

impl Connector {
    pub fn connect(self: &Arc<Self>) -> Connection {
        Connection {
            connector: Arc::clone(self),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An open (or closed) connection
///
/// Clones share state: closing one clone closes them all.
#[derive(Clone)]
pub struct Connection {
    connector: Arc<Connector>,
}

impl Connection {
    /// Submit a query and return an iterator over its rows
    ///
    /// The job runs in the connection's project, defaults to its dataset and
    /// is pinned to its location. The call returns once the job is accepted
    /// and its first page is available, or with [`DriverError::Cancelled`]
    /// as soon as `cancel` fires.
    pub async fn query(&self, text: &str, cancel: &CancellationToken) -> Result<Rows> {
        if self.is_closed() {
            return Err(DriverError::ConnectionClosed);
        }

        let settings = &self.connector.settings;
        let job = QueryJob::new(text, settings.project.clone())
            .with_default_dataset(settings.dataset.clone())
            .with_location(settings.location.clone());

        tracing::debug!(project = %job.project, location = ?job.location, "Submitting query");

        let first_page = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DriverError::Cancelled),
            page = self.connector.warehouse.submit(&job) => page,
        }?;

        tracing::debug!(job = %first_page.job.job_id, rows = first_page.rows.len(), "Query accepted");

        Ok(Rows::new(Arc::clone(&self.connector.warehouse), first_page))
    }

    /// Close the connection; later calls are no-ops
    pub async fn close(&self) -> Result<()> {
        if self.connector.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::debug!(project = %self.connector.settings.project, "Closing connection");
        self.connector.warehouse.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.connector.is_closed()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.connector.settings
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("settings", &self.connector.settings)
            .field("closed", &self.is_closed())
            .finish()
    }
}
