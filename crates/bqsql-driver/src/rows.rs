//! Row iterator adapter
//!
//! Walks the pages of an accepted query job and hands out one converted row
//! at a time. Pages are fetched lazily, only when the buffered rows run out.

use crate::warehouse::{JobRef, PageRow, ResultPage, Warehouse};
use bqsql_core::{convert_row, DriverError, FieldSchema, GenericValue, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Done,
    Failed,
    Closed,
}

/// Result rows of one query
pub struct Rows {
    warehouse: Arc<dyn Warehouse>,
    job: JobRef,
    columns: Vec<FieldSchema>,
    buffered: VecDeque<PageRow>,
    page_token: Option<String>,
    state: State,
}

impl Rows {
    /// Wrap the first page of an accepted job
    pub fn new(warehouse: Arc<dyn Warehouse>, first_page: ResultPage) -> Self {
        Self {
            warehouse,
            job: first_page.job,
            columns: first_page.schema,
            buffered: first_page.rows.into(),
            page_token: first_page.page_token,
            state: State::Streaming,
        }
    }

    /// Column schemas, in order
    pub fn columns(&self) -> &[FieldSchema] {
        &self.columns
    }

    /// Column names, in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Database type names, in order (e.g. `ARRAY<STRING>`)
    pub fn column_types(&self) -> Vec<String> {
        self.columns.iter().map(FieldSchema::database_type_name).collect()
    }

    /// Job the rows belong to
    pub fn job(&self) -> &JobRef {
        &self.job
    }

    /// Produce the next row
    ///
    /// Returns `Ok(None)` once the result is exhausted, and keeps returning it
    /// on every later call. After any error the iterator is unusable and
    /// every later call returns [`DriverError::IteratorFailed`].
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<Option<Vec<GenericValue>>> {
        loop {
            match self.state {
                State::Done | State::Closed => return Ok(None),
                State::Failed => return Err(DriverError::IteratorFailed),
                State::Streaming => {}
            }

            if let Some(row) = self.buffered.pop_front() {
                let converted = row
                    .into_native(&self.columns)
                    .and_then(|native| convert_row(&native, &self.columns));
                return match converted {
                    Ok(values) => Ok(Some(values)),
                    Err(err) => Err(self.fail(err)),
                };
            }

            let Some(token) = self.page_token.take() else {
                tracing::debug!(job = %self.job.job_id, "Result exhausted");
                self.state = State::Done;
                return Ok(None);
            };

            tracing::debug!(job = %self.job.job_id, page_token = %token, "Fetching next result page");

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DriverError::Cancelled),
                page = self.warehouse.fetch_page(&self.job, &token, &self.columns) => page,
            };

            match fetched {
                Ok(page) => {
                    self.buffered.extend(page.rows);
                    self.page_token = page.page_token;
                }
                Err(err) => return Err(self.fail(as_iteration_error(err))),
            }
        }
    }

    /// Drain every remaining row
    pub async fn collect_all(&mut self, cancel: &CancellationToken) -> Result<Vec<Vec<GenericValue>>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next(cancel).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Stop iterating and drop buffered rows
    pub fn close(&mut self) {
        self.buffered.clear();
        self.page_token = None;
        if self.state == State::Streaming {
            self.state = State::Closed;
        }
    }

    fn fail(&mut self, err: DriverError) -> DriverError {
        tracing::warn!(job = %self.job.job_id, error = %err, "Result iteration failed");
        self.state = State::Failed;
        self.buffered.clear();
        self.page_token = None;
        err
    }
}

/// Upstream failures while paging are iteration failures, whatever phase
/// the client labelled them with
fn as_iteration_error(err: DriverError) -> DriverError {
    match err {
        DriverError::Submission { status, message } | DriverError::Warehouse { status, message } => {
            DriverError::Iteration { status, message }
        }
        other => other,
    }
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("warehouse", &self.warehouse.name())
            .field("job", &self.job)
            .field("columns", &self.column_names())
            .field("buffered", &self.buffered.len())
            .field("state", &self.state)
            .finish()
    }
}
