//! Metadata client: datasets, tables and table schemas of one project

use crate::warehouse::{TableMetadata, Warehouse};
use bqsql_core::schema::column_names;
use bqsql_core::Result;
use std::sync::{Arc, RwLock};

/// Warehouse client scoped to a project
///
/// The processing location is mutable: the cache re-applies the caller's
/// location (or the tenant default) every time it hands the client out.
pub struct ApiClient {
    warehouse: Arc<dyn Warehouse>,
    project: String,
    location: RwLock<String>,
}

impl ApiClient {
    pub fn new(warehouse: Arc<dyn Warehouse>, project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            warehouse,
            project: project.into(),
            location: RwLock::new(location.into()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Current processing location
    pub fn location(&self) -> String {
        match self.location.read() {
            Ok(location) => location.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_location(&self, location: &str) {
        match self.location.write() {
            Ok(mut current) => *current = location.to_string(),
            Err(poisoned) => *poisoned.into_inner() = location.to_string(),
        }
    }

    pub async fn list_datasets(&self) -> Result<Vec<String>> {
        self.warehouse.list_datasets(&self.project).await
    }

    pub async fn list_tables(&self, dataset: &str) -> Result<Vec<String>> {
        self.warehouse.list_tables(&self.project, dataset).await
    }

    pub async fn table_schema(&self, dataset: &str, table: &str) -> Result<TableMetadata> {
        self.warehouse.table_schema(&self.project, dataset, table).await
    }

    /// Flattened column names of a table
    ///
    /// Nested record children appear as `parent.child`. With
    /// `orderable_only`, geography columns and record children are left out.
    pub async fn columns(&self, dataset: &str, table: &str, orderable_only: bool) -> Result<Vec<String>> {
        let metadata = self.table_schema(dataset, table).await?;
        Ok(column_names(&metadata.schema, orderable_only))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("warehouse", &self.warehouse.name())
            .field("project", &self.project)
            .field("location", &self.location())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWarehouse;
    use bqsql_core::{FieldSchema, TypeTag};

    #[tokio::test]
    async fn test_columns_flatten_records() {
        let warehouse = MockWarehouse::new();
        warehouse
            .add_table(
                "p",
                "d",
                "t",
                vec![
                    FieldSchema::new("id", TypeTag::Integer),
                    FieldSchema::new("area", TypeTag::Geography),
                    FieldSchema::record("address", vec![FieldSchema::new("city", TypeTag::String)]),
                ],
            )
            .await;

        let client = ApiClient::new(Arc::new(warehouse), "p", "US");
        assert_eq!(
            client.columns("d", "t", false).await.unwrap(),
            vec!["id", "area", "address", "address.city"]
        );
        assert_eq!(client.columns("d", "t", true).await.unwrap(), vec!["id", "address"]);
    }

    #[test]
    fn test_location_is_mutable() {
        let client = ApiClient::new(Arc::new(MockWarehouse::new()), "p", "US");
        client.set_location("EU");
        assert_eq!(client.location(), "EU");
    }
}
