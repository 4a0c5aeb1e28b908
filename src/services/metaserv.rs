// Read-only access to the metaserv catalog.
use async_trait::async_trait;
use mysql_async::{prelude::*, Opts, Pool};

use crate::api::middleware::AppError;
use crate::models::{CatalogColumn, CatalogDatabase, CatalogSchema, CatalogTable};

/// The four catalog lookups the query pipeline needs.
#[async_trait]
pub trait MetaservCatalog: Send + Sync {
    async fn find_database_by_name(&self, name: &str) -> Result<Option<CatalogDatabase>, AppError>;

    async fn find_default_schema_by_database_id(
        &self,
        db_id: i64,
    ) -> Result<Option<CatalogSchema>, AppError>;

    async fn find_tables_by_schema_id(&self, schema_id: i64) -> Result<Vec<CatalogTable>, AppError>;

    async fn find_columns_by_table_id(&self, table_id: i64) -> Result<Vec<CatalogColumn>, AppError>;
}

/// Metaserv backed by its MySQL schema (`MSDatabase`, `MSDatabaseSchema`,
/// `MSDatabaseTable`, `MSDatabaseColumn`).
pub struct MysqlMetaserv {
    pool: Pool,
}

impl MysqlMetaserv {
    pub fn new(metaserv_url: &str) -> Result<Self, AppError> {
        let opts = Opts::from_url(metaserv_url)
            .map_err(|e| AppError::Catalog(format!("Invalid metaserv URL: {}", e)))?;
        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    async fn get_conn(&self) -> Result<mysql_async::Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Catalog(format!("Failed to connect to metaserv: {}", e)))
    }
}

fn lookup_failed(what: &str, err: mysql_async::Error) -> AppError {
    AppError::Catalog(format!("Metaserv lookup of {} failed: {}", what, err))
}

#[async_trait]
impl MetaservCatalog for MysqlMetaserv {
    async fn find_database_by_name(&self, name: &str) -> Result<Option<CatalogDatabase>, AppError> {
        let mut conn = self.get_conn().await?;
        let row: Option<(i64, String, Option<String>, String, u16)> = conn
            .exec_first(
                "select id, name, description, conn_host, conn_port from MSDatabase where name = ?",
                (name,),
            )
            .await
            .map_err(|e| lookup_failed("database", e))?;

        Ok(row.map(|(id, name, description, host, port)| CatalogDatabase {
            id,
            name,
            description,
            host,
            port,
        }))
    }

    async fn find_default_schema_by_database_id(
        &self,
        db_id: i64,
    ) -> Result<Option<CatalogSchema>, AppError> {
        let mut conn = self.get_conn().await?;
        let row: Option<(i64, i64, String, Option<String>, bool)> = conn
            .exec_first(
                "select id, db_id, name, description, is_default_schema from MSDatabaseSchema \
                 where db_id = ? and is_default_schema = 1",
                (db_id,),
            )
            .await
            .map_err(|e| lookup_failed("default schema", e))?;

        Ok(row.map(|(id, db_id, name, description, is_default)| CatalogSchema {
            id,
            db_id,
            name,
            description,
            is_default,
        }))
    }

    async fn find_tables_by_schema_id(&self, schema_id: i64) -> Result<Vec<CatalogTable>, AppError> {
        let mut conn = self.get_conn().await?;
        let rows: Vec<(i64, i64, String, Option<String>)> = conn
            .exec(
                "select id, schema_id, name, description from MSDatabaseTable where schema_id = ?",
                (schema_id,),
            )
            .await
            .map_err(|e| lookup_failed("tables", e))?;

        Ok(rows
            .into_iter()
            .map(|(id, schema_id, name, description)| CatalogTable {
                id,
                schema_id,
                schema_name: None,
                name,
                description,
            })
            .collect())
    }

    async fn find_columns_by_table_id(&self, table_id: i64) -> Result<Vec<CatalogColumn>, AppError> {
        let mut conn = self.get_conn().await?;
        #[allow(clippy::type_complexity)]
        let rows: Vec<(
            i64,
            i64,
            String,
            Option<String>,
            Option<i32>,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<bool>,
            Option<i32>,
        )> = conn
            .exec(
                "select id, table_id, name, description, ordinal, ucd, unit, datatype, nullable, arraysize \
                 from MSDatabaseColumn where table_id = ?",
                (table_id,),
            )
            .await
            .map_err(|e| lookup_failed("columns", e))?;

        Ok(rows
            .into_iter()
            .map(
                |(id, table_id, name, description, ordinal, ucd, unit, datatype, nullable, array_size)| {
                    CatalogColumn {
                        id,
                        table_id,
                        table_name: None,
                        name,
                        description,
                        ordinal,
                        ucd,
                        unit,
                        datatype,
                        nullable,
                        array_size,
                    }
                },
            )
            .collect())
    }
}

/// Catalog held in memory. Useful for static deployments and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    databases: Vec<CatalogDatabase>,
    schemas: Vec<CatalogSchema>,
    tables: Vec<CatalogTable>,
    columns: Vec<CatalogColumn>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new database id.
    pub fn add_database(&mut self, name: &str, host: &str, port: u16) -> i64 {
        let id = self.databases.len() as i64 + 1;
        self.databases.push(CatalogDatabase {
            id,
            name: name.to_string(),
            description: None,
            host: host.to_string(),
            port,
        });
        id
    }

    pub fn add_schema(&mut self, db_id: i64, name: &str, is_default: bool) -> i64 {
        let id = self.schemas.len() as i64 + 1;
        self.schemas.push(CatalogSchema {
            id,
            db_id,
            name: name.to_string(),
            description: None,
            is_default,
        });
        id
    }

    pub fn add_table(&mut self, schema_id: i64, name: &str) -> i64 {
        let id = self.tables.len() as i64 + 1;
        self.tables.push(CatalogTable {
            id,
            schema_id,
            schema_name: None,
            name: name.to_string(),
            description: None,
        });
        id
    }

    /// Adds a column to `table_id`; the column's own `table_id` is overwritten.
    pub fn add_column(&mut self, table_id: i64, mut column: CatalogColumn) {
        column.table_id = table_id;
        if column.id == 0 {
            column.id = self.columns.len() as i64 + 1;
        }
        self.columns.push(column);
    }
}

#[async_trait]
impl MetaservCatalog for InMemoryCatalog {
    async fn find_database_by_name(&self, name: &str) -> Result<Option<CatalogDatabase>, AppError> {
        Ok(self.databases.iter().find(|d| d.name == name).cloned())
    }

    async fn find_default_schema_by_database_id(
        &self,
        db_id: i64,
    ) -> Result<Option<CatalogSchema>, AppError> {
        Ok(self
            .schemas
            .iter()
            .find(|s| s.db_id == db_id && s.is_default)
            .cloned())
    }

    async fn find_tables_by_schema_id(&self, schema_id: i64) -> Result<Vec<CatalogTable>, AppError> {
        Ok(self
            .tables
            .iter()
            .filter(|t| t.schema_id == schema_id)
            .cloned()
            .collect())
    }

    async fn find_columns_by_table_id(&self, table_id: i64) -> Result<Vec<CatalogColumn>, AppError> {
        Ok(self
            .columns
            .iter()
            .filter(|c| c.table_id == table_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_catalog_lookups() {
        let mut catalog = InMemoryCatalog::new();
        let db = catalog.add_database("lsst", "lsst-db", 3306);
        catalog.add_schema(db, "scratch", false);
        let schema = catalog.add_schema(db, "sdss", true);
        let table = catalog.add_table(schema, "Object");
        catalog.add_column(
            table,
            CatalogColumn::described(0, 0, "ra", "double", Some("pos.eq.ra"), Some("deg")),
        );

        let database = catalog.find_database_by_name("lsst").await.unwrap().unwrap();
        assert_eq!(database.port, 3306);
        assert!(catalog.find_database_by_name("nope").await.unwrap().is_none());

        let default_schema = catalog
            .find_default_schema_by_database_id(database.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(default_schema.name, "sdss");

        let tables = catalog.find_tables_by_schema_id(default_schema.id).await.unwrap();
        assert_eq!(tables.len(), 1);
        let columns = catalog.find_columns_by_table_id(tables[0].id).await.unwrap();
        assert_eq!(columns[0].unit.as_deref(), Some("deg"));
        assert_eq!(columns[0].table_id, table);
    }

    #[test]
    fn test_mysql_metaserv_rejects_bad_url() {
        assert!(matches!(
            MysqlMetaserv::new("not a url"),
            Err(AppError::Catalog(_))
        ));
    }
}
