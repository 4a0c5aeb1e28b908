pub mod analyzer;
pub mod catalog_lookup;
pub mod credentials;
pub mod database; // Execution backends (MySQL, PostgreSQL)
pub mod instance_resolver;
pub mod job_manager;
pub mod metadata_reconciler;
pub mod metaserv; // Catalog DAO
pub mod query_service;
pub mod query_task;
pub mod result_stream;
pub mod result_writer;
pub mod rewrite; // Instance stripping and ADQL spatial rewrites

pub use credentials::ServiceAccountConnections;
pub use job_manager::{JobManager, JobSettings};
pub use metaserv::{InMemoryCatalog, MetaservCatalog, MysqlMetaserv};
pub use query_service::QueryService;
pub use query_task::ExecutionContext;
