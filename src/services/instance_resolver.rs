// Maps the instance-identifying table of a query to a connection URI.
use url::Url;

use crate::api::middleware::AppError;
use crate::models::ParsedTable;
use crate::services::metaserv::MetaservCatalog;

const NO_INSTANCE: &str = "Unable to determine database to connect to";

/// Resolve the database a query should run against.
///
/// The first three-part table name carries the instance. If its first segment
/// looks like `//host:port[/path]` the URI is built from it directly; otherwise
/// the segment names a catalog database and the URI is built from that
/// database's host, port and default schema.
pub async fn resolve_database_uri(
    catalog: &dyn MetaservCatalog,
    tables: &[ParsedTable],
    scheme: &str,
) -> Result<String, AppError> {
    let table = tables
        .iter()
        .find(|t| t.qualified_name.len() == 3)
        .ok_or_else(|| {
            AppError::Resolution(
                "Unable to determine a table identifying the database instance".to_string(),
            )
        })?;

    let instance = &table.qualified_name.parts[0].value;
    tracing::debug!("Resolving database instance '{}'", instance);

    if instance.starts_with("//") {
        return uri_from_identifier(instance, scheme);
    }

    let database = catalog
        .find_database_by_name(instance)
        .await?
        .ok_or_else(|| AppError::Resolution(NO_INSTANCE.to_string()))?;
    let schema = catalog.find_default_schema_by_database_id(database.id).await?;
    let schema_name = schema.map(|s| s.name).unwrap_or_default();

    let uri = format!("{}://{}:{}/{}", scheme, database.host, database.port, schema_name);
    tracing::debug!("Instance '{}' resolved through catalog to {}", instance, uri);
    Ok(uri)
}

fn uri_from_identifier(identifier: &str, scheme: &str) -> Result<String, AppError> {
    let parsed = Url::parse(&format!("{}:{}", scheme, identifier))
        .map_err(|e| AppError::Resolution(format!("{}: {}", NO_INSTANCE, e)))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::Resolution(NO_INSTANCE.to_string()))?;

    let mut uri = format!("{}://{}", scheme, host);
    if let Some(port) = parsed.port() {
        uri.push_str(&format!(":{}", port));
    }
    let path = parsed.path();
    if !path.is_empty() && path != "/" {
        uri.push_str(path);
    }
    Ok(uri)
}
