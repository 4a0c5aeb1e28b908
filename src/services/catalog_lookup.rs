use crate::models::{CatalogColumn, CatalogTable, ParsedTable};
use crate::services::metaserv::MetaservCatalog;

/// Catalog description of one FROM-clause table.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub parsed_table: ParsedTable,
    pub table: CatalogTable,
    pub columns: Vec<CatalogColumn>,
}

/// Look up catalog metadata for the (unstripped) query tables.
///
/// The first name segment is taken as the catalog database name. Tables the
/// catalog does not know are skipped, as are tables whose lookup fails: the
/// query still runs, with metadata inferred from the result set. Entries come
/// back in FROM-clause order.
pub async fn lookup_metadata(
    catalog: &dyn MetaservCatalog,
    tables: &[ParsedTable],
) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    for parsed_table in tables {
        match lookup_table(catalog, parsed_table).await {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {
                tracing::debug!("Table {} not in catalog", parsed_table.qualified_name);
            }
            Err(e) => {
                tracing::warn!(
                    "Catalog lookup for {} failed, continuing without it: {}",
                    parsed_table.qualified_name,
                    e
                );
            }
        }
    }
    entries
}

async fn lookup_table(
    catalog: &dyn MetaservCatalog,
    parsed_table: &ParsedTable,
) -> Result<Option<CatalogEntry>, crate::api::middleware::AppError> {
    let Some(database_name) = parsed_table.qualified_name.parts.first() else {
        return Ok(None);
    };

    let Some(database) = catalog.find_database_by_name(&database_name.value).await? else {
        return Ok(None);
    };
    let Some(schema) = catalog.find_default_schema_by_database_id(database.id).await? else {
        return Ok(None);
    };

    let tables = catalog.find_tables_by_schema_id(schema.id).await?;
    let Some(mut table) = tables
        .into_iter()
        .find(|t| t.name.eq_ignore_ascii_case(&parsed_table.identifier))
    else {
        return Ok(None);
    };
    table.schema_name = Some(schema.name.clone());

    let mut columns = catalog.find_columns_by_table_id(table.id).await?;
    for column in &mut columns {
        column.table_name = Some(table.name.clone());
    }

    Ok(Some(CatalogEntry {
        parsed_table: parsed_table.clone(),
        table,
        columns,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::analyzer::analyze;
    use crate::services::metaserv::InMemoryCatalog;
    use crate::sql::parser::parse_statement;

    fn catalog() -> InMemoryCatalog {
        let mut catalog = InMemoryCatalog::new();
        let db = catalog.add_database("lsst", "lsst-db", 3306);
        let schema = catalog.add_schema(db, "sdss", true);
        let object = catalog.add_table(schema, "Object");
        catalog.add_column(
            object,
            CatalogColumn::described(0, 0, "ra", "double", Some("pos.eq.ra"), Some("deg")),
        );
        catalog.add_table(schema, "Source");
        catalog
    }

    #[tokio::test]
    async fn test_known_tables_are_annotated() {
        let analysis = analyze(
            &parse_statement("SELECT * FROM lsst.sdss.Object o, lsst.sdss.Source s").unwrap(),
        );
        let entries = lookup_metadata(&catalog(), &analysis.tables).await;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].table.name, "Object");
        assert_eq!(entries[0].table.schema_name.as_deref(), Some("sdss"));
        assert_eq!(entries[0].columns[0].table_name.as_deref(), Some("Object"));
        assert_eq!(entries[0].parsed_table.position, 1);
        assert_eq!(entries[1].parsed_table.alias.as_deref(), Some("s"));
        assert!(entries[1].columns.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tables_are_skipped() {
        let analysis = analyze(
            &parse_statement("SELECT * FROM other.x.Thing, lsst.sdss.Missing, lsst.sdss.Object").unwrap(),
        );
        let entries = lookup_metadata(&catalog(), &analysis.tables).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].parsed_table.position, 3);
    }
}
