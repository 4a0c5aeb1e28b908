// Joins live result-set metadata with catalog metadata.
//
// Resolution for each result column, by ordinal:
//   1. the SELECT item at that position is qualified and its prefix names a
//      FROM table (by alias or any suffix of its name) whose catalog columns
//      contain the bare identifier;
//   2. the bare identifier in the first-seen-wins map of all catalog columns;
//   3. the engine-reported column name in the same map;
//   4. nothing from the catalog: datatype comes from the engine type.
// All name matching is case-insensitive.

use std::collections::HashMap;

use crate::models::{CatalogColumn, ColumnMetadata, JdbcColumnMetadata, ParsedTable};
use crate::services::analyzer::Analysis;
use crate::services::catalog_lookup::CatalogEntry;

pub fn associate_metadata(
    analysis: &Analysis,
    live_columns: &[JdbcColumnMetadata],
    catalog: &[CatalogEntry],
) -> Vec<ColumnMetadata> {
    let table_mapping = build_table_name_and_alias_mapping(&analysis.tables);

    let mut columns_by_table: HashMap<usize, HashMap<String, &CatalogColumn>> = HashMap::new();
    let mut default_columns: HashMap<String, &CatalogColumn> = HashMap::new();
    for entry in catalog {
        let by_name = columns_by_table.entry(entry.parsed_table.position).or_default();
        for column in &entry.columns {
            let key = column.name.to_lowercase();
            by_name.entry(key.clone()).or_insert(column);
            default_columns.entry(key).or_insert(column);
        }
    }

    live_columns
        .iter()
        .map(|live| {
            let mut resolved: Option<&CatalogColumn> = None;

            if let Some(parsed) = analysis.column_at(live.ordinal) {
                let identifier = parsed.identifier.to_lowercase();
                resolved = parsed
                    .qualified_name
                    .prefix()
                    .and_then(|prefix| table_mapping.get(&prefix.key()))
                    .and_then(|table| columns_by_table.get(&table.position))
                    .and_then(|by_name| by_name.get(&identifier))
                    .copied();

                if resolved.is_none() {
                    resolved = default_columns.get(&identifier).copied();
                }
            }

            if resolved.is_none() {
                resolved = default_columns.get(&live.name.to_lowercase()).copied();
            }

            build_column_metadata(live, resolved)
        })
        .collect()
}

/// Every way a query can refer to one of its tables: its alias and each
/// suffix of its dotted name (`a.b.c`, `b.c`, `c`). Keys are lower-cased.
pub fn build_table_name_and_alias_mapping(tables: &[ParsedTable]) -> HashMap<String, &ParsedTable> {
    let mut mapping = HashMap::new();
    for table in tables {
        if let Some(alias) = &table.alias {
            mapping.insert(alias.to_lowercase(), table);
        }
        let segments = table.qualified_name.segments();
        for start in 0..segments.len() {
            mapping.insert(segments[start..].join(".").to_lowercase(), table);
        }
    }
    mapping
}

fn build_column_metadata(live: &JdbcColumnMetadata, catalog: Option<&CatalogColumn>) -> ColumnMetadata {
    let engine_table = if live.table_name.is_empty() {
        None
    } else {
        Some(live.table_name.clone())
    };

    match catalog {
        Some(column) => ColumnMetadata {
            name: live.display_name().to_string(),
            datatype: column
                .datatype
                .clone()
                .or_else(|| Some(live.engine_type.logical_type().to_string())),
            description: column.description.clone().unwrap_or_default(),
            ucd: column.ucd.clone(),
            unit: column.unit.clone(),
            table_name: column.table_name.clone().or(engine_table),
            engine_type: Some(live.engine_type),
        },
        None => ColumnMetadata {
            name: live.display_name().to_string(),
            datatype: Some(live.engine_type.logical_type().to_string()),
            description: String::new(),
            ucd: None,
            unit: None,
            table_name: engine_table,
            engine_type: Some(live.engine_type),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogTable, EngineType};
    use crate::services::analyzer::analyze;
    use crate::sql::parser::parse_statement;

    fn live(name: &str, ordinal: usize, engine_type: EngineType) -> JdbcColumnMetadata {
        JdbcColumnMetadata {
            name: name.to_string(),
            label: None,
            table_name: "test".to_string(),
            ordinal,
            type_name: "INTEGER".to_string(),
            schema_name: Some("default".to_string()),
            catalog_name: Some("default".to_string()),
            nullable: true,
            engine_type,
        }
    }

    fn catalog_column(id: i64, table: &str, name: &str, datatype: &str, unit: &str) -> CatalogColumn {
        let mut column = CatalogColumn::described(id, 1, name, datatype, Some("meta.main"), Some(unit));
        column.table_name = Some(table.to_string());
        column.description = Some(format!("{} column", name));
        column
    }

    fn catalog_for(sql: &str, tables: &[(&str, Vec<CatalogColumn>)]) -> (Analysis, Vec<CatalogEntry>) {
        let analysis = analyze(&parse_statement(sql).unwrap());
        let entries = analysis
            .tables
            .iter()
            .filter_map(|parsed| {
                tables
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(&parsed.identifier))
                    .map(|(name, columns)| CatalogEntry {
                        parsed_table: parsed.clone(),
                        table: CatalogTable {
                            id: 1,
                            schema_id: 1,
                            schema_name: Some("default".to_string()),
                            name: name.to_string(),
                            description: Some("Test Table".to_string()),
                        },
                        columns: columns.clone(),
                    })
            })
            .collect();
        (analysis, entries)
    }

    fn test_table() -> Vec<CatalogColumn> {
        vec![
            catalog_column(1, "test", "foo", "double", "ergs"),
            catalog_column(2, "test", "bar", "float", "jansky"),
        ]
    }

    fn units(sql: &str, live_columns: &[JdbcColumnMetadata]) -> Vec<Option<String>> {
        let (analysis, entries) = catalog_for(sql, &[("test", test_table())]);
        associate_metadata(&analysis, live_columns, &entries)
            .into_iter()
            .map(|c| c.unit)
            .collect()
    }

    #[test]
    fn test_associate_metadata_across_select_forms() {
        let foo_bar = [live("foo", 1, EngineType::Double), live("bar", 2, EngineType::Float)];
        let expected = vec![Some("ergs".to_string()), Some("jansky".to_string())];

        for sql in [
            "SELECT * FROM test",
            "SELECT foo, bar FROM test",
            "SELECT foo a, bar b FROM test",
            "SELECT test.foo a, test.bar b FROM test",
            "SELECT a.foo, a.bar FROM test a",
            "SELECT a.foo y, a.bar z FROM test a",
            "SELECT test.* FROM test",
            "SELECT a.* FROM test a",
        ] {
            assert_eq!(units(sql, &foo_bar), expected, "{}", sql);
        }
    }

    #[test]
    fn test_alias_permutation_tracks_underlying_column() {
        let bar_foo = [live("bar", 1, EngineType::Float), live("foo", 2, EngineType::Double)];
        assert_eq!(
            units("SELECT a.bar z, a.foo y FROM test a", &bar_foo),
            vec![Some("jansky".to_string()), Some("ergs".to_string())]
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let foo = [live("foo", 1, EngineType::Double)];
        for sql in [
            "SELECT foo a FROM test",
            "SELECT foO a FROM test",
            "SELECT foO aA FROM test",
            "SELECT xY.foO aA FROM test xY",
        ] {
            assert_eq!(units(sql, &foo), vec![Some("ergs".to_string())], "{}", sql);
        }
    }

    #[test]
    fn test_qualified_reference_beats_first_seen_default() {
        let (analysis, entries) = catalog_for(
            "SELECT s.flux, o.flux FROM Object o, Source s",
            &[
                ("Object", vec![catalog_column(1, "Object", "flux", "double", "nmgy")]),
                ("Source", vec![catalog_column(2, "Source", "flux", "double", "jansky")]),
            ],
        );
        let live_columns = [live("flux", 1, EngineType::Double), live("flux", 2, EngineType::Double)];
        let metadata = associate_metadata(&analysis, &live_columns, &entries);

        assert_eq!(metadata[0].unit.as_deref(), Some("jansky"));
        assert_eq!(metadata[0].table_name.as_deref(), Some("Source"));
        assert_eq!(metadata[1].unit.as_deref(), Some("nmgy"));

        // Unqualified: first table in FROM order wins.
        let (analysis, entries) = catalog_for(
            "SELECT flux FROM Object o, Source s",
            &[
                ("Object", vec![catalog_column(1, "Object", "flux", "double", "nmgy")]),
                ("Source", vec![catalog_column(2, "Source", "flux", "double", "jansky")]),
            ],
        );
        let metadata = associate_metadata(&analysis, &live_columns[..1], &entries);
        assert_eq!(metadata[0].unit.as_deref(), Some("nmgy"));
    }

    #[test]
    fn test_unresolved_columns_use_engine_type() {
        let (analysis, entries) = catalog_for("SELECT count(*), foo FROM test", &[("test", test_table())]);
        let mut count = live("count(*)", 1, EngineType::BigInt);
        count.table_name = String::new();
        let metadata = associate_metadata(
            &analysis,
            &[count, live("foo", 2, EngineType::Double)],
            &entries,
        );

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].name, "count(*)");
        assert_eq!(metadata[0].datatype.as_deref(), Some("long"));
        assert!(metadata[0].ucd.is_none());
        assert!(metadata[0].table_name.is_none());
        assert_eq!(metadata[1].datatype.as_deref(), Some("double"));
        assert_eq!(metadata[1].description, "foo column");
    }

    #[test]
    fn test_display_name_prefers_label() {
        let (analysis, entries) = catalog_for("SELECT foo AS f FROM test", &[("test", test_table())]);
        let mut column = live("foo", 1, EngineType::Double);
        column.label = Some("f".to_string());
        let metadata = associate_metadata(&analysis, &[column], &entries);
        assert_eq!(metadata[0].name, "f");
        assert_eq!(metadata[0].unit.as_deref(), Some("ergs"));
    }

    #[test]
    fn test_table_mapping_keys() {
        let analysis = analyze(&parse_statement("SELECT * FROM lsst.sdss.Object o").unwrap());
        let mapping = build_table_name_and_alias_mapping(&analysis.tables);
        for key in ["o", "object", "sdss.object", "lsst.sdss.object"] {
            assert_eq!(mapping[key].position, 1, "{}", key);
        }
    }
}
