//! Filtered PostgreSQL schema generation.
//!
//! Only tables that have a dump, and only columns that were seen in it, make
//! it into the generated script. Foreign keys are kept when both ends
//! survived the filter.

use crate::ddl::{Column, Relation, Table};
use crate::dump::DumpShape;
use crate::error::Result;
use crate::import::select_columns;
use crate::target::{qualify_table, quote_ident};
use crate::typemap;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// Render the filtered schema script.
///
/// Layout: `CREATE SCHEMA`, optional `DROP TABLE ... CASCADE` in reverse
/// declared order, one `CREATE TABLE` per surviving table in declared order,
/// then foreign keys deduplicated by constraint name.
pub fn render_filtered_schema(
    tables: &[Table],
    relations: &[Relation],
    dumps: &HashMap<String, DumpShape>,
    schema: &str,
    drop_existing: bool,
) -> String {
    // Surviving tables with their surviving columns
    let kept: Vec<(&Table, Vec<&Column>)> = tables
        .iter()
        .filter_map(|t| {
            let shape = dumps.get(&t.name)?;
            let cols = select_columns(t, shape);
            if cols.is_empty() {
                debug!("{}: no common columns, not emitted", t.name);
                None
            } else {
                Some((t, cols))
            }
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "-- filtered schema");
    let _ = writeln!(out, "CREATE SCHEMA IF NOT EXISTS {};\n", quote_ident(schema));

    if drop_existing {
        let _ = writeln!(out, "-- Drop existing tables in reverse declared order");
        for (table, _) in kept.iter().rev() {
            let _ = writeln!(
                out,
                "DROP TABLE IF EXISTS {} CASCADE;",
                qualify_table(schema, &table.name)
            );
        }
        out.push('\n');
    }

    for (table, cols) in &kept {
        let _ = writeln!(
            out,
            "CREATE TABLE IF NOT EXISTS {} (",
            qualify_table(schema, &table.name)
        );
        for (i, col) in cols.iter().enumerate() {
            let pk = if col.name.eq_ignore_ascii_case("Id") {
                " PRIMARY KEY"
            } else {
                ""
            };
            let comma = if i + 1 < cols.len() { "," } else { "" };
            let _ = writeln!(
                out,
                "    {} {}{}{}",
                quote_ident(&col.name),
                typemap::to_postgres(&col.data_type),
                pk,
                comma
            );
        }
        let _ = writeln!(out, ");\n");
    }

    let columns: HashSet<(&str, &str)> = kept
        .iter()
        .flat_map(|(t, cols)| cols.iter().map(|c| (t.name.as_str(), c.name.as_str())))
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();

    let _ = writeln!(out, "-- Foreign key constraints");
    for rel in relations {
        let survives = columns.contains(&(rel.source_table.as_str(), rel.source_column.as_str()))
            && columns.contains(&(rel.target_table.as_str(), rel.target_column.as_str()));
        if !survives || !seen.insert(rel.constraint_name.as_str()) {
            continue;
        }

        let source = qualify_table(schema, &rel.source_table);
        let constraint = quote_ident(&rel.constraint_name);
        let _ = writeln!(
            out,
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            source, constraint
        );
        let _ = writeln!(
            out,
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({});",
            source,
            constraint,
            quote_ident(&rel.source_column),
            qualify_table(schema, &rel.target_table),
            quote_ident(&rel.target_column)
        );
    }

    out
}

/// Render the filtered schema and write it to `path`.
pub fn write_filtered_schema<P: AsRef<Path>>(
    tables: &[Table],
    relations: &[Relation],
    dumps: &HashMap<String, DumpShape>,
    schema: &str,
    drop_existing: bool,
    path: P,
) -> Result<String> {
    let path = path.as_ref();
    let sql = render_filtered_schema(tables, relations, dumps, schema, drop_existing);
    std::fs::write(path, &sql)?;
    info!("Filtered schema written to {}", path.display());
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Vec<Table> {
        vec![
            Table::new("Users")
                .with_column("Id", "int")
                .with_column("Name", "nvarchar(50)")
                .with_column("Bio", "nvarchar(max)"),
            Table::new("Posts")
                .with_column("Id", "int")
                .with_column("OwnerUserId", "int")
                .with_column("Score", "decimal(18,2)"),
            Table::new("Badges").with_column("Id", "int"),
        ]
    }

    fn shape(name: &str, cols: &[&str]) -> DumpShape {
        let mut shape = DumpShape::new(name);
        shape.columns.extend(cols.iter().map(|c| c.to_string()));
        shape
    }

    fn dumps() -> HashMap<String, DumpShape> {
        HashMap::from([
            ("Users".to_string(), shape("Users", &["Id", "Name"])),
            ("Posts".to_string(), shape("Posts", &["Id", "OwnerUserId", "Score"])),
        ])
    }

    fn fk(name: &str, src: &str, src_col: &str, tgt: &str, tgt_col: &str) -> Relation {
        Relation {
            constraint_name: name.into(),
            source_table: src.into(),
            source_column: src_col.into(),
            target_table: tgt.into(),
            target_column: tgt_col.into(),
        }
    }

    #[test]
    fn test_only_tables_and_columns_with_data() {
        let sql = render_filtered_schema(&tables(), &[], &dumps(), "so", true);

        assert!(sql.contains("CREATE SCHEMA IF NOT EXISTS \"so\";"));
        assert!(sql.contains(
            "CREATE TABLE IF NOT EXISTS \"so\".\"Users\" (\n    \"Id\" INTEGER PRIMARY KEY,\n    \"Name\" VARCHAR(50)\n);"
        ));
        assert!(!sql.contains("Bio"));
        assert!(!sql.contains("Badges"));
        assert!(sql.contains("\"Score\" NUMERIC(18,2)"));
    }

    #[test]
    fn test_drops_in_reverse_declared_order() {
        let sql = render_filtered_schema(&tables(), &[], &dumps(), "so", true);
        let posts = sql.find("DROP TABLE IF EXISTS \"so\".\"Posts\" CASCADE;").unwrap();
        let users = sql.find("DROP TABLE IF EXISTS \"so\".\"Users\" CASCADE;").unwrap();
        assert!(posts < users);

        let without = render_filtered_schema(&tables(), &[], &dumps(), "so", false);
        assert!(!without.contains("DROP TABLE"));
    }

    #[test]
    fn test_foreign_keys_filtered_and_deduplicated() {
        let relations = vec![
            fk("FK_Posts_Users", "Posts", "OwnerUserId", "Users", "Id"),
            fk("FK_Posts_Users", "Posts", "OwnerUserId", "Users", "Id"),
            fk("FK_Badges_Users", "Badges", "UserId", "Users", "Id"),
            fk("FK_Users_Bio", "Users", "Bio", "Posts", "Id"),
        ];
        let sql = render_filtered_schema(&tables(), &relations, &dumps(), "so", true);

        assert_eq!(sql.matches("ADD CONSTRAINT").count(), 1);
        assert!(sql.contains(
            "ALTER TABLE \"so\".\"Posts\" DROP CONSTRAINT IF EXISTS \"FK_Posts_Users\";\n\
             ALTER TABLE \"so\".\"Posts\" ADD CONSTRAINT \"FK_Posts_Users\" FOREIGN KEY (\"OwnerUserId\") REFERENCES \"so\".\"Users\"(\"Id\");"
        ));
    }

    #[test]
    fn test_write_filtered_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("filtered_schema.sql");
        let sql = write_filtered_schema(&tables(), &[], &dumps(), "so", true, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), sql);
    }
}
