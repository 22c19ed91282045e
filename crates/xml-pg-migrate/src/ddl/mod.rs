//! Source DDL extraction.
//!
//! Pulls `CREATE TABLE` column lists and `ALTER TABLE ... FOREIGN KEY`
//! relations out of a SQL Server flavoured script with regular expressions.
//! This is deliberately shallow: anything that isn't a plain column
//! definition or a single-column foreign key is ignored.

mod types;

pub use types::{Column, Relation, Table};

use crate::error::{MigrateError, Result};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Optional `[schema].` or `schema.` prefix followed by a possibly bracketed name.
const QUALIFIED_NAME: &str = r"(?:\[?\w+\]?\.)?\[?(\w+)\]?";

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?is)CREATE\s+TABLE\s+{}\s*\((.*?)\)\s*;",
            QUALIFIED_NAME
        ))
        .expect("table regex is valid")
    })
}

fn column_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[?([A-Za-z_]\w*)\]?\s+\[?([A-Za-z]\w*)\]?\s*(\([^)]*\))?")
            .expect("column regex is valid")
    })
}

fn relation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)ALTER\s+TABLE\s+{q}\s+(?:WITH\s+(?:NO)?CHECK\s+)?ADD\s+CONSTRAINT\s+\[?(\w+)\]?\s+FOREIGN\s+KEY\s*\(\s*\[?(\w+)\]?\s*\)\s*REFERENCES\s+{q}\s*\(\s*\[?(\w+)\]?\s*\)",
            q = QUALIFIED_NAME
        ))
        .expect("relation regex is valid")
    })
}

/// Items inside a table body that are constraints, not columns. Keywords
/// match as whole words so `CheckedAt` or `UniqueViews` stay columns.
fn constraint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:PRIMARY\s+KEY|FOREIGN\s+KEY|CONSTRAINT|UNIQUE|INDEX|CHECK)\b")
            .expect("constraint regex is valid")
    })
}

/// Parse all `CREATE TABLE` statements, preserving declaration order.
pub fn parse_tables(ddl: &str) -> Vec<Table> {
    let mut tables = Vec::new();

    for caps in table_re().captures_iter(ddl) {
        let mut table = Table::new(&caps[1]);
        let body = strip_line_comments(&caps[2]);

        for item in split_top_level(&body) {
            if constraint_re().is_match(item) {
                continue;
            }
            if let Some(col) = column_re().captures(item) {
                let args: String = col
                    .get(3)
                    .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect())
                    .unwrap_or_default();
                table.columns.push(Column {
                    name: col[1].to_string(),
                    data_type: format!("{}{}", &col[2], args),
                });
            }
        }

        debug!("Parsed table {} ({} columns)", table.name, table.columns.len());
        tables.push(table);
    }

    tables
}

/// Parse all `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` statements.
pub fn parse_relations(ddl: &str) -> Vec<Relation> {
    relation_re()
        .captures_iter(ddl)
        .map(|m| Relation {
            source_table: m[1].to_string(),
            constraint_name: m[2].to_string(),
            source_column: m[3].to_string(),
            target_table: m[4].to_string(),
            target_column: m[5].to_string(),
        })
        .collect()
}

/// Read a DDL file and extract tables and relations from it.
pub fn load_schema<P: AsRef<Path>>(path: P) -> Result<(Vec<Table>, Vec<Relation>)> {
    let path = path.as_ref();
    let ddl = std::fs::read_to_string(path)?;

    let tables = parse_tables(&ddl);
    if tables.is_empty() {
        return Err(MigrateError::Schema(format!(
            "no CREATE TABLE statements found in {:?}",
            path
        )));
    }
    let relations = parse_relations(&ddl);

    info!(
        "Parsed {} tables and {} foreign keys from {:?}",
        tables.len(),
        relations.len(),
        path
    );
    Ok((tables, relations))
}

fn strip_line_comments(body: &str) -> String {
    body.lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a table body on commas that are not nested in parentheses.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                items.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    items.push(body[start..].trim());
    items.retain(|s| !s.is_empty());
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDL: &str = r#"
-- Stack Exchange dump schema
CREATE TABLE Users (
    Id int NOT NULL,
    DisplayName nvarchar(40) NOT NULL,
    Reputation int,
    CreationDate datetime,
    PRIMARY KEY (Id)
);

CREATE TABLE [dbo].[Posts] (
    [Id] int NOT NULL,
    [OwnerUserId] int, -- nullable for community wiki
    [Score] decimal(18, 2),
    [Body] nvarchar(max),
    CONSTRAINT PK_Posts PRIMARY KEY (Id)
);

ALTER TABLE Posts ADD CONSTRAINT FK_Posts_Users FOREIGN KEY (OwnerUserId) REFERENCES Users(Id);
ALTER TABLE [dbo].[Comments] WITH CHECK ADD CONSTRAINT [FK_Comments_Posts] FOREIGN KEY ([PostId]) REFERENCES [dbo].[Posts] ([Id]);
"#;

    #[test]
    fn test_parse_tables_in_order() {
        let tables = parse_tables(DDL);
        let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Users", "Posts"]);
    }

    #[test]
    fn test_parse_columns_skip_constraints() {
        let tables = parse_tables(DDL);
        let users = &tables[0];
        let cols: Vec<_> = users
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        assert_eq!(
            cols,
            vec![
                ("Id", "int"),
                ("DisplayName", "nvarchar(40)"),
                ("Reputation", "int"),
                ("CreationDate", "datetime"),
            ]
        );
    }

    #[test]
    fn test_parse_bracketed_and_commented_columns() {
        let tables = parse_tables(DDL);
        let posts = &tables[1];
        assert_eq!(posts.columns.len(), 4);
        assert_eq!(posts.column("Score").unwrap().data_type, "decimal(18,2)");
        assert_eq!(posts.column("Body").unwrap().data_type, "nvarchar(max)");
        assert!(posts.column("PK_Posts").is_none());
    }

    #[test]
    fn test_parse_single_line_table() {
        let tables =
            parse_tables("CREATE TABLE Users (Id int, Name nvarchar(50), CreatedAt datetime);");
        assert_eq!(tables.len(), 1);
        let names: Vec<_> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Name", "CreatedAt"]);
        assert_eq!(tables[0].columns[1].data_type, "nvarchar(50)");
    }

    #[test]
    fn test_keyword_prefixed_columns_are_kept() {
        let tables = parse_tables(
            "CREATE TABLE Posts (Id int, CheckedAt datetime, UniqueViews int, \
             IndexedBody nvarchar(max), ConstraintType varchar(10), PrimaryKeyHint int, \
             CONSTRAINT PK_Posts PRIMARY KEY (Id), UNIQUE (UniqueViews), \
             CHECK (UniqueViews >= 0));",
        );
        let names: Vec<_> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Id",
                "CheckedAt",
                "UniqueViews",
                "IndexedBody",
                "ConstraintType",
                "PrimaryKeyHint"
            ]
        );
    }

    #[test]
    fn test_parse_relations() {
        let relations = parse_relations(DDL);
        assert_eq!(relations.len(), 2);
        assert_eq!(
            relations[0],
            Relation {
                constraint_name: "FK_Posts_Users".into(),
                source_table: "Posts".into(),
                source_column: "OwnerUserId".into(),
                target_table: "Users".into(),
                target_column: "Id".into(),
            }
        );
        assert_eq!(relations[1].source_table, "Comments");
        assert_eq!(relations[1].target_table, "Posts");
        assert_eq!(relations[1].source_column, "PostId");
    }

    #[test]
    fn test_load_schema_without_tables_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "SELECT 1;").unwrap();
        assert!(matches!(load_schema(file.path()), Err(MigrateError::Schema(_))));
    }

    #[test]
    fn test_split_top_level_keeps_nested_commas() {
        let items = split_top_level("a decimal(18,2), b int");
        assert_eq!(items, vec!["a decimal(18,2)", "b int"]);
    }
}
