//! Type mapping from declared SQL Server column types to PostgreSQL.

/// Longest character column kept as VARCHAR; anything wider becomes TEXT.
const MAX_VARCHAR_LENGTH: u32 = 255;

/// Map a declared source type such as `nvarchar(50)` or `decimal(18,2)` to a
/// PostgreSQL column type.
pub fn to_postgres(declared: &str) -> String {
    let declared = declared.trim();
    let (base, args) = split_type(declared);
    let base = base.to_lowercase();
    let length = args.first().and_then(|a| a.parse::<u32>().ok());
    let is_max = args
        .first()
        .map(|a| a.eq_ignore_ascii_case("max"))
        .unwrap_or(false);

    match base.as_str() {
        // Boolean
        "bit" => "BOOLEAN".to_string(),

        // Integer types
        "tinyint" | "smallint" => "SMALLINT".to_string(),
        "int" | "integer" => "INTEGER".to_string(),
        "bigint" => "BIGINT".to_string(),

        // Decimal/numeric
        "decimal" | "numeric" => {
            if args.is_empty() {
                "NUMERIC".to_string()
            } else {
                format!("NUMERIC({})", args.join(","))
            }
        }
        "money" => "NUMERIC(19,4)".to_string(),
        "smallmoney" => "NUMERIC(10,4)".to_string(),

        // Floating point
        "float" => "DOUBLE PRECISION".to_string(),
        "real" => "REAL".to_string(),

        // String types
        "char" | "nchar" => match length {
            Some(n) if n <= MAX_VARCHAR_LENGTH => format!("CHAR({})", n),
            Some(_) => "TEXT".to_string(),
            None => "CHAR".to_string(),
        },
        "varchar" | "nvarchar" => match length {
            _ if is_max => "TEXT".to_string(),
            Some(n) if n <= MAX_VARCHAR_LENGTH => format!("VARCHAR({})", n),
            Some(_) => "TEXT".to_string(),
            None => "VARCHAR".to_string(),
        },
        "text" | "ntext" => "TEXT".to_string(),

        // Binary types
        "binary" | "varbinary" | "image" => "BYTEA".to_string(),

        // Date/time types
        "date" => "DATE".to_string(),
        "time" => "TIME".to_string(),
        "datetime" | "datetime2" | "smalldatetime" | "timestamp" => "TIMESTAMP".to_string(),
        "datetimeoffset" => "TIMESTAMPTZ".to_string(),

        // GUID
        "uniqueidentifier" => "UUID".to_string(),

        "xml" => "XML".to_string(),

        // Unknown types pass through
        _ => declared.to_uppercase(),
    }
}

/// Split `name(a, b)` into `name` and its trimmed arguments.
fn split_type(declared: &str) -> (&str, Vec<&str>) {
    match declared.find('(') {
        Some(open) => {
            let close = declared.rfind(')').unwrap_or(declared.len());
            let inner = if close > open {
                &declared[open + 1..close]
            } else {
                ""
            };
            let args = inner
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect();
            (declared[..open].trim(), args)
        }
        None => (declared, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_types() {
        assert_eq!(to_postgres("int"), "INTEGER");
        assert_eq!(to_postgres("INT"), "INTEGER");
        assert_eq!(to_postgres("bigint"), "BIGINT");
        assert_eq!(to_postgres("smallint"), "SMALLINT");
        assert_eq!(to_postgres("tinyint"), "SMALLINT");
    }

    #[test]
    fn test_string_types() {
        assert_eq!(to_postgres("nvarchar(50)"), "VARCHAR(50)");
        assert_eq!(to_postgres("varchar(255)"), "VARCHAR(255)");
        assert_eq!(to_postgres("nvarchar(4000)"), "TEXT");
        assert_eq!(to_postgres("nvarchar(max)"), "TEXT");
        assert_eq!(to_postgres("varchar"), "VARCHAR");
        assert_eq!(to_postgres("nchar(10)"), "CHAR(10)");
        assert_eq!(to_postgres("ntext"), "TEXT");
    }

    #[test]
    fn test_decimal_types() {
        assert_eq!(to_postgres("decimal(18,2)"), "NUMERIC(18,2)");
        assert_eq!(to_postgres("numeric( 10 , 4 )"), "NUMERIC(10,4)");
        assert_eq!(to_postgres("decimal"), "NUMERIC");
        assert_eq!(to_postgres("money"), "NUMERIC(19,4)");
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(to_postgres("datetime"), "TIMESTAMP");
        assert_eq!(to_postgres("datetime2(7)"), "TIMESTAMP");
        assert_eq!(to_postgres("datetimeoffset"), "TIMESTAMPTZ");
        assert_eq!(to_postgres("date"), "DATE");
    }

    #[test]
    fn test_special_types() {
        assert_eq!(to_postgres("uniqueidentifier"), "UUID");
        assert_eq!(to_postgres("bit"), "BOOLEAN");
        assert_eq!(to_postgres("varbinary(max)"), "BYTEA");
        assert_eq!(to_postgres("geography"), "GEOGRAPHY");
    }
}
