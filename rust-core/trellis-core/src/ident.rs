//! # Identifier Sanitizer
//!
//! Table, column, alias and ORDER BY names cannot be bound as parameters, so
//! they are checked against an allow-list (`[A-Za-z0-9_]+` per dotted
//! segment) and double-quoted here. Everything that becomes a SQL name goes
//! through this module.
//!
//! Column entries containing a parenthesis are treated as expressions
//! (`COUNT(*)`, `LOWER(name)`) and pass through untouched. Callers must not
//! build such entries from user input.

use crate::error::{Error, Result};

/// Whether `token` is a single allow-listed identifier segment
fn is_safe_segment(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn quote_segment(segment: &str) -> String {
    format!("\"{segment}\"")
}

/// Quote a possibly dotted, possibly aliased identifier.
///
/// `users` becomes `"users"`, `u.name` becomes `"u"."name"` and `users u`
/// becomes `"users" u`.
///
/// # Errors
///
/// Returns `Error::InvalidIdentifier` if any segment or the alias contains a
/// character outside `[A-Za-z0-9_]`.
pub fn quote_identifier(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let (ident, alias) = match trimmed.split_once(char::is_whitespace) {
        Some((ident, alias)) => (ident, Some(alias.trim_start())),
        None => (trimmed, None),
    };

    let quoted = ident
        .split('.')
        .map(|segment| {
            if is_safe_segment(segment) {
                Ok(quote_segment(segment))
            } else {
                Err(Error::invalid_identifier(raw))
            }
        })
        .collect::<Result<Vec<_>>>()?
        .join(".");

    match alias {
        Some(alias) if is_safe_segment(alias) => Ok(format!("{quoted} {alias}")),
        Some(_) => Err(Error::invalid_identifier(raw)),
        None => Ok(quoted),
    }
}

/// Quote a comma-separated SELECT column list.
///
/// - `*` passes through.
/// - `table.*` becomes `"table".*`.
/// - entries with a parenthesis pass through unchanged (expressions).
/// - `expr AS alias` (any case) quotes both sides.
/// - anything else goes through [`quote_identifier`].
///
/// # Errors
///
/// Returns `Error::InvalidIdentifier` for any entry that fails the checks.
pub fn quote_column_list(spec: &str) -> Result<String> {
    let columns = split_top_level(spec)
        .into_iter()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(quote_column)
        .collect::<Result<Vec<_>>>()?;

    if columns.is_empty() {
        return Ok("*".to_string());
    }
    Ok(columns.join(", "))
}

fn quote_column(column: &str) -> Result<String> {
    if column == "*" {
        return Ok(column.to_string());
    }
    if let Some(table) = column.strip_suffix(".*") {
        return quote_identifier(table).map(|t| format!("{t}.*"));
    }
    if column.contains('(') {
        return Ok(column.to_string());
    }
    if let Some((expr, alias)) = split_as(column) {
        return Ok(format!(
            "{} AS {}",
            quote_identifier(expr)?,
            quote_identifier(alias)?
        ));
    }
    quote_identifier(column)
}

/// Split `expr AS alias` on a case-insensitive ` AS `
fn split_as(column: &str) -> Option<(&str, &str)> {
    let upper = column.to_ascii_uppercase();
    upper
        .find(" AS ")
        .map(|at| (&column[..at], &column[at + 4..]))
}

/// Split on commas that are not nested inside parentheses
fn split_top_level(spec: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in spec.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&spec[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&spec[start..]);
    parts
}

/// Sort direction of one ORDER BY clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
}

impl Direction {
    fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }

    const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A parsed ORDER BY list: quoted columns with optional directions
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderSpec {
    clauses: Vec<(String, Option<Direction>)>,
}

impl OrderSpec {
    /// Parse a list such as `name DESC, id`.
    ///
    /// The first token of each clause is quoted as an identifier; a second
    /// token is kept only if it is `ASC` or `DESC` (any case). Anything else
    /// in a clause is dropped, as are empty clauses.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidIdentifier` if a column token fails the check.
    pub fn parse(spec: &str) -> Result<Self> {
        let clauses = spec
            .split(',')
            .filter_map(|clause| {
                let mut tokens = clause.split_whitespace();
                let column = tokens.next()?;
                let direction = tokens.next().and_then(Direction::parse);
                Some(quote_identifier(column).map(|quoted| (quoted, direction)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    /// Quoted clauses in order
    #[must_use]
    pub fn clauses(&self) -> &[(String, Option<Direction>)] {
        &self.clauses
    }

    /// Whether no clause survived parsing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Render as SQL, without the `ORDER BY` keyword
    #[must_use]
    pub fn to_sql(&self) -> String {
        self.clauses
            .iter()
            .map(|(column, direction)| match direction {
                Some(d) => format!("{column} {}", d.as_sql()),
                None => column.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Quote an ORDER BY list such as `name DESC, id`; see [`OrderSpec::parse`]
///
/// # Errors
///
/// Returns `Error::InvalidIdentifier` if a column token fails the check.
pub fn quote_order_list(spec: &str) -> Result<String> {
    OrderSpec::parse(spec).map(|order| order.to_sql())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users").unwrap(), r#""users""#);
        assert_eq!(quote_identifier("  u.name ").unwrap(), r#""u"."name""#);
        assert_eq!(quote_identifier("users u").unwrap(), r#""users" u"#);
        assert_eq!(quote_identifier("users   u").unwrap(), r#""users" u"#);
    }

    #[test]
    fn test_quote_identifier_rejects_injection() {
        for bad in [
            "",
            "users;",
            "users; DROP TABLE x",
            "na\"me",
            "a..b",
            "users u extra",
            "users u-x",
            "tab\u{e9}",
        ] {
            let err = quote_identifier(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidIdentifier { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_quote_column_list() {
        assert_eq!(quote_column_list("*").unwrap(), "*");
        assert_eq!(quote_column_list("").unwrap(), "*");
        assert_eq!(
            quote_column_list("id, u.name, posts.*").unwrap(),
            r#""id", "u"."name", "posts".*"#
        );
        assert_eq!(
            quote_column_list("name as n, u.id AS user_id").unwrap(),
            r#""name" AS "n", "u"."id" AS "user_id""#
        );
    }

    #[test]
    fn test_expressions_pass_through() {
        assert_eq!(
            quote_column_list("COUNT(*) AS total, COALESCE(a, b)").unwrap(),
            "COUNT(*) AS total, COALESCE(a, b)"
        );
    }

    #[test]
    fn test_quote_column_list_rejects_bad_entries() {
        assert!(quote_column_list("id, name; --").is_err());
        assert!(quote_column_list("bad-table.*").is_err());
        assert!(quote_column_list("name AS n-1").is_err());
    }

    #[test]
    fn test_quote_order_list() {
        assert_eq!(
            quote_order_list("name desc, id").unwrap(),
            r#""name" DESC, "id""#
        );
        assert_eq!(
            quote_order_list("created_at ASC").unwrap(),
            r#""created_at" ASC"#
        );
    }

    #[test]
    fn test_order_direction_outside_vocabulary_is_dropped() {
        assert_eq!(quote_order_list("name sideways").unwrap(), r#""name""#);
        assert_eq!(
            quote_order_list("name RANDOM() extra").unwrap(),
            r#""name""#
        );
        assert_eq!(quote_order_list(" , ").unwrap(), "");
    }

    #[test]
    fn test_order_spec_clauses() {
        let order = OrderSpec::parse("a desc, b, c Asc").unwrap();
        assert_eq!(
            order.clauses(),
            &[
                (r#""a""#.to_string(), Some(Direction::Desc)),
                (r#""b""#.to_string(), None),
                (r#""c""#.to_string(), Some(Direction::Asc)),
            ]
        );
        assert!(OrderSpec::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_order_column_is_still_checked() {
        let err = quote_order_list("name, id; DROP").unwrap_err();
        assert!(err.to_string().contains("id;"));
    }

    proptest! {
        #[test]
        fn prop_valid_identifiers_quote(
            segments in prop::collection::vec("[A-Za-z0-9_]{1,10}", 1..4),
            alias in prop::option::of("[A-Za-z0-9_]{1,6}"),
        ) {
            let mut raw = segments.join(".");
            if let Some(alias) = &alias {
                raw = format!("{raw} {alias}");
            }
            let quoted = quote_identifier(&raw).unwrap();
            for segment in &segments {
                let expected = format!("\"{segment}\"");
                prop_assert!(quoted.contains(&expected));
            }
        }

        #[test]
        fn prop_foreign_character_rejected(
            prefix in "[A-Za-z0-9_]{0,5}",
            bad in "[^A-Za-z0-9_.\\s]",
            suffix in "[A-Za-z0-9_]{0,5}",
        ) {
            let raw = format!("{prefix}{bad}{suffix}");
            prop_assert!(quote_identifier(&raw).is_err());
        }
    }
}
