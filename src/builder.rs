//! Statement composition from sparse, optional inputs.
//!
//! Every value is bound through a `?` placeholder. Only the shape of the
//! statement (which columns, how many placeholders, which filters) varies
//! with the inputs.

use crate::error::{DbError, Result};
use crate::table::{Row, Value};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Strings of this length or shorter count as absent.
pub const MIN_TEXT_LEN: usize = 2;

/// SQL text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// The statement with each placeholder replaced by its value as a SQL
    /// literal. For dry runs and audit output only, never for execution.
    pub fn to_literal_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut params = self.params.iter();
        let mut in_string = false;
        for ch in self.sql.chars() {
            match ch {
                '\'' => {
                    in_string = !in_string;
                    out.push(ch);
                }
                '?' if !in_string => match params.next() {
                    Some(value) => out.push_str(&value.to_literal()),
                    None => out.push(ch),
                },
                _ => out.push(ch),
            }
        }
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal_sql())
    }
}

pub fn valid_ident(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier. Identifiers cannot be bound, so anything
/// beyond letters, digits and underscore is rejected.
pub fn quote_ident(name: &str) -> Result<String> {
    if !valid_ident(name) {
        return Err(DbError::Validation(format!("invalid identifier <{name}>")));
    }
    Ok(format!("\"{name}\""))
}

/// `(?)` for one value, `(?,?,?)` for several.
pub fn placeholder_list(len: usize) -> String {
    format!("({})", vec!["?"; len].join(","))
}

/// Single-row INSERT over a base column set plus whichever optional
/// columns pass their gate.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    values: Vec<Value>,
}

impl InsertBuilder {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Always included.
    pub fn value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    /// Included when present and longer than [`MIN_TEXT_LEN`] characters.
    pub fn text(self, column: &str, value: Option<&str>) -> Self {
        match value {
            Some(text) if text.chars().count() > MIN_TEXT_LEN => self.value(column, text),
            _ => self,
        }
    }

    pub fn integer(self, column: &str, value: Option<i64>) -> Self {
        self.maybe(column, value)
    }

    pub fn real(self, column: &str, value: Option<f64>) -> Self {
        self.maybe(column, value)
    }

    /// Included whenever present, whatever its content.
    pub fn maybe(self, column: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.value(column, value),
            None => self,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn build(&self) -> Result<Statement> {
        if self.columns.is_empty() {
            return Err(DbError::Precondition(format!(
                "insert into <{}> has no columns",
                self.table
            )));
        }
        let columns = quote_all(&self.columns)?;
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_ident(&self.table)?,
                columns,
                placeholder_list(self.values.len())
            ),
            params: self.values.clone(),
        })
    }
}

/// One INSERT carrying every row of `rows`.
pub fn multi_row_insert(table: &str, columns: &[String], rows: &[Row]) -> Result<Statement> {
    if columns.is_empty() || rows.is_empty() {
        return Err(DbError::Precondition(format!(
            "insert into <{table}> needs at least one column and one row"
        )));
    }
    let tuple = placeholder_list(columns.len());
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_ident(table)?,
        quote_all(columns)?
    );
    let mut params = Vec::with_capacity(columns.len() * rows.len());
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(DbError::Precondition(format!(
                "row {idx} has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        if idx > 0 {
            sql.push(',');
        }
        sql.push_str(&tuple);
        params.extend(row.iter().cloned());
    }
    Ok(Statement { sql, params })
}

fn quote_all(columns: &[String]) -> Result<String> {
    let quoted = columns
        .iter()
        .map(|col| quote_ident(col))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn keyword(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// SELECT over a fixed base with optional filters appended in call order.
///
/// Column arguments are SQL expressions written by the caller (for example
/// `ent."Fc"`), never user input.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    sql: String,
    params: Vec<Value>,
    filtered: bool,
    order_by: Vec<String>,
    limit: Option<i64>,
}

impl SelectBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            sql: base.into().trim_end().to_string(),
            params: Vec::new(),
            filtered: false,
            order_by: Vec::new(),
            limit: None,
        }
    }

    fn push_clause(&mut self, clause: &str) {
        self.sql.push_str(if self.filtered { " AND " } else { " WHERE " });
        self.sql.push_str(clause);
        self.filtered = true;
    }

    /// `column IN (...)`; skipped entirely when `values` is `None` or empty.
    pub fn filter_in(mut self, column: &str, values: Option<&[Value]>) -> Self {
        if let Some(values) = values.filter(|values| !values.is_empty()) {
            self.push_clause(&format!("{column} IN {}", placeholder_list(values.len())));
            self.params.extend(values.iter().cloned());
        }
        self
    }

    pub fn filter_eq(mut self, column: &str, value: Option<Value>) -> Self {
        if let Some(value) = value {
            self.push_clause(&format!("{column} = ?"));
            self.params.push(value);
        }
        self
    }

    /// Arbitrary predicate with its own placeholders.
    pub fn filter(mut self, predicate: &str, params: Vec<Value>) -> Self {
        self.push_clause(predicate);
        self.params.extend(params);
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order_by.push(format!("{column} {}", order.keyword()));
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit.map(|n| n as i64);
        self
    }

    pub fn build(self) -> Statement {
        let mut sql = self.sql;
        let mut params = self.params;
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            params.push(Value::Integer(limit));
        }
        Statement { sql, params }
    }
}

/// The N-CMAPSS sub-datasets an engine component can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Dataset {
    #[serde(rename = "DS01-005")]
    Ds01,
    #[serde(rename = "DS02-006")]
    Ds02,
    #[serde(rename = "DS03-012")]
    Ds03,
    #[serde(rename = "DS04")]
    Ds04,
    #[serde(rename = "DS05")]
    Ds05,
    #[serde(rename = "DS06")]
    Ds06,
    #[serde(rename = "DS07")]
    Ds07,
    #[serde(rename = "DS08a-009")]
    Ds08a,
    #[serde(rename = "DS08c-008")]
    Ds08c,
    #[serde(rename = "DS08d-010")]
    Ds08d,
}

impl Dataset {
    pub const ALL: [Dataset; 10] = [
        Dataset::Ds01,
        Dataset::Ds02,
        Dataset::Ds03,
        Dataset::Ds04,
        Dataset::Ds05,
        Dataset::Ds06,
        Dataset::Ds07,
        Dataset::Ds08a,
        Dataset::Ds08c,
        Dataset::Ds08d,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dataset::Ds01 => "DS01-005",
            Dataset::Ds02 => "DS02-006",
            Dataset::Ds03 => "DS03-012",
            Dataset::Ds04 => "DS04",
            Dataset::Ds05 => "DS05",
            Dataset::Ds06 => "DS06",
            Dataset::Ds07 => "DS07",
            Dataset::Ds08a => "DS08a-009",
            Dataset::Ds08c => "DS08c-008",
            Dataset::Ds08d => "DS08d-010",
        }
    }

    /// Parse a caller-supplied list; a leading `all` selects every dataset.
    pub fn parse_list<S: AsRef<str>>(values: &[S]) -> Result<Vec<Dataset>> {
        if values.first().is_some_and(|v| v.as_ref() == "all") {
            return Ok(Dataset::ALL.to_vec());
        }
        values.iter().map(|v| v.as_ref().parse()).collect()
    }
}

impl FromStr for Dataset {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Dataset::ALL
            .into_iter()
            .find(|ds| ds.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Dataset::ALL.iter().map(|ds| ds.as_str()).collect();
                DbError::Validation(format!(
                    "unknown dataset <{s}>, valid datasets are {}",
                    valid.join(", ")
                ))
            })
    }
}

impl From<Dataset> for Value {
    fn from(ds: Dataset) -> Self {
        Value::Text(ds.as_str().to_string())
    }
}

/// Sort keys accepted by the unit listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitOrder {
    #[default]
    Id,
    Age,
    Rul,
}

impl UnitOrder {
    pub fn column(self) -> &'static str {
        match self {
            UnitOrder::Id => "id",
            UnitOrder::Age => "age",
            UnitOrder::Rul => "rul",
        }
    }
}

impl FromStr for UnitOrder {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(UnitOrder::Id),
            "age" => Ok(UnitOrder::Age),
            "rul" => Ok(UnitOrder::Rul),
            other => Err(DbError::Validation(format!(
                "order by <{other}> must be one of id, age, rul"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::from).collect()
    }

    #[test]
    fn insert_keeps_append_order() {
        let stmt = InsertBuilder::new("asset_tb")
            .value("type_id", 1i64)
            .value("group_id", 2i64)
            .text("owner", Some("abc"))
            .integer("process_id", None)
            .real("age", Some(1.5))
            .build()
            .unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "asset_tb" ("type_id", "group_id", "owner", "age") VALUES (?,?,?,?)"#
        );
        assert_eq!(
            stmt.params,
            vec![Value::Integer(1), Value::Integer(2), Value::from("abc"), Value::Real(1.5)]
        );
    }

    #[test]
    fn short_text_counts_as_absent() {
        let builder = InsertBuilder::new("asset_tb")
            .text("owner", Some("ab"))
            .text("common_name", Some(""))
            .text("serial_number", None);
        assert!(builder.columns().is_empty());
        assert!(matches!(builder.build(), Err(DbError::Precondition(_))));
    }

    #[test]
    fn single_value_renders_bare() {
        let stmt = InsertBuilder::new("t").value("unit", 3i64).build().unwrap();
        assert_eq!(stmt.sql, r#"INSERT INTO "t" ("unit") VALUES (?)"#);
        assert_eq!(stmt.to_literal_sql(), r#"INSERT INTO "t" ("unit") VALUES (3)"#);
    }

    #[test]
    fn in_filters_render_by_arity() {
        let one = ints(&[5]);
        let many = ints(&[5, 6, 7]);
        let stmt = SelectBuilder::new("SELECT * FROM t")
            .filter_in("a", None)
            .filter_in("b", Some(one.as_slice()))
            .filter_in("c", Some(many.as_slice()))
            .build();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE b IN (?) AND c IN (?,?,?)");
        assert_eq!(
            stmt.to_literal_sql(),
            "SELECT * FROM t WHERE b IN (5) AND c IN (5,6,7)"
        );
    }

    #[test]
    fn absent_filters_leave_base_untouched() {
        let stmt = SelectBuilder::new("SELECT * FROM t ")
            .filter_in("a", None)
            .filter_in("b", Some(&[][..]))
            .order_by("id", Order::Asc)
            .build();
        assert_eq!(stmt.sql, "SELECT * FROM t ORDER BY id ASC");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn limit_is_bound() {
        let stmt = SelectBuilder::new("SELECT * FROM t")
            .filter_eq("asset_id", Some(Value::Integer(4)))
            .limit(Some(10))
            .build();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE asset_id = ? LIMIT ?");
        assert_eq!(stmt.params, ints(&[4, 10]));
    }

    #[test]
    fn literal_rendering_skips_quoted_question_marks() {
        let stmt = Statement::with_params(
            "SELECT '?' AS q, ? AS v",
            vec![Value::from("it's")],
        );
        assert_eq!(stmt.to_literal_sql(), "SELECT '?' AS q, 'it''s' AS v");
    }

    #[test]
    fn identifiers_are_checked() {
        assert_eq!(quote_ident("engine_ncmapss_tb").unwrap(), "\"engine_ncmapss_tb\"");
        assert!(quote_ident("t; DROP TABLE x").is_err());
        assert!(quote_ident("").is_err());
        assert!(quote_ident("1abc").is_err());
    }

    #[test]
    fn multi_row_insert_binds_every_cell() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![ints(&[1, 2]), ints(&[3, 4])];
        let stmt = multi_row_insert("t", &columns, &rows).unwrap();
        assert_eq!(stmt.sql, r#"INSERT INTO "t" ("a", "b") VALUES (?,?),(?,?)"#);
        assert_eq!(stmt.params, ints(&[1, 2, 3, 4]));
    }

    #[test]
    fn datasets_are_validated() {
        assert_eq!(
            Dataset::parse_list(&["DS02-006"]).unwrap(),
            vec![Dataset::Ds02]
        );
        assert_eq!(Dataset::parse_list(&["all"]).unwrap().len(), Dataset::ALL.len());
        assert!(matches!(
            Dataset::parse_list(&["bogus"]),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn unit_order_is_validated() {
        assert_eq!("rul".parse::<UnitOrder>().unwrap(), UnitOrder::Rul);
        assert!(matches!("serial".parse::<UnitOrder>(), Err(DbError::Validation(_))));
    }
}
