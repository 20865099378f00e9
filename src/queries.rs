//! Read paths over assets, groups and telemetry.
//!
//! Store failures degrade to an empty [`Table`] carrying the error; caller
//! mistakes (unknown dataset, unknown table) fail before any SQL is sent.

use crate::builder::{Dataset, Order, SelectBuilder, Statement, UnitOrder, quote_ident};
use crate::catalog;
use crate::db::Db;
use crate::error::{DbError, Result};
use crate::hierarchy::ComponentTables;
use crate::table::{Table, Value};
use std::collections::BTreeMap;

/// Assets joined with the unit number from every registered component table.
pub fn devices(db: &Db, components: &ComponentTables) -> Table {
    let mut out = Table::default();
    for (_, _, table) in components.iter() {
        let Ok(quoted) = quote_ident(table) else {
            continue;
        };
        let part = db.execute_sql(&format!(
            "SELECT ast.*, cmp.\"unit\" FROM asset_tb ast JOIN {quoted} cmp ON ast.\"id\" = cmp.\"id\""
        ));
        if part.failure().is_some() {
            return part;
        }
        out = out.concat(part);
    }
    out
}

/// Every group (test round).
pub fn rounds(db: &Db) -> Table {
    db.execute(
        &SelectBuilder::new("SELECT * FROM group_tb")
            .order_by("\"id\"", Order::Asc)
            .build(),
    )
}

/// Telemetry of one asset with its group's applied current, in time order.
/// Samples taken while the device was off (status 0) report zero voltage.
pub fn device_data(db: &Db, asset_id: i64) -> Table {
    let statement = SelectBuilder::new(
        "SELECT dtt.\"asset_id\",
                dtt.\"group_id\",
                dtt.\"dt\",
                dtt.\"cycle\",
                dtt.\"temperature\",
                dtt.\"status\",
                CASE WHEN dtt.\"status\" = 0 THEN 0.0 ELSE dtt.\"voltage\" END AS \"voltage\",
                gtt.\"current\"
         FROM data_tb dtt
         JOIN group_tb gtt ON dtt.\"group_id\" = gtt.\"id\"",
    )
    .filter_eq("dtt.\"asset_id\"", Some(Value::Integer(asset_id)))
    .order_by("dtt.\"dt\"", Order::Asc)
    .order_by("dtt.\"cycle\"", Order::Asc)
    .build();
    db.execute(&statement)
}

/// Per-cycle voltage and temperature statistics of one asset, rounded to two
/// decimals. Only samples above `voltage_cutoff` count; with `downsample > 1`
/// only every n-th cycle is kept.
pub fn unit_stats(db: &Db, asset_id: i64, downsample: i64, voltage_cutoff: f64) -> Table {
    let mut select = SelectBuilder::new(
        "SELECT \"asset_id\", \"cycle\", \"voltage\", \"temperature\" FROM data_tb",
    )
    .filter("\"voltage\" > ?", vec![Value::Real(voltage_cutoff)])
    .filter_eq("\"asset_id\"", Some(Value::Integer(asset_id)));
    if downsample > 1 {
        select = select.filter("\"cycle\" % ? = 0", vec![Value::Integer(downsample)]);
    }
    let samples = db.execute(&select.order_by("\"cycle\"", Order::Asc).build());
    if samples.failure().is_some() {
        return samples;
    }

    let mut per_cycle: BTreeMap<i64, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for row in &samples.rows {
        let Some(cycle) = row[1].as_i64() else {
            continue;
        };
        let entry = per_cycle.entry(cycle).or_default();
        if let Some(v) = row[2].as_f64() {
            entry.0.push(v);
        }
        if let Some(t) = row[3].as_f64() {
            entry.1.push(t);
        }
    }

    let mut out = Table::new(
        [
            "asset_id",
            "cycle",
            "mean_voltage",
            "mean_temperature",
            "std_voltage",
            "std_temperature",
            "min_voltage",
            "min_temperature",
            "max_voltage",
            "max_temperature",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    );
    for (cycle, (voltage, temperature)) in per_cycle {
        let v = Summary::of(&voltage);
        let t = Summary::of(&temperature);
        out.push(vec![
            Value::Integer(asset_id),
            Value::Integer(cycle),
            round2(v.mean),
            round2(t.mean),
            round2(v.std),
            round2(t.std),
            round2(v.min),
            round2(t.min),
            round2(v.max),
            round2(t.max),
        ]);
    }
    out
}

#[derive(Default)]
struct Summary {
    mean: Option<f64>,
    std: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Summary {
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        // Sample standard deviation; undefined for a single sample.
        let std = (values.len() > 1).then(|| {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        });
        Self {
            mean: Some(mean),
            std,
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
        }
    }
}

fn round2(value: Option<f64>) -> Value {
    value
        .map(|v| Value::Real((v * 100.0).round() / 100.0))
        .unwrap_or(Value::Null)
}

/// Telemetry of a group, and optionally the cooling block telemetry of the same group.
pub fn round_data(db: &Db, group_id: i64, include_cooling_block: bool) -> (Table, Option<Table>) {
    let data = db.execute(
        &SelectBuilder::new("SELECT * FROM data_tb")
            .filter_eq("\"group_id\"", Some(Value::Integer(group_id)))
            .order_by("\"asset_id\"", Order::Asc)
            .order_by("\"dt\"", Order::Asc)
            .build(),
    );
    let cooling = include_cooling_block.then(|| {
        db.execute(
            &SelectBuilder::new("SELECT * FROM cb_data_tb")
                .filter_eq("\"group_id\"", Some(Value::Integer(group_id)))
                .order_by("\"id\"", Order::Asc)
                .build(),
        )
    });
    (data, cooling)
}

/// Filters for [`units`]. `None` leaves a dimension unfiltered.
#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    pub group_ids: Option<Vec<i64>>,
    pub fc: Option<Vec<i64>>,
    pub datasets: Option<Vec<String>>,
    pub order_by: UnitOrder,
}

impl UnitFilter {
    pub fn statement(&self) -> Result<Statement> {
        let datasets: Option<Vec<Value>> = match &self.datasets {
            Some(names) => Some(
                Dataset::parse_list(names)?
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ),
            None => None,
        };
        let group_ids = ints(self.group_ids.as_deref());
        let fc = ints(self.fc.as_deref());

        Ok(SelectBuilder::new(
            "SELECT ast.\"id\",
                    ast.\"serial_number\",
                    ast.\"age\",
                    ast.\"eol\",
                    ast.\"rul\",
                    ent.\"group_id\",
                    ent.\"Fc\",
                    ent.\"unit\",
                    ent.\"dataset\"
             FROM asset_tb ast
             JOIN engine_ncmapss_tb ent ON ast.\"id\" = ent.\"id\"",
        )
        .filter_in("ent.\"group_id\"", group_ids.as_deref())
        .filter_in("ent.\"Fc\"", fc.as_deref())
        .filter_in("ent.\"dataset\"", datasets.as_deref())
        .order_by(&format!("ast.\"{}\"", self.order_by.column()), Order::Asc)
        .build())
    }
}

fn ints(values: Option<&[i64]>) -> Option<Vec<Value>> {
    values.map(|values| values.iter().copied().map(Value::Integer).collect())
}

/// Engine units with their flight class and dataset.
pub fn units(db: &Db, filter: &UnitFilter) -> Result<Table> {
    Ok(db.execute(&filter.statement()?))
}

/// Rows of one telemetry table for a set of assets.
#[derive(Debug, Clone, Default)]
pub struct TelemetryQuery {
    pub table: String,
    pub assets: Vec<i64>,
    pub date_start: Option<String>,
    pub date_stop: Option<String>,
    pub cycle_start: Option<i64>,
    pub cycle_stop: Option<i64>,
    pub limit: Option<usize>,
    pub drop_columns: Vec<String>,
}

pub fn telemetry(db: &Db, query: &TelemetryQuery) -> Result<Table> {
    let quoted = quote_ident(&query.table)?;
    if !catalog::table_exists(db, &query.table)? {
        return Err(DbError::Precondition(format!(
            "table <{}> does not exist",
            query.table
        )));
    }
    if query.assets.is_empty() {
        return Err(DbError::Precondition("must supply at least one asset id".to_string()));
    }
    let known = db.query(&Statement::new("SELECT \"id\" FROM asset_tb"))?;
    let known: Vec<i64> = known.rows.iter().filter_map(|row| row[0].as_i64()).collect();
    let unknown: Vec<String> = query
        .assets
        .iter()
        .filter(|id| !known.contains(id))
        .map(|id| id.to_string())
        .collect();
    if !unknown.is_empty() {
        return Err(DbError::Precondition(format!(
            "unknown asset ids <{}>",
            unknown.join(", ")
        )));
    }

    let assets = ints(Some(query.assets.as_slice()));
    let mut select = SelectBuilder::new(format!("SELECT * FROM {quoted}"))
        .filter_in("\"asset_id\"", assets.as_deref());
    if let Some(start) = &query.date_start {
        select = select.filter("\"dt\" >= ?", vec![Value::from(start.as_str())]);
    }
    if let Some(stop) = &query.date_stop {
        select = select.filter("\"dt\" <= ?", vec![Value::from(stop.as_str())]);
    }
    if let Some(start) = query.cycle_start {
        select = select.filter("\"cycle\" >= ?", vec![Value::Integer(start)]);
    }
    if let Some(stop) = query.cycle_stop {
        select = select.filter("\"cycle\" <= ?", vec![Value::Integer(stop)]);
    }
    let statement = select
        .order_by("\"id\"", Order::Asc)
        .limit(query.limit)
        .build();

    let table = db.execute(&statement);
    if query.drop_columns.is_empty() || table.failure().is_some() {
        Ok(table)
    } else {
        Ok(table.drop_columns(&query.drop_columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_filter_renders_in_declaration_order() {
        let filter = UnitFilter {
            group_ids: Some(vec![5]),
            fc: None,
            datasets: Some(vec!["DS01-005".into(), "DS04".into()]),
            order_by: UnitOrder::Rul,
        };
        let sql = filter.statement().unwrap().to_literal_sql();
        assert!(sql.contains("WHERE ent.\"group_id\" IN (5) AND ent.\"dataset\" IN ('DS01-005','DS04')"));
        assert!(!sql.contains("\"Fc\" IN"));
        assert!(sql.ends_with("ORDER BY ast.\"rul\" ASC"));
    }

    #[test]
    fn unit_filter_without_filters_has_no_where() {
        let sql = UnitFilter::default().statement().unwrap().sql;
        assert!(!sql.contains("WHERE"));
    }

    #[test]
    fn bogus_dataset_fails_before_the_store() {
        let filter = UnitFilter {
            datasets: Some(vec!["bogus".into()]),
            ..UnitFilter::default()
        };
        assert!(matches!(filter.statement(), Err(DbError::Validation(_))));
    }

    #[test]
    fn summary_matches_sample_statistics() {
        let s = Summary::of(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.mean, Some(2.5));
        assert_eq!(round2(s.std), Value::Real(1.29));
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(4.0));
        assert_eq!(Summary::of(&[7.0]).std, None);
    }
}
