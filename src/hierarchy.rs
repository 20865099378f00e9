//! Asset type hierarchy: asset_type -> asset -> per-type component table.
//!
//! Every create is idempotent by lookup. An existing row is returned as-is,
//! and a uniqueness violation during insert is the "already exists" branch,
//! answered by re-fetching the conflicting row.

use crate::builder::{InsertBuilder, MIN_TEXT_LEN, SelectBuilder, Statement, quote_ident, valid_ident};
use crate::catalog;
use crate::db::Db;
use crate::error::{DbError, Result};
use crate::model::{Asset, AssetType, Component, Group};
use crate::table::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub const ASSET_TYPE_TABLE: &str = "asset_type_tb";
pub const ASSET_TABLE: &str = "asset_tb";
pub const GROUP_TABLE: &str = "group_tb";

#[derive(Debug, Clone, Copy)]
pub enum AssetTypeKey<'a> {
    Name { type_name: &'a str, subtype: &'a str },
    Id(i64),
}

#[derive(Debug, Clone, Copy)]
pub enum AssetKey<'a> {
    Id(i64),
    Serial(&'a str),
}

/// Fields of an asset to create. Only `type_id` and `group_id` are always
/// written; every other column is written only when present (and, for text,
/// longer than two characters).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAsset {
    pub type_id: i64,
    pub group_id: i64,
    pub owner: Option<String>,
    pub process_id: Option<i64>,
    pub serial_number: Option<String>,
    pub common_name: Option<String>,
    pub age: Option<f64>,
    pub eol: Option<f64>,
    pub rul: Option<f64>,
    pub units: Option<String>,
}

impl NewAsset {
    pub fn new(type_id: i64, group_id: i64) -> Self {
        Self {
            type_id,
            group_id,
            ..Self::default()
        }
    }

    pub fn statement(&self) -> Result<Statement> {
        InsertBuilder::new(ASSET_TABLE)
            .value("type_id", self.type_id)
            .value("group_id", self.group_id)
            .text("owner", self.owner.as_deref())
            .integer("process_id", self.process_id)
            .text("serial_number", self.serial_number.as_deref())
            .text("common_name", self.common_name.as_deref())
            .real("age", self.age)
            .real("eol", self.eol)
            .real("rul", self.rul)
            .maybe("units", self.units.as_deref())
            .build()
    }

    /// The serial number as it will be written, if it passes the text gate.
    pub fn effective_serial(&self) -> Option<&str> {
        self.serial_number
            .as_deref()
            .filter(|serial| serial.chars().count() > MIN_TEXT_LEN)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum AssetCreation {
    Created(Asset),
    Existing(Asset),
    /// Dry run: the statement that would have been executed.
    Sandbox(Statement),
}

impl AssetCreation {
    pub fn asset(&self) -> Option<&Asset> {
        match self {
            AssetCreation::Created(asset) | AssetCreation::Existing(asset) => Some(asset),
            AssetCreation::Sandbox(_) => None,
        }
    }

    pub fn into_asset(self) -> Option<Asset> {
        match self {
            AssetCreation::Created(asset) | AssetCreation::Existing(asset) => Some(asset),
            AssetCreation::Sandbox(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewComponent {
    pub unit: i64,
    pub num_samples: Option<i64>,
    pub misc_info: Option<String>,
}

impl NewComponent {
    pub fn new(unit: i64) -> Self {
        Self {
            unit,
            ..Self::default()
        }
    }
}

/// Registered component tables, keyed by (type, subtype).
#[derive(Debug, Clone, Default)]
pub struct ComponentTables {
    tables: BTreeMap<(String, String), String>,
}

impl ComponentTables {
    /// `{type}_{subtype}_tb`.
    pub fn table_name(type_name: &str, subtype: &str) -> Result<String> {
        let name = format!("{type_name}_{subtype}_tb");
        if !valid_ident(&name) {
            return Err(DbError::Precondition(format!(
                "asset type <{type_name}>/<{subtype}> does not map to a valid table name"
            )));
        }
        Ok(name)
    }

    /// Register every asset type in the store whose component table exists.
    pub fn discover(db: &Db) -> Result<Self> {
        let types = AssetType::from_table(
            &db.query(&Statement::new(format!("SELECT * FROM {}", quote_ident(ASSET_TYPE_TABLE)?)))?,
        )?;
        let mut registry = Self::default();
        for ty in types {
            match registry.register(db, &ty.type_name, &ty.subtype) {
                Ok(table) => debug!(table, "registered component table"),
                Err(err) => warn!(
                    type_name = %ty.type_name,
                    subtype = %ty.subtype,
                    "no component table: {err}"
                ),
            }
        }
        Ok(registry)
    }

    /// Validate the component table of (type, subtype) against the live schema and record it.
    pub fn register(&mut self, db: &Db, type_name: &str, subtype: &str) -> Result<&str> {
        let name = Self::table_name(type_name, subtype)?;
        if !catalog::table_exists(db, &name)? {
            return Err(DbError::Precondition(format!("table <{name}> does not exist")));
        }
        let entry = self
            .tables
            .entry((type_name.to_string(), subtype.to_string()))
            .or_insert(name);
        Ok(entry.as_str())
    }

    pub fn get(&self, type_name: &str, subtype: &str) -> Option<&str> {
        self.tables
            .get(&(type_name.to_string(), subtype.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.tables
            .iter()
            .map(|((ty, sub), table)| (ty.as_str(), sub.as_str(), table.as_str()))
    }
}

/// Creates and fetches rows across the asset hierarchy.
pub struct AssetStore<'db> {
    db: &'db Db,
    components: ComponentTables,
}

impl<'db> AssetStore<'db> {
    pub fn new(db: &'db Db) -> Self {
        Self {
            db,
            components: ComponentTables::default(),
        }
    }

    /// A store whose component registry is pre-populated from the live schema.
    pub fn open(db: &'db Db) -> Result<Self> {
        Ok(Self {
            db,
            components: ComponentTables::discover(db)?,
        })
    }

    pub fn db(&self) -> &'db Db {
        self.db
    }

    pub fn components(&self) -> &ComponentTables {
        &self.components
    }

    pub fn create_asset_type(
        &self,
        type_name: &str,
        subtype: &str,
        description: Option<&str>,
    ) -> Result<AssetType> {
        let key = AssetTypeKey::Name { type_name, subtype };
        if let Some(existing) = self.asset_type(key)? {
            debug!(id = existing.id, "asset type already exists");
            return Ok(existing);
        }

        let statement = InsertBuilder::new(ASSET_TYPE_TABLE)
            .value("type", type_name)
            .value("subtype", subtype)
            .maybe("description", description)
            .build()?;
        match self.db.write(&statement) {
            Ok(_) => info!(type_name, subtype, "created asset type"),
            Err(DbError::Conflict(_)) => info!(type_name, subtype, "asset type already exists"),
            Err(err) => return Err(err),
        }
        self.asset_type(key)?.ok_or_else(|| {
            DbError::Execution(format!("asset type <{type_name}>/<{subtype}> not found after insert"))
        })
    }

    pub fn asset_type(&self, key: AssetTypeKey<'_>) -> Result<Option<AssetType>> {
        let base = format!("SELECT * FROM {}", quote_ident(ASSET_TYPE_TABLE)?);
        let statement = match key {
            AssetTypeKey::Name { type_name, subtype } => {
                if type_name.is_empty() || subtype.is_empty() {
                    return Err(DbError::Precondition(
                        "must supply an asset type and subtype, or a type id".to_string(),
                    ));
                }
                SelectBuilder::new(base)
                    .filter_eq("\"type\"", Some(Value::from(type_name)))
                    .filter_eq("\"subtype\"", Some(Value::from(subtype)))
                    .build()
            }
            AssetTypeKey::Id(id) => SelectBuilder::new(base)
                .filter_eq("\"id\"", Some(Value::Integer(id)))
                .build(),
        };
        Ok(AssetType::from_table(&self.db.query(&statement)?)?.into_iter().next())
    }

    /// Create an asset, or return the existing one with the same serial number.
    /// With `sandbox` set nothing is executed and the composed statement is returned.
    pub fn create_asset(&self, asset: &NewAsset, sandbox: bool) -> Result<AssetCreation> {
        let statement = asset.statement()?;
        if sandbox {
            info!(sql = %statement, "sandbox: statement not executed");
            return Ok(AssetCreation::Sandbox(statement));
        }

        let serial = asset.effective_serial();
        if let Some(serial) = serial {
            if let Some(existing) = self.asset(AssetKey::Serial(serial))? {
                debug!(id = existing.id, serial, "asset already exists");
                return Ok(AssetCreation::Existing(existing));
            }
        }

        match (self.db.write(&statement), serial) {
            (Ok(_), _) => {
                let id = self.db.last_insert_id();
                let created = self.asset(AssetKey::Id(id))?.ok_or_else(|| {
                    DbError::Execution(format!("asset {id} not found after insert"))
                })?;
                info!(id, "created asset");
                Ok(AssetCreation::Created(created))
            }
            (Err(DbError::Conflict(_)), Some(serial)) => {
                warn!(serial, "asset already exists (serial numbers must be unique)");
                self.asset(AssetKey::Serial(serial))?
                    .map(AssetCreation::Existing)
                    .ok_or_else(|| {
                        DbError::Execution(format!("asset <{serial}> conflicted but was not found"))
                    })
            }
            (Err(err), _) => Err(err),
        }
    }

    pub fn asset(&self, key: AssetKey<'_>) -> Result<Option<Asset>> {
        let base = format!("SELECT * FROM {}", quote_ident(ASSET_TABLE)?);
        let statement = match key {
            AssetKey::Id(id) => SelectBuilder::new(base)
                .filter_eq("\"id\"", Some(Value::Integer(id)))
                .build(),
            AssetKey::Serial(serial) => SelectBuilder::new(base)
                .filter_eq("\"serial_number\"", Some(Value::from(serial)))
                .build(),
        };
        Ok(Asset::from_table(&self.db.query(&statement)?)?.into_iter().next())
    }

    /// Resolve the component table registered for `asset_type`, registering
    /// it on first use.
    pub fn component_table(&mut self, asset_type: &AssetType) -> Result<String> {
        if let Some(table) = self.components.get(&asset_type.type_name, &asset_type.subtype) {
            return Ok(table.to_string());
        }
        self.components
            .register(self.db, &asset_type.type_name, &asset_type.subtype)
            .map(str::to_string)
    }

    /// Create the component row of `asset`. The asset must already exist.
    pub fn create_component(&mut self, asset: &Asset, component: &NewComponent) -> Result<Component> {
        if asset.id <= 0 {
            return Err(DbError::Precondition("asset has no id".to_string()));
        }
        let asset_type = self.asset_type(AssetTypeKey::Id(asset.type_id))?.ok_or_else(|| {
            DbError::Precondition(format!(
                "a valid asset type was not found with id <{}>",
                asset.type_id
            ))
        })?;
        let table = self.component_table(&asset_type)?;

        let statement = InsertBuilder::new(&table)
            .value("id", asset.id)
            .value("unit", component.unit)
            .integer("num_samples", component.num_samples)
            .maybe("misc_info", component.misc_info.as_deref())
            .build()?;
        match self.db.write(&statement) {
            Ok(_) => info!(table = %table, id = asset.id, "created component"),
            Err(DbError::Conflict(_)) => info!(table = %table, id = asset.id, "component already exists"),
            Err(err) => return Err(err),
        }
        self.component(&table, asset.id)?.ok_or_else(|| {
            DbError::Execution(format!("component {} not found in <{table}>", asset.id))
        })
    }

    pub fn component(&self, table: &str, id: i64) -> Result<Option<Component>> {
        let statement = SelectBuilder::new(format!("SELECT * FROM {}", quote_ident(table)?))
            .filter_eq("\"id\"", Some(Value::Integer(id)))
            .build();
        Ok(Component::from_table(table, &self.db.query(&statement)?)?
            .into_iter()
            .next())
    }

    pub fn create_group(
        &self,
        group: &str,
        current: Option<f64>,
        num_devices: Option<i64>,
        info: Option<&str>,
    ) -> Result<Group> {
        if let Some(existing) = self.group(group)? {
            return Ok(existing);
        }
        let statement = InsertBuilder::new(GROUP_TABLE)
            .value("group", group)
            .real("current", current)
            .integer("num_devices", num_devices)
            .maybe("info", info)
            .build()?;
        match self.db.write(&statement) {
            Ok(_) => info!(group, "created group"),
            Err(DbError::Conflict(_)) => info!(group, "group already exists"),
            Err(err) => return Err(err),
        }
        self.group(group)?
            .ok_or_else(|| DbError::Execution(format!("group <{group}> not found after insert")))
    }

    pub fn group(&self, group: &str) -> Result<Option<Group>> {
        if group.is_empty() {
            return Err(DbError::Precondition("must supply a group label".to_string()));
        }
        let statement = SelectBuilder::new(format!("SELECT * FROM {}", quote_ident(GROUP_TABLE)?))
            .filter_eq("\"group\"", Some(Value::from(group)))
            .build();
        Ok(Group::from_table(&self.db.query(&statement)?)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;

    fn db() -> Db {
        let db = Db::open_in_memory().unwrap();
        schema::bootstrap(db.conn()).unwrap();
        db
    }

    #[test]
    fn bare_asset_writes_only_required_columns() {
        let stmt = NewAsset::new(1, 2).statement().unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "asset_tb" ("type_id", "group_id") VALUES (?,?)"#
        );
    }

    #[test]
    fn owner_needs_three_characters() {
        let short = NewAsset {
            owner: Some("ab".into()),
            ..NewAsset::new(1, 1)
        };
        assert!(!short.statement().unwrap().sql.contains("\"owner\""));
        let long = NewAsset {
            owner: Some("abc".into()),
            ..NewAsset::new(1, 1)
        };
        assert!(long.statement().unwrap().sql.contains("\"owner\""));
    }

    #[test]
    fn units_are_written_whenever_present() {
        let asset = NewAsset {
            units: Some("V".into()),
            ..NewAsset::new(1, 1)
        };
        assert!(asset.statement().unwrap().sql.contains("\"units\""));
    }

    #[test]
    fn sandbox_does_not_touch_the_store() {
        let db = db();
        let store = AssetStore::new(&db);
        let created = store.create_asset(&NewAsset::new(1, 1), true).unwrap();
        assert!(matches!(created, AssetCreation::Sandbox(_)));
        assert_eq!(db.max_id(ASSET_TABLE).unwrap(), None);
    }

    #[test]
    fn asset_type_lookup_requires_names() {
        let db = db();
        let store = AssetStore::new(&db);
        let err = store
            .asset_type(AssetTypeKey::Name {
                type_name: "",
                subtype: "ncmapss",
            })
            .unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert_eq!(
            ComponentTables::table_name("engine", "ncmapss").unwrap(),
            "engine_ncmapss_tb"
        );
        assert!(matches!(
            ComponentTables::table_name("engine", "x; drop"),
            Err(DbError::Precondition(_))
        ));
    }

    #[test]
    fn registry_rejects_missing_tables() {
        let db = db();
        let mut registry = ComponentTables::default();
        registry.register(&db, "irel", "transistor").unwrap();
        let err = registry.register(&db, "battery", "lion").unwrap_err();
        assert!(matches!(err, DbError::Precondition(_)));
        assert_eq!(registry.get("irel", "transistor"), Some("irel_transistor_tb"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn groups_are_idempotent() {
        let db = db();
        let store = AssetStore::new(&db);
        let first = store.create_group("round-1", Some(2.5), Some(8), None).unwrap();
        let second = store.create_group("round-1", Some(9.0), None, Some("ignored")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.current, Some(2.5));
    }
}
