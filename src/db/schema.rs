use crate::error::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 1;

/// Create the reference telemetry schema if it is not present.
///
/// Existing tables are left untouched. The DDL runs as one transaction; on
/// failure nothing is created and the connection is usable again.
pub fn bootstrap(conn: &Connection) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS asset_type_tb (
            id INTEGER PRIMARY KEY,
            "type" TEXT NOT NULL,
            subtype TEXT NOT NULL,
            description TEXT,
            UNIQUE ("type", subtype)
        );

        CREATE TABLE IF NOT EXISTS group_tb (
            id INTEGER PRIMARY KEY,
            "group" TEXT NOT NULL UNIQUE,
            current REAL,
            num_devices INTEGER,
            info TEXT
        );

        CREATE TABLE IF NOT EXISTS asset_tb (
            id INTEGER PRIMARY KEY,
            type_id INTEGER NOT NULL,
            owner TEXT NOT NULL DEFAULT 'unknown',
            process_id INTEGER,
            group_id INTEGER NOT NULL,
            serial_number TEXT UNIQUE,
            common_name TEXT,
            age REAL NOT NULL DEFAULT 0,
            eol REAL,
            rul REAL,
            units TEXT,
            FOREIGN KEY(type_id) REFERENCES asset_type_tb(id),
            FOREIGN KEY(group_id) REFERENCES group_tb(id)
        );

        CREATE INDEX IF NOT EXISTS idx_asset_type ON asset_tb(type_id);
        CREATE INDEX IF NOT EXISTS idx_asset_group ON asset_tb(group_id);

        CREATE TABLE IF NOT EXISTS engine_ncmapss_tb (
            id INTEGER PRIMARY KEY,
            unit INTEGER NOT NULL,
            num_samples INTEGER,
            misc_info TEXT,
            group_id INTEGER,
            "Fc" INTEGER,
            dataset TEXT,
            FOREIGN KEY(id) REFERENCES asset_tb(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS irel_transistor_tb (
            id INTEGER PRIMARY KEY,
            unit INTEGER NOT NULL,
            num_samples INTEGER,
            misc_info TEXT,
            FOREIGN KEY(id) REFERENCES asset_tb(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS cooling_block_tb (
            id INTEGER PRIMARY KEY,
            unit INTEGER NOT NULL,
            num_samples INTEGER,
            misc_info TEXT,
            FOREIGN KEY(id) REFERENCES asset_tb(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS data_tb (
            id INTEGER PRIMARY KEY,
            asset_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            dt TEXT NOT NULL,
            cycle INTEGER NOT NULL,
            temperature REAL,
            status INTEGER,
            voltage REAL,
            FOREIGN KEY(asset_id) REFERENCES asset_tb(id),
            FOREIGN KEY(group_id) REFERENCES group_tb(id)
        );

        CREATE INDEX IF NOT EXISTS idx_data_asset ON data_tb(asset_id, dt);
        CREATE INDEX IF NOT EXISTS idx_data_group ON data_tb(group_id);

        CREATE TABLE IF NOT EXISTS cb_data_tb (
            id INTEGER PRIMARY KEY,
            asset_id INTEGER NOT NULL,
            group_id INTEGER NOT NULL,
            dt TEXT NOT NULL,
            cycle INTEGER NOT NULL,
            temperature REAL,
            status INTEGER,
            voltage REAL,
            FOREIGN KEY(asset_id) REFERENCES asset_tb(id),
            FOREIGN KEY(group_id) REFERENCES group_tb(id)
        );

        CREATE INDEX IF NOT EXISTS idx_cb_data_group ON cb_data_tb(group_id);
        "#,
    )?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}
