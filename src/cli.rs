use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "assetdb",
    version,
    about = "Asset telemetry store",
    after_help = r#"Examples:
  assetdb --db assets.sqlite init
  assetdb --db assets.sqlite create-asset-type --type engine --subtype ncmapss
  assetdb --db assets.sqlite create-group --group round-1 --current 2.5
  assetdb --db assets.sqlite create-asset --type-id 1 --group-id 1 --generate-serial
  assetdb --db assets.sqlite create-component --asset-id 1 --unit 3
  assetdb --db assets.sqlite batch-insert --table data_tb --rows rows.json --batches 10
  assetdb --db assets.sqlite units --group-id 1,2 --dataset DS02-006 --order-by rul
  assetdb --params connection.yaml tables
"#
)]
pub struct Args {
    /// Database file. Takes precedence over --params and ASSETDB_* variables.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// YAML file with connection parameters.
    #[arg(long, global = true, value_name = "PATH")]
    pub params: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the asset schema in an empty database.
    Init,
    /// List user tables.
    Tables,
    /// Describe the columns of a table.
    Columns {
        #[arg(long)]
        table: String,
    },
    /// Run one statement and print its rows.
    Query {
        #[arg(long)]
        sql: String,
    },
    /// Create an asset type, or return the existing one.
    CreateAssetType {
        #[arg(long = "type")]
        type_name: String,
        #[arg(long)]
        subtype: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a group (test round), or return the existing one.
    CreateGroup {
        #[arg(long)]
        group: String,
        #[arg(long)]
        current: Option<f64>,
        #[arg(long)]
        num_devices: Option<i64>,
        #[arg(long)]
        info: Option<String>,
    },
    /// Create an asset, or return the one with the same serial number.
    CreateAsset {
        #[arg(long)]
        type_id: i64,
        #[arg(long)]
        group_id: i64,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        process_id: Option<i64>,
        #[arg(long, conflicts_with = "generate_serial")]
        serial_number: Option<String>,
        #[arg(long)]
        common_name: Option<String>,
        #[arg(long)]
        age: Option<f64>,
        #[arg(long)]
        eol: Option<f64>,
        #[arg(long)]
        rul: Option<f64>,
        #[arg(long)]
        units: Option<String>,
        /// Print the statement instead of executing it.
        #[arg(long)]
        sandbox: bool,
        /// Use a random eight character serial number.
        #[arg(long)]
        generate_serial: bool,
    },
    /// Create the component row of an existing asset.
    CreateComponent {
        #[arg(long)]
        asset_id: i64,
        #[arg(long)]
        unit: i64,
        #[arg(long)]
        num_samples: Option<i64>,
        #[arg(long)]
        misc_info: Option<String>,
    },
    /// Insert a JSON array of records into a table in chunks.
    BatchInsert {
        #[arg(long)]
        table: String,
        #[arg(long, value_name = "PATH")]
        rows: PathBuf,
        /// Number of chunks. Defaults to ASSETDB_BATCH_COUNT or 10.
        #[arg(long)]
        batches: Option<usize>,
    },
    /// List engine units.
    Units {
        #[arg(long = "group-id", value_delimiter = ',')]
        group_ids: Vec<i64>,
        #[arg(long, value_delimiter = ',')]
        fc: Vec<i64>,
        /// Dataset names, or "all".
        #[arg(long = "dataset", value_delimiter = ',')]
        datasets: Vec<String>,
        /// id|age|rul
        #[arg(long, default_value = "id")]
        order_by: String,
    },
    /// List assets with their component unit numbers.
    Devices,
    /// List groups.
    Rounds,
    /// Telemetry of one asset.
    DeviceData {
        #[arg(long)]
        asset_id: i64,
    },
    /// Per-cycle statistics of one asset.
    UnitStats {
        #[arg(long)]
        asset_id: i64,
        #[arg(long, default_value_t = 1)]
        downsample: i64,
        #[arg(long, default_value_t = 0.0)]
        voltage_cutoff: f64,
    },
    /// Telemetry of a group.
    RoundData {
        #[arg(long)]
        group_id: i64,
        #[arg(long)]
        cooling_block: bool,
    },
    /// Rows of a telemetry table for some assets.
    Telemetry {
        #[arg(long)]
        table: String,
        #[arg(long = "asset-id", value_delimiter = ',', required = true)]
        assets: Vec<i64>,
        #[arg(long)]
        date_start: Option<String>,
        #[arg(long)]
        date_stop: Option<String>,
        #[arg(long)]
        cycle_start: Option<i64>,
        #[arg(long)]
        cycle_stop: Option<i64>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long = "drop", value_delimiter = ',')]
        drop_columns: Vec<String>,
    },
}
