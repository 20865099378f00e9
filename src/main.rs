use anyhow::{Context, Result, bail};
use assetdb::builder::{Statement, UnitOrder};
use assetdb::config::{Config, ConnectParams};
use assetdb::db::{self, Db};
use assetdb::hierarchy::{AssetKey, AssetStore, NewAsset, NewComponent};
use assetdb::queries::{self, TelemetryQuery, UnitFilter};
use assetdb::table::Table;
use assetdb::util::{LogProgress, generate_serial_number};
use assetdb::{catalog, cli, loader};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const SERIAL_LENGTH: usize = 8;

fn connect_params(args: &cli::Args) -> Result<ConnectParams> {
    if let Some(path) = &args.db {
        return Ok(ConnectParams::file(path));
    }
    if let Some(path) = &args.params {
        return ConnectParams::from_yaml_file(path)
            .with_context(|| format!("reading connection parameters from {}", path.display()));
    }
    Ok(ConnectParams::from_env())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_table(table: Table) -> Result<()> {
    let table = table.into_result()?;
    print_json(&table.records())
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    (!values.is_empty()).then_some(values)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let db = Db::connect(&connect_params(&args)?)?;

    match args.command {
        cli::Command::Init => {
            db::schema::bootstrap(db.conn())?;
            print_json(&catalog::list_tables(&db)?)
        }
        cli::Command::Tables => print_json(&catalog::list_tables(&db)?),
        cli::Command::Columns { table } => print_table(catalog::column_table(&db, &table)?),
        cli::Command::Query { sql } => print_table(db.query(&Statement::new(sql))?),
        cli::Command::CreateAssetType {
            type_name,
            subtype,
            description,
        } => {
            let store = AssetStore::new(&db);
            print_json(&store.create_asset_type(&type_name, &subtype, description.as_deref())?)
        }
        cli::Command::CreateGroup {
            group,
            current,
            num_devices,
            info,
        } => {
            let store = AssetStore::new(&db);
            print_json(&store.create_group(&group, current, num_devices, info.as_deref())?)
        }
        cli::Command::CreateAsset {
            type_id,
            group_id,
            owner,
            process_id,
            serial_number,
            common_name,
            age,
            eol,
            rul,
            units,
            sandbox,
            generate_serial,
        } => {
            let serial_number = if generate_serial {
                Some(generate_serial_number(SERIAL_LENGTH))
            } else {
                serial_number
            };
            let asset = NewAsset {
                type_id,
                group_id,
                owner,
                process_id,
                serial_number,
                common_name,
                age,
                eol,
                rul,
                units,
            };
            let store = AssetStore::new(&db);
            print_json(&store.create_asset(&asset, sandbox)?)
        }
        cli::Command::CreateComponent {
            asset_id,
            unit,
            num_samples,
            misc_info,
        } => {
            let mut store = AssetStore::open(&db)?;
            let Some(asset) = store.asset(AssetKey::Id(asset_id))? else {
                bail!("asset {asset_id} does not exist");
            };
            let component = NewComponent {
                unit,
                num_samples,
                misc_info,
            };
            print_json(&store.create_component(&asset, &component)?)
        }
        cli::Command::BatchInsert {
            table,
            rows,
            batches,
        } => {
            let raw = std::fs::read_to_string(&rows)
                .with_context(|| format!("reading {}", rows.display()))?;
            let records: Vec<serde_json::Map<String, serde_json::Value>> =
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", rows.display()))?;
            let rows = Table::from_records(&records)?;
            let batches = batches.unwrap_or(Config::get().batch_count);
            let mut progress = LogProgress::new(format!("insert into {table}"));
            let report = loader::batch_insert(&db, &table, &rows, batches, &mut progress)?;
            print_json(&report)
        }
        cli::Command::Units {
            group_ids,
            fc,
            datasets,
            order_by,
        } => {
            let filter = UnitFilter {
                group_ids: non_empty(group_ids),
                fc: non_empty(fc),
                datasets: non_empty(datasets),
                order_by: order_by.parse::<UnitOrder>()?,
            };
            print_table(queries::units(&db, &filter)?)
        }
        cli::Command::Devices => {
            let store = AssetStore::open(&db)?;
            print_table(queries::devices(&db, store.components()))
        }
        cli::Command::Rounds => print_table(queries::rounds(&db)),
        cli::Command::DeviceData { asset_id } => print_table(queries::device_data(&db, asset_id)),
        cli::Command::UnitStats {
            asset_id,
            downsample,
            voltage_cutoff,
        } => print_table(queries::unit_stats(&db, asset_id, downsample, voltage_cutoff)),
        cli::Command::RoundData {
            group_id,
            cooling_block,
        } => {
            let (data, cooling) = queries::round_data(&db, group_id, cooling_block);
            let data = data.into_result()?.records();
            let cooling = match cooling {
                Some(table) => Some(table.into_result()?.records()),
                None => None,
            };
            print_json(&json!({ "data": data, "cooling_block": cooling }))
        }
        cli::Command::Telemetry {
            table,
            assets,
            date_start,
            date_stop,
            cycle_start,
            cycle_stop,
            limit,
            drop_columns,
        } => {
            let query = TelemetryQuery {
                table,
                assets,
                date_start,
                date_stop,
                cycle_start,
                cycle_stop,
                limit,
                drop_columns,
            };
            print_table(queries::telemetry(&db, &query)?)
        }
    }
}
