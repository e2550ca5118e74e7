//! trajframe cli - mobility trajectory processing

use std::fs::File;
use std::io::BufWriter;

use argopt::{cmd_group, subcmd};
use csv::{Reader, Writer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use trajframe::config::Settings;
use trajframe::io::{read_positionfixes_csv, read_staypoints_csv, read_triplegs_csv, write_csv};
use trajframe::io::{positionfixes_to_gpx, triplegs_to_gpx};

/// CLI of trajframe - Process your tracking data as typed trajectory tables
#[cmd_group(commands = [staypoints, activity, modes, gpx])]
fn main() -> Result<(), String> {}

/// Log to stderr, `RUST_LOG` overrides the default `trajframe=info`
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trajframe=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Extract the staypoints of a positionfixes CSV file
#[subcmd]
fn staypoints(
    /// Positionfixes CSV file source
    csv_path: String,
    /// Staypoints CSV path file destination
    destination: String,
    /// Columns and thresholds configuration. Default: .trajframe.yaml, ~/.trajframe.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_logging();
    let settings = Settings::load(config).map_err(|e| e.to_string())?;

    let pfs = read_positionfixes_csv(open(&csv_path)?, &settings.columns.positionfixes_layout())
        .map_err(|e| e.to_string())?;

    let options = settings.staypoints.options().map_err(|e| e.to_string())?;
    let sp = pfs.extract_staypoints(&options).map_err(|e| e.to_string())?;

    let mut wtr = create(&destination)?;
    write_csv(sp.frame(), &mut wtr).map_err(|e| e.to_string())?;

    Ok(())
}

/// Flag the staypoints considered an activity
#[subcmd]
fn activity(
    /// Staypoints CSV file source
    csv_path: String,
    /// Staypoints CSV path file destination
    destination: String,
    /// Columns and thresholds configuration. Default: .trajframe.yaml, ~/.trajframe.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_logging();
    let settings = Settings::load(config).map_err(|e| e.to_string())?;

    let sp = read_staypoints_csv(open(&csv_path)?, &settings.columns.staypoints_layout())
        .map_err(|e| e.to_string())?;

    let method = settings.activity.method().map_err(|e| e.to_string())?;
    let sp = sp
        .create_activity_flag(method, settings.activity.time_threshold, &settings.activity.column)
        .map_err(|e| e.to_string())?;

    let mut wtr = create(&destination)?;
    write_csv(sp.frame(), &mut wtr).map_err(|e| e.to_string())?;

    Ok(())
}

/// Predict the transport mode of triplegs
#[subcmd]
fn modes(
    /// Triplegs CSV file source
    csv_path: String,
    /// Triplegs CSV path file destination
    destination: String,
    /// Columns and speed categories configuration. Default: .trajframe.yaml, ~/.trajframe.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_logging();
    let settings = Settings::load(config).map_err(|e| e.to_string())?;

    let tpls = read_triplegs_csv(open(&csv_path)?, &settings.columns.triplegs_layout())
        .map_err(|e| e.to_string())?;

    let method = settings.transport.method().map_err(|e| e.to_string())?;
    let categories = settings.transport.categories().map_err(|e| e.to_string())?;
    let tpls = tpls
        .predict_transport_mode(method, &categories)
        .map_err(|e| e.to_string())?;

    let mut wtr = create(&destination)?;
    write_csv(tpls.frame(), &mut wtr).map_err(|e| e.to_string())?;

    Ok(())
}

/// Generate a GPX from a positionfixes or triplegs CSV file
#[subcmd]
fn gpx(
    /// CSV file source
    csv_path: String,
    /// GPX path file destination
    destination: String,
    /// Read the file as triplegs instead of positionfixes
    #[opt(long)]
    triplegs: bool,
    /// Columns configuration. Default: .trajframe.yaml, ~/.trajframe.yaml
    #[opt(long)]
    config: Option<String>,
) -> Result<(), String> {
    init_logging();
    let settings = Settings::load(config).map_err(|e| e.to_string())?;
    let rdr = open(&csv_path)?;

    let doc = if triplegs {
        let tpls = read_triplegs_csv(rdr, &settings.columns.triplegs_layout())
            .map_err(|e| e.to_string())?;
        triplegs_to_gpx(&tpls)
    } else {
        let pfs = read_positionfixes_csv(rdr, &settings.columns.positionfixes_layout())
            .map_err(|e| e.to_string())?;
        positionfixes_to_gpx(&pfs)
    }
    .map_err(|e| e.to_string())?;
    info!("Writing {} tracks to {}", doc.tracks.len(), destination);

    let destination = File::create(destination)
        .map_err(|e| format!("Failed on create the destination file: {}", e))?;
    let mut writer = BufWriter::new(destination);
    ::gpx::write(&doc, &mut writer).map_err(|e| e.to_string())?;

    Ok(())
}

fn open(path: &str) -> Result<Reader<File>, String> {
    let csv = File::open(path).map_err(|e| format!("Failed on open the CSV file: {}", e))?;

    Ok(Reader::from_reader(csv))
}

fn create(path: &str) -> Result<Writer<File>, String> {
    let destination =
        File::create(path).map_err(|e| format!("Failed on create the destination file: {}", e))?;

    Ok(Writer::from_writer(destination))
}
