mod bluetooth;
mod config;
mod delivery;
mod models;
mod records;
#[cfg(test)]
mod test_utils;
mod utils;

use clap::Parser;
use log::{error, info, LevelFilter};

use bluetooth::{scan_with_retry, BluerRadio, Radio};
use config::CollectorConfig;
use delivery::http::Poster;
use delivery::{FileSink, HttpSink, ReqwestPoster, Severity};
use records::format_records;
use utils::{format_datetime, local_now};

/// Collect OMRON environment sensor broadcasts and deliver them to an HTTP
/// endpoint and, optionally, a local CSV file.
#[derive(Parser, Debug)]
#[command(author, about, version)]
struct Options {
    /// Outputting debug logs
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Writing to csv file
    #[arg(short = 'w', long = "write")]
    write: bool,
}

/// Severity reported by each sink for one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CycleReport {
    file: Option<Severity>,
    http: Severity,
}

impl CycleReport {
    fn worst(&self) -> Severity {
        self.file
            .map_or(self.http, |file| file.worst(self.http))
    }
}

/// One scan-then-deliver cycle
///
/// `http` is `None` when no HTTP client could be built; that sink is then
/// reported as critical while the file sink still runs.
async fn run_cycle<P: Poster>(
    config: &CollectorConfig,
    radio: &dyn Radio,
    http: Option<&HttpSink<P>>,
    file: Option<&FileSink>,
) -> CycleReport {
    let readings = scan_with_retry(
        radio,
        config.scan_retries,
        config.scan_window,
        &config.expected_devices,
    )
    .await;

    let captured = local_now();
    info!(
        "Formatting {} reading(s) captured at {}",
        readings.len(),
        format_datetime(&captured)
    );
    let records = format_records(&readings, captured);

    let file = file.map(|sink| sink.append_all(&records));
    let http = match http {
        Some(sink) => sink.post_all(&records).await,
        None => Severity::Critical,
    };

    CycleReport { file, http }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if options.debug {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match CollectorConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let http = match ReqwestPoster::new(config.connect_timeout, config.read_timeout) {
        Ok(poster) => Some(HttpSink::new(
            poster,
            config.post_url.clone(),
            config.retry_policy.clone(),
            config.request_concurrency,
        )),
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            None
        }
    };
    let file = options
        .write
        .then(|| FileSink::new(&config.output_dir, config.output_filename.as_str()));

    let report = run_cycle(&config, &BluerRadio, http.as_ref(), file.as_ref()).await;

    if let Some(severity) = report.file {
        info!("File sink result: {}", severity);
    }
    info!("HTTP sink result: {}", report.http);
    info!("Collection cycle result: {}", report.worst());

    Ok(())
}
