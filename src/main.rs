//! Netharvest Binary Entry Point
//!
//! Runs one polling job to completion and exits. Core functionality is
//! provided by the `netharvest` library crate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use netharvest::{
    config::{AppConfig, parse_duration},
    context::RunContext,
    inventory::{
        DeviceScope, TemplateLevel, create_template_dirs, load_devices, load_sql_templates,
        load_templates,
    },
    poller::{
        DeviceDataPoller, DevicePoller, EponPoller, IfaceDataPoller, IfaceDiscoverPoller,
        LinkRegistry, PoolReport, TsImportPoller, UdpSnmpConnector, WirelessPoller, WorkerPool,
        load_olts, load_radio_ifaces,
    },
    routeros::TcpApiConnector,
    storage::{RowSource, RrdFileStore, StorageBuilder, TimeSeriesSink},
    telnet::TcpConnector,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Netharvest - Batch Network Telemetry
#[derive(Parser, Debug)]
#[command(name = "netharvest", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "configs/netharvest.yaml",
        env = "NETHARVEST_CONFIG"
    )]
    config: String,

    /// Concurrent device workers (overrides config file)
    #[arg(long, env = "NETHARVEST_WORKERS")]
    workers: Option<usize>,

    /// Time-series base directory (overrides config file)
    #[arg(long, env = "NETHARVEST_TS_DIR")]
    ts_dir: Option<PathBuf>,

    /// Inventory database path (overrides config file)
    #[arg(long, env = "NETHARVEST_DB_PATH")]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    job: Job,
}

#[derive(Subcommand, Debug)]
enum Job {
    /// Device-level SNMP templates
    DeviceData {
        /// Poll only this device id
        #[arg(long)]
        device: Option<i64>,
    },

    /// Interface SNMP templates over known interfaces
    IfaceData {
        /// Poll only this device id
        #[arg(long, conflicts_with = "device_type")]
        device: Option<i64>,

        /// Poll only devices of this type
        #[arg(long)]
        device_type: Option<i64>,
    },

    /// Walk interface tables into the inventory
    IfaceDiscover {
        /// Walk only this device id
        #[arg(long)]
        device: Option<i64>,
    },

    /// ONU levels and status from EPON OLTs
    Epon {
        /// Country code of the OLTs to scrape
        #[arg(long)]
        country: String,

        /// Scrape only the OLT with this name
        #[arg(long)]
        name: Option<String>,
    },

    /// Link quality from RouterOS registration tables
    WirelessLinks,

    /// Relational values into the time-series store
    TsImport {
        /// Rows per page (overrides config file)
        #[arg(long, env = "NETHARVEST_PAGE_SIZE")]
        page_size: Option<usize>,

        /// Wait before reading, and stamp values that far back
        #[arg(long, value_parser = parse_duration, default_value = "0s")]
        delay: Duration,
    },
}

impl Job {
    fn delay(&self) -> Duration {
        match self {
            Job::TsImport { delay, .. } => *delay,
            _ => Duration::ZERO,
        }
    }
}

fn device_scope(device: Option<i64>, device_type: Option<i64>) -> DeviceScope {
    match (device, device_type) {
        (Some(id), _) => DeviceScope::Id(id),
        (None, Some(t)) => DeviceScope::DeviceType(t),
        (None, None) => DeviceScope::All,
    }
}

/// Run `poller` over `devices` and return once every device is done.
async fn run_pool<P: DevicePoller>(
    poller: P,
    workers: usize,
    devices: Vec<P::Device>,
) -> PoolReport {
    WorkerPool::start(Arc::new(poller), workers, devices)
        .wait()
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = if Path::new(&cli.config).exists() {
        tracing::info!(path = %cli.config, "Loading configuration");
        AppConfig::load(&cli.config)?
    } else {
        tracing::warn!(path = %cli.config, "Configuration file not found, using defaults");
        AppConfig::default()
    };

    // CLI > ENV > config file
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(dir) = cli.ts_dir {
        config.timeseries.dir = dir;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }
    if let Job::TsImport {
        page_size: Some(size),
        ..
    } = cli.job
    {
        config.timeseries.page_size = size;
    }
    config.validate()?;

    let delay = cli.job.delay();
    if !delay.is_zero() {
        tracing::info!(delay = ?delay, "Waiting before start");
        tokio::time::sleep(delay).await;
    }
    let poll_time = Utc::now() - TimeDelta::from_std(delay)?;

    let settings = Arc::new(config);
    let handles = StorageBuilder::new(&settings.database.path)
        .channel_capacity(settings.database.channel_capacity)
        .build()?;
    let rows: Arc<dyn RowSource> = Arc::new(handles.reader.clone());
    let sink = TimeSeriesSink::new(Arc::new(RrdFileStore::new()), &settings.timeseries.dir);
    let ctx = RunContext::new(
        poll_time,
        sink,
        handles.mutations(),
        Arc::clone(&rows),
        Arc::clone(&settings),
    );
    let ts_dir = settings.timeseries.dir.as_path();
    let workers = settings.workers;

    tracing::info!(job = ?cli.job, workers, %poll_time, "Run started");

    let report = match cli.job {
        Job::DeviceData { device } => {
            let templates = load_templates(rows.as_ref(), Some(ts_dir))?;
            let devices = load_devices(
                rows.as_ref(),
                &device_scope(device, None),
                Some(TemplateLevel::Device),
            )?;
            let snmp = Arc::new(UdpSnmpConnector::from_config(&settings.snmp));
            let poller = DeviceDataPoller::new(ctx.with_templates(templates), snmp);
            run_pool(poller, workers, devices).await
        }
        Job::IfaceData {
            device,
            device_type,
        } => {
            let templates = load_templates(rows.as_ref(), Some(ts_dir))?;
            let devices = load_devices(
                rows.as_ref(),
                &device_scope(device, device_type),
                Some(TemplateLevel::Iface),
            )?;
            let snmp = Arc::new(UdpSnmpConnector::from_config(&settings.snmp));
            let poller = IfaceDataPoller::new(ctx.with_templates(templates), snmp);
            run_pool(poller, workers, devices).await
        }
        Job::IfaceDiscover { device } => {
            let devices = load_devices(rows.as_ref(), &device_scope(device, None), None)?;
            let snmp = Arc::new(UdpSnmpConnector::from_config(&settings.snmp));
            run_pool(IfaceDiscoverPoller::new(ctx, snmp), workers, devices).await
        }
        Job::Epon { country, name } => {
            let olts = load_olts(rows.as_ref(), &country, name.as_deref())?;
            let snmp = Arc::new(UdpSnmpConnector::from_config(&settings.snmp));
            let telnet = TcpConnector::new(settings.telnet.timeout);
            run_pool(EponPoller::new(ctx, snmp, telnet), workers, olts).await
        }
        Job::WirelessLinks => {
            let registry = Arc::new(LinkRegistry::new(load_radio_ifaces(rows.as_ref())?));
            let access_points = registry.access_points();
            let api = Arc::new(TcpApiConnector::new(
                settings.routeros.port,
                settings.routeros.timeout,
            ));
            run_pool(WirelessPoller::new(ctx, api, registry), workers, access_points).await
        }
        Job::TsImport { .. } => {
            let templates = load_sql_templates(rows.as_ref())?;
            create_template_dirs(ts_dir, templates.iter().map(|t| t.path.as_str()))?;
            run_pool(TsImportPoller::new(ctx), workers, templates).await
        }
    };

    tracing::info!(
        devices = report.devices,
        succeeded = report.succeeded,
        failed = report.failed,
        samples = report.summary.samples,
        mutations = report.summary.mutations,
        dropped = report.summary.dropped,
        "Run finished"
    );

    let drained = handles.shutdown()?;
    tracing::info!(
        applied = drained.applied,
        failed = drained.failed,
        "Mutation queue drained"
    );
    Ok(())
}
