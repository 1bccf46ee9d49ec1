use std::path::Path;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use valor_telemetry::config::Config;
use valor_telemetry::error::Result;
use valor_telemetry::monitor::Monitor;
use valor_telemetry::sampler::HostSampler;
use valor_telemetry::types::NodeIdentity;
use valor_telemetry::uplink::UplinkClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let config_path = std::env::var("VALOR_CONFIG").unwrap_or_else(|_| "valor.json".to_string());
    let cfg = Config::load(Path::new(&config_path));

    // The console is reserved for the live telemetry line; tracing goes to
    // the durable log file so silent mode still records everything.
    let log_path = Path::new(&cfg.log_file);
    let log_dir = log_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let log_name = log_path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "valor-node.log".into());
    let file_appender = tracing_appender::rolling::never(log_dir, log_name);
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        eprintln!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let identity = match cfg.node_id.clone() {
        Some(id) => NodeIdentity::with_node_id(id),
        None => NodeIdentity::generate(),
    };

    // Strategy selection happens exactly once, here. The only fatal sensor
    // condition is a mandatory GPU that cannot initialize.
    let sampler = HostSampler::detect(&cfg)?;

    let uplink = match &cfg.uplink_url {
        Some(url) => Some(UplinkClient::new(url.clone())?),
        None => None,
    };

    info!(
        node_id = %identity.node_id,
        session_id = %identity.session_id,
        physical = sampler.is_physical_capable(),
        gpu = sampler.has_gpu(),
        yield_law = %cfg.yield_law,
        uplink = uplink.is_some(),
        "Node starting"
    );

    if !cfg.silent {
        print_banner(&cfg, &identity, &sampler);
    }

    let monitor = Monitor::new(&cfg, sampler, identity, uplink);
    monitor.run().await;

    Ok(())
}

fn print_banner(cfg: &Config, identity: &NodeIdentity, sampler: &HostSampler) {
    let mode = if sampler.is_physical_capable() { "PHYSICAL" } else { "SIMULATED" };
    let gpu = if sampler.has_gpu() { "ACTIVE" } else { "N/A" };

    println!("{}", "=".repeat(62));
    println!(" VALOR TELEMETRY NODE v{VERSION}");
    println!(" NODE_ID: {} | SESSION: {}", identity.node_id, identity.session_id);
    println!(" MODE: {mode} | GPU: {gpu} | YIELD_LAW: {}", cfg.yield_law);
    match &cfg.uplink_url {
        Some(url) => println!(" UPLINK: {url}"),
        None => println!(" UPLINK: disabled (local display only)"),
    }
    println!("{}", "=".repeat(62));
    println!(" [STATUS] Telemetry sampling active");
    println!(" [ACTION] Press Ctrl+C to disconnect node\n");
}
