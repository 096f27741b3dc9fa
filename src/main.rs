use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use waypoint::proxy::{
    self, DEFAULT_BIND, DEFAULT_PORT, DEFAULT_STATS_INTERVAL, DEFAULT_TIMEOUT, DEFAULT_UPSTREAM,
    ProxyConfig,
};
use waypoint::{Error, Result};

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Caching DNS forwarding proxy", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value_t = DEFAULT_BIND.to_string())]
    bind: String,

    /// Upstream DNS server (ip or ip:port)
    #[arg(short, long, default_value_t = DEFAULT_UPSTREAM.to_string())]
    upstream: String,

    /// Seconds to wait for the upstream before dropping a query
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Handle one query at a time
    #[arg(long)]
    sequential: bool,

    /// Seconds between statistics reports, 0 to disable
    #[arg(long, default_value_t = DEFAULT_STATS_INTERVAL.as_secs())]
    stats_interval: u64,

    /// Enable debug logging and log every answered query
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<ProxyConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind address `{}`", self.bind)))?;

        if self.timeout == 0 {
            return Err(Error::Config("timeout must be at least 1 second".into()));
        }

        Ok(ProxyConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            upstream: proxy::parse_upstream(&self.upstream)?,
            timeout: Duration::from_secs(self.timeout),
            sequential: self.sequential,
            stats_interval: (self.stats_interval > 0)
                .then(|| Duration::from_secs(self.stats_interval)),
            verbose: self.verbose,
        })
    }
}

/// `RUST_LOG` overrides the level chosen by `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(proxy::run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
