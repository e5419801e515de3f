//! erpsd: CFM continuity monitor raising ERPS Signal-Fail
//!
//! With `-m` the daemon sends CCMs, with `-t` it sends LBMs; with neither it
//! only answers LBMs and LTMs and tracks the CCMs it receives.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use cfm_erps::core::{CcmInterval, Config, MacAddress, MepId};
use cfm_erps::engine::Engine;
use cfm_erps::network::RawSocketTransport;
use cfm_erps::Result;

#[derive(Parser, Debug)]
#[command(
    name = "erpsd",
    version,
    disable_version_flag = true,
    about = "CFM continuity monitor raising ERPS Signal-Fail"
)]
struct Args {
    /// Interface to run on
    #[arg(short = 'i', long)]
    interface: String,

    /// Local MEP ID; CCMs are sent continually when set
    #[arg(short = 'm', long = "mep-id")]
    mep_id: Option<MepId>,

    /// Target MAC address; LBMs are sent continually when set
    #[arg(short = 't', long = "target")]
    target: Option<MacAddress>,

    /// Ring id
    #[arg(short = 'r', long = "ring-id", default_value_t = 2)]
    ring_id: u8,

    /// VLAN id, 0 for untagged
    #[arg(short = 'v', long, default_value_t = 0)]
    vlan: u16,

    /// Maintenance domain level
    #[arg(short = 'l', long = "md-level", default_value_t = 0)]
    md_level: u8,

    /// CCM interval in ms: 100, 1000, 10000, 60000 or 600000
    #[arg(short = 's', long = "ccm-interval", default_value_t = 1000)]
    ccm_interval: u64,

    /// CCM slots skipped between transmissions
    #[arg(short = 'S', long = "ccm-skips", default_value_t = 0)]
    ccm_skips: u32,

    /// Maintenance domain name
    #[arg(short = 'd', long = "domain", default_value = "HCL")]
    md_name: String,

    /// Maintenance association name
    #[arg(short = 'a', long = "association", default_value = "HCL_ERPS")]
    ma_name: String,

    /// Log at debug level
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Use this MAC address instead of the interface's
    #[arg(long = "local-mac")]
    local_mac: Option<MacAddress>,

    /// Send one linktrace toward this MAC address at startup
    #[arg(long = "linktrace")]
    linktrace: Option<MacAddress>,
}

impl Args {
    fn to_config(&self) -> Result<Config> {
        Ok(Config {
            interface: self.interface.clone(),
            local_mac: self.local_mac,
            remote_mac: self.target,
            vlan: self.vlan,
            md_level: self.md_level,
            ring_id: self.ring_id,
            mep_id: self.mep_id,
            ccm_interval: CcmInterval::from_millis(self.ccm_interval)?,
            ccm_skips: self.ccm_skips,
            md_name: self.md_name.clone(),
            ma_name: self.ma_name.clone(),
            verbose: self.verbose,
        })
    }
}

async fn run(args: Args) -> Result<()> {
    let config = args.to_config()?;
    config.validate()?;

    let transport = Arc::new(RawSocketTransport::open(&config.interface, config.local_mac)?);
    let engine = Engine::new(config, transport)?;
    let handle = engine.handle();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
        }
        shutdown.cancel();
    });

    if let Some(target) = args.linktrace {
        handle.linktrace(target, None)?;
    }

    engine.run(cancel).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
