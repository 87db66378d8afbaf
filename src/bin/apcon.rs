// ============================================================================
// File: src/bin/apcon.rs
// ----------------------------------------------------------------------------
// Command line front end for the controller:
// - probe: report which control transports this host declares
// - dump: initialize and print the controller's diagnostic state
// - start/stop/disconnect: drive one access point operation and exit
// ============================================================================

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use log::error;

use apcon::backends::{default_providers, DisconnectReason, MacAddr, TransportPaths};
use apcon::config::{AccessPointConfig, ApSecurity, BAND_2GHZ, BAND_5GHZ, BAND_6GHZ};
use apcon::controller::ApdController;
use apcon::event::EventContext;
use apcon::vendor::{highest_declared_version, VendorTuning};

#[derive(Parser, Debug)]
#[command(name = "apcon", version, about = "Control-plane client for the apd access point daemon")]
struct Cli {
    /// Path of the daemon's HTTP API socket
    #[arg(long, value_name = "PATH")]
    api_socket: Option<PathBuf>,

    /// Directory holding the daemon's legacy control sockets
    #[arg(long, value_name = "DIR")]
    ctrl_dir: Option<PathBuf>,

    /// Path of the vendor extension manifest
    #[arg(long, value_name = "PATH")]
    vendor_manifest: Option<PathBuf>,

    /// Log at debug level and ask the daemon to do the same
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report which control transports this host declares
    Probe,
    /// Initialize a backend and print the controller's diagnostic state
    Dump,
    /// Bring up an access point and exit
    Start {
        /// Wireless interface to host the AP on
        iface: String,
        /// Network name
        ssid: String,
        /// WPA2 passphrase; the AP is open without one
        #[arg(long)]
        passphrase: Option<String>,
        /// Use WPA3-SAE instead of WPA2 for the passphrase
        #[arg(long, requires = "passphrase")]
        sae: bool,
        /// Opportunistic Wireless Encryption, passphrase-less but encrypted
        #[arg(long, conflicts_with = "passphrase")]
        owe: bool,
        /// Band to allow, repeatable (2, 5 or 6)
        #[arg(long = "band", value_name = "GHZ")]
        bands: Vec<u32>,
        /// Pin the AP to one channel instead of automatic selection
        #[arg(long)]
        channel: Option<u32>,
        /// Do not broadcast the SSID
        #[arg(long)]
        hidden: bool,
        /// Mark the uplink as metered
        #[arg(long)]
        metered: bool,
        /// Two-letter regulatory country code
        #[arg(long, value_name = "CC")]
        country: Option<String>,
        /// Bridge interface to attach the AP to (vendor extension)
        #[arg(long, value_name = "IFACE")]
        bridge: Option<String>,
        /// Channels automatic selection may pick, e.g. "1-11,36" (vendor extension)
        #[arg(long, value_name = "LIST")]
        acs_channels: Option<String>,
    },
    /// Tear down the access point on an interface
    Stop { iface: String },
    /// Force-deauthenticate one connected client
    Disconnect {
        iface: String,
        /// Client MAC address, aa:bb:cc:dd:ee:ff
        client: String,
        #[arg(long, value_enum, default_value_t = ReasonArg::Unspecified)]
        reason: ReasonArg,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReasonArg {
    Unspecified,
    PrevAuthNotValid,
    ApBusy,
}

impl From<ReasonArg> for DisconnectReason {
    fn from(arg: ReasonArg) -> Self {
        match arg {
            ReasonArg::Unspecified => DisconnectReason::Unspecified,
            ReasonArg::PrevAuthNotValid => DisconnectReason::PrevAuthNotValid,
            ReasonArg::ApBusy => DisconnectReason::ApBusy,
        }
    }
}

fn transport_paths(cli: &Cli) -> TransportPaths {
    let mut paths = TransportPaths::new();
    if let Some(socket) = &cli.api_socket {
        paths = paths.with_api_socket(socket);
    }
    if let Some(dir) = &cli.ctrl_dir {
        paths = paths.with_ctrl_dir(dir);
    }
    if let Some(manifest) = &cli.vendor_manifest {
        paths = paths.with_vendor_manifest(manifest);
    }
    paths
}

fn band_mask(bands: &[u32]) -> anyhow::Result<u32> {
    if bands.is_empty() {
        return Ok(BAND_2GHZ);
    }
    let mut mask = 0;
    for band in bands {
        mask |= match band {
            2 => BAND_2GHZ,
            5 => BAND_5GHZ,
            6 => BAND_6GHZ,
            other => bail!("unknown band {other} GHz, expected 2, 5 or 6"),
        };
    }
    Ok(mask)
}

fn initialized_controller(
    paths: TransportPaths,
    tuning: VendorTuning,
    events: EventContext,
) -> anyhow::Result<ApdController> {
    let controller = ApdController::with_tuning(paths, tuning, events);
    if !controller.initialize() {
        bail!("no usable backend, is the daemon installed?");
    }
    Ok(controller)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    // Controller operations block their calling thread, so the runtime only
    // hosts the event loop and watcher tasks while main stays outside it.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;
    let events = EventContext::new(runtime.handle().clone());

    let paths = transport_paths(&cli);
    let verbose = cli.verbose;

    match cli.command {
        Command::Probe => {
            let providers = default_providers(&paths);
            if providers.is_empty() {
                println!("no control transports on this platform");
            }
            for provider in &providers {
                let declared = (provider.declared)();
                println!(
                    "{}: {}",
                    provider.name,
                    if declared { "declared" } else { "not declared" }
                );
            }
            match highest_declared_version(&paths.vendor_manifest) {
                Some(version) => println!("vendor extension: {version}"),
                None => println!("vendor extension: none"),
            }
        }
        Command::Dump => {
            let controller = ApdController::new(paths, events);
            controller.enable_verbose_logging(verbose, verbose);
            if !controller.initialize() {
                error!("initialize failed, dumping what we have");
            }
            let mut out = String::new();
            controller
                .dump(&mut out)
                .context("formatting controller state")?;
            print!("{out}");
        }
        Command::Start {
            iface,
            ssid,
            passphrase,
            sae,
            owe,
            bands,
            channel,
            hidden,
            metered,
            country,
            bridge,
            acs_channels,
        } => {
            let security = if owe {
                ApSecurity::Owe
            } else {
                match (passphrase, sae) {
                    (Some(pass), false) => ApSecurity::Wpa2Psk { passphrase: pass },
                    (Some(pass), true) => ApSecurity::Wpa3Sae { passphrase: pass },
                    (None, _) => ApSecurity::Open,
                }
            };
            let mut config = AccessPointConfig::new(&iface, ssid.into_bytes())
                .with_band_mask(band_mask(&bands)?)
                .with_hidden(hidden)
                .with_security(security);
            if let Some(channel) = channel {
                config = config.with_channel(channel);
            }
            if let Some(country) = country {
                config = config.with_country_code(country);
            }

            let mut tuning = VendorTuning::new();
            if let Some(bridge) = bridge {
                tuning = tuning.with_bridge_iface(bridge);
            }
            if let Some(list) = acs_channels {
                tuning = tuning.with_acs_channel_list(list);
            }

            let controller = initialized_controller(paths, tuning, events)?;
            controller.enable_verbose_logging(verbose, verbose);
            let failed_iface = iface.clone();
            let started = controller.start_access_point(
                &config,
                metered,
                Box::new(move || error!("access point on {failed_iface} failed")),
            );
            if !started {
                bail!("daemon rejected the access point on {iface}");
            }
            println!("access point up on {iface}");
        }
        Command::Stop { iface } => {
            let controller = initialized_controller(paths, VendorTuning::default(), events)?;
            if !controller.stop_access_point(&iface) {
                bail!("daemon rejected stopping the access point on {iface}");
            }
            println!("access point down on {iface}");
        }
        Command::Disconnect {
            iface,
            client,
            reason,
        } => {
            let client: MacAddr = client
                .parse()
                .with_context(|| format!("parsing client address {client:?}"))?;
            let controller = initialized_controller(paths, VendorTuning::default(), events)?;
            if !controller.disconnect_client(&iface, &client, reason.into()) {
                bail!("daemon rejected disconnecting {client} on {iface}");
            }
            println!("disconnected {client} on {iface}");
        }
    }
    Ok(())
}
