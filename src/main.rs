//! spectral-sweep command line.
//!
//! ```text
//! spectral-sweep sweep --start 790 --end 830 --step 1 --exposure 0.1 --wait 0.05 \
//!     --pump-power 0.01 --probe-power 0.1
//! spectral-sweep show 20250803-104120
//! spectral-sweep list
//! spectral-sweep config
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use spectral_sweep::config::{SweepConfig, DEFAULT_CONFIG_PATH};
use spectral_sweep::instrument::{MockLaser, MockSpectrometer};
use spectral_sweep::report::RunReport;
use spectral_sweep::{
    logging, ExperimentLedger, RunTimestamp, SweepController, SweepOptions, SweepParams,
};
use std::path::PathBuf;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "spectral-sweep", version, about = "Wavelength-sweep photon counting")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override storage.data_dir
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tune across [start, end) and record photon counts
    Sweep {
        /// First wavelength (nm)
        #[arg(long)]
        start: f64,
        /// Exclusive end wavelength (nm)
        #[arg(long)]
        end: f64,
        /// Step (nm)
        #[arg(long)]
        step: f64,
        /// Exposure per acquisition (s)
        #[arg(long)]
        exposure: f64,
        /// Settle delay after each wavelength change (s)
        #[arg(long, default_value_t = 0.5)]
        wait: f64,
        /// 532 nm pump power (W), recorded in the ledger
        #[arg(long)]
        pump_power: Option<f64>,
        /// Probe power (W), recorded in the ledger
        #[arg(long)]
        probe_power: Option<f64>,
        /// Do not write the ledger row or summary table
        #[arg(long)]
        no_save: bool,
    },
    /// Print the parameters and results of a recorded run
    Show {
        /// Run timestamp (YYYYMMDD-HHMMSS)
        timestamp: String,
    },
    /// List recorded runs
    List,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SweepConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    logging::init(&config.application)?;

    let ledger = ExperimentLedger::from_config(&config.storage);

    match cli.command {
        Command::Sweep {
            start,
            end,
            step,
            exposure,
            wait,
            pump_power,
            probe_power,
            no_save,
        } => {
            let mut params = SweepParams::new(start, end, step, exposure, wait);
            params.pump_power_w = pump_power;
            params.probe_power_w = probe_power;

            let laser = Arc::new(MockLaser::with_lock_time(config.laser.lock_time));
            let spectrometer = Arc::new(MockSpectrometer::from_config(&config.spectrometer));
            let mut controller = SweepController::new(laser, spectrometer, ledger)
                .with_options(SweepOptions::from_config(&config));

            let outcome = controller.run(&params, !no_save).await?;
            match outcome.timestamp {
                Some(ts) => println!("{ts}"),
                None => {
                    for p in outcome.accumulator.result.points() {
                        println!("{},{}", p.wavelength_nm, p.total_count);
                    }
                }
            }
        }
        Command::Show { timestamp } => {
            let ts = RunTimestamp::parse(&timestamp)?;
            match RunReport::load(&ledger, &ts)? {
                Some(report) => print!("{report}"),
                None => bail!("no run {ts} in {}", ledger.ledger_path().display()),
            }
        }
        Command::List => {
            for row in ledger.entries()? {
                let points = row.params().grid().map(|g| g.len()).unwrap_or(0);
                println!(
                    "{}  {:.2}..{:.2} nm step {}  ({} points)",
                    row.timestamp,
                    row.start_wavelength_nm,
                    row.end_wavelength_nm,
                    row.step_nm,
                    points
                );
            }
        }
        Command::Config => print!("{}", config.to_toml()?),
    }
    Ok(())
}
