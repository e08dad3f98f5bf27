extern crate chrono;
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate log;
extern crate na_core;
extern crate sekf_cycle;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use env_logger::{Builder, Env};

use std::io::Write;
use std::path::PathBuf;
use std::process;

use na_core::Result;
use sekf_cycle::perturb::generate_perturbations;
use sekf_cycle::{run_sekf, CycleContext, CycleDriver, SekfConfig};

/// Sequential finite-difference Kalman filter for land-surface soil moisture.
#[derive(Parser)]
#[command(name = "sekf-cycle", version)]
struct Cli {
  /// More log output; repeat for trace level. RUST_LOG takes precedence.
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Runs one assimilation cycle.
  Run(RunArgs),
  /// Derives the perturbed members from a control restart file.
  Perturb(PerturbArgs),
}

#[derive(Args)]
struct RunArgs {
  #[arg(long)]
  config: PathBuf,
  /// Cycle start, RFC 3339.
  #[arg(long, value_parser = parse_time)]
  start: DateTime<Utc>,
  /// Analysis time, RFC 3339.
  #[arg(long, value_parser = parse_time)]
  analysis: DateTime<Utc>,
  /// Only run the update on an already staged run directory.
  #[arg(long)]
  run_dir: Option<PathBuf>,
}

#[derive(Args)]
struct PerturbArgs {
  #[arg(long)]
  config: PathBuf,
  /// Control restart file.
  #[arg(long)]
  control: PathBuf,
  /// Receives one `ensNNN` directory per member.
  #[arg(long)]
  out_dir: PathBuf,
  #[arg(long, value_parser = parse_time)]
  analysis: DateTime<Utc>,
}

fn parse_time(s: &str) -> ::std::result::Result<DateTime<Utc>, String> {
  DateTime::parse_from_rfc3339(s)
    .map(|t| t.with_timezone(&Utc) )
    .map_err(|e| format!("`{}` is not an RFC 3339 time: {}", s, e) )
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  Builder::from_env(Env::default().default_filter_or(level))
    .format(|buf, record| {
      writeln!(buf, "[{} {:5} {}] {}",
               chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
               record.level(),
               record.target(),
               record.args())
    })
    .init();
}

fn run(args: RunArgs) -> Result<()> {
  let config = SekfConfig::load(&args.config)?;
  match args.run_dir {
    Some(run_dir) => {
      let ctx = CycleContext {
        config: config,
        run_dir: run_dir,
        start_time: args.start,
        analysis_time: args.analysis,
      };
      let path = run_sekf(&ctx)?;
      info!("analysis written to {}", path.display());
    },
    None => {
      let mut driver = CycleDriver::new(config, args.start, args.analysis)?;
      let link = driver.run_all()?;
      info!("cycle finished, analysis at {}", link.display());
    },
  }
  Ok(())
}

fn perturb(args: PerturbArgs) -> Result<()> {
  let config = SekfConfig::load(&args.config)?;
  let members = generate_perturbations(&config, &args.control, &args.out_dir, &args.analysis)?;
  info!("{} members written below {}", members.len(), args.out_dir.display());
  Ok(())
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let result = match cli.command {
    Command::Run(args) => run(args),
    Command::Perturb(args) => perturb(args),
  };
  if let Err(e) = result {
    error!("{}", e);
    process::exit(1);
  }
}
