//! prefmac CLI - verify and re-sign browser preference integrity tags

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use prefmac_core::reconcile::{FieldIssue, FieldReport, ReconcileReport};
use prefmac_core::{PrefMacConfig, ProfileFiles, ProfileSigner, StoreBackend};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prefmac")]
#[command(about = "Verify and re-sign browser preference integrity tags", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seed file, overrides `seed.path`
    #[arg(long, global = true)]
    seed: Option<PathBuf>,

    /// Tag store backend, overrides `store.backend`
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Secure store database, overrides `store.db_path`
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Fixed account SID, used with --volume-serial instead of live queries
    #[arg(long, global = true, requires = "volume_serial")]
    sid: Option<String>,

    /// Fixed volume serial number
    #[arg(long, global = true, requires = "sid")]
    volume_serial: Option<u32>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare stored tags with recomputed ones
    Verify(ProfileArgs),
    /// Recompute and store every tag
    Apply(ProfileArgs),
    /// Set the startup page and home page, then re-sign
    SetStartup {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Startup page URL
        #[arg(long)]
        url: String,
    },
    /// Print this machine's identity string
    MachineId,
}

#[derive(Args)]
struct ProfileArgs {
    /// Profile directory holding `Preferences` and `Secure Preferences`
    #[arg(long, conflicts_with_all = ["preferences", "secure_preferences"])]
    profile_dir: Option<PathBuf>,

    /// Preferences document
    #[arg(short, long, required_unless_present = "profile_dir")]
    preferences: Option<PathBuf>,

    /// Separate document holding the embedded tags
    #[arg(short, long)]
    secure_preferences: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl ProfileArgs {
    fn files(&self) -> Result<ProfileFiles> {
        if let Some(dir) = &self.profile_dir {
            return Ok(ProfileFiles::in_profile_dir(dir));
        }
        let preferences = self
            .preferences
            .clone()
            .context("either --profile-dir or --preferences is required")?;
        Ok(match &self.secure_preferences {
            Some(secure) => ProfileFiles::split(preferences, secure),
            None => ProfileFiles::single(preferences),
        })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Document,
    SecureStore,
}

impl From<BackendArg> for StoreBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Document => StoreBackend::Document,
            BackendArg::SecureStore => StoreBackend::SecureStore,
        }
    }
}

/// All tags matched, or tags were written.
const EXIT_OK: u8 = 0;
/// Verification found mismatches.
const EXIT_MISMATCH: u8 = 1;
/// The run aborted.
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let config = load_config(&cli)?;
    debug!(?config, "effective configuration");
    let signer = ProfileSigner::new(config).context("invalid configuration")?;

    match &cli.command {
        Commands::Verify(profile) => {
            let report = signer
                .verify(&profile.files()?)
                .context("verification failed")?;
            print_report(&report, profile.json)?;
            Ok(exit_code(&report))
        }
        Commands::Apply(profile) => {
            let report = signer.apply(&profile.files()?).context("apply failed")?;
            print_report(&report, profile.json)?;
            Ok(exit_code(&report))
        }
        Commands::SetStartup { profile, url } => {
            let report = signer
                .set_startup(&profile.files()?, url)
                .context("setting the startup page failed")?;
            print_report(&report, profile.json)?;
            Ok(exit_code(&report))
        }
        Commands::MachineId => {
            let identity = signer
                .machine_identity()
                .context("machine identity unavailable")?;
            println!("{identity}");
            Ok(EXIT_OK)
        }
    }
}

/// Configuration file (or defaults) with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<PrefMacConfig> {
    let mut config = match &cli.config {
        Some(path) => PrefMacConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PrefMacConfig::default(),
    };

    if let Some(seed) = &cli.seed {
        config.seed.path = seed.clone();
    }
    if let Some(backend) = cli.backend {
        config.store.backend = backend.into();
    }
    if let Some(db) = &cli.db {
        config.store.db_path = db.clone();
    }
    if let (Some(sid), Some(serial)) = (&cli.sid, cli.volume_serial) {
        config.identity.sid = Some(sid.clone());
        config.identity.volume_serial = Some(serial);
    }
    Ok(config)
}

/// Exit status of a completed run: written tags or a full match succeed.
fn exit_code(report: &ReconcileReport) -> u8 {
    if report.applied || report.all_match() {
        EXIT_OK
    } else {
        EXIT_MISMATCH
    }
}

fn print_report(report: &ReconcileReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for field in &report.fields {
        println!("{:<14} {}", status(field), field.path);
    }
    println!("{:<14} {}", status(&report.aggregate), report.aggregate.path);

    let mismatches = report.mismatches().count();
    let missing = report.missing_fields().count();
    if report.applied {
        println!(
            "applied: {} tags written ({} fields absent)",
            report.fields.len() - missing,
            missing
        );
    } else if report.all_match() {
        println!("verified: all tags match");
    } else {
        println!(
            "verified: {mismatches} field mismatches, aggregate {}",
            if report.aggregate.matches { "ok" } else { "MISMATCH" }
        );
    }
    Ok(())
}

fn status(field: &FieldReport) -> &'static str {
    match field.issue {
        Some(FieldIssue::FieldNotFound) => "ABSENT",
        Some(FieldIssue::TagMissing) => "NO TAG",
        None if field.matches => "OK",
        None if field.stored_tag.is_none() => "NEW",
        None => "MISMATCH",
    }
}
