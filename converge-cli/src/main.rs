mod command_probe;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use converge_core::poll::{Attempt, Classification, PollSpec, Poller, UnclassifiedPolicy};
use converge_provider_ibm::resources::{self, Phase, PhaseProfile, WaitProfile};
use converge_provider_ibm::WaitSettings;

use command_probe::CommandProbe;

/// Timeout of an ad-hoc wait when neither a profile nor a flag sets one
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Parser, Debug)]
#[command(name = "converge")]
#[command(about = "Wait for remote resources to converge", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the wait profiles of the IBM Cloud resource types
    Profiles {
        /// Only show this resource type
        resource_type: Option<String>,
    },
    /// Run a command until its output reaches a target status
    Wait(WaitArgs),
}

#[derive(Args, Debug)]
struct WaitArgs {
    /// Statuses meaning "still in progress" (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "profile")]
    pending: Vec<String>,

    /// Statuses meaning "done" (comma separated)
    #[arg(long, value_delimiter = ',', conflicts_with = "profile")]
    target: Vec<String>,

    /// Use the labels and timings of a wait profile, as <resource_type>:<phase>
    #[arg(long, value_parser = parse_profile)]
    profile: Option<ProfileRef>,

    /// Give up after this long (e.g. "90m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Wait before the first probe
    #[arg(long, value_parser = humantime::parse_duration)]
    delay: Option<Duration>,

    /// Fixed time between probes
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// Lower bound on the time between probes
    #[arg(long, value_parser = humantime::parse_duration)]
    min_interval: Option<Duration>,

    /// JSON pointer to the status in the command's output
    #[arg(long)]
    field: Option<String>,

    /// Exit code of the command meaning "not found"
    #[arg(long)]
    absent_exit_code: Option<i32>,

    /// Fail on statuses that are neither pending nor target
    #[arg(long)]
    strict: bool,

    /// Consecutive target observations required
    #[arg(long)]
    occurrences: Option<u32>,

    /// JSON file with wait settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Probe command, run once per attempt
    #[arg(last = true, required = true)]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct ProfileRef {
    profile: &'static WaitProfile,
    phase: Phase,
}

impl ProfileRef {
    fn phase_profile(&self) -> Result<&'static PhaseProfile, String> {
        self.profile.phase(self.phase).ok_or_else(|| {
            format!(
                "{} has no {} wait",
                self.profile.resource_type, self.phase
            )
        })
    }
}

fn parse_profile(s: &str) -> Result<ProfileRef, String> {
    let (resource_type, phase) = s
        .split_once(':')
        .ok_or_else(|| format!("Expected <resource_type>:<phase>, got '{}'", s))?;
    let profile = resources::profile(resource_type)
        .ok_or_else(|| format!("Unknown resource type: {}", resource_type))?;
    Ok(ProfileRef {
        profile,
        phase: phase.parse()?,
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = match cli.command {
        Commands::Profiles { resource_type } => run_profiles(resource_type.as_deref()),
        Commands::Wait(args) => run_wait(args).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_profiles(resource_type: Option<&str>) -> Result<(), String> {
    let profiles: Vec<&WaitProfile> = match resource_type {
        Some(name) => vec![
            resources::profile(name).ok_or_else(|| format!("Unknown resource type: {}", name))?,
        ],
        None => resources::profiles().iter().collect(),
    };

    for profile in profiles {
        println!("{}", profile.resource_type.bold());
        for phase in Phase::ALL {
            if let Some(p) = profile.phase(phase) {
                print_phase(phase, p);
            }
        }
        println!();
    }
    Ok(())
}

fn print_phase(phase: Phase, p: &PhaseProfile) {
    println!(
        "  {:<7} {} {}",
        phase.to_string().cyan(),
        "timeout".dimmed(),
        humantime::format_duration(p.timeout)
    );
    println!("          pending: {}", p.pending.join(", ").yellow());
    let target = if p.target.is_empty() {
        "(gone)".to_string()
    } else {
        p.target
            .iter()
            .map(|t| {
                if p.failed.contains(t) {
                    t.red().to_string()
                } else {
                    t.green().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("          target:  {}", target);
    let interval = match p.poll_interval {
        Some(interval) => humantime::format_duration(interval).to_string(),
        None => "backoff".to_string(),
    };
    println!(
        "          {} delay {}, interval {}, min {}{}",
        p.status_field.dimmed(),
        humantime::format_duration(p.delay),
        interval,
        humantime::format_duration(p.min_interval),
        if p.continuous_target_occurrence > 1 {
            format!(", {} consecutive", p.continuous_target_occurrence)
        } else {
            String::new()
        }
    );
}

/// Build the poll configuration of a wait from its flags
///
/// Precedence, lowest first: profile (or ad-hoc defaults), config file, flags.
fn build_spec(args: &WaitArgs) -> Result<PollSpec, String> {
    let mut spec = match &args.profile {
        Some(profile) => profile.phase_profile()?.poll_spec(),
        None => {
            if args.target.is_empty() && args.absent_exit_code.is_none() {
                return Err("--target (or --profile) is required".to_string());
            }
            PollSpec::new(
                args.pending.iter().cloned(),
                args.target.iter().cloned(),
                DEFAULT_TIMEOUT,
            )
            .with_delay(Duration::ZERO)
        }
    };

    if let Some(path) = &args.config {
        let settings = WaitSettings::from_file(path).map_err(|e| e.to_string())?;
        spec = settings.apply(spec);
    }

    if let Some(timeout) = args.timeout {
        spec = spec.with_timeout(timeout);
    }
    if let Some(delay) = args.delay {
        spec = spec.with_delay(delay);
    }
    if let Some(interval) = args.interval {
        spec = spec.with_poll_interval(interval);
    }
    if let Some(min) = args.min_interval {
        spec = spec.with_min_poll_interval(min);
    }
    if let Some(occurrences) = args.occurrences {
        spec = spec.with_continuous_target_occurrence(occurrences);
    }
    if args.strict {
        spec = spec.with_unclassified(UnclassifiedPolicy::Fail);
    }

    spec.validate().map_err(|e| e.to_string())?;
    Ok(spec)
}

fn build_probe(args: &WaitArgs) -> Result<CommandProbe, String> {
    let mut probe = CommandProbe::new(&args.command)?;

    let phase = match &args.profile {
        Some(profile) => Some(profile.phase_profile()?),
        None => None,
    };
    // A profile reads its own status field unless told otherwise
    let field = args
        .field
        .clone()
        .or_else(|| phase.map(|p| p.status_field.to_string()));

    if let Some(field) = field {
        probe = probe.with_field(field);
    }
    if let Some(code) = args.absent_exit_code {
        probe = probe.with_absent_exit_code(code);
    }
    if let Some(phase) = phase {
        probe = probe.with_phase(phase.clone());
    }
    Ok(probe)
}

fn print_attempt(attempt: &Attempt<'_>) {
    let label = match attempt.classification {
        Classification::Target => attempt.label.green(),
        Classification::Pending => attempt.label.yellow(),
        Classification::NotFound => attempt.label.dimmed(),
        Classification::Unclassified => attempt.label.magenta(),
    };
    println!(
        "  {} {} {}",
        format!("#{}", attempt.number).dimmed(),
        label,
        format!("({}s)", attempt.elapsed.as_secs()).dimmed()
    );
}

async fn run_wait(args: WaitArgs) -> Result<(), String> {
    let spec = build_spec(&args)?;
    let probe = build_probe(&args)?;
    let phase = match &args.profile {
        Some(profile) => Some(profile.phase_profile()?),
        None => None,
    };

    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let target = if spec.target.is_empty() {
        "(gone)".to_string()
    } else {
        spec.target.join(", ")
    };
    println!(
        "{}",
        format!(
            "Waiting for {} (timeout {})",
            target,
            humantime::format_duration(spec.timeout)
        )
        .cyan()
        .bold()
    );

    let converged = Poller::new(spec)
        .with_cancellation(token)
        .with_observer(print_attempt)
        .poll(probe)
        .await
        .map_err(|e| e.to_string())?;

    if let Some(phase) = phase
        && phase.is_failed(&converged.label)
    {
        return Err(format!(
            "Resource reached failed status '{}' after {} attempts",
            converged.label, converged.attempts
        ));
    }

    println!(
        "{} Reached '{}' after {} attempts ({})",
        "✓".green(),
        converged.label.green().bold(),
        converged.attempts,
        humantime::format_duration(Duration::from_secs(converged.elapsed.as_secs()))
    );
    Ok(())
}
