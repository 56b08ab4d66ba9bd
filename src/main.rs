use clap::Parser;
use hostprep::config::{ensure_user_config_exists, load_config, Config, Group};
use hostprep::data::{CommandSpec, Policy};
use hostprep::display;
use hostprep::environment::{require_root, Environment};
use hostprep::session::{read_snapshot, save_snapshot, set_aside, SessionState};
use hostprep::utils::command::INTERRUPTED_EXIT;
use hostprep::{
    CommandExecutor, InterruptFlag, PromptConfirm, Provisioner, Result, RunReport, SystemRunner,
};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hostprep", version, about = "Prepare a Debian-family host for gaming")]
struct Cli {
    /// Answer yes to every question
    #[arg(short = 'y', long = "yes")]
    yes: bool,

    /// Show what would be done without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Skip the preflight update steps
    #[arg(long)]
    skip_update: bool,

    /// Config file to use instead of the user/system one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Install a component without asking (repeatable)
    #[arg(long = "select", value_name = "NAME")]
    select: Vec<String>,

    /// Install every gaming platform without asking
    #[arg(long)]
    all_platforms: bool,

    /// Report the rollback manifest and exit
    #[arg(long)]
    rollback: bool,

    /// Print hardware detection and exit
    #[arg(long)]
    detect_only: bool,
}

fn env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into())
}

/// Stderr only, for the messages emitted before the log file is known
fn startup_subscriber(verbose: bool) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
}

fn init_logging(verbose: bool, log_file: Option<File>) {
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn open_log(env: &Environment, stamp: &str) -> Option<(PathBuf, File)> {
    if let Err(err) = env.prepare_dirs() {
        eprintln!("Warning: could not create {}: {}", env.log_dir.display(), err);
        return None;
    }
    let path = env.log_file(stamp);
    match OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            env.hand_over(&path);
            Some((path, file))
        }
        Err(err) => {
            eprintln!("Warning: could not open log file {}: {}", path.display(), err);
            None
        }
    }
}

fn selected_names(cli: &Cli, config: &Config) -> Vec<String> {
    let mut names = cli.select.clone();
    if cli.all_platforms {
        names.extend(
            config
                .components
                .iter()
                .filter(|c| c.group == Group::Platforms)
                .map(|c| c.name.clone()),
        );
    }
    names
}

fn print_summary(report: &RunReport, session: &SessionState) {
    display::print_report(&report.detection, session.decisions(), &report.installed);
    let failures = session.failures();
    if failures.is_empty() {
        info!("All commands completed successfully");
    } else {
        print!("{}", display::render_failures(failures));
        warn!("{} command(s) failed; see the log for details", failures.len());
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let startup = startup_subscriber(cli.verbose);
    let config = tracing::subscriber::with_default(startup, || -> Result<Config> {
        if cli.config.is_none() {
            ensure_user_config_exists()?;
        }
        load_config(cli.config.as_deref())
    })?;
    let policy: Policy = config.policy(cli.yes, cli.dry_run);

    if !policy.dry_run && !cli.detect_only {
        require_root()?;
    }

    let env = Environment::detect(config.behavior.state_dir().as_deref());
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let (log_path, log_file) = open_log(&env, &stamp).unzip();
    init_logging(cli.verbose, log_file);
    let interrupt = InterruptFlag::install()?;

    info!("Running for user {} (home {})", env.real_user, env.home.display());
    if let Some(path) = &log_path {
        info!("Logging to {}", path.display());
    }
    if policy.dry_run {
        info!("[DRY RUN] no changes will be made");
    }

    let runner = SystemRunner::default().with_interrupt(interrupt.clone());
    let prompt = PromptConfirm::stdio(interrupt.clone());
    let mut provisioner = Provisioner::new(&config, policy, &runner, prompt)
        .with_interrupt(interrupt)
        .backup_dir(&env.backup_dir)
        .select(selected_names(&cli, &config))
        .skip_preflight(cli.skip_update);

    if cli.rollback {
        if env.rollback_file.exists() {
            info!("Rollback manifest found at {}", env.rollback_file.display());
            warn!("Automatic rollback is not supported; review the manifest and revert manually");
        } else {
            warn!("No rollback manifest at {}", env.rollback_file.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if cli.detect_only {
        print!("{}", display::render_detection(&provisioner.detect()));
        return Ok(ExitCode::SUCCESS);
    }

    if policy.interactive && !provisioner.confirm("Continue with installation?") {
        info!("Cancelled by operator");
        return Ok(ExitCode::SUCCESS);
    }

    let mut persist = true;
    let previous = match read_snapshot(&env.state_file) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!("Installation state {} is unreadable: {}", env.state_file.display(), err);
            if !policy.dry_run {
                if let Err(err) = set_aside(&env.state_file, &stamp) {
                    error!(
                        "Could not move the unreadable state aside, it will not be overwritten: {}",
                        err
                    );
                    persist = false;
                }
            }
            None
        }
    };
    let mut session = SessionState::load(previous);

    let report = provisioner.run(&mut session);
    if report.interrupted || provisioner.interrupted() {
        print_summary(&report, &session);
        warn!("Interrupted; installation state left unchanged");
        return Ok(ExitCode::from(INTERRUPTED_EXIT as u8));
    }
    if report.cancelled {
        info!("Cancelled by operator");
        return Ok(ExitCode::SUCCESS);
    }

    if persist {
        if save_snapshot(&env.state_file, &session.snapshot(), policy.dry_run) {
            env.hand_over(&env.state_file);
        }
    }

    print_summary(&report, &session);

    let reboot = if policy.interactive {
        provisioner.confirm("Reboot now to finish the setup?")
    } else {
        policy.auto_yes && config.behavior.reboot_when_done
    };
    if reboot {
        let executor = CommandExecutor::new(&runner, policy.dry_run);
        executor.execute(&CommandSpec::new("Rebooting", "systemctl", &["reboot"]), &mut session);
    } else {
        info!("A reboot is recommended before playing");
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}
