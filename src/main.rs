use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use phalanx::{
    compliance::{BaselineTable, ComplianceEvaluator},
    config::DiscoveryConfig,
    credentials::{CredentialCandidate, CredentialResolver, ProfileSet, Scheme},
    discovery::{DiscoveryCoordinator, RunState},
    inventory::InventoryMerger,
    output::{OutputFormat, OutputManager},
    protocols::ManagementProtocol,
    utils::AddressSpaceSpec,
};

fn print_banner() {
    println!("{}", "phalanx".truecolor(231, 76, 60).bold());
    println!("{}", "out-of-band fleet discovery".bright_blue());
    println!();
}

fn build_cli() -> Command {
    Command::new("phalanx")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Out-of-band discovery and protocol-capability resolution for Dell server fleets")
        .arg(
            Arg::new("target")
                .help("Address range (10.0.0.1-254) or comma-separated CIDR scopes (10.0.0.0/24)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("profiles")
                .long("profiles")
                .value_name("FILE")
                .help("TOML file with credential profiles and scope assignments"),
        )
        .arg(
            Arg::new("baselines")
                .long("baselines")
                .value_name("FILE")
                .help("TOML firmware baseline table (built-in PowerEdge table if omitted)"),
        )
        .arg(
            Arg::new("username")
                .short('u')
                .long("username")
                .value_name("USER")
                .help("Manual fallback credential username"),
        )
        .arg(
            Arg::new("password")
                .short('p')
                .long("password")
                .value_name("SECRET")
                .help("Manual fallback credential secret"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("Management endpoint port for the fallback credential [default: 443]"),
        )
        .arg(
            Arg::new("http")
                .long("http")
                .action(ArgAction::SetTrue)
                .help("Use plain HTTP for the fallback credential"),
        )
        .arg(
            Arg::new("protocols")
                .long("protocols")
                .value_name("LIST")
                .help("Comma-separated protocol subset: redfish,wsman,racadm,ipmi,ssh"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Per-protocol probe timeout in milliseconds [default: 10000]"),
        )
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .value_name("N")
                .help("Worker pool size [default: 16-32, scaled to CPU count]"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("Output format: text, json, csv [default: text]"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write results to a file instead of stdout"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress the banner and progress bar"),
        )
}

fn parse_spec(target: &str) -> anyhow::Result<AddressSpaceSpec> {
    if target.contains('/') {
        let mut scopes = Vec::new();
        for part in target.split(',') {
            let subnet = part
                .trim()
                .parse()
                .with_context(|| format!("invalid CIDR scope: {}", part))?;
            scopes.push(phalanx::credentials::IpScope::new(subnet));
        }
        Ok(AddressSpaceSpec::Scopes(scopes))
    } else {
        AddressSpaceSpec::parse_range(target).map_err(Into::into)
    }
}

async fn drive_progress(
    mut rx: tokio::sync::watch::Receiver<phalanx::discovery::DiscoveryProgress>,
) {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} hosts {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    while rx.changed().await.is_ok() {
        let progress = rx.borrow().clone();
        if progress.total as u64 != bar.length().unwrap_or(0) {
            bar.set_length(progress.total as u64);
        }
        bar.set_position(progress.completed as u64);
        bar.set_message(format!("{:.0}%", progress.percentage()));
        if progress.state == RunState::Done {
            break;
        }
    }
    bar.finish_and_clear();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let matches = build_cli().get_matches();

    let quiet = matches.get_flag("quiet");
    if !quiet {
        print_banner();
    }

    let target = matches.get_one::<String>("target").expect("required arg");
    let spec = parse_spec(target)?;

    // Configuration: file defaults, then CLI overrides
    let mut config = DiscoveryConfig::load_default_config();
    if let Some(timeout) = matches.get_one::<String>("timeout") {
        config.probe_timeout = timeout.parse().context("invalid --timeout")?;
    }
    if let Some(concurrency) = matches.get_one::<String>("concurrency") {
        config.concurrency = concurrency.parse().context("invalid --concurrency")?;
    }
    if let Some(list) = matches.get_one::<String>("protocols") {
        let mut protocols = Vec::new();
        for name in list.split(',') {
            let protocol = ManagementProtocol::parse(name)
                .with_context(|| format!("unknown protocol: {}", name))?;
            protocols.push(protocol);
        }
        config.protocols = protocols;
    }

    // Credential sources
    let profile_set = match matches.get_one::<String>("profiles") {
        Some(path) => ProfileSet::from_toml_file(path)
            .with_context(|| format!("failed to load profiles from {}", path))?,
        None => ProfileSet::default(),
    };
    let mut resolver = CredentialResolver::from_profile_set(profile_set);
    if let (Some(username), Some(password)) = (
        matches.get_one::<String>("username"),
        matches.get_one::<String>("password"),
    ) {
        let port = match matches.get_one::<String>("port") {
            Some(p) => p.parse().context("invalid --port")?,
            None => 443,
        };
        let scheme = if matches.get_flag("http") { Scheme::Http } else { Scheme::Https };
        resolver = resolver.with_fallback(
            CredentialCandidate::new(username.clone(), password.clone())
                .with_port(port)
                .with_scheme(scheme),
        );
    }

    // Baseline table
    let evaluator = match matches.get_one::<String>("baselines") {
        Some(path) => {
            let table = BaselineTable::from_toml_file(path)
                .with_context(|| format!("failed to load baselines from {}", path))?;
            ComplianceEvaluator::new(table)
        }
        None => ComplianceEvaluator::builtin(),
    };

    let coordinator =
        match DiscoveryCoordinator::new(config, Arc::new(resolver), Arc::new(evaluator)) {
            Ok(coordinator) => coordinator,
            Err(e) => {
                eprintln!("{} {}", "[!]".bright_red(), e);
                process::exit(1);
            }
        };

    // Ctrl-C cancels the run; partial results are still reported
    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "[~] cancelling, collecting partial results...".yellow());
            cancel.cancel();
        }
    });

    let progress_task = if quiet {
        None
    } else {
        Some(tokio::spawn(drive_progress(coordinator.progress())))
    };

    let run = match coordinator.run(&spec).await {
        Ok(run) => run,
        Err(e) => {
            eprintln!("{} {}", "[!]".bright_red(), e);
            process::exit(1);
        }
    };

    if let Some(task) = progress_task {
        task.abort();
        let _ = task.await;
    }

    let merger = InventoryMerger::new();
    let merge = merger.merge(&run.results);

    let format = match matches.get_one::<String>("format") {
        Some(f) => OutputFormat::parse(f).with_context(|| format!("unknown format: {}", f))?,
        None => OutputFormat::Text,
    };
    let mut output = OutputManager::new(format);
    if let Some(path) = matches.get_one::<String>("output") {
        output = output.with_file(PathBuf::from(path));
    }
    output.write_run(&run, &merge)?;

    Ok(())
}
