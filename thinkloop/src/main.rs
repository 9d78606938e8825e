//! Scheduled thinking loop.
//!
//! Each `thinkloop run` performs one cycle against the memory document stored
//! in a GitHub repository. Scheduling is external (cron, CI schedule).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

use thinkloop::cycle::{CycleDeps, run_cycle};
use thinkloop::exit_codes;
use thinkloop::io::channels::{CommandChannel, GitHubIssues, NtfyTopic};
use thinkloop::io::config::{DEFAULT_CONFIG_PATH, Secrets, ThinkConfig, load_config};
use thinkloop::io::github::GitHubClient;
use thinkloop::io::notifier::{NoopNotifier, Notifier, NtfyNotifier};
use thinkloop::io::oracle::ChatCompletionsOracle;
use thinkloop::io::store::GitHubContentsStore;
use thinkloop::io::wake::{HttpWake, Wake};
use thinkloop::logging;
use thinkloop::status;

#[derive(Parser)]
#[command(
    name = "thinkloop",
    version,
    about = "Scheduled thinking loop over a shared memory document"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one cycle: ingest, think, act, persist, notify.
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Summarize the stored memory document without modifying it.
    Status {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Validate the configuration and print the effective values.
    CheckConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { config } => with_config(&config, cmd_run),
        Command::Status { config } => with_config(&config, cmd_status),
        Command::CheckConfig { config } => with_config(&config, cmd_check_config),
    };
    std::process::exit(code);
}

/// Load config and secrets, then run `command`. Setup errors exit with `INVALID`.
fn with_config(path: &Path, command: fn(&ThinkConfig, &Secrets) -> i32) -> i32 {
    let setup = load_config(path).and_then(|config| {
        let secrets = Secrets::from_env(&config)?;
        Ok((config, secrets))
    });
    match setup {
        Ok((config, secrets)) => command(&config, &secrets),
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

fn github_client(config: &ThinkConfig, secrets: &Secrets) -> Result<GitHubClient> {
    GitHubClient::new(
        &config.store.api_base,
        &secrets.store_token,
        Duration::from_secs(config.store.timeout_secs),
    )
}

fn cmd_run(config: &ThinkConfig, secrets: &Secrets) -> i32 {
    match run_once(config, secrets) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}

fn run_once(config: &ThinkConfig, secrets: &Secrets) -> Result<i32> {
    let github = github_client(config, secrets)?;
    let memory_store = GitHubContentsStore::new(
        github.clone(),
        &config.store.owner,
        &config.store.repo,
        config.store.branch.as_deref(),
    );
    let target_store = GitHubContentsStore::new(
        github.clone(),
        config.actions_owner(),
        config.actions_repo(),
        config.actions_branch(),
    );
    let issues = GitHubIssues::new(
        github,
        &config.store.owner,
        &config.store.repo,
        &config.channels.issues.label,
    );
    let oracle = ChatCompletionsOracle::new(
        &config.oracle.base_url,
        &config.oracle.model,
        &secrets.oracle_key,
        Duration::from_secs(config.oracle.timeout_secs),
    )?;

    let ntfy = &config.channels.ntfy;
    let ntfy_channel = if ntfy.enabled {
        Some(NtfyTopic::new(
            &ntfy.server,
            &ntfy.topic,
            &ntfy.since,
            Duration::from_secs(ntfy.timeout_secs),
        )?)
    } else {
        None
    };
    let notifier: Box<dyn Notifier> = if config.notifier.enabled {
        Box::new(NtfyNotifier::new(
            &config.notifier.server,
            &config.notifier.topic,
            Duration::from_secs(config.notifier.timeout_secs),
        )?)
    } else {
        Box::new(NoopNotifier)
    };
    let wake = config
        .wake
        .url
        .as_deref()
        .map(|url| HttpWake::new(url, Duration::from_secs(config.wake.timeout_secs)))
        .transpose()?;

    let mut channels: Vec<&dyn CommandChannel> = Vec::new();
    if config.channels.issues.enabled {
        channels.push(&issues);
    }
    if let Some(channel) = &ntfy_channel {
        channels.push(channel);
    }

    let deps = CycleDeps {
        memory_store: &memory_store,
        target_store: &target_store,
        oracle: &oracle,
        channels,
        issues: Some(&issues),
        notifier: notifier.as_ref(),
        wake: wake.as_ref().map(|w| w as &dyn Wake),
    };
    let report = run_cycle(&deps, config, Utc::now())?;
    println!("{}", report.summary_line());
    Ok(report.exit_code())
}

fn cmd_status(config: &ThinkConfig, secrets: &Secrets) -> i32 {
    let summary = github_client(config, secrets).and_then(|github| {
        let store = GitHubContentsStore::new(
            github,
            &config.store.owner,
            &config.store.repo,
            config.store.branch.as_deref(),
        );
        status::status_from_store(&store, config, Utc::now().date_naive())
    });
    match summary {
        Ok(summary) => {
            println!("{}", status::render(&summary));
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::DEPENDENCY_FAILURE
        }
    }
}

fn cmd_check_config(config: &ThinkConfig, _secrets: &Secrets) -> i32 {
    match config.to_toml() {
        Ok(rendered) => {
            print!("{rendered}");
            exit_codes::OK
        }
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    }
}
