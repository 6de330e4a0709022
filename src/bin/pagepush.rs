// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use pagepush::{
    config::{PublishDefinition, SourceDirectory, DEFINITION_FILE_NAME},
    path::locate_definition_file,
    publish::mirror::has_content,
    request::BuildId,
    DenyPullRequests, Git2Transport, Outcome, PublishGate, PublishRequest, PublishSettings,
    Publisher,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::ProgressBar;
use std::{fs, path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "pagepush [options] <pagepush-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to publish definition file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Publish(opts) => run_publish(self.config, opts),
            Command::Check(opts) => run_check(self.config, opts),
            Command::Init(opts) => run_init(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Publish built site to the target branch.
    #[command(override_usage = "pagepush publish [options]")]
    Publish(PublishOptions),

    /// Show what a publish would do without touching the network.
    #[command(override_usage = "pagepush check [options]")]
    Check(CheckOptions),

    /// Write default publish definition into current directory.
    #[command(override_usage = "pagepush init [options]")]
    Init(InitOptions),
}

#[derive(Args, Clone, Debug)]
struct OverrideOptions {
    /// Directory holding the built site.
    #[arg(short, long, value_name = "dir")]
    pub source: Option<PathBuf>,

    /// Target repository in owner/name form.
    #[arg(short, long, value_name = "owner/name")]
    pub repository: Option<String>,

    /// Branch to publish on.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,

    /// Build identifier to embed in the commit message.
    #[arg(long, value_name = "label")]
    pub build: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PublishOptions {
    #[command(flatten)]
    pub overrides: OverrideOptions,

    /// Keep working copy in this empty directory instead of a temporary one.
    #[arg(short, long, value_name = "dir")]
    pub workdir: Option<PathBuf>,

    /// Do not draw transfer progress.
    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckOptions {
    #[command(flatten)]
    pub overrides: OverrideOptions,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InitOptions {
    /// Target repository in owner/name form.
    #[arg(short, long, value_name = "owner/name")]
    pub repository: Option<String>,

    /// Branch to publish on.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_publish(config: Option<PathBuf>, opts: PublishOptions) -> Result<()> {
    let definition = load_definition(config, &opts.overrides)?;
    let request = resolve_request(&definition, &opts.overrides)?;

    let mut settings = PublishSettings::from_definition(&definition);
    settings.workdir = opts.workdir;
    let bar = if opts.no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    let publisher = Publisher::new(settings, Git2Transport::new(definition.target.depth, bar));

    match publisher.publish(&request)? {
        Outcome::Published {
            commit,
            branch,
            report,
        } => info!(
            "published commit {commit} to {} at {branch:?} ({} copied, {} unchanged, {} removed)",
            request.target_repository, report.copied, report.unchanged, report.removed
        ),
        Outcome::Skipped => info!("pull request build, nothing published"),
    }

    Ok(())
}

fn run_check(config: Option<PathBuf>, opts: CheckOptions) -> Result<()> {
    let definition = load_definition(config, &opts.overrides)?;
    let request = resolve_request(&definition, &opts.overrides)?;

    info!(
        "target: {} at {:?} ({})",
        request.target_repository,
        request.target_branch,
        request.target_repository.url()
    );
    info!("build: {}", request.build_identifier);
    if let Some(identity) = &request.identity {
        info!("committer: {} <{}>", identity.name, identity.email);
    }

    if !DenyPullRequests.is_publish_allowed(&request) {
        info!("pull request build, publish would be skipped");
        return Ok(());
    }

    let is_populated = has_content(request.source_directory.as_path());
    if is_populated {
        info!("source: {}", request.source_directory);
    } else {
        warn!("source: {} holds no built output", request.source_directory);
    }

    if request.credential.is_some() {
        info!("credential: found in {}", request.credential_source);
    } else {
        warn!("credential: none in {}", request.credential_source);
    }

    if !is_populated || request.credential.is_none() {
        bail!("publish would fail");
    }

    Ok(())
}

fn run_init(opts: InitOptions) -> Result<()> {
    let path = std::env::current_dir()?.join(DEFINITION_FILE_NAME);
    if path.exists() {
        bail!("{:?} already exists", path.display());
    }

    let mut definition = PublishDefinition::default();
    definition.target.repository = match opts.repository {
        Some(repository) => repository,
        None => "<put owner/name of hosting repository here>".into(),
    };
    if let Some(branch) = opts.branch {
        definition.target.branch = branch;
    }

    fs::write(&path, definition.to_string())
        .with_context(|| format!("failed to write {:?}", path.display()))?;
    info!("wrote {:?}", path.display());

    Ok(())
}

fn load_definition(
    config: Option<PathBuf>,
    overrides: &OverrideOptions,
) -> Result<PublishDefinition> {
    let path = match config {
        Some(path) => path,
        None => locate_definition_file(std::env::current_dir()?)?,
    };

    let mut definition: PublishDefinition = fs::read_to_string(&path)
        .with_context(|| format!("failed to read publish definition at {:?}", path.display()))?
        .parse()?;

    if let Some(source) = &overrides.source {
        definition.source.directory = SourceDirectory::new(source);
    }
    if let Some(repository) = &overrides.repository {
        definition.target.repository = repository.clone();
    }
    if let Some(branch) = &overrides.branch {
        definition.target.branch = branch.clone();
    }

    Ok(definition)
}

fn resolve_request(
    definition: &PublishDefinition,
    overrides: &OverrideOptions,
) -> Result<PublishRequest> {
    let mut request = PublishRequest::from_env(definition)?;
    if let Some(build) = &overrides.build {
        request.build_identifier = BuildId::new(build);
    }

    Ok(request)
}
