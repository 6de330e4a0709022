// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publishing pipeline.
//!
//! Turn a directory of built site output into exactly one new commit on the
//! publish branch of a remote repository, and push it.
//!
//! # Pipeline
//!
//! Publishing is a strictly linear sequence of steps, each of which depends
//! on the state the previous one left behind:
//!
//! 1. __Gate__: ask the [`PublishGate`] whether the request may publish at
//!    all. Requests from untrusted pull requests are skipped, which counts as
//!    success.
//! 2. __Preconditions__: the source directory must hold output, and a
//!    credential must be present.
//! 3. __Acquisition__: fetch a shallow working copy of the publish branch,
//!    or start an orphan branch if the remote lacks it.
//! 4. __Sync__: mirror the source directory into the working copy.
//! 5. __Commit__: stage everything and commit, even if nothing changed, so
//!    every build leaves a commit behind.
//! 6. __Push__: force-push the branch. A shallow working copy cannot prove
//!    its history descends from the remote's, so a normal push would always
//!    be refused.
//!
//! The first failing step aborts the rest. Nothing on the remote changes
//! before the push, so a failure anywhere earlier leaves the remote as it
//! was.
//!
//! # Concurrency
//!
//! Publishers racing on the same branch are not coordinated. With a plain
//! force-push the last writer wins. Enable the lease to have the publisher
//! re-read the remote tip right before pushing and refuse to push if it
//! moved since acquisition.

pub mod gate;
pub mod mirror;
pub mod transport;
pub mod working_copy;

use crate::{
    config::PublishDefinition,
    publish::{
        gate::{DenyPullRequests, PublishGate},
        mirror::{has_content, Mirror, MirrorReport},
        transport::{Acquisition, Git2Transport, Transport, TransportError},
        working_copy::WorkingCopy,
    },
    request::{BuildId, CommitIdentity, Credential, PublishRequest},
};

use git2::Oid;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::{debug, info, instrument};

/// Placeholder replaced by the build identifier in commit message templates.
pub const BUILD_PLACEHOLDER: &str = "{build}";

/// What a publish attempt ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Commit was created and pushed.
    Published {
        commit: Oid,
        branch: String,
        report: MirrorReport,
    },

    /// Gate denied publishing.
    Skipped,
}

/// Publisher behavior not tied to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// Commit message template.
    pub message: String,

    /// Gitignore-style patterns never deleted from the working copy.
    pub preserve: Vec<String>,

    /// Refuse to push when the remote tip moved since acquisition.
    pub lease: bool,

    /// Start an orphan branch when the remote lacks the publish branch.
    pub create_missing: bool,

    /// Identity used when neither the request nor git configuration has one.
    pub fallback_identity: CommitIdentity,

    /// Directory to keep the working copy in. A temporary directory is used
    /// and removed afterwards when unset.
    pub workdir: Option<PathBuf>,
}

impl PublishSettings {
    /// Extract publisher settings from publish definition.
    pub fn from_definition(definition: &PublishDefinition) -> Self {
        Self {
            message: definition.commit.message.clone(),
            preserve: definition.source.preserve.clone(),
            lease: definition.target.lease,
            create_missing: definition.target.create_missing,
            fallback_identity: CommitIdentity::new(
                definition.commit.name.clone(),
                definition.commit.email.clone(),
            ),
            workdir: None,
        }
    }

    /// Render commit message for a build.
    ///
    /// Templates without a placeholder get the build identifier appended.
    pub fn render_message(&self, build: &BuildId) -> String {
        if self.message.contains(BUILD_PLACEHOLDER) {
            self.message.replace(BUILD_PLACEHOLDER, build.as_str())
        } else {
            format!("{} {build}", self.message.trim_end())
        }
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self::from_definition(&PublishDefinition::default())
    }
}

/// Publisher of built sites.
#[derive(Debug)]
pub struct Publisher<T = Git2Transport, G = DenyPullRequests>
where
    T: Transport,
    G: PublishGate,
{
    settings: PublishSettings,
    transport: T,
    gate: G,
}

impl<T> Publisher<T>
where
    T: Transport,
{
    /// Construct new publisher that skips pull request builds.
    pub fn new(settings: PublishSettings, transport: T) -> Self {
        Self {
            settings,
            transport,
            gate: DenyPullRequests,
        }
    }
}

impl<T, G> Publisher<T, G>
where
    T: Transport,
    G: PublishGate,
{
    /// Replace the gate deciding which requests may publish.
    ///
    /// Custom gates can only narrow publishing. Pull request builds are
    /// skipped no matter what the gate says.
    pub fn with_gate<H>(self, gate: H) -> Publisher<T, H>
    where
        H: PublishGate,
    {
        Publisher {
            settings: self.settings,
            transport: self.transport,
            gate,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Publish built site to the target branch.
    ///
    /// # Errors
    ///
    /// - Return [`PublishError::MissingOutput`] if the source directory is
    ///   absent, not a directory, or holds no files besides git metadata.
    /// - Return [`PublishError::MissingCredential`] if no credential is
    ///   available.
    /// - Return [`PublishError::AcquisitionFailure`] if the branch cannot be
    ///   acquired.
    /// - Return [`PublishError::Sync`] if mirroring fails.
    /// - Return [`PublishError::Commit`] if the publish commit cannot be made.
    /// - Return [`PublishError::LeaseProbe`] if the remote tip cannot be
    ///   read for the lease check.
    /// - Return [`PublishError::RemoteMoved`] if the lease check fails.
    /// - Return [`PublishError::PushRejected`] if the push fails.
    #[instrument(
        skip(self, request),
        fields(target = %request.target_repository),
        level = "debug"
    )]
    pub fn publish(&self, request: &PublishRequest) -> Result<Outcome> {
        // INVARIANT: Pull request builds never publish, whatever the gate.
        let is_allowed =
            DenyPullRequests.is_publish_allowed(request) && self.gate.is_publish_allowed(request);
        if !is_allowed {
            info!("publishing not allowed for this build, skipping");
            return Ok(Outcome::Skipped);
        }

        let source = request.source_directory.as_path();
        check_output(source)?;
        let credential = request.credential.as_ref().ok_or_else(|| {
            PublishError::MissingCredential {
                lookup: request.credential_source.clone(),
            }
        })?;

        let target = &request.target_repository;
        let branch = request.target_branch.as_str();
        let acquisition_failure = |source: TransportError| PublishError::AcquisitionFailure {
            url: target.url().to_owned(),
            branch: branch.to_owned(),
            source,
        };

        // INVARIANT: Scratch space outlives working copy.
        let scratch = Scratch::new(self.settings.workdir.as_deref())?;
        let copy = match self
            .transport
            .acquire(target, branch, scratch.path(), credential)
            .map_err(acquisition_failure)?
        {
            Acquisition::Existing(copy) => copy,
            Acquisition::Missing if self.settings.create_missing => {
                WorkingCopy::init_orphan(scratch.path(), branch, target.url())
                    .map_err(|err| acquisition_failure(err.into()))?
            }
            Acquisition::Missing => {
                return Err(acquisition_failure(TransportError::MissingBranch {
                    branch: branch.to_owned(),
                }));
            }
        };

        let report = Mirror::new(copy.root(), &self.settings.preserve)?.sync(source)?;

        let signature = copy
            .signature(request.identity.as_ref(), &self.settings.fallback_identity)
            .map_err(PublishError::Commit)?;
        let message = self.settings.render_message(&request.build_identifier);
        let commit = copy
            .commit_all(&signature, &message)
            .map_err(PublishError::Commit)?;
        info!("commit {commit} on {branch:?}: {message}");

        if self.settings.lease {
            self.check_lease(&copy, request, credential)?;
        }

        self.transport
            .push(&copy, target, credential)
            .map_err(|err| PublishError::PushRejected {
                branch: branch.to_owned(),
                source: err,
            })?;
        info!("published {target} at {branch:?}");

        Ok(Outcome::Published {
            commit,
            branch: branch.to_owned(),
            report,
        })
    }

    fn check_lease(
        &self,
        copy: &WorkingCopy,
        request: &PublishRequest,
        credential: &Credential,
    ) -> Result<()> {
        let branch = request.target_branch.as_str();
        let found = self
            .transport
            .remote_tip(&request.target_repository, branch, credential)
            .map_err(|err| PublishError::LeaseProbe {
                branch: branch.to_owned(),
                source: err,
            })?;
        debug!("lease on {branch:?}: expect {:?}, found {found:?}", copy.base());

        if found != copy.base() {
            return Err(PublishError::RemoteMoved {
                branch: branch.to_owned(),
                expected: copy.base(),
                found,
            });
        }

        Ok(())
    }
}

fn check_output(source: &Path) -> Result<()> {
    if !has_content(source) {
        return Err(PublishError::MissingOutput {
            path: source.to_path_buf(),
        });
    }

    Ok(())
}

/// Where the working copy lives for the duration of a publish.
enum Scratch {
    Temporary(TempDir),
    Kept(PathBuf),
}

impl Scratch {
    fn new(workdir: Option<&Path>) -> Result<Self> {
        let Some(path) = workdir else {
            let dir = TempDir::with_prefix("pagepush-").map_err(|err| PublishError::Workdir {
                source: err,
                path: std::env::temp_dir(),
            })?;
            debug!("working copy at {:?}", dir.path().display());
            return Ok(Self::Temporary(dir));
        };

        let workdir_err = |err| PublishError::Workdir {
            source: err,
            path: path.to_path_buf(),
        };
        if path.exists() {
            let is_empty = fs::read_dir(path)
                .map_err(workdir_err)?
                .next()
                .is_none();
            if !is_empty {
                return Err(PublishError::WorkdirNotEmpty {
                    path: path.to_path_buf(),
                });
            }
        } else {
            fs::create_dir_all(path).map_err(workdir_err)?;
        }

        Ok(Self::Kept(path.to_path_buf()))
    }

    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Kept(path) => path.as_path(),
        }
    }
}

/// All possible error types for publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Source directory holds no built output.
    #[error("no built output at {:?}", path.display())]
    MissingOutput { path: PathBuf },

    /// Credential required but absent.
    #[error("no push credential found in {lookup}")]
    MissingCredential { lookup: String },

    /// Working copy of target branch cannot be obtained.
    #[error("failed to acquire branch {branch:?} of {url}")]
    AcquisitionFailure {
        url: String,
        branch: String,
        #[source]
        source: TransportError,
    },

    /// Working copy cannot be synced with source directory.
    #[error(transparent)]
    Sync(#[from] crate::publish::mirror::MirrorError),

    /// Publish commit cannot be created.
    #[error("failed to create publish commit")]
    Commit(#[source] git2::Error),

    /// Remote tip cannot be read for the lease check.
    #[error("failed to read remote tip of branch {branch:?}")]
    LeaseProbe {
        branch: String,
        #[source]
        source: TransportError,
    },

    /// Remote tip moved since acquisition.
    #[error("branch {branch:?} moved on remote: expected {expected:?}, found {found:?}")]
    RemoteMoved {
        branch: String,
        expected: Option<Oid>,
        found: Option<Oid>,
    },

    /// Push of the publish commit fails.
    #[error("failed to push branch {branch:?}")]
    PushRejected {
        branch: String,
        #[source]
        source: TransportError,
    },

    /// Scratch directory for working copy cannot be prepared.
    #[error("failed to prepare working directory at {:?}", path.display())]
    Workdir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Caller-chosen working directory already holds files.
    #[error("working directory {:?} is not empty", path.display())]
    WorkdirNotEmpty { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = PublishError> = std::result::Result<T, E>;
