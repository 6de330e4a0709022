// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Network side of publishing.
//!
//! Everything the publisher does over the network goes through the
//! [`Transport`] trait: reading the remote branch tip, acquiring a shallow
//! working copy of the branch, and pushing the publish commit. Only
//! [`Transport::push`] mutates the remote.

use crate::{
    publish::working_copy::{WorkingCopy, REMOTE_NAME},
    request::{Credential, TargetRepository},
};

use auth_git2::GitAuthenticator;
use git2::{
    build::RepoBuilder, Config, Direction, FetchOptions, Oid, PushOptions, Remote,
    RemoteCallbacks,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::Path, time};
use tracing::{debug, info, instrument, warn};

/// Username sent along with token credentials.
pub const TOKEN_USERNAME: &str = "x-access-token";

/// Result of acquiring the target branch.
#[derive(Debug)]
pub enum Acquisition {
    /// Branch exists on the remote and is checked out.
    Existing(WorkingCopy),

    /// Remote has no such branch.
    Missing,
}

/// Layer of indirection for network access.
pub trait Transport {
    /// Read the current tip of a remote branch.
    ///
    /// Returns `None` if the remote does not have the branch.
    fn remote_tip(
        &self,
        target: &TargetRepository,
        branch: &str,
        credential: &Credential,
    ) -> Result<Option<Oid>>;

    /// Obtain a working copy of a remote branch in an empty directory.
    fn acquire(
        &self,
        target: &TargetRepository,
        branch: &str,
        dest: &Path,
        credential: &Credential,
    ) -> Result<Acquisition>;

    /// Force-push working copy's branch to the remote.
    fn push(
        &self,
        copy: &WorkingCopy,
        target: &TargetRepository,
        credential: &Credential,
    ) -> Result<()>;
}

/// Network access through libgit2.
#[derive(Debug, Clone)]
pub struct Git2Transport {
    depth: u32,
    bar: ProgressBar,
}

impl Default for Git2Transport {
    fn default() -> Self {
        Self::new(1, ProgressBar::hidden())
    }
}

impl Git2Transport {
    /// Construct new libgit2 transport.
    ///
    /// Acquisition fetches `depth` commits of history, zero meaning all of
    /// it. Transfer progress of acquisition is shown through the progress
    /// bar.
    pub fn new(depth: u32, bar: ProgressBar) -> Self {
        Self { depth, bar }
    }

    fn authenticator(credential: &Credential) -> GitAuthenticator {
        GitAuthenticator::new_empty().add_plaintext_credentials(
            "*",
            TOKEN_USERNAME,
            credential.expose(),
        )
    }
}

impl Transport for Git2Transport {
    #[instrument(skip(self, target, credential), level = "debug")]
    fn remote_tip(
        &self,
        target: &TargetRepository,
        branch: &str,
        credential: &Credential,
    ) -> Result<Option<Oid>> {
        let authenticator = Self::authenticator(credential);
        let config = Config::open_default()?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));

        let mut remote = Remote::create_detached(target.url())?;
        let connection = remote.connect_auth(Direction::Fetch, Some(rc), None)?;
        let refname = format!("refs/heads/{branch}");
        let tip = connection
            .list()?
            .iter()
            .find(|head| head.name() == refname)
            .map(|head| head.oid());
        debug!("remote tip of {refname}: {tip:?}");

        Ok(tip)
    }

    /// Obtain a working copy of a remote branch.
    ///
    /// Probes the remote for the branch first, so a missing branch is
    /// reported as [`Acquisition::Missing`] instead of a clone failure. The
    /// clone itself only fetches the configured depth of history.
    #[instrument(skip(self, target, dest, credential), level = "debug")]
    fn acquire(
        &self,
        target: &TargetRepository,
        branch: &str,
        dest: &Path,
        credential: &Credential,
    ) -> Result<Acquisition> {
        if self.remote_tip(target, branch, credential)?.is_none() {
            warn!("{target} has no branch {branch:?}");
            return Ok(Acquisition::Missing);
        }

        info!("clone {target} at {branch:?} (depth {})", self.depth);
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
        )?
        .progress_chars("-Cco.");
        self.bar.set_style(style);
        self.bar.set_message(format!("{target}@{branch}"));
        self.bar.enable_steady_tick(time::Duration::from_millis(100));

        let authenticator = Self::authenticator(credential);
        let config = Config::open_default()?;
        let bar = self.bar.clone();
        let mut throttle = time::Instant::now();
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        rc.transfer_progress(|progress| {
            let stats = progress.to_owned();
            if throttle.elapsed() > time::Duration::from_millis(10) {
                throttle = time::Instant::now();
                bar.set_length(stats.total_objects() as u64);
                bar.set_position(stats.received_objects() as u64);
            }
            true
        });

        let mut fo = FetchOptions::new();
        fo.remote_callbacks(rc);
        if self.depth > 0 {
            fo.depth(i32::try_from(self.depth).unwrap_or(i32::MAX));
        }

        let cloned = RepoBuilder::new()
            .branch(branch)
            .fetch_options(fo)
            .clone(target.url(), dest);
        self.bar.finish_and_clear();

        let repository = cloned?;
        let base = repository.head()?.target();
        Ok(Acquisition::Existing(WorkingCopy::new(repository, branch, base)))
    }

    /// Force-push working copy's branch to the remote.
    ///
    /// A forced update is required because a shallow working copy cannot
    /// prove its history descends from the remote's. Rejections the remote
    /// reports for the branch, e.g. from branch protection, are returned as
    /// [`TransportError::Rejected`] with the remote's own reason.
    #[instrument(skip(self, copy, target, credential), level = "debug")]
    fn push(
        &self,
        copy: &WorkingCopy,
        target: &TargetRepository,
        credential: &Credential,
    ) -> Result<()> {
        let branch = copy.branch();
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        info!("push {branch:?} to {target}");

        let authenticator = Self::authenticator(credential);
        let config = copy.repository().config()?;
        let mut rejection = None;
        {
            let mut rc = RemoteCallbacks::new();
            rc.credentials(authenticator.credentials(&config));
            rc.push_transfer_progress(|current, total, bytes| {
                debug!("push progress: {current}/{total} objects, {bytes} bytes");
            });
            rc.push_update_reference(|refname, status| {
                if let Some(reason) = status {
                    rejection = Some((refname.to_owned(), reason.to_owned()));
                }
                Ok(())
            });

            let mut po = PushOptions::new();
            po.remote_callbacks(rc);
            let mut remote = copy.repository().find_remote(REMOTE_NAME)?;
            remote.push(&[refspec.as_str()], Some(&mut po))?;
        }

        if let Some((refname, reason)) = rejection {
            return Err(TransportError::Rejected { refname, reason });
        }

        Ok(())
    }
}

/// All possible error types for network access.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Remote does not have the requested branch.
    #[error("remote has no branch {branch:?}")]
    MissingBranch { branch: String },

    /// Remote refuses to update a reference.
    #[error("remote rejected {refname}: {reason}")]
    Rejected { refname: String, reason: String },

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
pub type Result<T, E = TransportError> = std::result::Result<T, E>;
