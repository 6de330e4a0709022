// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local working copy of the publish branch.
//!
//! A __working copy__ is a scratch checkout of the target branch. The mirror
//! rewrites its files, and it turns whatever ended up on disk into exactly
//! one commit on the branch.

use crate::request::CommitIdentity;

use git2::{IndexAddOption, Oid, Repository, RepositoryInitOptions, Signature};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Name of the remote the working copy pushes to.
pub const REMOTE_NAME: &str = "origin";

/// Checkout of the target branch.
pub struct WorkingCopy {
    repository: Repository,
    branch: String,
    base: Option<Oid>,
}

impl std::fmt::Debug for WorkingCopy {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("WorkingCopy")
            .field("path", &self.repository.path())
            .field("branch", &self.branch)
            .field("base", &self.base)
            .finish()
    }
}

impl WorkingCopy {
    /// Wrap repository checked out at branch.
    ///
    /// The base is the branch tip the repository was acquired at, or `None`
    /// for a branch that does not exist on the remote yet.
    pub fn new(repository: Repository, branch: impl Into<String>, base: Option<Oid>) -> Self {
        Self {
            repository,
            branch: branch.into(),
            base,
        }
    }

    /// Initialize working copy for a branch the remote does not have yet.
    ///
    /// HEAD points at the unborn branch, so the first commit becomes the root
    /// of an orphan branch.
    ///
    /// # Errors
    ///
    /// - Return [`git2::Error`] if repository initialization fails.
    #[instrument(skip(path, url), level = "debug")]
    pub fn init_orphan(
        path: impl AsRef<Path>,
        branch: &str,
        url: &str,
    ) -> Result<Self, git2::Error> {
        info!("initialize orphan branch {branch:?}");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);
        let repository = Repository::init_opts(path.as_ref(), &opts)?;
        repository.remote(REMOTE_NAME, url)?;

        Ok(Self::new(repository, branch, None))
    }

    /// Top-level directory of the working copy.
    pub fn root(&self) -> &Path {
        self.repository
            .workdir()
            .unwrap_or_else(|| self.repository.path())
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Branch tip the working copy was acquired at.
    pub fn base(&self) -> Option<Oid> {
        self.base
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Current commit at HEAD, if any.
    pub fn head(&self) -> Option<Oid> {
        self.repository.head().ok().and_then(|head| head.target())
    }

    /// Pick the signature for the publish commit.
    ///
    /// An explicit identity always wins. Otherwise the user's git
    /// configuration is used, and the fallback covers machines that have
    /// none.
    pub fn signature(
        &self,
        identity: Option<&CommitIdentity>,
        fallback: &CommitIdentity,
    ) -> Result<Signature<'static>, git2::Error> {
        match identity {
            Some(identity) => identity.signature(),
            None => self
                .repository
                .signature()
                .or_else(|_| fallback.signature()),
        }
    }

    /// Stage every change in the working copy and commit it.
    ///
    /// Adds, modifications, and deletions are all staged. Ignore rules are
    /// bypassed so the commit holds exactly what is on disk. A commit is
    /// created even when its tree equals the parent's.
    ///
    /// # Errors
    ///
    /// - Return [`git2::Error`] if staging or committing fails.
    #[instrument(skip(self, signature, message), level = "debug")]
    pub fn commit_all(&self, signature: &Signature<'_>, message: &str) -> Result<Oid, git2::Error> {
        let mut index = self.repository.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT | IndexAddOption::FORCE, None)?;
        index.update_all(["*"], None)?;
        index.write()?;

        // INVARIANT: Always use new tree produced by index after staging.
        let tree = self.repository.find_tree(index.write_tree()?)?;

        // INVARIANT: Orphan branches get a root commit.
        let mut parents = Vec::new();
        if let Some(parent) = self.head() {
            parents.push(self.repository.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        let commit = self.repository.commit(
            Some("HEAD"),
            signature,
            signature,
            message,
            &tree,
            &parents,
        )?;
        debug!("created commit {commit} with {} parent(s)", parents.len());

        Ok(commit)
    }
}
