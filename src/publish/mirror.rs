// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory mirroring.
//!
//! Replace the tracked contents of a working copy with the contents of a
//! built site. After a sync the working copy holds exactly the source's file
//! set, except for git metadata and preserved paths, which are never touched.
//!
//! # Mirror Rules
//!
//! - New and changed files are copied. Files whose bytes already match are
//!   left alone.
//! - Files and directories in the working copy that the source lacks are
//!   deleted.
//! - Any `.git` entry is excluded on both sides, so the working copy keeps
//!   its history.
//! - Symbolic links in the source are followed. The working copy receives
//!   the contents of the file a link points to, never the link itself.
//! - Files are written in place, truncated and rewritten, instead of going
//!   through a temporary file. The result is committed right after anyway.
//! - Where source and working copy disagree on whether a path is a file or a
//!   directory, the source wins.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::{
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, trace};
use walkdir::{DirEntry, WalkDir};

/// Name of version control metadata entries excluded from mirroring.
pub const METADATA_DIR: &str = ".git";

/// Tally of what a sync did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MirrorReport {
    /// Files written because they were new or changed.
    pub copied: usize,

    /// Files whose content already matched.
    pub unchanged: usize,

    /// Files deleted from the working copy.
    pub removed: usize,
}

/// Mirror a source directory into a destination directory.
#[derive(Debug, Clone)]
pub struct Mirror {
    dest: PathBuf,
    preserve: Gitignore,
}

impl Mirror {
    /// Construct new mirror for destination directory.
    ///
    /// Preserve patterns use gitignore syntax relative to the destination.
    /// Paths they match are never deleted.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Pattern`] if a preserve pattern is invalid.
    pub fn new(
        dest: impl Into<PathBuf>,
        preserve: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let dest = dest.into();
        let mut builder = GitignoreBuilder::new(&dest);
        for pattern in preserve {
            builder.add_line(None, pattern.as_ref())?;
        }
        let preserve = builder.build()?;

        Ok(Self { dest, preserve })
    }

    /// Sync destination with source directory.
    ///
    /// # Errors
    ///
    /// - Return [`MirrorError::Walk`] if either tree cannot be traversed,
    ///   including broken or looping symbolic links in the source.
    /// - Return [`MirrorError::Copy`], [`MirrorError::CreateDir`], or
    ///   [`MirrorError::Remove`] if filesystem updates fail.
    #[instrument(skip(self, source), level = "debug")]
    pub fn sync(&self, source: impl AsRef<Path>) -> Result<MirrorReport> {
        let source = source.as_ref();
        info!(
            "mirror {:?} into {:?}",
            source.display(),
            self.dest.display()
        );

        let mut report = MirrorReport::default();
        let expected = self.copy_tree(source, &mut report)?;
        self.prune(&expected, &mut report)?;

        debug!("{report:?}");
        Ok(report)
    }

    fn copy_tree(&self, source: &Path, report: &mut MirrorReport) -> Result<HashSet<PathBuf>> {
        let mut expected = HashSet::new();
        let walker = WalkDir::new(source)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_metadata(entry));

        for entry in walker {
            let entry = entry?;
            let relative = relative_to(source, entry.path()).to_path_buf();
            let target = self.dest.join(&relative);

            if entry.file_type().is_dir() {
                make_dir(&target)?;
            } else if copy_file(entry.path(), &target)? {
                trace!("copy {:?}", relative.display());
                report.copied += 1;
            } else {
                report.unchanged += 1;
            }

            expected.insert(relative);
        }

        Ok(expected)
    }

    fn prune(&self, expected: &HashSet<PathBuf>, report: &mut MirrorReport) -> Result<()> {
        let mut stale_dirs = Vec::new();
        let walker = WalkDir::new(&self.dest)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !is_metadata(entry) && !self.is_preserved(entry));

        for entry in walker {
            let entry = entry?;
            let relative = relative_to(&self.dest, entry.path());
            if expected.contains(relative) {
                continue;
            }

            if entry.file_type().is_dir() {
                stale_dirs.push((entry.depth(), entry.into_path()));
                continue;
            }

            trace!("remove {:?}", relative.display());
            fs::remove_file(entry.path()).map_err(|err| MirrorError::Remove {
                source: err,
                path: entry.path().to_path_buf(),
            })?;
            report.removed += 1;
        }

        // INVARIANT: Remove deepest directories first, and only once empty.
        //   - Preserved paths keep their parent directories alive.
        stale_dirs.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, dir) in stale_dirs {
            let is_empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if is_empty {
                fs::remove_dir(&dir).map_err(|err| MirrorError::Remove {
                    source: err,
                    path: dir.clone(),
                })?;
            }
        }

        Ok(())
    }

    fn is_preserved(&self, entry: &DirEntry) -> bool {
        self.preserve
            .matched(entry.path(), entry.file_type().is_dir())
            .is_ignore()
    }
}

/// Check if directory holds at least one file outside git metadata.
///
/// Directories alone do not count, since git cannot commit them. Symbolic
/// links are followed the same way [`Mirror::sync`] follows them.
pub fn has_content(dir: impl AsRef<Path>) -> bool {
    WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !is_metadata(entry))
        .filter_map(|entry| entry.ok())
        .any(|entry| !entry.file_type().is_dir())
}

fn is_metadata(entry: &DirEntry) -> bool {
    entry.file_name() == METADATA_DIR
}

fn relative_to<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn make_dir(target: &Path) -> Result<()> {
    if let Ok(metadata) = fs::symlink_metadata(target) {
        if metadata.is_dir() {
            return Ok(());
        }

        fs::remove_file(target).map_err(|err| MirrorError::Remove {
            source: err,
            path: target.to_path_buf(),
        })?;
    }

    fs::create_dir_all(target).map_err(|err| MirrorError::CreateDir {
        source: err,
        path: target.to_path_buf(),
    })
}

/// Copy file in place. Returns `false` if target already held same bytes.
fn copy_file(source: &Path, target: &Path) -> Result<bool> {
    let copy_err = |err: io::Error| MirrorError::Copy {
        source: err,
        path: target.to_path_buf(),
    };

    match fs::symlink_metadata(target) {
        Ok(metadata) if metadata.is_dir() => {
            fs::remove_dir_all(target).map_err(|err| MirrorError::Remove {
                source: err,
                path: target.to_path_buf(),
            })?;
        }
        Ok(metadata) if metadata.file_type().is_symlink() => {
            fs::remove_file(target).map_err(|err| MirrorError::Remove {
                source: err,
                path: target.to_path_buf(),
            })?;
        }
        Ok(metadata) => {
            let source_len = fs::metadata(source).map_err(copy_err)?.len();
            if source_len == metadata.len()
                && fs::read(source).map_err(copy_err)? == fs::read(target).map_err(copy_err)?
            {
                return Ok(false);
            }
        }
        Err(_) => {}
    }

    let mut reader = File::open(source).map_err(copy_err)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(target)
        .map_err(copy_err)?;
    io::copy(&mut reader, &mut writer).map_err(copy_err)?;

    Ok(true)
}

/// Directory mirroring error types.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Directory traversal fails.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    /// Preserve pattern cannot be parsed.
    #[error(transparent)]
    Pattern(#[from] ignore::Error),

    /// File cannot be copied into the working copy.
    #[error("failed to copy file to {:?}", path.display())]
    Copy {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Directory cannot be created in the working copy.
    #[error("failed to create directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Stale entry cannot be removed from the working copy.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;
