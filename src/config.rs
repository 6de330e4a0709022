// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the `pagepush.toml` publish definition to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Name of the publish definition file.
pub const DEFINITION_FILE_NAME: &str = "pagepush.toml";

/// Publish definition layout.
///
/// Every site published through pagepush comes with a __publish definition__.
/// The definition says where the built site lives, which repository and
/// branch it gets published to, how the commit is written, and which
/// environment variables the CI system uses to hand over its state.
///
/// # General Layout
///
/// A publish definition is composed of four sections: source, target, commit,
/// and env. Every field has a sensible default except the target repository,
/// which must always be provided.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishDefinition {
    /// Where the built site is found.
    pub source: SourceSettings,

    /// Where the built site is published to.
    pub target: TargetSettings,

    /// How the publish commit is written.
    pub commit: CommitSettings,

    /// Environment variables to read CI state from.
    pub env: EnvSettings,
}

impl FromStr for PublishDefinition {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut definition: PublishDefinition =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        let directory = expand(definition.source.directory.as_path())?;
        definition.source.directory = SourceDirectory::new(directory);
        if let Some(token_path) = definition.env.token_path.take() {
            definition.env.token_path = Some(expand(&token_path)?);
        }

        Ok(definition)
    }
}

impl Display for PublishDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Source settings.
///
/// The built site is produced by an external site generator before pagepush
/// ever runs.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceSettings {
    /// Directory holding the built site.
    pub directory: SourceDirectory,

    /// Gitignore-style patterns that are never deleted from the working copy.
    pub preserve: Vec<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            directory: SourceDirectory::new("output"),
            preserve: Vec::new(),
        }
    }
}

/// Target settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetSettings {
    /// Hosting repository in `owner/name` form.
    pub repository: String,

    /// Branch the site is published on.
    pub branch: String,

    /// Host used to derive the remote URL.
    pub host: String,

    /// Explicit remote URL, overrides the one derived from host and repository.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Fetch depth for acquisition. Zero fetches full history.
    pub depth: u32,

    /// Refuse to push when the remote tip moved since acquisition.
    pub lease: bool,

    /// Create the branch as an orphan when the remote lacks it.
    pub create_missing: bool,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            repository: String::new(),
            branch: "gh-pages".into(),
            host: "github.com".into(),
            url: None,
            depth: 1,
            lease: false,
            create_missing: true,
        }
    }
}

/// Commit settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitSettings {
    /// Commit message template. `{build}` is replaced by the build identifier.
    pub message: String,

    /// Committer name used under a CI identity.
    pub name: String,

    /// Committer email used under a CI identity.
    pub email: String,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            message: "Publish build {build}".into(),
            name: "pagepush".into(),
            email: "pagepush@localhost".into(),
        }
    }
}

/// Names of the environment variables CI state is read from.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvSettings {
    /// Holds the pull request flag.
    pub pull_request: String,

    /// Holds the push token.
    pub token: String,

    /// Holds the flag saying we run under an automated CI identity.
    pub ci: String,

    /// Holds the build identifier.
    pub build: String,

    /// File to read the push token from when the token variable is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_path: Option<PathBuf>,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self {
            pull_request: "TRAVIS_PULL_REQUEST".into(),
            token: "GH_TOKEN".into(),
            ci: "CI".into(),
            build: "TRAVIS_BUILD_NUMBER".into(),
            token_path: None,
        }
    }
}

/// Path to the built site.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct SourceDirectory(PathBuf);

impl SourceDirectory {
    /// Construct new source directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Treat source directory as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }
}

impl Display for SourceDirectory {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_path().to_string_lossy().as_ref())
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
