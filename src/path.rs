// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where the publish definition should be read from when the
//! caller does not name one explicitly.

use crate::config::DEFINITION_FILE_NAME;

use std::path::{Path, PathBuf};

/// Locate publish definition file.
///
/// Prefers `pagepush.toml` inside the given working directory, since CI jobs
/// run from the root of the site repository. Falls back to
/// `$XDG_CONFIG_HOME/pagepush/pagepush.toml` for local use. Returns the
/// working directory candidate if neither exists, so the caller reports a
/// sensible path in its error.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the working directory candidate is missing and
///   the user's configuration directory cannot be determined.
pub fn locate_definition_file(work_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let local = work_dir.as_ref().join(DEFINITION_FILE_NAME);
    if local.is_file() {
        return Ok(local);
    }

    let global = default_definition_file()?;
    if global.is_file() {
        return Ok(global);
    }

    Ok(local)
}

/// Determine default absolute path to the user-wide publish definition.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/pagepush/pagepush.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_definition_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("pagepush").join(DEFINITION_FILE_NAME))
        .ok_or(NoConfigDir)
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn locate_prefers_working_directory() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        std::fs::write(cwd.join(DEFINITION_FILE_NAME), "")?;

        assert_eq!(locate_definition_file(&cwd)?, cwd.join(DEFINITION_FILE_NAME));

        Ok(())
    }

    #[sealed_test(env = [("XDG_CONFIG_HOME", "/nonexistent/pagepush-test")])]
    fn locate_falls_back_to_working_directory_candidate() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;

        assert_eq!(locate_definition_file(&cwd)?, cwd.join(DEFINITION_FILE_NAME));

        Ok(())
    }
}
