// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish requests.
//!
//! A __publish request__ describes exactly one publish attempt. It is built
//! fresh for every CI run out of the publish definition and whatever state
//! the CI system hands over through environment variables, used once, and
//! then thrown away.
//!
//! # Trust
//!
//! CI systems run builds for pull requests coming from forks. Such builds
//! must never see, let alone exercise, the push credential. The request
//! records whether the current run is such a build, and the publisher's gate
//! turns the whole publish into a no-op when it is.

use crate::config::{PublishDefinition, SourceDirectory};

use git2::Signature;
use std::{
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::PathBuf,
};
use tracing::{debug, instrument};

/// Build identifier used when the CI system does not provide one.
pub const LOCAL_BUILD: &str = "local";

/// One publish attempt.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Directory holding the already built site.
    pub source_directory: SourceDirectory,

    /// Repository to publish to.
    pub target_repository: TargetRepository,

    /// Branch the site is published on.
    pub target_branch: String,

    /// Token authorizing network operations.
    pub credential: Option<Credential>,

    /// Where the credential was looked up, for error reporting.
    pub credential_source: String,

    /// Current run was triggered by an untrusted pull request.
    pub is_pull_request_context: bool,

    /// Label tying the publish commit back to the triggering build.
    pub build_identifier: BuildId,

    /// Committer identity to use instead of the user's git configuration.
    pub identity: Option<CommitIdentity>,
}

impl PublishRequest {
    /// Resolve publish request from the current process environment.
    ///
    /// # Errors
    ///
    /// - Return [`RequestError::InvalidRepository`] if the target repository
    ///   is not in `owner/name` form.
    /// - Return [`RequestError::ReadToken`] if the token file cannot be read.
    pub fn from_env(definition: &PublishDefinition) -> Result<Self> {
        Self::resolve(definition, |key| std::env::var(key).ok())
    }

    /// Resolve publish request through a variable lookup.
    ///
    /// The lookup receives variable names taken from the definition's `[env]`
    /// section.
    ///
    /// # Errors
    ///
    /// - Return [`RequestError::InvalidRepository`] if the target repository
    ///   is not in `owner/name` form.
    /// - Return [`RequestError::ReadToken`] if the token file cannot be read.
    #[instrument(skip(definition, lookup), level = "debug")]
    pub fn resolve<L>(definition: &PublishDefinition, lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let env = &definition.env;
        let target = &definition.target;

        let target_repository =
            TargetRepository::new(&target.repository, &target.host, target.url.as_deref())?;

        let is_pull_request_context = is_pull_request_flag(lookup(&env.pull_request).as_deref());
        let is_ci = is_truthy_flag(lookup(&env.ci).as_deref());
        debug!("pull request context: {is_pull_request_context}, ci identity: {is_ci}");

        let build_identifier = lookup(&env.build)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(BuildId::new)
            .unwrap_or_else(|| BuildId::new(LOCAL_BUILD));

        let mut credential_source = format!("${}", env.token);
        let mut credential = lookup(&env.token).and_then(Credential::new);
        if let Some(token_path) = &env.token_path {
            credential_source.push_str(format!(" or {}", token_path.display()).as_str());
            if credential.is_none() && token_path.is_file() {
                debug!("read token from {:?}", token_path.display());
                let content = read_to_string(token_path).map_err(|err| RequestError::ReadToken {
                    source: err,
                    token_path: token_path.clone(),
                })?;
                credential = Credential::new(content);
            }
        }

        let identity = is_ci.then(|| {
            CommitIdentity::new(definition.commit.name.clone(), definition.commit.email.clone())
        });

        Ok(Self {
            source_directory: definition.source.directory.clone(),
            target_repository,
            target_branch: target.branch.clone(),
            credential,
            credential_source,
            is_pull_request_context,
            build_identifier,
            identity,
        })
    }
}

/// Remote repository to publish to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRepository {
    owner: String,
    name: String,
    url: String,
}

impl TargetRepository {
    /// Construct new target repository from `owner/name` slug.
    ///
    /// The remote URL is `https://<host>/<owner>/<name>.git` unless an
    /// explicit URL is given.
    ///
    /// # Errors
    ///
    /// - Return [`RequestError::InvalidRepository`] if slug is not in
    ///   `owner/name` form.
    pub fn new(slug: impl AsRef<str>, host: impl AsRef<str>, url: Option<&str>) -> Result<Self> {
        let slug = slug.as_ref().trim().trim_end_matches(".git");
        let (owner, name) = slug
            .split_once('/')
            .filter(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            })
            .ok_or_else(|| RequestError::InvalidRepository {
                slug: slug.to_owned(),
            })?;

        let url = match url {
            Some(url) => url.to_owned(),
            None => format!("https://{}/{owner}/{name}.git", host.as_ref()),
        };

        Ok(Self {
            owner: owner.to_owned(),
            name: name.to_owned(),
            url,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remote URL to clone from and push to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Display for TargetRepository {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}/{}", self.owner, self.name)
    }
}

/// Opaque push token.
///
/// Never printed. [`Debug`] is redacted, and there is no [`Display`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Construct new credential, trimming surrounding whitespace.
    ///
    /// Returns `None` for blank tokens.
    pub fn new(token: impl AsRef<str>) -> Option<Self> {
        let token = token.as_ref().trim();
        (!token.is_empty()).then(|| Self(token.to_owned()))
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Credential {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str("Credential(<redacted>)")
    }
}

/// Label of the build that triggered the publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildId(String);

impl BuildId {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for BuildId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.0)
    }
}

/// Name and email written into the publish commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Produce signature stamped with the current time.
    pub fn signature(&self) -> std::result::Result<Signature<'static>, git2::Error> {
        Signature::now(&self.name, &self.email)
    }
}

/// Decide whether a pull request flag marks an untrusted run.
///
/// Travis stores `false` or the pull request number. Anything but an unset,
/// empty, `false`, `0`, or `no` value counts as a pull request.
pub fn is_pull_request_flag(value: Option<&str>) -> bool {
    match value.map(|value| value.trim().to_ascii_lowercase()) {
        None => false,
        Some(value) => !matches!(value.as_str(), "" | "false" | "0" | "no"),
    }
}

/// Decide whether a boolean-ish environment flag is set.
pub fn is_truthy_flag(value: Option<&str>) -> bool {
    value
        .map(|value| value.trim().to_ascii_lowercase())
        .is_some_and(|value| matches!(value.as_str(), "true" | "1" | "yes"))
}

/// Publish request resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Target repository is not written as `owner/name`.
    #[error("target repository {slug:?} is not in owner/name form")]
    InvalidRepository { slug: String },

    /// Token file exists but cannot be read.
    #[error("failed to read token file at {:?}", token_path.display())]
    ReadToken {
        #[source]
        source: std::io::Error,
        token_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = RequestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;
    use std::collections::HashMap;

    fn definition() -> PublishDefinition {
        let mut definition = PublishDefinition::default();
        definition.target.repository = "blogger/blogger.github.io".into();
        definition
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test_case(None, false; "unset")]
    #[test_case(Some(""), false; "empty")]
    #[test_case(Some("false"), false; "travis push build")]
    #[test_case(Some("FALSE"), false; "uppercase false")]
    #[test_case(Some("0"), false; "zero")]
    #[test_case(Some("42"), true; "travis pull request number")]
    #[test_case(Some("true"), true; "literal true")]
    #[test]
    fn pull_request_flag(value: Option<&str>, expect: bool) {
        pretty_assertions::assert_eq!(is_pull_request_flag(value), expect);
    }

    #[test_case(None, false; "unset")]
    #[test_case(Some("true"), true; "literal true")]
    #[test_case(Some("1"), true; "one")]
    #[test_case(Some("Yes"), true; "yes")]
    #[test_case(Some("false"), false; "literal false")]
    #[test]
    fn truthy_flag(value: Option<&str>, expect: bool) {
        pretty_assertions::assert_eq!(is_truthy_flag(value), expect);
    }

    #[test]
    fn resolve_push_build() -> anyhow::Result<()> {
        let request = PublishRequest::resolve(
            &definition(),
            lookup(&[
                ("TRAVIS_PULL_REQUEST", "false"),
                ("GH_TOKEN", "  s3cr3t\n"),
                ("CI", "true"),
                ("TRAVIS_BUILD_NUMBER", "128"),
            ]),
        )?;

        assert!(!request.is_pull_request_context);
        assert_eq!(request.credential, Credential::new("s3cr3t"));
        assert_eq!(request.build_identifier, BuildId::new("128"));
        assert_eq!(
            request.identity,
            Some(CommitIdentity::new("pagepush", "pagepush@localhost"))
        );
        assert_eq!(request.target_branch, "gh-pages");
        assert_eq!(
            request.target_repository.url(),
            "https://github.com/blogger/blogger.github.io.git"
        );

        Ok(())
    }

    #[test]
    fn resolve_pull_request_build() -> anyhow::Result<()> {
        let request = PublishRequest::resolve(
            &definition(),
            lookup(&[("TRAVIS_PULL_REQUEST", "7"), ("GH_TOKEN", "")]),
        )?;

        assert!(request.is_pull_request_context);
        assert_eq!(request.credential, None);
        assert_eq!(request.identity, None);
        assert_eq!(request.build_identifier, BuildId::new(LOCAL_BUILD));
        assert_eq!(request.credential_source, "$GH_TOKEN");

        Ok(())
    }

    #[sealed_test(env = [("GH_TOKEN", "from-env")])]
    fn resolve_prefers_token_variable_over_file() -> anyhow::Result<()> {
        std::fs::write("token", "from-file\n")?;
        let mut definition = definition();
        definition.env.token_path = Some(PathBuf::from("token"));

        let request = PublishRequest::from_env(&definition)?;
        assert_eq!(request.credential, Credential::new("from-env"));
        assert_eq!(request.credential_source, "$GH_TOKEN or token");

        Ok(())
    }

    #[sealed_test]
    fn resolve_reads_token_file() -> anyhow::Result<()> {
        std::fs::write("token", "from-file\n")?;
        let mut definition = definition();
        definition.env.token_path = Some(PathBuf::from("token"));

        let request = PublishRequest::resolve(&definition, |_| None)?;
        assert_eq!(request.credential, Credential::new("from-file"));

        Ok(())
    }

    #[test]
    fn target_repository_parsing() -> anyhow::Result<()> {
        let repo = TargetRepository::new("owner/site.git", "git.example.org", None)?;
        assert_eq!(repo.owner(), "owner");
        assert_eq!(repo.name(), "site");
        assert_eq!(repo.url(), "https://git.example.org/owner/site.git");
        assert_eq!(repo.to_string(), "owner/site");

        let repo = TargetRepository::new("owner/site", "github.com", Some("/srv/site.git"))?;
        assert_eq!(repo.url(), "/srv/site.git");

        for slug in ["", "owner", "/site", "owner/", "a/b/c"] {
            assert!(matches!(
                TargetRepository::new(slug, "github.com", None),
                Err(RequestError::InvalidRepository { .. })
            ));
        }

        Ok(())
    }

    #[test]
    fn credential_is_redacted() {
        let credential = Credential::new("ghp_topsecret").unwrap();
        let debug = format!("{credential:?}");
        assert!(!debug.contains("topsecret"));
        assert_eq!(Credential::new("   "), None);
    }
}
