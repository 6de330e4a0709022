// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::RemoteFixture;

use anyhow::Result;
use indicatif::ProgressBar;
use pagepush::{
    config::SourceDirectory, publish::mirror::MirrorReport, Git2Transport, Outcome,
    PublishDefinition, PublishError, PublishRequest, PublishSettings, Publisher,
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, fs, path::Path};
use tempfile::TempDir;

const BLOB_MODE: i32 = 0o100644;

fn definition(remote: &RemoteFixture, source: &Path) -> PublishDefinition {
    let mut definition = PublishDefinition::default();
    definition.source.directory = SourceDirectory::new(source);
    definition.target.repository = "blogger/blogger.github.io".into();
    definition.target.url = Some(remote.url());
    definition.target.depth = 0;
    definition
}

fn request(definition: &PublishDefinition, vars: &[(&str, &str)]) -> Result<PublishRequest> {
    let vars = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect::<BTreeMap<_, _>>();
    Ok(PublishRequest::resolve(definition, |key| vars.get(key).cloned())?)
}

fn publisher(definition: &PublishDefinition) -> Publisher {
    // INVARIANT: libgit2 cannot shallow clone local remotes, so fetch all history.
    Publisher::new(
        PublishSettings::from_definition(definition),
        Git2Transport::new(0, ProgressBar::hidden()),
    )
}

fn site(pages: &[(&str, &str)]) -> Result<TempDir> {
    let dir = TempDir::with_prefix("site-")?;
    for (name, contents) in pages {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
    }
    Ok(dir)
}

fn files(pages: &[(&str, &str)]) -> BTreeMap<String, (i32, String)> {
    pages
        .iter()
        .map(|(name, contents)| (name.to_string(), (BLOB_MODE, contents.to_string())))
        .collect()
}

const CI_PUSH: &[(&str, &str)] = &[
    ("TRAVIS_PULL_REQUEST", "false"),
    ("GH_TOKEN", "s3cr3t"),
    ("CI", "true"),
    ("TRAVIS_BUILD_NUMBER", "42"),
];

#[test]
fn publish_replaces_branch_content_with_site() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "gh-pages")?;
    remote.stage_and_commit("index.html", "old")?;
    let old_tip = remote.stage_and_commit("old.html", "C")?;

    let source = site(&[("index.html", "A"), ("about.html", "B"), ("posts/first.html", "P")])?;
    let definition = definition(&remote, source.path());
    let outcome = publisher(&definition).publish(&request(&definition, CI_PUSH)?)?;

    let tip = remote.tip("gh-pages").expect("branch must exist");
    assert_eq!(
        outcome,
        Outcome::Published {
            commit: tip,
            branch: "gh-pages".into(),
            report: MirrorReport {
                copied: 3,
                unchanged: 0,
                removed: 1,
            },
        }
    );
    assert_eq!(
        remote.files(tip)?,
        files(&[("about.html", "B"), ("index.html", "A"), ("posts/first.html", "P")])
    );
    assert_eq!(remote.message(tip)?, "Publish build 42");
    assert_eq!(remote.parents(tip)?, vec![old_tip]);

    Ok(())
}

#[test]
fn publish_twice_creates_distinct_commits_with_same_tree() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "gh-pages")?;
    remote.stage_and_commit("index.html", "old")?;

    let source = site(&[("index.html", "A")])?;
    let definition = definition(&remote, source.path());
    let publisher = publisher(&definition);

    publisher.publish(&request(&definition, CI_PUSH)?)?;
    let first = remote.tip("gh-pages").expect("branch must exist");

    let mut vars = CI_PUSH.to_vec();
    vars.retain(|(key, _)| *key != "TRAVIS_BUILD_NUMBER");
    vars.push(("TRAVIS_BUILD_NUMBER", "43"));
    let outcome = publisher.publish(&request(&definition, &vars)?)?;
    let second = remote.tip("gh-pages").expect("branch must exist");

    assert_ne!(first, second);
    assert_eq!(remote.tree_id(first)?, remote.tree_id(second)?);
    assert_eq!(remote.parents(second)?, vec![first]);
    assert_eq!(remote.message(second)?, "Publish build 43");
    match outcome {
        Outcome::Published { report, .. } => assert_eq!(report.unchanged, 1),
        Outcome::Skipped => panic!("publish must not be skipped"),
    }

    Ok(())
}

#[test]
fn publish_starts_orphan_branch_when_remote_lacks_it() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "main")?;
    let main_tip = remote.stage_and_commit("README.md", "source code lives here")?;

    let source = site(&[("index.html", "A")])?;
    let definition = definition(&remote, source.path());
    publisher(&definition).publish(&request(&definition, CI_PUSH)?)?;

    let tip = remote.tip("gh-pages").expect("branch must exist");
    assert!(remote.parents(tip)?.is_empty());
    assert_eq!(remote.files(tip)?, files(&[("index.html", "A")]));
    assert_eq!(remote.tip("main"), Some(main_tip));

    Ok(())
}

#[test]
fn publish_fails_on_missing_branch_when_creation_is_off() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "main")?;
    remote.stage_and_commit("README.md", "source code lives here")?;

    let source = site(&[("index.html", "A")])?;
    let mut definition = definition(&remote, source.path());
    definition.target.create_missing = false;
    let result = publisher(&definition).publish(&request(&definition, CI_PUSH)?);

    assert!(matches!(result, Err(PublishError::AcquisitionFailure { .. })));
    assert_eq!(remote.tip("gh-pages"), None);

    Ok(())
}

#[test]
fn pull_request_build_leaves_remote_untouched() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "gh-pages")?;
    let old_tip = remote.stage_and_commit("index.html", "old")?;

    let source = site(&[("index.html", "A")])?;
    let definition = definition(&remote, source.path());
    let vars = [("TRAVIS_PULL_REQUEST", "17"), ("GH_TOKEN", "s3cr3t")];
    let outcome = publisher(&definition).publish(&request(&definition, &vars)?)?;

    assert_eq!(outcome, Outcome::Skipped);
    assert_eq!(remote.tip("gh-pages"), Some(old_tip));

    Ok(())
}

#[test]
fn lease_accepts_unmoved_remote() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "gh-pages")?;
    let old_tip = remote.stage_and_commit("index.html", "old")?;

    let source = site(&[("index.html", "A")])?;
    let mut definition = definition(&remote, source.path());
    definition.target.lease = true;
    publisher(&definition).publish(&request(&definition, CI_PUSH)?)?;

    let tip = remote.tip("gh-pages").expect("branch must exist");
    assert_eq!(remote.parents(tip)?, vec![old_tip]);
    assert_eq!(remote.files(tip)?, files(&[("index.html", "A")]));

    Ok(())
}

#[test]
fn kept_workdir_holds_published_checkout() -> Result<()> {
    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "gh-pages")?;
    remote.stage_and_commit("old.html", "C")?;

    let source = site(&[("index.html", "A")])?;
    let workdir = TempDir::with_prefix("workdir-")?;
    let definition = definition(&remote, source.path());
    let mut settings = PublishSettings::from_definition(&definition);
    settings.workdir = Some(workdir.path().into());
    Publisher::new(settings, Git2Transport::new(0, ProgressBar::hidden()))
        .publish(&request(&definition, CI_PUSH)?)?;

    assert!(workdir.path().join(".git").is_dir());
    assert_eq!(fs::read_to_string(workdir.path().join("index.html"))?, "A");
    assert!(!workdir.path().join("old.html").exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn symlinked_pages_are_published_as_files() -> Result<()> {
    use std::os::unix::fs::symlink;

    let remote_dir = TempDir::with_prefix("remote-")?;
    let remote = RemoteFixture::new(remote_dir.path(), "gh-pages")?;
    remote.stage_and_commit("index.html", "old")?;

    let shared = site(&[("style.css", "body {}")])?;
    let source = site(&[("index.html", "A")])?;
    symlink(shared.path().join("style.css"), source.path().join("style.css"))?;
    symlink(shared.path(), source.path().join("assets"))?;

    let definition = definition(&remote, source.path());
    publisher(&definition).publish(&request(&definition, CI_PUSH)?)?;

    let tip = remote.tip("gh-pages").expect("branch must exist");
    assert_eq!(
        remote.files(tip)?,
        files(&[
            ("assets/style.css", "body {}"),
            ("index.html", "A"),
            ("style.css", "body {}"),
        ])
    );

    Ok(())
}
