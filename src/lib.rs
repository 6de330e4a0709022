// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish a built static site to a git-backed page hosting branch.
//!
//! A static site generator renders a blog into an output directory. Pagepush
//! takes that directory and makes it the new content of a fixed branch of a
//! hosting repository, e.g., a `gh-pages` branch, with exactly one commit per
//! build.
//!
//! # Publish Flow
//!
//! 1. A [`PublishDefinition`] is read from `pagepush.toml`.
//! 2. A [`PublishRequest`] is resolved from the definition and the
//!    environment the CI system provides.
//! 3. A [`Publisher`] gates, acquires, syncs, commits, and pushes.
//!
//! # See Also
//!
//! 1. [`publish`] for the pipeline itself.
//! 2. [`request`] for how CI state is read.

pub mod config;
pub mod path;
pub mod publish;
pub mod request;

#[doc(inline)]
pub use crate::{
    config::PublishDefinition,
    publish::{
        gate::{DenyPullRequests, PublishGate},
        transport::{Git2Transport, Transport},
        Outcome, PublishError, PublishSettings, Publisher,
    },
    request::PublishRequest,
};
