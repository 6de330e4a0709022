// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Publish gating.
//!
//! Decide whether a publish request may touch the network at all. The
//! publisher consults its gate before anything else, and a denied request
//! ends as a successful skip rather than a failure.
//!
//! Pull request builds are always denied. [`DenyPullRequests`] is applied by
//! the publisher on top of whatever gate it holds, so custom gates can only
//! narrow publishing further.

use crate::request::PublishRequest;

/// Predicate deciding whether a request may be published.
pub trait PublishGate {
    /// Check if publishing is allowed for given request.
    fn is_publish_allowed(&self, request: &PublishRequest) -> bool;
}

/// Deny every request made from a pull request context.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyPullRequests;

impl PublishGate for DenyPullRequests {
    fn is_publish_allowed(&self, request: &PublishRequest) -> bool {
        !request.is_pull_request_context
    }
}

impl<F> PublishGate for F
where
    F: Fn(&PublishRequest) -> bool,
{
    fn is_publish_allowed(&self, request: &PublishRequest) -> bool {
        self(request)
    }
}
