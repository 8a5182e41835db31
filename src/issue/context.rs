/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/issue/context.rs
*
* Explicit execution context for issuance requests. A request runs either on
* the controlling host or on the managed target host; the context is switched
* for the duration of one request through a guard that restores the previous
* target when dropped, whichever way the request exits.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::ops::Deref;

/// Where an issuance request is executed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionTarget {
    /// The controlling host. Requests leave through the configured controller
    /// proxy when there is one.
    #[default]
    Controller,
    /// The managed host this process deploys onto. Requests go out directly.
    Managed,
}

impl ExecutionTarget {
    pub fn from_on_target(on_target: bool) -> Self {
        if on_target {
            ExecutionTarget::Managed
        } else {
            ExecutionTarget::Controller
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionContext {
    target: ExecutionTarget,
}

impl ExecutionContext {
    pub fn new(target: ExecutionTarget) -> Self {
        Self { target }
    }

    pub fn target(&self) -> ExecutionTarget {
        self.target
    }

    /// Switches to `target` until the returned guard is dropped.
    pub fn delegate(&mut self, target: ExecutionTarget) -> DelegationGuard<'_> {
        let previous = std::mem::replace(&mut self.target, target);
        DelegationGuard {
            context: self,
            previous,
        }
    }
}

pub struct DelegationGuard<'a> {
    context: &'a mut ExecutionContext,
    previous: ExecutionTarget,
}

impl Deref for DelegationGuard<'_> {
    type Target = ExecutionContext;

    fn deref(&self) -> &ExecutionContext {
        self.context
    }
}

impl Drop for DelegationGuard<'_> {
    fn drop(&mut self) {
        self.context.target = self.previous;
    }
}
