// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Coordinator instance selection.
//!
//! A [`Selector`] picks which configured coordinator URL the next
//! load-balanced request goes to. `round-robin` walks the list with a
//! monotonic counter, `sticky` pins the first instance and fails closed
//! once it is marked down, and any unrecognized method gets the
//! [`Rejecting`] selector, which refuses every selection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::{LB_METHOD_ROUND_ROBIN, LB_METHOD_STICKY};

/// Picks the index of the next coordinator instance to try.
pub trait Selector: Send + Sync {
    /// Index of the instance the next request should use, or `None` when
    /// no instance can be selected.
    fn next(&self) -> Option<usize>;

    /// Record that the instance at `index` failed to serve a request.
    fn mark_failed(&self, index: usize);

    /// Whether this selector actually balances load. The rejecting
    /// selector reports `false`.
    fn is_load_balancing(&self) -> bool {
        true
    }
}

/// Build the selector for a load-balancing method name.
pub fn selector_for(method: &str, instances: usize) -> Box<dyn Selector> {
    match method {
        LB_METHOD_ROUND_ROBIN => Box::new(RoundRobin::new(instances)),
        LB_METHOD_STICKY => Box::new(Sticky::new(instances)),
        _ => Box::new(Rejecting),
    }
}

/// Monotonic counter modulo the instance count.
pub struct RoundRobin {
    counter: AtomicUsize,
    instances: usize,
}

impl RoundRobin {
    /// Create a selector over `instances` entries.
    pub fn new(instances: usize) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            instances,
        }
    }
}

impl Selector for RoundRobin {
    fn next(&self) -> Option<usize> {
        if self.instances == 0 {
            return None;
        }
        Some(self.counter.fetch_add(1, Ordering::Relaxed) % self.instances)
    }

    fn mark_failed(&self, _index: usize) {
        // the counter already moves on; failed instances are simply
        // reached again one full cycle later
    }
}

/// Pins the first instance and fails closed once it is down.
pub struct Sticky {
    instances: usize,
    poisoned: AtomicBool,
}

impl Sticky {
    /// Create a selector over `instances` entries.
    pub fn new(instances: usize) -> Self {
        Self {
            instances,
            poisoned: AtomicBool::new(false),
        }
    }
}

impl Selector for Sticky {
    fn next(&self) -> Option<usize> {
        if self.instances == 0 || self.poisoned.load(Ordering::Acquire) {
            return None;
        }
        Some(0)
    }

    fn mark_failed(&self, _index: usize) {
        self.poisoned.store(true, Ordering::Release);
    }
}

/// Selector for unknown load-balancing methods: refuses every request.
pub struct Rejecting;

impl Selector for Rejecting {
    fn next(&self) -> Option<usize> {
        None
    }

    fn mark_failed(&self, _index: usize) {}

    fn is_load_balancing(&self) -> bool {
        false
    }
}
