//! Hierarchical cancellation scopes
//!
//! A scope answers one question: may this unit of work still proceed?
//!
//! ```text
//!   root (global-timeout)
//!    ├── child (file-timeout)  file-1.yaml
//!    ├── child (file-timeout)  file-2.yaml
//!    └── child (file-timeout)  file-N.yaml
//! ```
//!
//! A child is cancelled when its own deadline elapses or when its parent is
//! cancelled, whichever comes first. Cancellation is monotonic: once a scope
//! reports cancelled it never reports live again.
//!
//! Checks are cooperative. Nothing here interrupts running work; jobs poll
//! [`CancellationScope::is_cancelled`] between iterations.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

/// A time budget: either unbounded or a fixed duration
///
/// On the command line a negative value (`-1`, `-5s`) means unbounded,
/// otherwise the value is parsed with humantime (`500ms`, `2s`, `1m 30s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// The scope never expires on its own
    #[default]
    Unbounded,
    /// The scope expires this long after it is created
    After(Duration),
}

impl Timeout {
    /// Absolute deadline for a scope created at `now`
    pub fn deadline_from(&self, now: Instant) -> Option<Instant> {
        match self {
            Timeout::Unbounded => None,
            Timeout::After(d) => now.checked_add(*d),
        }
    }
}

impl FromStr for Timeout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |e: humantime::DurationError| ConfigError::InvalidDuration {
            value: s.to_string(),
            reason: e.to_string(),
        };

        match s.strip_prefix('-') {
            // Negative sentinel: a bare number (`-1`) or a duration (`-5s`)
            Some(magnitude) if magnitude.parse::<u64>().is_ok() => Ok(Timeout::Unbounded),
            Some(magnitude) => humantime::parse_duration(magnitude)
                .map(|_| Timeout::Unbounded)
                .map_err(invalid),
            None if s == "0" => Ok(Timeout::After(Duration::ZERO)),
            None => humantime::parse_duration(s)
                .map(Timeout::After)
                .map_err(invalid),
        }
    }
}

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeout::Unbounded => write!(f, "unbounded"),
            Timeout::After(d) => write!(f, "{}", humantime::format_duration(*d)),
        }
    }
}

/// Why a scope stopped being live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancellationScope::cancel`] was called on this scope or an ancestor
    Cancelled,
    /// The deadline of this scope or an ancestor elapsed
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

#[derive(Default)]
struct ScopeState {
    reason: Option<CancelReason>,
    children: Vec<Weak<ScopeInner>>,
}

struct ScopeInner {
    /// Effective deadline, already intersected with every ancestor's
    deadline: Option<Instant>,
    /// Fast path for polling; set once, never cleared
    cancelled: AtomicBool,
    state: Mutex<ScopeState>,
    signal: Condvar,
}

impl ScopeInner {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            cancelled: AtomicBool::new(false),
            state: Mutex::new(ScopeState::default()),
            signal: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        // A poisoned lock still holds a consistent reason/children pair
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark cancelled (first reason wins) and propagate to live children
    fn cancel_with(&self, reason: CancelReason) {
        let children = {
            let mut state = self.lock();
            if state.reason.is_some() {
                return;
            }
            state.reason = Some(reason);
            self.cancelled.store(true, Ordering::Release);
            std::mem::take(&mut state.children)
        };

        self.signal.notify_all();

        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel_with(reason);
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }
}

/// Cloneable handle to a node in the cancellation tree
///
/// Clones share state: cancelling one clone cancels them all.
#[derive(Clone)]
pub struct CancellationScope {
    inner: Arc<ScopeInner>,
}

impl CancellationScope {
    /// Create a root scope that expires after `timeout`
    pub fn root(timeout: Timeout) -> Self {
        Self {
            inner: Arc::new(ScopeInner::new(timeout.deadline_from(Instant::now()))),
        }
    }

    /// Derive a child scope
    ///
    /// The child's deadline is the earlier of its own and this scope's. If
    /// this scope is already cancelled the child starts out cancelled with
    /// the same reason.
    pub fn child(&self, timeout: Timeout) -> Self {
        let own = timeout.deadline_from(Instant::now());
        let deadline = match (own, self.inner.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let child = Arc::new(ScopeInner::new(deadline));

        let inherited = {
            let mut state = self.inner.lock();
            match state.reason {
                Some(reason) => Some(reason),
                None => {
                    // Prune dropped children before the vector would grow
                    if state.children.len() == state.children.capacity() {
                        state.children.retain(|c| c.strong_count() > 0);
                    }
                    state.children.push(Arc::downgrade(&child));
                    None
                }
            }
        };

        if let Some(reason) = inherited {
            child.cancel_with(reason);
        }

        Self { inner: child }
    }

    /// Cancel this scope and every scope derived from it
    pub fn cancel(&self) {
        self.inner.cancel_with(CancelReason::Cancelled);
    }

    /// Non-blocking poll
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Reason this scope is cancelled, or `None` while it is live
    pub fn reason(&self) -> Option<CancelReason> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return self.inner.lock().reason;
        }

        if self.inner.expired(Instant::now()) {
            self.inner.cancel_with(CancelReason::DeadlineExceeded);
            return self.inner.lock().reason;
        }

        None
    }

    /// Effective deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline; `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Block until the scope is cancelled
    pub fn wait(&self) -> CancelReason {
        loop {
            if let Some(reason) = self.wait_until(None) {
                return reason;
            }
        }
    }

    /// Block until the scope is cancelled or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CancelReason> {
        let limit = Instant::now().checked_add(timeout);
        self.wait_until(limit)
    }

    fn wait_until(&self, limit: Option<Instant>) -> Option<CancelReason> {
        let mut state = self.inner.lock();

        loop {
            if let Some(reason) = state.reason {
                return Some(reason);
            }

            let now = Instant::now();
            if self.inner.expired(now) {
                drop(state);
                self.inner.cancel_with(CancelReason::DeadlineExceeded);
                return self.inner.lock().reason;
            }

            let wake_at = match (self.inner.deadline, limit) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };

            match wake_at {
                Some(at) => {
                    if limit.is_some_and(|l| now >= l) {
                        return None;
                    }
                    let (guard, _) = self
                        .inner
                        .signal
                        .wait_timeout(state, at.saturating_duration_since(now))
                        .unwrap_or_else(|e| e.into_inner());
                    state = guard;
                }
                None => {
                    state = self
                        .inner
                        .signal
                        .wait(state)
                        .unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }
}

impl fmt::Debug for CancellationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationScope")
            .field("deadline", &self.inner.deadline)
            .field("reason", &self.inner.lock().reason)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_parse_timeout() {
        assert_eq!("-1".parse::<Timeout>().unwrap(), Timeout::Unbounded);
        assert_eq!("-5s".parse::<Timeout>().unwrap(), Timeout::Unbounded);
        assert_eq!(
            "0".parse::<Timeout>().unwrap(),
            Timeout::After(Duration::ZERO)
        );
        assert_eq!(
            "500ms".parse::<Timeout>().unwrap(),
            Timeout::After(Duration::from_millis(500))
        );
        assert_eq!(
            "1m 30s".parse::<Timeout>().unwrap(),
            Timeout::After(Duration::from_secs(90))
        );
        assert!("soon".parse::<Timeout>().is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_negative() {
        for value in ["-garbage", "-", "-5 parsecs"] {
            assert!(
                matches!(
                    value.parse::<Timeout>(),
                    Err(ConfigError::InvalidDuration { .. })
                ),
                "{} should be rejected",
                value
            );
        }
    }

    #[test]
    fn test_unbounded_root_stays_live() {
        let root = CancellationScope::root(Timeout::Unbounded);
        assert!(!root.is_cancelled());
        assert_eq!(root.deadline(), None);
        assert_eq!(root.remaining(), None);
        assert_eq!(root.wait_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn test_zero_timeout_is_cancelled() {
        let root = CancellationScope::root(Timeout::After(Duration::ZERO));
        assert!(root.is_cancelled());
        assert_eq!(root.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_deadline_elapses() {
        let root = CancellationScope::root(Timeout::After(Duration::from_millis(30)));
        assert!(!root.is_cancelled());
        assert_eq!(root.wait(), CancelReason::DeadlineExceeded);
        assert!(root.is_cancelled());
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let root = CancellationScope::root(Timeout::Unbounded);
        let child = root.child(Timeout::Unbounded);
        let grandchild = child.child(Timeout::After(Duration::from_secs(60)));

        assert!(!grandchild.is_cancelled());

        root.cancel();

        assert_eq!(child.reason(), Some(CancelReason::Cancelled));
        assert_eq!(grandchild.reason(), Some(CancelReason::Cancelled));
    }

    #[test]
    fn test_child_cancel_does_not_affect_parent() {
        let root = CancellationScope::root(Timeout::Unbounded);
        let a = root.child(Timeout::Unbounded);
        let b = root.child(Timeout::Unbounded);

        a.cancel();

        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_parent_deadline_dominates() {
        let root = CancellationScope::root(Timeout::After(Duration::from_millis(20)));
        let child = root.child(Timeout::After(Duration::from_secs(60)));

        assert_eq!(child.deadline(), root.deadline());
        assert_eq!(child.wait(), CancelReason::DeadlineExceeded);
    }

    #[test]
    fn test_child_deadline_earlier_than_parent() {
        let root = CancellationScope::root(Timeout::After(Duration::from_secs(60)));
        let child = root.child(Timeout::After(Duration::ZERO));

        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[test]
    fn test_child_of_cancelled_parent() {
        let root = CancellationScope::root(Timeout::After(Duration::ZERO));
        assert!(root.is_cancelled());

        let child = root.child(Timeout::Unbounded);
        assert_eq!(child.reason(), Some(CancelReason::DeadlineExceeded));
    }

    #[test]
    fn test_cancellation_is_monotonic() {
        let root = CancellationScope::root(Timeout::Unbounded);
        root.cancel();

        for _ in 0..3 {
            assert_eq!(root.reason(), Some(CancelReason::Cancelled));
        }
        root.cancel();
        assert!(root.is_cancelled());
    }

    #[test]
    fn test_wait_wakes_on_cancel_from_other_thread() {
        let root = CancellationScope::root(Timeout::Unbounded);
        let child = root.child(Timeout::Unbounded);

        let waiter = thread::spawn(move || child.wait());

        thread::sleep(Duration::from_millis(20));
        root.cancel();

        assert_eq!(waiter.join().unwrap(), CancelReason::Cancelled);
    }

    #[test]
    fn test_dropped_children_are_pruned() {
        let root = CancellationScope::root(Timeout::Unbounded);
        for _ in 0..1000 {
            let _ = root.child(Timeout::Unbounded);
        }
        assert!(root.inner.lock().children.len() < 1000);
    }
}
