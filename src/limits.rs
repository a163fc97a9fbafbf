//! Process-wide resource thresholds and per-parse recursion tracking.

use thiserror::Error;
use tracing::warn;

/// Configurable thresholds that bound a single formatting invocation.
///
/// Defaults match the table in the design spec; every field can be
/// overridden via [`crate::config::FormatterConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityLimits {
    pub max_source_size_bytes: u64,
    pub max_token_count: usize,
    pub max_arena_capacity: usize,
    pub max_node_depth: u32,
    pub max_parse_depth: u32,
    pub parsing_timeout_ms: u64,
    pub max_heap_usage_bytes: u64,
    /// Depth at which [`DepthTracker::enter`] first emits a warning rather
    /// than failing outright.
    pub depth_warn_threshold: u32,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        SecurityLimits {
            max_source_size_bytes: 10 * 1024 * 1024,
            max_token_count: 1_000_000,
            max_arena_capacity: 100_000,
            max_node_depth: 100,
            max_parse_depth: 200,
            parsing_timeout_ms: 30_000,
            max_heap_usage_bytes: 512 * 1024 * 1024,
            depth_warn_threshold: 80,
        }
    }
}

/// Errors raised while tracking recursive-descent depth.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DepthError {
    #[error("recursion depth exceeded: {depth} > max {max} at {location}")]
    RecursionDepthExceeded { depth: u32, max: u32, location: String },

    #[error("exit() called without a matching enter()")]
    UnmatchedExit,
}

/// Per-parse recursion-depth counter with warn/fail thresholds.
///
/// Created fresh for each [`crate::parser::Parser::parse`] call; never
/// shared across files or threads.
#[derive(Debug)]
pub struct DepthTracker {
    current_depth: u32,
    max_depth: u32,
    warn_threshold: u32,
    warned: bool,
}

impl DepthTracker {
    pub fn new(max_depth: u32, warn_threshold: u32) -> Self {
        DepthTracker { current_depth: 0, max_depth, warn_threshold, warned: false }
    }

    /// Current recursion depth.
    pub fn current_depth(&self) -> u32 {
        self.current_depth
    }

    /// Increments the depth counter, warning once past `warn_threshold` and
    /// failing past `max_depth`.
    pub fn enter(&mut self, location: &str) -> Result<(), DepthError> {
        let next = self.current_depth + 1;
        if next > self.max_depth {
            return Err(DepthError::RecursionDepthExceeded { depth: next, max: self.max_depth, location: location.to_string() });
        }
        if next >= self.warn_threshold && !self.warned {
            warn!(depth = next, %location, "recursion depth nearing configured maximum");
            self.warned = true;
        }
        self.current_depth = next;
        Ok(())
    }

    /// Decrements the depth counter. Fails if called without a matching
    /// [`DepthTracker::enter`].
    pub fn exit(&mut self) -> Result<(), DepthError> {
        if self.current_depth == 0 {
            return Err(DepthError::UnmatchedExit);
        }
        self.current_depth -= 1;
        Ok(())
    }

    /// Enters scoped to a guard whose `Drop` calls [`DepthTracker::exit`],
    /// so every `enter` is paired with an `exit` on every exit path
    /// (including early `?` returns).
    pub fn enter_scoped<'a>(&'a mut self, location: &str) -> Result<DepthGuard<'a>, DepthError> {
        self.enter(location)?;
        Ok(DepthGuard { tracker: self })
    }
}

/// RAII guard returned by [`DepthTracker::enter_scoped`].
pub struct DepthGuard<'a> {
    tracker: &'a mut DepthTracker,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.tracker.exit() {
            warn!(error = %e, "depth guard exit failed; depth tracker is out of balance");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_enter_exit_returns_to_zero() {
        let mut tracker = DepthTracker::new(10, 8);
        for _ in 0..5 {
            tracker.enter("node").unwrap();
        }
        for _ in 0..5 {
            tracker.exit().unwrap();
        }
        assert_eq!(tracker.current_depth(), 0);
    }

    #[test]
    fn enter_past_max_depth_fails() {
        let mut tracker = DepthTracker::new(2, 2);
        tracker.enter("a").unwrap();
        tracker.enter("b").unwrap();
        let err = tracker.enter("c").unwrap_err();
        assert!(matches!(err, DepthError::RecursionDepthExceeded { depth: 3, max: 2, .. }));
    }

    #[test]
    fn exit_without_matching_enter_fails() {
        let mut tracker = DepthTracker::new(10, 8);
        let err = tracker.exit().unwrap_err();
        assert_eq!(err, DepthError::UnmatchedExit);
    }

    #[test]
    fn scoped_guard_exits_on_drop_even_on_early_return() {
        let mut tracker = DepthTracker::new(10, 8);
        fn enters_and_bails(tracker: &mut DepthTracker) -> Result<(), DepthError> {
            let _guard = tracker.enter_scoped("x")?;
            Err(DepthError::UnmatchedExit) // simulate an early error return
        }
        let _ = enters_and_bails(&mut tracker);
        assert_eq!(tracker.current_depth(), 0);
    }

    #[test]
    fn default_limits_match_documented_values() {
        let limits = SecurityLimits::default();
        assert_eq!(limits.max_source_size_bytes, 10 * 1024 * 1024);
        assert_eq!(limits.max_token_count, 1_000_000);
        assert_eq!(limits.max_arena_capacity, 100_000);
        assert_eq!(limits.max_node_depth, 100);
        assert_eq!(limits.parsing_timeout_ms, 30_000);
    }
}
