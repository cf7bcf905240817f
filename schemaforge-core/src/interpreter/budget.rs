use std::cell::Cell;
use std::time::{Duration, Instant};

use schemaforge_config::LimitsConfig;

/// How often the wall clock is sampled, in steps.
const CLOCK_SAMPLE_INTERVAL: u64 = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetExceeded {
    #[error("execution budget exceeded: source is {actual} bytes, limit is {limit}")]
    SourceSize { actual: usize, limit: usize },
    #[error("execution budget exceeded: more than {0} interpreter steps")]
    Steps(u64),
    #[error("execution budget exceeded: deadline of {0} ms elapsed")]
    Deadline(u64),
    #[error("execution budget exceeded: nesting deeper than {0}")]
    Nesting(usize),
    #[error("execution budget exceeded: value larger than {0} bytes")]
    ValueSize(usize),
}

/// Step, depth, size and deadline accounting for one execution.
#[derive(Debug)]
pub struct Budget {
    limits: LimitsConfig,
    steps: Cell<u64>,
    depth: Cell<usize>,
    started: Cell<Instant>,
}

impl Budget {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            limits: limits.clone(),
            steps: Cell::new(0),
            depth: Cell::new(0),
            started: Cell::new(Instant::now()),
        }
    }

    /// Reset counters and restart the deadline clock.
    pub fn restart(&self) {
        self.steps.set(0);
        self.depth.set(0);
        self.started.set(Instant::now());
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps.get()
    }

    pub fn check_source(&self, source: &str) -> Result<(), BudgetExceeded> {
        let actual = source.len();
        if actual > self.limits.max_source_bytes {
            return Err(BudgetExceeded::SourceSize {
                actual,
                limit: self.limits.max_source_bytes,
            });
        }
        Ok(())
    }

    pub fn tick(&self) -> Result<(), BudgetExceeded> {
        let steps = self.steps.get().saturating_add(1);
        self.steps.set(steps);
        if steps > self.limits.max_steps {
            return Err(BudgetExceeded::Steps(self.limits.max_steps));
        }
        if steps % CLOCK_SAMPLE_INTERVAL == 0 {
            self.check_deadline()?;
        }
        Ok(())
    }

    pub fn check_deadline(&self) -> Result<(), BudgetExceeded> {
        if let Some(timeout) = self.limits.timeout()
            && self.elapsed() > timeout
        {
            return Err(BudgetExceeded::Deadline(self.limits.timeout_ms));
        }
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.started.get().elapsed()
    }

    /// Enter one level of evaluation nesting. The level is released when the
    /// returned guard drops.
    pub fn descend(&self) -> Result<DepthGuard<'_>, BudgetExceeded> {
        let depth = self.depth.get() + 1;
        if depth > self.limits.max_nesting_depth {
            return Err(BudgetExceeded::Nesting(self.limits.max_nesting_depth));
        }
        self.depth.set(depth);
        Ok(DepthGuard { budget: self })
    }

    pub fn check_size(&self, bytes: usize) -> Result<(), BudgetExceeded> {
        if bytes > self.limits.max_value_bytes {
            return Err(BudgetExceeded::ValueSize(self.limits.max_value_bytes));
        }
        Ok(())
    }
}

pub struct DepthGuard<'a> {
    budget: &'a Budget,
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let depth = self.budget.depth.get();
        self.budget.depth.set(depth.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsConfig {
        LimitsConfig {
            max_steps: 10,
            max_nesting_depth: 8,
            max_value_bytes: 16,
            max_source_bytes: 32,
            ..LimitsConfig::default()
        }
    }

    #[test]
    fn steps_run_out() {
        let budget = Budget::new(&limits());
        for _ in 0..10 {
            budget.tick().unwrap();
        }
        assert_eq!(budget.tick(), Err(BudgetExceeded::Steps(10)));
        budget.restart();
        assert!(budget.tick().is_ok());
    }

    #[test]
    fn depth_guard_releases_on_drop() {
        let budget = Budget::new(&limits());
        {
            let _guards: Vec<_> = (0..8).map(|_| budget.descend().unwrap()).collect();
            assert!(matches!(budget.descend(), Err(BudgetExceeded::Nesting(8))));
        }
        assert!(budget.descend().is_ok());
    }

    #[test]
    fn size_checks() {
        let budget = Budget::new(&limits());
        assert!(budget.check_size(16).is_ok());
        assert_eq!(budget.check_size(17), Err(BudgetExceeded::ValueSize(16)));
        assert!(budget.check_source(&"x".repeat(33)).is_err());
    }

    #[test]
    fn zero_timeout_never_expires() {
        let budget = Budget::new(&LimitsConfig {
            timeout_ms: 0,
            ..LimitsConfig::default()
        });
        assert!(budget.check_deadline().is_ok());
    }
}
