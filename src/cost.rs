//! Daily cost circuit breaker.
//!
//! External provider calls carry an estimated cost. Once the cumulative
//! spend for the current local day crosses the configured ceiling, further
//! calls fail fast with [`Error::CostLimit`] until the next day boundary.

use crate::error::{Error, Result};
use chrono::NaiveDate;
use std::sync::Mutex;

/// Tracks cumulative provider spend for the current day.
#[derive(Debug)]
pub struct CostTracker {
    /// Ceiling in USD; `None` disables enforcement.
    ceiling_usd: Option<f64>,
    state: Mutex<DayState>,
}

#[derive(Debug, Clone, Copy)]
struct DayState {
    day: NaiveDate,
    spent_usd: f64,
}

impl CostTracker {
    /// Creates a tracker with the given daily ceiling.
    #[must_use]
    pub fn new(ceiling_usd: Option<f64>) -> Self {
        Self {
            ceiling_usd,
            state: Mutex::new(DayState {
                day: today(),
                spent_usd: 0.0,
            }),
        }
    }

    /// A tracker that never trips.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Records a charge, failing fast once the ceiling is crossed.
    ///
    /// The charge that crosses the ceiling is still recorded; subsequent
    /// calls fail until the day rolls over.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CostLimit`] when the ceiling has been reached.
    pub fn charge(&self, cost_usd: f64) -> Result<()> {
        let Some(ceiling) = self.ceiling_usd else {
            return Ok(());
        };
        let mut state = self.state.lock().map_err(|_| Error::Config {
            message: "cost tracker lock poisoned".to_string(),
        })?;

        let now = today();
        if state.day != now {
            state.day = now;
            state.spent_usd = 0.0;
        }

        if state.spent_usd >= ceiling {
            return Err(Error::CostLimit {
                spent_usd: state.spent_usd,
                ceiling_usd: ceiling,
            });
        }

        state.spent_usd += cost_usd;
        Ok(())
    }

    /// Cumulative spend for the current day.
    #[must_use]
    pub fn spent_today(&self) -> f64 {
        self.state.lock().map(|s| s.spent_usd).unwrap_or(0.0)
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
