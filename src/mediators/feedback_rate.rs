//! In-memory, per-Gateway-instance throttle for `get_feedback`. Deliberately not synchronized
//! across instances (source: a module-level dictionary); each instance enforces its own
//! 1800-second per-model cooldown and 120-second global cooldown once it has actually consulted
//! the store for a feedback window.

use errors::*;
use time_helpers;

use std::collections::HashMap;
use std::sync::Mutex;

const PER_MODEL_COOLDOWN_SECONDS: f64 = 1800.0;
const GLOBAL_COOLDOWN_SECONDS: f64 = 120.0;

pub struct FeedbackRateLimiter {
    next_global_feedback: Mutex<f64>,
    next_feedback_at: Mutex<HashMap<String, f64>>,
}

impl FeedbackRateLimiter {
    pub fn new() -> FeedbackRateLimiter {
        FeedbackRateLimiter {
            next_global_feedback: Mutex::new(-1.0),
            next_feedback_at: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `Ok(())` if a `get_feedback` call for `model_name` is currently allowed, or
    /// `Err(RateLimited(next_feedback_timestamp))` otherwise. Per-model is checked before global,
    /// matching the source's check order.
    pub fn check(&self, model_name: &str) -> Result<()> {
        let now = time_helpers::epoch_now();

        if let Some(&next) = self.next_feedback_at.lock().unwrap().get(model_name) {
            if next > now {
                bail!(ErrorKind::RateLimited(next + 1.0));
            }
        }

        let next_global = *self.next_global_feedback.lock().unwrap();
        if next_global > now {
            bail!(ErrorKind::RateLimited(next_global + 1.0));
        }

        Ok(())
    }

    /// Called once a `get_feedback` request has actually consulted the store, win or lose,
    /// to arm both cooldowns for the next attempt.
    pub fn commit(&self, model_name: &str) {
        let now = time_helpers::epoch_now();
        self.next_feedback_at
            .lock()
            .unwrap()
            .insert(model_name.to_owned(), now + PER_MODEL_COOLDOWN_SECONDS);
        *self.next_global_feedback.lock().unwrap() = now + GLOBAL_COOLDOWN_SECONDS;
    }
}

impl Default for FeedbackRateLimiter {
    fn default() -> FeedbackRateLimiter {
        FeedbackRateLimiter::new()
    }
}

#[cfg(test)]
mod tests {
    use mediators::feedback_rate::*;

    #[test]
    fn test_initially_allowed() {
        let limiter = FeedbackRateLimiter::new();
        assert!(limiter.check("model-a").is_ok());
    }

    #[test]
    fn test_commit_blocks_same_model() {
        let limiter = FeedbackRateLimiter::new();
        limiter.commit("model-a");
        assert!(limiter.check("model-a").is_err());
    }

    #[test]
    fn test_commit_blocks_globally() {
        let limiter = FeedbackRateLimiter::new();
        limiter.commit("model-a");
        // A different model is still blocked by the global cooldown.
        assert!(limiter.check("model-b").is_err());
    }
}
