//! Per-connection update gate: a minimum interval between accepted updates
//! plus a cap on accepted updates per one-second window.

use std::time::Duration;
use tokio::time::Instant;

use plaza_shared::config::WorldConfig;

/// Length of the counting window.
pub const RATE_WINDOW: Duration = Duration::from_millis(1000);

/// Counting state for one connection. Lives in the same registry entry as
/// its player.
#[derive(Debug, Clone, PartialEq)]
pub struct RateState {
    pub window_start: Instant,
    pub update_count: u32,
    /// `None` until the first accepted update
    pub last_accepted_at: Option<Instant>,
}

impl RateState {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            update_count: 0,
            last_accepted_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Closer than the minimum interval to the previous accepted update
    TooSoon,
    /// Window budget already spent
    WindowFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimiter {
    min_interval: Duration,
    max_per_window: u32,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, max_per_window: u32) -> Self {
        Self {
            min_interval,
            max_per_window,
        }
    }

    pub fn from_config(config: &WorldConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_update_interval_ms as u64),
            config.max_update_rate_per_second,
        )
    }

    /// Decide whether an update arriving at `now` is accepted, recording it
    /// in `state` if so.
    pub fn admit(&self, state: &mut RateState, now: Instant) -> Admission {
        if let Some(last) = state.last_accepted_at {
            if now.saturating_duration_since(last) < self.min_interval {
                return Admission::Deny(DenyReason::TooSoon);
            }
        }

        if now.saturating_duration_since(state.window_start) > RATE_WINDOW {
            state.window_start = now;
            state.update_count = 0;
        }

        if state.update_count >= self.max_per_window {
            return Admission::Deny(DenyReason::WindowFull);
        }

        state.update_count += 1;
        state.last_accepted_at = Some(now);
        Admission::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_update_is_allowed() {
        let limiter = RateLimiter::new(ms(50), 20);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        assert_eq!(limiter.admit(&mut state, t0), Admission::Allow);
        assert_eq!(state.update_count, 1);
        assert_eq!(state.last_accepted_at, Some(t0));
    }

    #[test]
    fn updates_inside_min_interval_are_denied() {
        let limiter = RateLimiter::new(ms(50), 20);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        assert_eq!(limiter.admit(&mut state, t0), Admission::Allow);
        assert_eq!(
            limiter.admit(&mut state, t0 + ms(49)),
            Admission::Deny(DenyReason::TooSoon)
        );
        assert_eq!(limiter.admit(&mut state, t0 + ms(50)), Admission::Allow);
    }

    #[test]
    fn denied_update_does_not_move_last_accepted() {
        let limiter = RateLimiter::new(ms(50), 20);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        limiter.admit(&mut state, t0);
        limiter.admit(&mut state, t0 + ms(30));
        assert_eq!(state.last_accepted_at, Some(t0));
        assert_eq!(state.update_count, 1);
    }

    #[test]
    fn window_budget_caps_accepted_updates() {
        let limiter = RateLimiter::new(ms(10), 5);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        let accepted = (0..20)
            .filter(|i| limiter.admit(&mut state, t0 + ms(i * 20)) == Admission::Allow)
            .count();
        // 20 attempts over 380ms, all inside one window
        assert_eq!(accepted, 5);
        assert_eq!(
            limiter.admit(&mut state, t0 + ms(900)),
            Admission::Deny(DenyReason::WindowFull)
        );
    }

    #[test]
    fn window_resets_after_one_second() {
        let limiter = RateLimiter::new(ms(10), 2);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        assert_eq!(limiter.admit(&mut state, t0), Admission::Allow);
        assert_eq!(limiter.admit(&mut state, t0 + ms(100)), Admission::Allow);
        assert_ne!(limiter.admit(&mut state, t0 + ms(200)), Admission::Allow);
        // Exactly 1000ms is still the same window
        assert_ne!(limiter.admit(&mut state, t0 + ms(1000)), Admission::Allow);
        assert_eq!(limiter.admit(&mut state, t0 + ms(1001)), Admission::Allow);
        assert_eq!(state.window_start, t0 + ms(1001));
        assert_eq!(state.update_count, 1);
    }

    #[test]
    fn burst_faster_than_min_interval_accepts_at_most_window_over_interval() {
        let limiter = RateLimiter::new(ms(50), 100);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        // One attempt every 5ms across a single 1000ms window
        let accepted = (0..200)
            .filter(|i| limiter.admit(&mut state, t0 + ms(i * 5)) == Admission::Allow)
            .count();
        assert!(accepted <= (1000 / 50) as usize);
    }

    #[test]
    fn default_config_never_exceeds_rate_in_a_window() {
        let config = WorldConfig::default();
        let limiter = RateLimiter::from_config(&config);
        let t0 = Instant::now();
        let mut state = RateState::new(t0);
        let accepted = (0..1000)
            .filter(|i| limiter.admit(&mut state, t0 + ms(*i)) == Admission::Allow)
            .count();
        assert!(accepted <= config.max_update_rate_per_second as usize);
    }
}
