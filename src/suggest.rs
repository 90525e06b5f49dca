//! Type-ahead debouncing for forward geocoding.
//!
//! The input side feeds every keystroke into [`SuggestionDebouncer::input`]
//! and polls [`SuggestionDebouncer::poll`] from its timer. A query is released
//! once it is long enough and the input has been idle for the configured
//! period. Time is passed in explicitly so the debouncer has no clock or
//! runtime of its own.

use std::time::{Duration, Instant};

use crate::controller::SessionConfig;

#[derive(Debug, Clone)]
pub struct SuggestionDebouncer {
    min_chars: usize,
    idle: Duration,
    pending: Option<(String, Instant)>,
    last_fired: Option<String>,
}

impl SuggestionDebouncer {
    pub fn new(min_chars: usize, idle: Duration) -> Self {
        Self { min_chars, idle, pending: None, last_fired: None }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.min_suggestion_chars, config.suggestion_idle)
    }

    /// Record the current input text at time `now`.
    ///
    /// Text shorter than the minimum cancels any pending query.
    pub fn input(&mut self, text: &str, now: Instant) {
        let query = text.trim();
        if query.chars().count() < self.min_chars {
            self.pending = None;
            self.last_fired = None;
            return;
        }
        self.pending = Some((query.to_string(), now));
    }

    /// Release the pending query if the input has been idle long enough.
    ///
    /// The same query is never released twice in a row.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let (query, since) = self.pending.as_ref()?;
        if now.saturating_duration_since(*since) < self.idle {
            return None;
        }
        let query = query.clone();
        self.pending = None;
        if self.last_fired.as_deref() == Some(query.as_str()) {
            return None;
        }
        self.last_fired = Some(query.clone());
        Some(query)
    }

    /// Time left until the pending query may fire, if any.
    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(_, since)| self.idle.saturating_sub(now.saturating_duration_since(*since)))
    }
}

impl Default for SuggestionDebouncer {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_after_idle_period() {
        let start = Instant::now();
        let mut debouncer = SuggestionDebouncer::default();

        debouncer.input("ben", start);
        assert_eq!(debouncer.poll(start + ms(299)), None);
        assert_eq!(debouncer.poll(start + ms(300)), Some("ben".to_string()));
        assert_eq!(debouncer.poll(start + ms(900)), None);
    }

    #[test]
    fn test_typing_restarts_timer() {
        let start = Instant::now();
        let mut debouncer = SuggestionDebouncer::default();

        debouncer.input("ben", start);
        debouncer.input("ben th", start + ms(200));
        assert_eq!(debouncer.poll(start + ms(400)), None);
        assert_eq!(debouncer.poll(start + ms(500)), Some("ben th".to_string()));
    }

    #[test]
    fn test_short_input_never_fires() {
        let start = Instant::now();
        let mut debouncer = SuggestionDebouncer::default();

        debouncer.input("be", start);
        assert_eq!(debouncer.poll(start + ms(1000)), None);
        assert_eq!(debouncer.time_until_ready(start), None);

        debouncer.input("ben", start);
        debouncer.input(" b ", start + ms(10));
        assert_eq!(debouncer.poll(start + ms(1000)), None);
    }

    #[test]
    fn test_same_query_not_repeated() {
        let start = Instant::now();
        let mut debouncer = SuggestionDebouncer::default();

        debouncer.input("cafe", start);
        assert!(debouncer.poll(start + ms(300)).is_some());
        debouncer.input("cafe ", start + ms(400));
        assert_eq!(debouncer.poll(start + ms(800)), None);

        debouncer.input("cafes", start + ms(900));
        assert_eq!(debouncer.poll(start + ms(1200)), Some("cafes".to_string()));
    }

    #[test]
    fn test_time_until_ready() {
        let start = Instant::now();
        let mut debouncer = SuggestionDebouncer::new(3, ms(300));
        debouncer.input("park", start);
        assert_eq!(debouncer.time_until_ready(start + ms(100)), Some(ms(200)));
        assert_eq!(debouncer.time_until_ready(start + ms(500)), Some(Duration::ZERO));
    }
}
