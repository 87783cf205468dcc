use rand::Rng;
use std::time::Duration;

/// Source of pacing delays between uploads. Substitutable so tests
/// never wait real time.
pub trait PacingPolicy {
    /// Next delay, drawn from `[min_secs, max_secs]`.
    fn next_delay(&mut self, min_secs: f64, max_secs: f64) -> Duration;
}

/// Uniform random delay over the configured interval.
pub struct RandomPacing;

impl PacingPolicy for RandomPacing {
    fn next_delay(&mut self, min_secs: f64, max_secs: f64) -> Duration {
        let secs = if max_secs > min_secs {
            rand::thread_rng().gen_range(min_secs..=max_secs)
        } else {
            min_secs
        };
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
pub struct FixedPacing(pub Duration);

#[cfg(test)]
impl PacingPolicy for FixedPacing {
    fn next_delay(&mut self, _min_secs: f64, _max_secs: f64) -> Duration {
        self.0
    }
}
