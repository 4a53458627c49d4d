use std::time::Duration;

/// Backoff schedule for one upload.
///
/// `backoff` drives the per-phase inner loop in [`crate::CaseFile`]: each
/// phase is tried once per entry, sleeping the entry's delay after a
/// transient failure. `batch_pause` is the flat delay between whole-batch
/// attempts in [`crate::Case::upload`], giving rate-limited remotes room to
/// recover.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: Vec<Duration>,
    pub batch_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(9),
            ],
            batch_pause: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Default try counts with all delays zeroed. For tests.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            backoff: vec![Duration::ZERO; Self::default().backoff.len()],
            batch_pause: Duration::ZERO,
        }
    }

    /// One try per phase, no sleeping anywhere. Makes backend call counts
    /// equal engine call counts, which is what retry-accounting tests want.
    #[must_use]
    pub fn single_try() -> Self {
        Self {
            backoff: vec![Duration::ZERO],
            batch_pause: Duration::ZERO,
        }
    }

    /// Number of tries each upload phase gets. Never zero: an empty
    /// schedule still means one try.
    #[must_use]
    pub fn tries(&self) -> usize {
        self.backoff.len().max(1)
    }
}
