//! Simulated remote table used by the `bench` command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thiserror::Error;

use agenda_core::Loader;

/// Error returned when the simulated backend drops a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("backend unavailable while loading {key}")]
pub struct BackendUnavailable {
    pub key: String,
}

/// A remote table with fixed latency and a seeded failure rate.
pub struct SimulatedBackend {
    latency: Duration,
    failure_rate: f64,
    rng: Mutex<ChaCha8Rng>,
    calls: AtomicU64,
}

impl SimulatedBackend {
    pub fn new(latency: Duration, failure_rate: f64, seed: u64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of loads that reached the backend.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Loader for SimulatedBackend {
    type Value = String;
    type Error = BackendUnavailable;

    async fn load(&self, key: &str) -> Result<String, BackendUnavailable> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let fail = self.rng.lock().gen_bool(self.failure_rate);
        tokio::time::sleep(self.latency).await;

        if fail {
            Err(BackendUnavailable {
                key: key.to_string(),
            })
        } else {
            Ok(format!("row<{key}>"))
        }
    }
}
