//! Profiler Module
//!
//! An observability sink notified before and after every native execution.

use crate::core::db::ParameterContainer;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Receives start/finish notifications around executions.
pub trait Profiler: Send + Sync {
    fn profiler_start(&self, sql: &str, parameters: Option<&ParameterContainer>);

    fn profiler_finish(&self);
}

/// Shared handle to a profiler, held by the driver, connections and statements.
pub type SharedProfiler = Arc<dyn Profiler>;

/// One profiled execution.
#[derive(Debug, Clone)]
pub struct Profile {
    pub sql: String,
    pub parameters: Option<ParameterContainer>,
    pub started_at: DateTime<Utc>,
    /// `None` while the execution is still running
    pub elapsed: Option<Duration>,
}

#[derive(Debug, Default)]
struct ProfilerState {
    profiles: Vec<Profile>,
    running: Option<Instant>,
}

/// Profiler that keeps every profile in memory.
#[derive(Debug, Default)]
pub struct QueryProfiler {
    state: Mutex<ProfilerState>,
}

impl QueryProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor returning a shareable handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.lock().profiles.clone()
    }

    pub fn last_profile(&self) -> Option<Profile> {
        self.lock().profiles.last().cloned()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.profiles.clear();
        state.running = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProfilerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Profiler for QueryProfiler {
    fn profiler_start(&self, sql: &str, parameters: Option<&ParameterContainer>) {
        let mut state = self.lock();
        state.profiles.push(Profile {
            sql: sql.to_string(),
            parameters: parameters.cloned(),
            started_at: Utc::now(),
            elapsed: None,
        });
        state.running = Some(Instant::now());
    }

    fn profiler_finish(&self) {
        let mut state = self.lock();
        let Some(started) = state.running.take() else {
            return;
        };
        if let Some(profile) = state.profiles.last_mut() {
            let elapsed = started.elapsed();
            profile.elapsed = Some(elapsed);
            debug!(sql = %profile.sql, elapsed_us = elapsed.as_micros() as u64, "profiled execution");
        }
    }
}
