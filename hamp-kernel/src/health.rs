use crate::laundry::fetcher::FetchError;
use crate::laundry::LaundryRegistry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::task;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub rooms_tracked: u32,
    pub pollers_running: u32,
    pub live_viewers: u32,
    pub poll_successes: u64,
    pub poll_failures: u64,
    pub memory_usage_mb: f32,
    pub rooms: Vec<RoomHealth>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RoomHealth {
    pub room: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    poll_successes: Arc<AtomicU64>,
    poll_failures: Arc<AtomicU64>,
    rooms: Arc<parking_lot::Mutex<HashMap<String, RoomHealth>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            poll_successes: Arc::new(AtomicU64::new(0)),
            poll_failures: Arc::new(AtomicU64::new(0)),
            rooms: Arc::new(parking_lot::Mutex::new(HashMap::new())),
        }
    }

    pub fn record_poll_success(&self, room: &str, at: OffsetDateTime) {
        self.poll_successes.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.lock();
        let entry = rooms.entry(room.to_string()).or_default();
        entry.last_success = Some(at);
        entry.last_error = None;
        entry.consecutive_failures = 0;
    }

    pub fn record_poll_failure(&self, room: &str, error: &FetchError) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.lock();
        let entry = rooms.entry(room.to_string()).or_default();
        entry.last_error = Some(error.to_string());
        entry.consecutive_failures += 1;
    }

    pub fn get_health(&self, registry: &LaundryRegistry) -> KernelHealth {
        let tracked = self.rooms.lock();
        let rooms = registry
            .rooms()
            .iter()
            .map(|r| {
                let mut health = tracked.get(r.slug()).cloned().unwrap_or_default();
                health.room = r.slug().to_string();
                health
            })
            .collect::<Vec<_>>();

        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            rooms_tracked: rooms.len() as u32,
            pollers_running: registry.running_pollers() as u32,
            live_viewers: registry.live_viewers() as u32,
            poll_successes: self.poll_successes.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            memory_usage_mb: get_memory_usage_mb(),
            rooms,
        }
    }

    /// Log périodique d'un résumé de santé
    pub fn spawn_health_reporter(&self, registry: Arc<LaundryRegistry>, every: Duration) {
        let health_tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
            // le premier tick est immédiat, rien d'intéressant à dire au démarrage
            interval.tick().await;

            loop {
                interval.tick().await;
                let health = health_tracker.get_health(&registry);
                info!(
                    "uptime {}s, {} viewers, polls ok/failed {}/{}",
                    health.uptime_seconds, health.live_viewers, health.poll_successes, health.poll_failures
                );
                for room in health.rooms.iter().filter(|r| r.consecutive_failures > 0) {
                    warn!(
                        room = %room.room,
                        failures = room.consecutive_failures,
                        "upstream failing: {}",
                        room.last_error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        });
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return (kb as f32) / 1024.0; // KB -> MB
                        }
                    }
                }
            }
        }
    }

    0.0
}
