//! Keep driver: the tokio loop that fires keep timers and ships outbound
//! notifications.
//!
//! ## Outbound frames
//!
//! Every queued [`Outbound`] message leaves as a [`Frame`]: its subject plus
//! the JSON-serialized [`WorldEvent`] envelope. Frames go out on a tokio
//! broadcast channel; the transport subscribes with [`KeepDriver::subscribe`].
//!
//! A `Captured` keep event forces an immediate realm bonus refresh, so the
//! cached counts never wait out a full refresh interval after a capture.

use crate::bonus::RealmBonusTracker;
use crate::protocol::{KeepEventKind, Outbound, Outbox, WorldEvent};
use crate::registry::KeepRegistry;
use anyhow::Result;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Timer resolution of the loop, in Hz.
    pub tick_rate_hz: f32,
    /// Frames buffered per subscriber before the slowest one lags.
    pub channel_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 1.0,
            channel_capacity: 1024,
        }
    }
}

/// One serialized outbound message.
#[derive(Debug, Clone)]
pub struct Frame {
    pub subject: &'static str,
    pub payload: Bytes,
}

/// What one step of the loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub frame: u64,
    pub firings: usize,
    pub bonuses_refreshed: bool,
}

// ---------------------------------------------------------------------------
// KeepDriver
// ---------------------------------------------------------------------------

pub struct KeepDriver {
    config: DriverConfig,
    registry: Arc<KeepRegistry>,
    bonuses: Arc<RwLock<RealmBonusTracker>>,
    outbox: Arc<Outbox>,
    frames: broadcast::Sender<Frame>,
    frame: u64,
    capture_pending: bool,
}

impl KeepDriver {
    pub fn new(
        config: DriverConfig,
        registry: Arc<KeepRegistry>,
        bonuses: Arc<RwLock<RealmBonusTracker>>,
        outbox: Arc<Outbox>,
    ) -> Self {
        let (frames, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            config,
            registry,
            bonuses,
            outbox,
            frames,
            frame: 0,
            capture_pending: false,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.frames.subscribe()
    }

    pub fn bonuses(&self) -> Arc<RwLock<RealmBonusTracker>> {
        self.bonuses.clone()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Fire due keep timers and refresh bonus counts when they are stale.
    pub fn step(&mut self) -> StepReport {
        self.frame += 1;
        self.outbox.set_frame(self.frame);

        let firings = self.registry.advance_all();

        let services = self.registry.services();
        let now = services.now();
        let interval = services.config.bonus_refresh_interval_ms;
        let due = {
            let bonuses = self.bonuses.read();
            bonuses
                .refreshed_at()
                .map_or(true, |at| now.saturating_sub(at) >= interval)
        };
        let bonuses_refreshed = due || self.capture_pending;
        if bonuses_refreshed {
            self.bonuses.write().refresh(&self.registry, now);
            self.capture_pending = false;
        }

        StepReport {
            frame: self.frame,
            firings,
            bonuses_refreshed,
        }
    }

    /// Serialize and send every queued message. Returns the number sent.
    pub fn publish_pending(&mut self) -> usize {
        let events = self.outbox.drain();
        let mut sent = 0;
        for event in events {
            if matches!(&event.payload, Outbound::Event(e) if e.kind == KeepEventKind::Captured) {
                self.capture_pending = true;
            }
            if publish_event(&self.frames, event.payload.subject(), &event) {
                sent += 1;
            }
        }
        sent
    }

    /// Run exactly `ticks` loop iterations at the configured rate.
    pub async fn run_ticks(&mut self, ticks: u64) -> usize {
        let mut timer = tokio::time::interval(self.tick_period());
        let mut sent = 0;
        for _ in 0..ticks {
            timer.tick().await;
            self.step();
            sent += self.publish_pending();
        }
        sent
    }

    fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f32(1.0 / self.config.tick_rate_hz.max(0.001))
    }

    /// Tick until ctrl-c.
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            keeps = self.registry.len(),
            tick_rate_hz = self.config.tick_rate_hz,
            "keep driver started"
        );

        let period = self.tick_period();
        let tick_handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            loop {
                timer.tick().await;
                let report = self.step();
                let sent = self.publish_pending();
                if report.firings > 0 || sent > 0 {
                    debug!(
                        "frame {}: {} timer firings, {} frames sent",
                        report.frame, report.firings, sent
                    );
                }
            }
        });

        tokio::select! {
            _ = tick_handle => {
                log::error!("Keep driver loop exited unexpectedly");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Keep driver shutting down (SIGINT)");
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Publish helper
// ---------------------------------------------------------------------------

/// Serialize `event` and send it on the frame channel.
///
/// Serialization errors are logged and swallowed. Having no subscriber is
/// not an error.
fn publish_event(frames: &broadcast::Sender<Frame>, subject: &'static str, event: &WorldEvent<Outbound>) -> bool {
    match serde_json::to_vec(event) {
        Ok(payload) => {
            let _ = frames.send(Frame {
                subject,
                payload: Bytes::from(payload),
            });
            true
        }
        Err(e) => {
            warn!("Failed to serialise event for {}: {}", subject, e);
            false
        }
    }
}
