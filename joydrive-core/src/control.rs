//! The fixed-rate control loop
//!
//! One loop owns everything: it polls the input source, shapes the operator
//! commands, appends the periodic spoof traffic and hands the finished
//! batch to the gateway, 100 times a second. Single-threaded by design;
//! cancellation arrives through a shared flag checked once per iteration.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{info, log_enabled, trace, warn, Level};

use crate::command::CommandState;
use crate::frame::FrameBatch;
use crate::gateway::CanGateway;
use crate::input::InputSource;
use crate::rav4::{MessageScheduler, SpoofMode, UiStatus};
use crate::schedule::ScheduleError;

/// Nominal spacing between ticks
pub const TICK_INTERVAL: Duration = Duration::from_millis(10);
/// Sleep between polls while waiting for the next tick boundary
pub const IDLE_SLEEP: Duration = Duration::from_micros(10);

/// Consecutive send failures after which the gateway link counts as lost
///
/// Integrating pedal and steering state against a vehicle that is not
/// receiving commands is unsafe, so the loop gives up quickly.
pub const MAX_CONSECUTIVE_SEND_FAILURES: u32 = 5;

/// Why [`ControlLoop::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation flag was cleared from outside
    Interrupted,
    /// Too many consecutive send failures
    TransportLost,
}

/// Errors that end the loop abnormally
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The input device failed mid-run
    #[error("Input device failure: {0}")]
    Input(#[from] io::Error),

    /// A message table failed validation
    #[error("Invalid message table: {0}")]
    Schedule(#[from] ScheduleError),
}

/// The orchestrating loop
///
/// Generic over the gateway and input source so tests can substitute
/// recording fakes for the hardware.
pub struct ControlLoop<G: CanGateway, I: InputSource> {
    gateway: G,
    input: I,
    scheduler: MessageScheduler,
    state: CommandState,
    running: Arc<AtomicBool>,
    consecutive_failures: u32,
}

impl<G: CanGateway, I: InputSource> ControlLoop<G, I> {
    /// Assembles a loop for `mode`
    ///
    /// `running` is the cancellation flag; the loop runs while it holds
    /// true.
    pub fn new(
        gateway: G,
        input: I,
        mode: SpoofMode,
        running: Arc<AtomicBool>,
    ) -> Result<Self, ControlError> {
        Ok(ControlLoop {
            gateway,
            input,
            scheduler: MessageScheduler::new(mode)?,
            state: CommandState::new(),
            running,
            consecutive_failures: 0,
        })
    }

    /// Runs until the flag clears or the transport is declared lost
    ///
    /// Ticks are scheduled off wall-clock deltas: once [`TICK_INTERVAL`]
    /// has elapsed since the last tick the loop fires and re-anchors on the
    /// current instant. A late tick therefore pushes every following tick
    /// later instead of being made up, and the effective rate can sag under
    /// system load. The vehicle tolerates that; no hard real-time guarantee
    /// is made.
    ///
    /// Input errors other than an empty read are fatal and surface as
    /// [`ControlError::Input`].
    pub fn run(&mut self) -> Result<StopReason, ControlError> {
        info!(
            "Control loop running, {:?} mode, one tick per {:?}",
            self.scheduler.mode(),
            TICK_INTERVAL
        );

        let mut last_tick = Instant::now();
        while self.running.load(Ordering::SeqCst) {
            self.input.poll()?;

            let now = Instant::now();
            if now.duration_since(last_tick) < TICK_INTERVAL {
                thread::sleep(IDLE_SLEEP);
                continue;
            }
            last_tick = now;

            let batch = self.build_batch();
            if log_enabled!(Level::Trace) && !batch.is_empty() {
                trace!("Tick {}, {} frames:\n{}", self.state.tick(), batch.len(), batch);
            }
            self.state.advance_tick();

            if !batch.is_empty() && !self.dispatch(&batch) {
                info!("Gateway link lost, shutting down");
                return Ok(StopReason::TransportLost);
            }
        }

        info!("Interrupted, shutting down");
        Ok(StopReason::Interrupted)
    }

    /// Builds the outgoing batch for the current tick: operator commands
    /// first, then whatever periodic traffic is due
    fn build_batch(&mut self) -> FrameBatch {
        let snapshot = self.input.snapshot();
        let mut batch = FrameBatch::new();

        if self.scheduler.mode().camera_enabled() {
            batch.push(self.state.shape_steering(snapshot.steer_target()));
        }
        if self.scheduler.mode().dsu_enabled() {
            let frame = self.state.shape_acceleration(
                snapshot.accel_held(),
                snapshot.brake_held(),
                snapshot.cancel_held(),
            );
            if let Some(frame) = frame {
                batch.push(frame);
            }
        }

        self.scheduler
            .append_due(&mut batch, self.state.tick(), UiStatus::default(), false);
        batch
    }

    /// Sends one batch, tracking consecutive failures
    ///
    /// Returns false once [`MAX_CONSECUTIVE_SEND_FAILURES`] is reached; a
    /// single success resets the count.
    fn dispatch(&mut self, batch: &FrameBatch) -> bool {
        match self.gateway.send_batch(batch) {
            Ok(()) => {
                self.consecutive_failures = 0;
                true
            }
            Err(error) => {
                self.consecutive_failures += 1;
                warn!(
                    "Batch send failed ({} of {} tolerated): {error}",
                    self.consecutive_failures, MAX_CONSECUTIVE_SEND_FAILURES
                );
                self.consecutive_failures < MAX_CONSECUTIVE_SEND_FAILURES
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CanFrame;
    use crate::gateway::GatewayError;
    use crate::input::InputSnapshot;

    struct FixedInput(InputSnapshot);

    impl InputSource for FixedInput {
        fn poll(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn snapshot(&self) -> InputSnapshot {
            self.0
        }
    }

    /// Clears the shared flag after a fixed number of polls
    struct CountdownInput {
        remaining: u32,
        running: Arc<AtomicBool>,
    }

    impl InputSource for CountdownInput {
        fn poll(&mut self) -> io::Result<()> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.running.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        fn snapshot(&self) -> InputSnapshot {
            InputSnapshot::neutral()
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        batches: Vec<Vec<CanFrame>>,
    }

    impl CanGateway for RecordingGateway {
        fn send_batch(&mut self, batch: &FrameBatch) -> Result<(), GatewayError> {
            self.batches.push(batch.iter().copied().collect());
            Ok(())
        }
    }

    /// Fails or succeeds per a scripted sequence, then succeeds forever
    #[derive(Default)]
    struct ScriptedGateway {
        failures: Vec<bool>,
        call: usize,
    }

    impl CanGateway for ScriptedGateway {
        fn send_batch(&mut self, _batch: &FrameBatch) -> Result<(), GatewayError> {
            let fail = self.failures.get(self.call).copied().unwrap_or(false);
            self.call += 1;
            if fail {
                Err(GatewayError::ShortWrite {
                    sent: 0,
                    expected: 16,
                })
            } else {
                Ok(())
            }
        }
    }

    fn camera_loop(
        snapshot: InputSnapshot,
    ) -> ControlLoop<RecordingGateway, FixedInput> {
        ControlLoop::new(
            RecordingGateway::default(),
            FixedInput(snapshot),
            SpoofMode::Camera,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap()
    }

    #[test]
    fn test_first_tick_camera_batch_order() {
        let mut control = camera_loop(InputSnapshot::neutral());
        let batch = control.build_batch();
        assert_eq!(batch.len(), 35);

        let frames = batch.frames();
        assert_eq!(frames[0].id, 0x2E4);
        assert_eq!(frames[1].id, 0x340);
        assert_eq!(frames[19].id, 0x383);
        assert_eq!(frames[20].id, 0x367);
        assert_eq!(frames[33].id, 0x412);
        assert_eq!(frames[34].id, 0x411);
    }

    #[test]
    fn test_off_boundary_tick_is_steer_only() {
        let mut control = camera_loop(InputSnapshot::neutral());
        control.build_batch();
        control.state.advance_tick();

        let batch = control.build_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.frames()[0].id, 0x2E4);
    }

    #[test]
    fn test_steering_input_reaches_the_frame() {
        let mut snapshot = InputSnapshot::neutral();
        snapshot.axes[0].x = 12000;
        let mut control = camera_loop(snapshot);

        let batch = control.build_batch();
        // First tick of ramping toward 1200: torque 30
        assert_eq!(batch.frames()[0].data[1], 0x00);
        assert_eq!(batch.frames()[0].data[2], 0x1E);
    }

    #[test]
    fn test_dsu_mode_first_batch() {
        let mut control = ControlLoop::new(
            RecordingGateway::default(),
            FixedInput(InputSnapshot::neutral()),
            SpoofMode::Dsu,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        let batch = control.build_batch();
        assert_eq!(batch.len(), 14);
        assert_eq!(batch.frames()[0].id, 0x343);
        assert_eq!(batch.frames()[1].id, 0x141);
    }

    #[test]
    fn test_both_mode_puts_commands_first() {
        let mut control = ControlLoop::new(
            RecordingGateway::default(),
            FixedInput(InputSnapshot::neutral()),
            SpoofMode::Both,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        let batch = control.build_batch();
        assert_eq!(batch.len(), 48);
        assert_eq!(batch.frames()[0].id, 0x2E4);
        assert_eq!(batch.frames()[1].id, 0x343);
        assert_eq!(batch.frames()[2].id, 0x340);
        assert_eq!(batch.frames()[47].id, 0x470);
    }

    #[test]
    fn test_dispatch_gives_up_after_threshold() {
        let mut control = ControlLoop::new(
            ScriptedGateway {
                failures: vec![true; 8],
                ..ScriptedGateway::default()
            },
            FixedInput(InputSnapshot::neutral()),
            SpoofMode::Camera,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        let batch = control.build_batch();
        for _ in 0..4 {
            assert!(control.dispatch(&batch));
        }
        assert!(!control.dispatch(&batch));
    }

    #[test]
    fn test_dispatch_success_resets_the_count() {
        let mut control = ControlLoop::new(
            ScriptedGateway {
                failures: vec![true, true, true, true, false, true, true, true, true],
                ..ScriptedGateway::default()
            },
            FixedInput(InputSnapshot::neutral()),
            SpoofMode::Camera,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        let batch = control.build_batch();
        for _ in 0..9 {
            assert!(control.dispatch(&batch));
        }
    }

    #[test]
    fn test_run_returns_interrupted_on_cleared_flag() {
        let running = Arc::new(AtomicBool::new(true));
        let mut control = ControlLoop::new(
            RecordingGateway::default(),
            CountdownInput {
                remaining: 50,
                running: Arc::clone(&running),
            },
            SpoofMode::Camera,
            running,
        )
        .unwrap();

        let reason = control.run().unwrap();
        assert_eq!(reason, StopReason::Interrupted);
    }

    #[test]
    fn test_run_returns_transport_lost_on_persistent_failure() {
        let mut control = ControlLoop::new(
            ScriptedGateway {
                failures: vec![true; 64],
                ..ScriptedGateway::default()
            },
            FixedInput(InputSnapshot::neutral()),
            SpoofMode::Camera,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap();

        let reason = control.run().unwrap();
        assert_eq!(reason, StopReason::TransportLost);
    }
}
