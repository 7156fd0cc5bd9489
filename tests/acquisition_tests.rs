//! End-to-end acquisition scenarios against simulated cameras
//!
//! Each scenario wires a registry, a display link and one or more
//! acquisition threads, drives a small batch from the test thread, and
//! asserts the observable protocol: event ordering, queue consumption,
//! trigger counters and recovery behavior.

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use fringesync::{
    acquisition::{self, AcquisitionConfig, AcquisitionShared, AcquisitionThread},
    camera::{CameraBackend, CameraProbe, SimulatedCamera, SimulatedCameraConfig},
    display::{DisplayConfig, DisplayLink},
    events::{wait_any, CameraCode, DrawCode, EventRegistry, WaitOutcome},
    frames::{FrameMetadata, FrameQueue, PatternKind},
};

struct Rig {
    registry: Arc<EventRegistry>,
    display: Arc<DisplayLink>,
    queue: Arc<FrameQueue>,
}

impl Rig {
    fn new(display_config: DisplayConfig) -> Self {
        Self {
            registry: EventRegistry::new_shared().unwrap(),
            display: Arc::new(DisplayLink::new(display_config).unwrap()),
            queue: Arc::new(FrameQueue::new()),
        }
    }

    fn start_camera(
        &self,
        camera_config: SimulatedCameraConfig,
        fail_triggers: u64,
        acq: AcquisitionConfig,
    ) -> (AcquisitionThread, Arc<CameraProbe>, usize) {
        let camera_id = self.registry.add_camera().unwrap();
        let mut camera = SimulatedCamera::new(camera_config);
        let probe = camera.probe();
        camera.fail_next_triggers(fail_triggers);
        let shared = AcquisitionShared::new(
            AcquisitionConfig { camera_id, ..acq },
            Arc::clone(&self.registry),
            Arc::clone(&self.display),
            Arc::clone(&self.queue),
            Box::new(camera),
        );
        let thread = AcquisitionThread::start(shared).unwrap();
        wait_until_parked(&thread.shared());
        (thread, probe, camera_id)
    }

    fn queue_frames(&self, count: u64, exposure_us: f64) {
        for key in 0..count {
            self.queue.push_back(
                FrameMetadata::new(key, PatternKind::Normal, 200.0, exposure_us)
                    .with_last_frame(key + 1 == count),
            );
        }
    }

    fn send_trigger_when_ready(&self, camera_id: usize) {
        let ready = self.registry.event(CameraCode::Ready, camera_id).unwrap();
        let outcome = wait_any(&[ready.fd()], Some(Duration::from_secs(5))).unwrap();
        assert_eq!(outcome, WaitOutcome::Signaled(0), "camera never became ready");
        ready.reset();
        self.registry.set(CameraCode::SendTrigger, camera_id).unwrap();
    }

    fn await_event(&self, code: CameraCode, camera_id: usize) {
        let event = self.registry.event(code, camera_id).unwrap();
        let outcome = wait_any(&[event.fd()], Some(Duration::from_secs(5))).unwrap();
        assert_eq!(outcome, WaitOutcome::Signaled(0), "{:?} never fired", code);
    }
}

fn wait_until_parked(shared: &Arc<AcquisitionShared>) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !shared.is_waiting() {
        assert!(Instant::now() < deadline, "thread never parked");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Backend whose exposure negotiation takes long enough for control signals
/// to land while batch preparation is still running
struct SlowPrepareCamera {
    prepare_delay: Duration,
}

impl CameraBackend for SlowPrepareCamera {
    fn name(&self) -> &str {
        "slow-prepare"
    }

    fn trigger(&mut self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn adjust_exposure_and_delay(
        &mut self,
        requested_us: f64,
        _hardware_delay_us: Option<f64>,
    ) -> f64 {
        thread::sleep(self.prepare_delay);
        requested_us
    }

    fn start_transfer(&mut self) -> bool {
        true
    }

    fn stop_transfer(&mut self) -> bool {
        true
    }

    fn finish_exposure(&mut self, _frame: &FrameMetadata, _scheduled_end: Option<Instant>) -> bool {
        true
    }
}

#[cfg(test)]
mod acquisition_tests {
    use super::*;

    /// Test: non-blocking batch consumes the queue and signals completion
    #[test]
    fn test_non_blocking_batch_completes() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            ..DisplayConfig::default()
        });
        let (thread, probe, camera_id) = rig.start_camera(
            SimulatedCameraConfig::default(),
            0,
            AcquisitionConfig {
                requested_exposure_us: 2_000.0,
                ..AcquisitionConfig::default()
            },
        );

        rig.queue_frames(5, 2_000.0);
        acquisition::prepare_cameras(&rig.registry, &[camera_id], Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(probe.attempted(), 0);

        for _ in 0..5 {
            rig.send_trigger_when_ready(camera_id);
        }
        let outcome = acquisition::await_last_frames(
            &rig.registry,
            &[camera_id],
            Some(Duration::from_secs(10)),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::AllSignaled);

        let shared = thread.shared();
        assert_eq!(shared.trigger_count(), 5);
        assert!(rig.queue.is_empty(), "all records consumed");
        assert_eq!(probe.attempted(), 5);
        assert_eq!(probe.succeeded(), 5);
        assert_eq!(probe.finished(), 5);
        assert_eq!(shared.trigger_duration_stats().count(), 5);

        thread.stop().unwrap();
    }

    /// Test: blocking non-concurrent cycle runs trigger, render handshake,
    /// exposure window and present request in order
    #[test]
    fn test_blocking_cycle_ordering() {
        let rig = Rig::new(DisplayConfig::default());
        let exposure_us = 10_000.0;
        let (thread, probe, camera_id) = rig.start_camera(
            SimulatedCameraConfig::default(),
            0,
            AcquisitionConfig {
                requested_exposure_us: exposure_us,
                ..AcquisitionConfig::default()
            },
        );
        let projector = rig.registry.add_projector().unwrap();
        acquisition::configure_projector_barriers(&rig.registry, projector, 1).unwrap();

        rig.queue_frames(1, exposure_us);
        acquisition::prepare_cameras(&rig.registry, &[camera_id], Some(Duration::from_secs(5)))
            .unwrap();

        // Stage the presentation side before triggering
        rig.registry.set(DrawCode::RenderReady, projector).unwrap();
        rig.registry.set(DrawCode::PresentReady, projector).unwrap();

        let trigger_time = Instant::now();
        rig.send_trigger_when_ready(camera_id);

        rig.await_event(CameraCode::ExposureBegin, camera_id);
        rig.await_event(CameraCode::LastFrameDone, camera_id);

        // The exposure window must have elapsed before the frame completed
        assert!(
            trigger_time.elapsed() >= Duration::from_micros(exposure_us as u64),
            "frame completed before the exposure window elapsed"
        );

        // The camera consumed RenderReady and requested the next render
        assert!(!rig.registry.is_signaled(DrawCode::RenderReady, projector).unwrap());
        assert!(rig.registry.is_signaled(DrawCode::Render, projector).unwrap());

        // After the transfer it consumed PresentReady, requested the flip
        // and reported ready again
        rig.await_event(CameraCode::Ready, camera_id);
        assert!(!rig.registry.is_signaled(DrawCode::PresentReady, projector).unwrap());
        assert!(rig.registry.is_signaled(DrawCode::Present, projector).unwrap());

        assert!(rig.queue.is_empty());
        assert_eq!(probe.succeeded(), 1);
        thread.stop().unwrap();
    }

    /// Test: a failed trigger in non-blocking mode drops the frame and
    /// moves on; the batch still completes
    #[test]
    fn test_non_blocking_trigger_failure_drops_frame() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            ..DisplayConfig::default()
        });
        let (thread, probe, camera_id) = rig.start_camera(
            SimulatedCameraConfig::default(),
            1,
            AcquisitionConfig {
                requested_exposure_us: 1_000.0,
                ..AcquisitionConfig::default()
            },
        );

        rig.queue_frames(2, 1_000.0);
        acquisition::prepare_cameras(&rig.registry, &[camera_id], Some(Duration::from_secs(5)))
            .unwrap();

        // First trigger fails and frame 0 is dropped
        rig.send_trigger_when_ready(camera_id);
        // Second trigger captures frame 1, the last of the batch
        rig.send_trigger_when_ready(camera_id);

        let outcome = acquisition::await_last_frames(
            &rig.registry,
            &[camera_id],
            Some(Duration::from_secs(10)),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::AllSignaled);

        let shared = thread.shared();
        assert_eq!(probe.attempted(), 2);
        assert_eq!(probe.succeeded(), 1);
        assert_eq!(shared.trigger_count(), 1, "only the successful trigger counts");
        assert!(rig.queue.is_empty(), "the dropped record left the queue too");
        thread.stop().unwrap();
    }

    /// Test: a lost exposure confirmation re-triggers a fixed pattern
    /// through the watchdog
    #[test]
    fn test_fixed_pattern_watchdog_retrigger() {
        // Callback-driven device that never confirms: every exposure times
        // out. 1 kHz refresh and a tiny floor keep the watchdog short.
        let rig = Rig::new(DisplayConfig {
            refresh_num: 1_000,
            blocking: false,
            fixed_pattern: true,
            ..DisplayConfig::default()
        });
        let (thread, probe, camera_id) = rig.start_camera(
            SimulatedCameraConfig {
                callback_driven: true,
                ..SimulatedCameraConfig::default()
            },
            0,
            AcquisitionConfig {
                requested_exposure_us: 1_000.0,
                watchdog_floor_us: 30_000.0,
                ..AcquisitionConfig::default()
            },
        );

        acquisition::prepare_cameras(&rig.registry, &[camera_id], Some(Duration::from_secs(5)))
            .unwrap();
        rig.send_trigger_when_ready(camera_id);

        // Each lost confirmation fires the watchdog, which re-triggers
        let deadline = Instant::now() + Duration::from_secs(5);
        while probe.attempted() < 3 {
            assert!(Instant::now() < deadline, "watchdog never re-triggered");
            thread::sleep(Duration::from_millis(5));
        }

        assert!(probe.attempted() >= 3);
        assert_eq!(probe.finished(), 0, "no exposure ever completed");
        thread.stop().unwrap();
    }

    /// Test: re-homing a parked thread to new instances, including the
    /// idempotent no-op path
    #[test]
    fn test_id_change_rendezvous() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            ..DisplayConfig::default()
        });
        let (thread, _probe, camera_a) = rig.start_camera(
            SimulatedCameraConfig::default(),
            0,
            AcquisitionConfig::default(),
        );
        let camera_b = rig.registry.add_camera().unwrap();
        let projector_b = {
            let _first = rig.registry.add_projector().unwrap();
            rig.registry.add_projector().unwrap()
        };

        // Same ids: a no-op, no rendezvous attempted
        thread.set_new_camera_and_encoder_id(camera_a, 0).unwrap();
        assert_eq!(thread.shared().camera_id(), camera_a);

        thread.set_new_camera_and_encoder_id(camera_b, 0).unwrap();
        assert_eq!(thread.shared().camera_id(), camera_b);
        assert!(
            !rig.registry.is_signaled(CameraCode::ChangeId, camera_b).unwrap(),
            "the thread acknowledged by resetting the event"
        );

        // The ack lands before the thread is back in its wait state
        wait_until_parked(&thread.shared());
        thread.set_new_projector_id(projector_b).unwrap();
        assert_eq!(thread.shared().projector_id(), projector_b);

        // The re-homed thread still answers on the new instance
        wait_until_parked(&thread.shared());
        rig.queue_frames(1, 1_000.0);
        acquisition::prepare_cameras(&rig.registry, &[camera_b], Some(Duration::from_secs(5)))
            .unwrap();
        rig.send_trigger_when_ready(camera_b);
        let outcome = acquisition::await_last_frames(
            &rig.registry,
            &[camera_b],
            Some(Duration::from_secs(10)),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::AllSignaled);

        thread.stop().unwrap();
    }

    /// Test: two cameras on one projector complete a shared non-blocking
    /// batch independently
    #[test]
    fn test_two_cameras_shared_batch() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            ..DisplayConfig::default()
        });
        let config = AcquisitionConfig {
            requested_exposure_us: 1_000.0,
            ..AcquisitionConfig::default()
        };
        let (thread_a, probe_a, camera_a) =
            rig.start_camera(SimulatedCameraConfig::default(), 0, config.clone());
        let (thread_b, probe_b, camera_b) =
            rig.start_camera(SimulatedCameraConfig::default(), 0, config);

        // Both cameras walk the same queue; records are shared, so only the
        // first consumer pops each one
        rig.queue_frames(3, 1_000.0);
        let cameras = [camera_a, camera_b];
        acquisition::prepare_cameras(&rig.registry, &cameras, Some(Duration::from_secs(5)))
            .unwrap();

        for _ in 0..3 {
            rig.send_trigger_when_ready(camera_a);
        }
        // Camera A owns the batch tail; camera B just idles after prepare
        let outcome = acquisition::await_last_frames(
            &rig.registry,
            &[camera_a],
            Some(Duration::from_secs(10)),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::AllSignaled);

        assert_eq!(probe_a.succeeded(), 3);
        assert_eq!(probe_b.attempted(), 0);
        assert!(acquisition::stop_all_transfers(&[thread_a.shared(), thread_b.shared()]));

        thread_a.stop().unwrap();
        thread_b.stop().unwrap();
    }

    /// Test: replay detection over a camera set
    #[test]
    fn test_all_replay_sources_conjunction() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            ..DisplayConfig::default()
        });
        let (thread, _probe, _camera_id) = rig.start_camera(
            SimulatedCameraConfig::default(),
            0,
            AcquisitionConfig::default(),
        );

        assert!(!acquisition::all_replay_sources(&[thread.shared()]));
        assert!(!acquisition::all_replay_sources(&[]), "empty set counts as live");
        thread.stop().unwrap();
    }

    /// Test: a Terminate posted while batch preparation is running survives
    /// the batch-event reset and stops the thread
    #[test]
    fn test_terminate_survives_batch_preparation() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            ..DisplayConfig::default()
        });
        let camera_id = rig.registry.add_camera().unwrap();
        let shared = AcquisitionShared::new(
            AcquisitionConfig {
                camera_id,
                ..AcquisitionConfig::default()
            },
            Arc::clone(&rig.registry),
            Arc::clone(&rig.display),
            Arc::clone(&rig.queue),
            Box::new(SlowPrepareCamera {
                prepare_delay: Duration::from_millis(100),
            }),
        );
        let thread = AcquisitionThread::start(shared).unwrap();
        wait_until_parked(&thread.shared());

        rig.registry.set(CameraCode::Prepare, camera_id).unwrap();
        thread::sleep(Duration::from_millis(30));
        rig.registry.set(CameraCode::Terminate, camera_id).unwrap();
        rig.await_event(CameraCode::PrepareDone, camera_id);

        // The thread must consume the signal and exit; a wiped signal leaves
        // it parked in its wait state instead
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            assert!(
                Instant::now() < deadline,
                "stop signal was lost during batch preparation"
            );
            let consumed = !rig
                .registry
                .is_signaled(CameraCode::Terminate, camera_id)
                .unwrap();
            if consumed && !thread.shared().is_waiting() {
                thread::sleep(Duration::from_millis(100));
                if !thread.shared().is_waiting() {
                    break;
                }
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }
        thread.stop().unwrap();
    }

    /// Test: trigger-failure recovery re-signals through RepeatTrigger only,
    /// never alongside a pending SendTrigger
    #[test]
    fn test_retry_uses_repeat_trigger_exclusively() {
        let rig = Rig::new(DisplayConfig {
            fixed_pattern: true,
            ..DisplayConfig::default()
        });
        let projector = rig.registry.add_projector().unwrap();
        acquisition::configure_projector_barriers(&rig.registry, projector, 1).unwrap();
        let (thread, probe, camera_id) = rig.start_camera(
            SimulatedCameraConfig::default(),
            2,
            AcquisitionConfig {
                projector_id: projector,
                requested_exposure_us: 2_000.0,
                ..AcquisitionConfig::default()
            },
        );
        acquisition::prepare_cameras(&rig.registry, &[camera_id], Some(Duration::from_secs(5)))
            .unwrap();
        rig.send_trigger_when_ready(camera_id);

        let deadline = Instant::now() + Duration::from_secs(5);
        while probe.succeeded() < 1 {
            assert!(Instant::now() < deadline, "retries never recovered");
            let send = rig
                .registry
                .is_signaled(CameraCode::SendTrigger, camera_id)
                .unwrap();
            let repeat = rig
                .registry
                .is_signaled(CameraCode::RepeatTrigger, camera_id)
                .unwrap();
            assert!(!(send && repeat), "send and repeat trigger pending together");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(probe.attempted(), 3);
        assert_eq!(probe.succeeded(), 1);
        assert!(!rig
            .registry
            .is_signaled(CameraCode::SendTrigger, camera_id)
            .unwrap());
        thread.stop().unwrap();
    }

    /// Test: a pre-trigger lead reaching past the monotonic clock's origin
    /// is treated as an elapsed deadline, and the frame still completes
    #[test]
    fn test_oversized_trigger_lead_is_treated_as_elapsed() {
        let rig = Rig::new(DisplayConfig {
            blocking: false,
            trigger_lead_us: 1e15,
            ..DisplayConfig::default()
        });
        let (thread, probe, camera_id) = rig.start_camera(
            SimulatedCameraConfig::default(),
            0,
            AcquisitionConfig {
                requested_exposure_us: 2_000.0,
                ..AcquisitionConfig::default()
            },
        );
        rig.queue.push_back(
            FrameMetadata::new(0, PatternKind::Normal, 0.0, 2_000.0)
                .with_scheduled_present(Instant::now() + Duration::from_millis(5))
                .with_last_frame(true),
        );
        acquisition::prepare_cameras(&rig.registry, &[camera_id], Some(Duration::from_secs(5)))
            .unwrap();
        rig.send_trigger_when_ready(camera_id);

        let outcome = acquisition::await_last_frames(
            &rig.registry,
            &[camera_id],
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(outcome, WaitOutcome::AllSignaled);
        assert_eq!(probe.succeeded(), 1);
        thread.stop().unwrap();
    }
}
