use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use otaflow_core::*;

/// Holds transfer steps until opened
#[derive(Default)]
struct Gate(AtomicBool);

impl Gate {
    fn closed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn open(&self) {
        self.0.store(true, Ordering::Release);
    }

    fn wait(&self) {
        while !self.0.load(Ordering::Acquire) {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

#[derive(Clone, Default)]
struct Script {
    begin_error: Option<TransportError>,
    steps: u64,
    chunk: u64,
    total: Option<u64>,
    fail_at: Option<u64>,
    panic_at: Option<u64>,
    finish_error: Option<TransportError>,
    step_delay: Duration,
    gate: Option<Arc<Gate>>,
    finish_gate: Option<Arc<Gate>>,
}

impl Script {
    fn image(steps: u64, chunk: u64) -> Self {
        Self {
            steps,
            chunk,
            total: Some(steps * chunk),
            ..Self::default()
        }
    }
}

struct ScriptedTransport {
    script: Script,
    begins: AtomicU32,
}

impl ScriptedTransport {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            begins: AtomicU32::new(0),
        })
    }

    fn begins(&self) -> u32 {
        self.begins.load(Ordering::SeqCst)
    }
}

impl FirmwareTransport for ScriptedTransport {
    fn begin(&self, _request: &UpdateRequest) -> Result<Box<dyn FirmwareSession>, TransportError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.script.begin_error {
            return Err(err.clone());
        }
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            done: 0,
        }))
    }
}

struct ScriptedSession {
    script: Script,
    done: u64,
}

impl FirmwareSession for ScriptedSession {
    fn image_descriptor(&mut self) -> Result<ImageDescriptor, TransportError> {
        Ok(ImageDescriptor {
            project_name: "demo".to_string(),
            version: "2.0.0".to_string(),
            ..ImageDescriptor::default()
        })
    }

    fn total_size(&self) -> Option<u64> {
        self.script.total
    }

    fn step(&mut self) -> StepOutcome {
        if let Some(gate) = &self.script.gate {
            gate.wait();
        }
        if !self.script.step_delay.is_zero() {
            thread::sleep(self.script.step_delay);
        }
        if self.script.panic_at == Some(self.done) {
            panic!("flash write fault at step {}", self.done);
        }
        if self.script.fail_at == Some(self.done) {
            return StepOutcome::Error(TransportError::Connection("connection reset".to_string()));
        }
        if self.done == self.script.steps {
            return StepOutcome::Done;
        }
        self.done += 1;
        StepOutcome::InProgress(self.bytes_read())
    }

    fn bytes_read(&self) -> u64 {
        self.done * self.script.chunk
    }

    fn finish(self: Box<Self>) -> Result<(), TransportError> {
        if let Some(gate) = &self.script.finish_gate {
            gate.wait();
        }
        match self.script.finish_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct RecordingRestart {
    restarts: AtomicU32,
}

impl RecordingRestart {
    fn count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

impl ProcessControl for RecordingRestart {
    fn restart(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
    }
}

fn orchestrator(script: Script) -> (Orchestrator, Arc<RecordingRestart>) {
    with_transport(ScriptedTransport::new(script))
}

fn with_transport(transport: Arc<ScriptedTransport>) -> (Orchestrator, Arc<RecordingRestart>) {
    let process = Arc::new(RecordingRestart::default());
    let config = OrchestratorConfig::default().with_grace_period(Duration::from_millis(50));
    let args = OrchestratorArgs::new(transport, process.clone()).with_config(config);
    (Orchestrator::new(args), process)
}

fn wait_for_flags(orchestrator: &Orchestrator, expected: Flags) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !orchestrator.flags().contains(expected) {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {expected:?}, flags are {:?}",
            orchestrator.flags()
        );
        thread::sleep(Duration::from_millis(2));
    }
}

fn wait_for_status(orchestrator: &Orchestrator, expected: UpdateStatus) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = orchestrator.status();
        if status == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {expected}, status is {status}"
        );
        thread::sleep(Duration::from_millis(2));
    }
}

const URL: &str = "https://fw.example.com/v2.bin";

#[test]
fn test_successful_update_restarts_after_grace() {
    let (ota, process) = orchestrator(Script::image(10, 10_000));

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Succeeded);

    assert_eq!(ota.progress(), 100_000);
    assert_eq!(ota.total_size(), Some(100_000));
    assert_eq!(ota.percent(), Some(100.0));
    assert!(ota.message().is_empty());
    assert_eq!(ota.image_descriptor().unwrap().version, "2.0.0");

    assert_eq!(ota.tick(), TickOutcome::Finished);
    assert_eq!(ota.tick(), TickOutcome::AwaitingGrace);
    assert_eq!(process.count(), 0);

    thread::sleep(Duration::from_millis(80));
    assert_eq!(ota.tick(), TickOutcome::Restarting);
    assert_eq!(process.count(), 1);
    assert_eq!(ota.status(), UpdateStatus::Idle);
    assert!(ota.image_descriptor().is_none());
}

#[test]
fn test_trigger_while_updating_is_rejected() {
    let gate = Gate::closed();
    let (ota, _) = orchestrator(Script {
        gate: Some(gate.clone()),
        ..Script::image(4, 256)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Updating);
    let progress = ota.progress();
    let message = ota.message();

    let err = ota.trigger(UpdateRequest::new("https://fw.example.com/other.bin"));

    assert_eq!(err, Err(OtaError::AlreadyRunning));
    assert_eq!(ota.progress(), progress);
    assert_eq!(ota.message(), message);

    gate.open();
    wait_for_status(&ota, UpdateStatus::Succeeded);
    assert_eq!(ota.progress(), 1024);
}

#[test]
fn test_failed_attempt_must_be_acknowledged() {
    let (ota, process) = orchestrator(Script {
        begin_error: Some(TransportError::Connection("connection refused".to_string())),
        ..Script::default()
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Failed);

    assert_eq!(
        ota.trigger(UpdateRequest::new(URL)),
        Err(OtaError::NotFullyFinished)
    );

    assert_eq!(ota.tick(), TickOutcome::Finished);
    thread::sleep(Duration::from_millis(80));
    assert_eq!(ota.tick(), TickOutcome::Reset);

    assert_eq!(process.count(), 0);
    assert_eq!(ota.status(), UpdateStatus::Idle);
    assert!(ota.trigger(UpdateRequest::new(URL)).is_ok());
    wait_for_status(&ota, UpdateStatus::Failed);
}

#[test]
fn test_begin_failure_reports_stage_and_cause() {
    let (ota, _) = orchestrator(Script {
        begin_error: Some(TransportError::Connection("connection refused".to_string())),
        ..Script::default()
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Failed);

    let message = ota.message();
    assert!(message.starts_with("begin failed:"), "{message}");
    assert!(message.contains("connection refused"), "{message}");
    assert!(message.contains("(at "), "{message}");
    assert!(ota.image_descriptor().is_none());
    assert_eq!(ota.progress(), 0);
    assert!(!ota.flags().contains(Flags::REQUEST_SUCCEEDED));
}

#[test]
fn test_transfer_and_finish_failures() {
    let (ota, _) = orchestrator(Script {
        fail_at: Some(3),
        ..Script::image(10, 100)
    });
    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Failed);
    assert!(ota.message().starts_with("transfer failed:"));
    assert_eq!(ota.progress(), 300);

    let (ota, _) = orchestrator(Script {
        finish_error: Some(TransportError::Verification("image header magic".to_string())),
        ..Script::image(2, 100)
    });
    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Failed);
    assert!(ota.message().starts_with("finish failed:"));
    assert!(ota.message().contains("image header magic"));
}

#[test]
fn test_abort_during_transfer() {
    let gate = Gate::closed();
    let (ota, process) = orchestrator(Script {
        gate: Some(gate.clone()),
        ..Script::image(100, 1_000)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Updating);

    assert!(ota.abort().is_ok());
    assert_eq!(ota.abort(), Err(OtaError::AbortAlreadyRequested));

    gate.open();
    wait_for_status(&ota, UpdateStatus::Failed);

    assert_eq!(ota.message(), ABORT_MESSAGE);
    assert!(ota.progress() < 100_000);
    let flags = ota.flags();
    assert!(!flags.contains(Flags::REQUEST_SUCCEEDED));
    assert!(!flags.contains(Flags::ABORT_REQUESTED));

    ota.tick();
    thread::sleep(Duration::from_millis(80));
    assert_eq!(ota.tick(), TickOutcome::Reset);
    assert_eq!(process.count(), 0);
}

#[test]
fn test_abort_without_attempt() {
    let (ota, _) = orchestrator(Script::image(1, 1));

    assert_eq!(ota.abort(), Err(OtaError::NothingRunning));

    ota.start_worker().unwrap();
    assert_eq!(ota.abort(), Err(OtaError::NothingRunning));
}

#[test]
fn test_worker_lifecycle() {
    let (ota, _) = orchestrator(Script::image(1, 1));

    assert!(ota.end_worker().is_ok());

    ota.start_worker().unwrap();
    assert!(ota.flags().contains(Flags::WORKER_RUNNING));
    assert_eq!(ota.start_worker(), Err(OtaError::AlreadyRunning));

    ota.end_worker().unwrap();
    assert!(!ota.flags().contains(Flags::WORKER_RUNNING));
    assert!(ota.end_worker().is_ok());

    // trigger brings the worker back
    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Succeeded);
}

#[test]
fn test_invalid_urls_leave_flags_untouched() {
    let (ota, _) = orchestrator(Script::image(1, 1));
    ota.start_worker().unwrap();
    let before = ota.flags();

    assert_eq!(ota.trigger(UpdateRequest::new("")), Err(OtaError::EmptyUrl));
    assert!(matches!(
        ota.trigger(UpdateRequest::new("not-a-url")),
        Err(OtaError::InvalidUrl(_))
    ));

    assert_eq!(ota.flags(), before);
    assert_eq!(ota.status(), UpdateStatus::Idle);
}

#[test]
fn test_progress_never_decreases() {
    let (ota, _) = orchestrator(Script {
        step_delay: Duration::from_millis(2),
        ..Script::image(50, 512)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();

    let mut last = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while ota.status() != UpdateStatus::Succeeded {
        let progress = ota.progress();
        assert!(progress >= last, "progress went from {last} to {progress}");
        last = progress;
        assert!(Instant::now() < deadline);
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(ota.progress(), 50 * 512);
}

#[test]
fn test_unknown_total_size() {
    let (ota, _) = orchestrator(Script {
        total: None,
        ..Script::image(3, 10)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Succeeded);

    assert_eq!(ota.total_size(), None);
    assert_eq!(ota.percent(), None);
    assert_eq!(ota.progress(), 30);
}

#[test]
fn test_tick_throttles_progress_logs() {
    let gate = Gate::closed();
    let (ota, _) = orchestrator(Script {
        gate: Some(gate.clone()),
        ..Script::image(2, 10)
    });

    assert_eq!(ota.tick(), TickOutcome::Idle);

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Updating);

    assert_eq!(ota.tick(), TickOutcome::InProgress { logged: true });
    assert_eq!(ota.tick(), TickOutcome::InProgress { logged: false });

    gate.open();
    wait_for_status(&ota, UpdateStatus::Succeeded);
    assert_eq!(ota.tick(), TickOutcome::Finished);
}

#[test]
fn test_end_worker_right_after_trigger_leaves_nothing_pending() {
    let (ota, _) = orchestrator(Script::image(1, 1));

    for _ in 0..200 {
        ota.trigger(UpdateRequest::new(URL)).unwrap();
        ota.end_worker().unwrap();

        let flags = ota.flags();
        assert!(
            !flags.intersects(
                Flags::WORKER_RUNNING
                    | Flags::IN_FLIGHT
                    | Flags::ABORT_REQUESTED
                    | Flags::END_REQUESTED
            ),
            "{flags:?}"
        );
        assert_eq!(ota.status(), UpdateStatus::Idle);
        assert_eq!(ota.abort(), Err(OtaError::NothingRunning));

        // Either the attempt ran to completion or it was dropped with a message.
        if !flags.contains(Flags::REQUEST_FINISHED) {
            assert_eq!(ota.message(), DROPPED_MESSAGE);
        }
    }
}

#[test]
fn test_concurrent_triggers_are_serialized() {
    let gate = Gate::closed();
    let transport = ScriptedTransport::new(Script {
        gate: Some(gate.clone()),
        ..Script::image(2, 64)
    });
    let (ota, _) = with_transport(transport.clone());
    ota.start_worker().unwrap();

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| ota.trigger(UpdateRequest::new(URL))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == OtaError::AlreadyRunning)
    );

    gate.open();
    wait_for_status(&ota, UpdateStatus::Succeeded);
    assert_eq!(transport.begins(), 1);
}

#[test]
fn test_end_worker_waits_for_attempt_in_flight() {
    let gate = Gate::closed();
    let (ota, _) = orchestrator(Script {
        gate: Some(gate.clone()),
        ..Script::image(3, 100)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Updating);

    thread::scope(|s| {
        let ending = s.spawn(|| ota.end_worker());

        thread::sleep(Duration::from_millis(50));
        assert!(!ending.is_finished());
        assert_eq!(ota.status(), UpdateStatus::Updating);

        gate.open();
        assert_eq!(ending.join().unwrap(), Ok(()));
    });

    let flags = ota.flags();
    assert!(flags.contains(Flags::REQUEST_FINISHED | Flags::REQUEST_SUCCEEDED));
    assert!(!flags.contains(Flags::WORKER_RUNNING));
    assert_eq!(ota.progress(), 300);
}

#[test]
fn test_abort_while_verifying_is_ignored() {
    let finish_gate = Gate::closed();
    let (ota, _) = orchestrator(Script {
        finish_gate: Some(finish_gate.clone()),
        ..Script::image(2, 100)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Verifying);

    assert!(ota.abort().is_ok());
    assert!(ota.flags().contains(Flags::ABORT_REQUESTED));

    finish_gate.open();
    wait_for_status(&ota, UpdateStatus::Succeeded);

    assert!(!ota.flags().contains(Flags::ABORT_REQUESTED));
    assert!(ota.message().is_empty());
    assert_eq!(ota.abort(), Err(OtaError::NothingRunning));
}

#[test]
fn test_transport_panic_fails_attempt() {
    let transport = ScriptedTransport::new(Script {
        panic_at: Some(1),
        ..Script::image(4, 100)
    });
    let (ota, _) = with_transport(transport.clone());

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_flags(&ota, Flags::WORKER_ENDED);

    let flags = ota.flags();
    assert!(flags.contains(Flags::REQUEST_FINISHED));
    assert!(!flags.intersects(Flags::REQUEST_SUCCEEDED | Flags::IN_FLIGHT | Flags::WORKER_RUNNING));
    let message = ota.message();
    assert!(message.starts_with("transfer failed: worker panicked"), "{message}");
    assert_eq!(ota.progress(), 100);

    assert!(ota.end_worker().is_ok());

    // A fresh worker picks up the next trigger.
    let deadline = Instant::now() + Duration::from_secs(5);
    while ota.trigger(UpdateRequest::new(URL)).is_err() {
        assert!(Instant::now() < deadline, "worker never came back");
        thread::sleep(Duration::from_millis(2));
    }
    wait_for_flags(&ota, Flags::WORKER_ENDED);
    assert_eq!(transport.begins(), 2);
}

#[test]
fn test_descriptor_kept_for_attempt_after_reset() {
    let (ota, _) = orchestrator(Script {
        fail_at: Some(1),
        ..Script::image(2, 10)
    });

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Failed);
    assert_eq!(ota.tick(), TickOutcome::Finished);
    thread::sleep(Duration::from_millis(80));
    assert_eq!(ota.tick(), TickOutcome::Reset);
    assert!(ota.image_descriptor().is_none());

    ota.trigger(UpdateRequest::new(URL)).unwrap();
    wait_for_status(&ota, UpdateStatus::Failed);
    assert_eq!(ota.image_descriptor().unwrap().project_name, "demo");
}
