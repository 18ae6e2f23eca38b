//! End-to-end runs of the engine with in-memory sources/sinks and scripted workers.

use anyhow::{Result, bail};
use blaster::data::{RecordSource, ResultSink};
use blaster::engine::fingerprint::Fingerprint;
use blaster::run::blast_files;
use blaster::utils::SharedOutput;
use blaster::{
    Blaster, CallContext, EngineConfig, Opts, Payload, RunInputs, SkipSet, Summary, Worker,
    WorkerRegistry,
};
use crossbeam_channel::{Receiver, Sender, bounded};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// --- helpers ---

/// In-memory writer that keeps its buffer reachable after being boxed.
#[derive(Clone, Default)]
struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

struct MemorySource {
    headers: Arc<[String]>,
    rows: std::vec::IntoIter<Vec<String>>,
}

impl MemorySource {
    fn ids(n: usize) -> Self {
        let rows: Vec<Vec<String>> = (1..=n)
            .map(|i| vec![i.to_string(), format!("name-{i}")])
            .collect();
        Self {
            headers: vec!["id".to_string(), "name".to_string()].into(),
            rows: rows.into_iter(),
        }
    }
}

impl RecordSource for MemorySource {
    fn headers(&self) -> &Arc<[String]> {
        &self.headers
    }

    fn read(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.rows.next())
    }
}

/// Source that yields one record, then fails.
struct BrokenSource {
    headers: Arc<[String]>,
    served: bool,
}

impl RecordSource for BrokenSource {
    fn headers(&self) -> &Arc<[String]> {
        &self.headers
    }

    fn read(&mut self) -> Result<Option<Vec<String>>> {
        if self.served {
            bail!("disk on fire");
        }
        self.served = true;
        Ok(Some(vec!["1".to_string()]))
    }
}

#[derive(Clone, Default)]
struct MemorySink {
    rows: Arc<Mutex<Vec<Vec<String>>>>,
    flushes: Arc<Mutex<usize>>,
}

impl MemorySink {
    fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }

    fn flushes(&self) -> usize {
        *self.flushes.lock().unwrap()
    }
}

impl ResultSink for MemorySink {
    fn write(&mut self, fields: &[String]) -> Result<()> {
        self.rows.lock().unwrap().push(fields.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Echoes the payload with `status: ok`, remembering every id it saw.
struct EchoWorker {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Worker for EchoWorker {
    fn send(&self, _ctx: &CallContext, payload: &Payload) -> Result<Payload> {
        if let Some(id) = payload.get("id").and_then(|v| v.as_str()) {
            self.seen.lock().unwrap().push(id.to_string());
        }
        let mut out = payload.clone();
        out.insert("status".into(), "ok".into());
        Ok(out)
    }
}

/// Fails for the listed ids, succeeds otherwise.
struct FailOn {
    ids: Vec<&'static str>,
}

impl Worker for FailOn {
    fn send(&self, _ctx: &CallContext, payload: &Payload) -> Result<Payload> {
        let id = payload.get("id").and_then(|v| v.as_str()).unwrap_or("");
        if self.ids.contains(&id) {
            bail!("boom on {}", id);
        }
        Ok(payload.clone())
    }
}

/// Signals when a call starts, then blocks until the gate closes.
struct GateWorker {
    started: Sender<()>,
    gate: Receiver<()>,
}

impl Worker for GateWorker {
    fn send(&self, _ctx: &CallContext, payload: &Payload) -> Result<Payload> {
        let _ = self.started.send(());
        let _ = self.gate.recv();
        Ok(payload.clone())
    }
}

fn config(worker: &str, workers: usize) -> EngineConfig {
    let opts = Opts {
        worker_type: Some(worker.to_string()),
        workers,
        rate: f64::INFINITY,
        soft_timeout_ms: 20_000,
        hard_timeout_ms: 30_000,
        status_interval_ms: 60_000,
        log_output: vec!["status".to_string()],
        ..Opts::default()
    };
    EngineConfig::from_opts(&opts).unwrap()
}

fn quiet(blaster: Blaster) -> (Blaster, CaptureBuffer) {
    let buf = CaptureBuffer::default();
    (blaster.with_output(SharedOutput::new(buf.clone())), buf)
}

fn run(blaster: &Blaster, source: impl RecordSource + 'static, sink: &MemorySink) -> Summary {
    run_with_skip(blaster, source, sink, SkipSet::empty())
}

fn run_with_skip(
    blaster: &Blaster,
    source: impl RecordSource + 'static,
    sink: &MemorySink,
    skip: SkipSet,
) -> Summary {
    blaster
        .run(RunInputs {
            source: Box::new(source),
            sink: Box::new(sink.clone()),
            skip,
            rate_input: None,
        })
        .unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("blaster-test-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

// --- scenarios ---

#[test]
fn test_three_records_all_succeed() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_w = Arc::clone(&seen);
    let (mut blaster, out) = quiet(Blaster::new(config("echo", 1)));
    blaster.register_worker_type("echo", move || {
        Box::new(EchoWorker {
            seen: Arc::clone(&seen_w),
        })
    });
    let sink = MemorySink::default();

    let summary = run(&blaster, MemorySource::ids(3), &sink);

    assert!(summary.fatal_error.is_none());
    assert!(!summary.interrupted);
    assert_eq!(summary.counters.dispatched, 3);
    assert_eq!(summary.counters.succeeded, 3);
    assert_eq!(summary.counters.failed, 0);
    assert_eq!(summary.counters.errors_ignored, 0);
    assert_eq!(sink.rows().len(), 3);
    assert_eq!(sink.flushes(), 1);
    // Pool of one: executed in input order.
    assert_eq!(*seen.lock().unwrap(), vec!["1", "2", "3"]);
    assert!(out.contents().contains("All processes finished."));
}

#[test]
fn test_log_rows_carry_hash_fields_and_outputs() {
    let (mut blaster, _out) = quiet(Blaster::new(config("echo", 2)));
    blaster.register_worker_type("echo", || {
        Box::new(EchoWorker {
            seen: Arc::default(),
        })
    });
    let sink = MemorySink::default();
    run(&blaster, MemorySource::ids(2), &sink);

    let mut rows = sink.rows();
    rows.sort_by(|a, b| a[1].cmp(&b[1]));
    assert_eq!(
        rows[0],
        vec![
            Fingerprint::of(&["1", "name-1"]).to_string(),
            "1".to_string(),
            "name-1".to_string(),
            "ok".to_string(),
        ]
    );
    assert_eq!(rows[1][1], "2");
}

#[test]
fn test_first_failure_is_fatal_and_run_drains() {
    let (mut blaster, out) = quiet(Blaster::new(config("fail-first", 1)));
    blaster.register_worker_type("fail-first", || Box::new(FailOn { ids: vec!["1"] }));
    let sink = MemorySink::default();

    let summary = run(&blaster, MemorySource::ids(3), &sink);

    let err = summary.fatal_error.as_ref().expect("fatal error recorded");
    assert!(format!("{:#}", err).contains("boom on 1"));
    assert!(!summary.interrupted);
    let c = summary.counters;
    assert_eq!(c.failed, 1);
    assert_eq!(c.errors_ignored, 0);
    // Records handed out before the cancel landed still finish and get logged.
    assert_eq!(c.dispatched, c.succeeded + c.failed);
    assert_eq!(sink.rows().len() as u64, c.succeeded);
    assert_eq!(sink.flushes(), 1);
    assert!(out.contents().contains("Fatal error"));
}

#[test]
fn test_later_failures_are_only_counted() {
    let (blaster, _out) = quiet(Blaster::new(config("fail", 3)));
    let sink = MemorySink::default();

    let summary = run(&blaster, MemorySource::ids(20), &sink);

    assert!(summary.fatal_error.is_some());
    let c = summary.counters;
    assert!(c.failed >= 1);
    assert_eq!(c.errors_ignored, c.failed - 1);
    assert_eq!(c.succeeded, 0);
    assert_eq!(c.dispatched, c.failed);
    assert!(sink.rows().is_empty());
    assert_eq!(sink.flushes(), 1);
}

#[test]
fn test_exactly_one_outcome_per_dispatched_record() {
    let (mut blaster, _out) = quiet(Blaster::new(config("mixed", 4)));
    blaster.register_worker_type("mixed", || Box::new(FailOn { ids: vec!["7"] }));
    let sink = MemorySink::default();

    let summary = run(&blaster, MemorySource::ids(50), &sink);

    let c = summary.counters;
    assert_eq!(c.dispatched, c.succeeded + c.failed);
    assert_eq!(sink.rows().len() as u64, c.succeeded);
    assert_eq!(c.in_flight, 0);
    // The failing record never shows up in the log.
    assert!(sink.rows().iter().all(|r| r[1] != "7"));
}

#[test]
fn test_source_read_error_is_fatal() {
    let (blaster, _out) = quiet(Blaster::new(config("dummy", 1)));
    let sink = MemorySink::default();
    let source = BrokenSource {
        headers: vec!["id".to_string()].into(),
        served: false,
    };

    let summary = run(&blaster, source, &sink);

    let err = summary.fatal_error.expect("read error is fatal");
    assert!(format!("{:#}", err).contains("disk on fire"));
    assert_eq!(sink.flushes(), 1);
}

#[test]
fn test_skip_set_records_never_reach_worker() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_w = Arc::clone(&seen);
    let (mut blaster, _out) = quiet(Blaster::new(config("echo", 2)));
    blaster.register_worker_type("echo", move || {
        Box::new(EchoWorker {
            seen: Arc::clone(&seen_w),
        })
    });
    let skip: SkipSet = [Fingerprint::of(&["2", "name-2"])].into_iter().collect();
    let sink = MemorySink::default();

    let summary = run_with_skip(&blaster, MemorySource::ids(3), &sink, skip);

    assert_eq!(summary.counters.dispatched, 2);
    assert_eq!(summary.counters.skipped, 1);
    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["1", "3"]);
}

#[test]
fn test_interrupt_finishes_in_flight_and_stops_dispatch() {
    let (started_tx, started_rx) = bounded::<()>(16);
    let (gate_tx, gate_rx) = bounded::<()>(0);
    let (mut blaster, _out) = quiet(Blaster::new(config("gate", 2)));
    blaster.register_worker_type("gate", move || {
        Box::new(GateWorker {
            started: started_tx.clone(),
            gate: gate_rx.clone(),
        })
    });
    let cancel = blaster.cancel_token();
    let sink = MemorySink::default();
    let sink_run = sink.clone();

    let handle = thread::spawn(move || run(&blaster, MemorySource::ids(10), &sink_run));

    for _ in 0..2 {
        started_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("worker call started");
    }
    cancel.cancel();
    drop(gate_tx);
    let summary = handle.join().unwrap();

    assert!(summary.interrupted);
    assert!(summary.fatal_error.is_none());
    assert_eq!(summary.counters.dispatched, 2);
    assert_eq!(summary.counters.succeeded, 2);
    assert_eq!(sink.rows().len(), 2);
    assert_eq!(sink.flushes(), 1);
    assert!(started_rx.try_recv().is_err());
}

#[test]
fn test_hard_timeout_fails_the_call() {
    let opts = Opts {
        worker_type: Some("dummy".to_string()),
        workers: 1,
        rate: f64::INFINITY,
        soft_timeout_ms: 20,
        hard_timeout_ms: 50,
        status_interval_ms: 60_000,
        ..Opts::default()
    };
    let (mut blaster, _out) = quiet(Blaster::new(EngineConfig::from_opts(&opts).unwrap()));
    let (_gate_tx, gate_rx) = bounded::<()>(0);
    let (started_tx, _started_rx) = bounded::<()>(16);
    blaster.register_worker_type("dummy", move || {
        Box::new(GateWorker {
            started: started_tx.clone(),
            gate: gate_rx.clone(),
        })
    });
    let sink = MemorySink::default();

    let summary = run(&blaster, MemorySource::ids(1), &sink);

    let err = summary.fatal_error.expect("hard timeout is a failure");
    assert!(format!("{:#}", err).contains("hard timeout"));
    assert_eq!(summary.counters.hard_timeouts, 1);
    assert!(sink.rows().is_empty());
}

#[test]
fn test_start_failure_is_startup_error() {
    struct NoStart;
    impl Worker for NoStart {
        fn start(&self, _ctx: &CallContext, _p: &Payload) -> Result<()> {
            bail!("cannot connect")
        }
        fn send(&self, _ctx: &CallContext, p: &Payload) -> Result<Payload> {
            Ok(p.clone())
        }
    }
    let (mut blaster, _out) = quiet(Blaster::new(config("nostart", 2)));
    blaster.register_worker_type("nostart", || Box::new(NoStart));
    let sink = MemorySink::default();

    let res = blaster.run(RunInputs {
        source: Box::new(MemorySource::ids(3)),
        sink: Box::new(sink.clone()),
        skip: SkipSet::empty(),
        rate_input: None,
    });

    assert!(res.is_err());
    assert_eq!(sink.flushes(), 0);
}

#[test]
fn test_unknown_worker_type_is_startup_error() {
    let (blaster, _out) = quiet(Blaster::new(config("nope", 1)));
    let res = blaster.run(RunInputs {
        source: Box::new(MemorySource::ids(1)),
        sink: Box::new(MemorySink::default()),
        skip: SkipSet::empty(),
        rate_input: None,
    });
    assert!(res.is_err());
}

#[test]
fn test_rate_input_unpauses_run_and_reports_bad_lines() {
    let opts = Opts {
        worker_type: Some("dummy".to_string()),
        workers: 1,
        rate: 0.0,
        status_interval_ms: 60_000,
        ..Opts::default()
    };
    let (blaster, out) = quiet(Blaster::new(EngineConfig::from_opts(&opts).unwrap()));
    let input = std::io::Cursor::new(b"abc\n-3\n\n25\n".to_vec());

    // Starts paused: the run can only finish once "25" has been applied.
    let summary = blaster
        .run(RunInputs {
            source: Box::new(MemorySource::ids(3)),
            sink: Box::new(MemorySink::default()),
            skip: SkipSet::empty(),
            rate_input: Some(Box::new(input)),
        })
        .unwrap();

    assert!(summary.fatal_error.is_none());
    assert_eq!(summary.counters.dispatched, 3);
    let rates: Vec<f64> = summary.segments.iter().map(|s| s.rate).collect();
    assert_eq!(rates, vec![0.0, 25.0]);
    let text = out.contents();
    assert!(text.contains("Enter a new rate"));
    assert!(text.contains("Invalid rate \"abc\""));
    assert!(text.contains("Invalid rate \"-3\""));
}

#[test]
fn test_status_lines_are_printed_during_run() {
    let opts = Opts {
        worker_type: Some("dummy".to_string()),
        workers: 1,
        rate: f64::INFINITY,
        status_interval_ms: 10,
        worker_payload: serde_json::from_value(json!({ "delay_ms": 30 })).unwrap(),
        ..Opts::default()
    };
    let (blaster, out) = quiet(Blaster::new(EngineConfig::from_opts(&opts).unwrap()));

    let summary = run(&blaster, MemorySource::ids(5), &MemorySink::default());

    assert_eq!(summary.counters.succeeded, 5);
    let text = out.contents();
    assert!(
        text.lines().any(|l| l.starts_with("rate max/s | dispatched")),
        "no status line in:\n{text}"
    );
}

#[test]
fn test_interrupt_lets_delayed_dummy_calls_complete() {
    let opts = Opts {
        worker_type: Some("dummy".to_string()),
        workers: 2,
        rate: f64::INFINITY,
        status_interval_ms: 60_000,
        worker_payload: serde_json::from_value(json!({ "delay_ms": 500 })).unwrap(),
        ..Opts::default()
    };
    let (blaster, _out) = quiet(Blaster::new(EngineConfig::from_opts(&opts).unwrap()));
    let cancel = blaster.cancel_token();
    let sink = MemorySink::default();
    let sink_run = sink.clone();

    let handle = thread::spawn(move || run(&blaster, MemorySource::ids(10), &sink_run));
    thread::sleep(Duration::from_millis(100));
    cancel.cancel();
    let summary = handle.join().unwrap();

    assert!(summary.interrupted);
    assert!(summary.fatal_error.is_none());
    let c = summary.counters;
    assert_eq!(c.dispatched, 2);
    assert_eq!(c.succeeded, 2);
    assert_eq!(c.failed, 0);
    assert_eq!(c.errors_ignored, 0);
    assert_eq!(sink.rows().len(), 2);
}

// --- file-backed resume ---

fn file_opts(dir: &std::path::Path) -> Opts {
    let data = dir.join("data.csv");
    std::fs::write(&data, "id,name\n1,a\n2,b\n3,c\n").unwrap();
    Opts {
        data: Some(data),
        log: Some(dir.join("log.csv")),
        worker_type: Some("dummy".to_string()),
        workers: 2,
        rate: f64::INFINITY,
        rate_input: false,
        status_interval_ms: 60_000,
        ..Opts::default()
    }
}

#[test]
fn test_rerun_with_log_dispatches_nothing() {
    let dir = temp_dir("resume");
    let opts = file_opts(&dir);
    let out = SharedOutput::new(CaptureBuffer::default());

    let first = blast_files(&opts, WorkerRegistry::with_defaults(), out.clone(), |_| Ok(())).unwrap();
    assert_eq!(first.counters.dispatched, 3);
    let log = std::fs::read_to_string(dir.join("log.csv")).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines[0], "hash,id,name");
    assert_eq!(lines.len(), 4);

    let second = blast_files(&opts, WorkerRegistry::with_defaults(), out, |_| Ok(())).unwrap();
    assert_eq!(second.counters.dispatched, 0);
    assert_eq!(second.counters.skipped, 3);
    // No duplicate header on append.
    let log = std::fs::read_to_string(dir.join("log.csv")).unwrap();
    assert_eq!(log.lines().count(), 4);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_partial_log_resumes_remaining_records() {
    let dir = temp_dir("partial");
    let opts = file_opts(&dir);
    let hash = Fingerprint::of(&["2", "b"]);
    std::fs::write(dir.join("log.csv"), format!("hash,id,name\n{hash},2,b\n")).unwrap();

    let summary = blast_files(
        &opts,
        WorkerRegistry::with_defaults(),
        SharedOutput::new(CaptureBuffer::default()),
        |_| Ok(()),
    )
    .unwrap();

    assert_eq!(summary.counters.dispatched, 2);
    assert_eq!(summary.counters.skipped, 1);
    let log = std::fs::read_to_string(dir.join("log.csv")).unwrap();
    assert_eq!(log.lines().count(), 4);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_data_file_is_startup_error() {
    let dir = temp_dir("missing");
    let mut opts = file_opts(&dir);
    opts.data = Some(dir.join("nope.csv"));
    let res = blast_files(
        &opts,
        WorkerRegistry::with_defaults(),
        SharedOutput::new(CaptureBuffer::default()),
        |_| Ok(()),
    );
    assert!(res.is_err());
    assert!(!dir.join("log.csv").exists());
    let _ = std::fs::remove_dir_all(&dir);
}
