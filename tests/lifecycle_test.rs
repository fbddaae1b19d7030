//! End-to-end jobs run in-process: every rank lives on its own thread with
//! its own runtime and the ranks talk over localhost.

use std::{
    path::Path,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use foreman::{
    Configuration, Job, OutputManager, Rank, State, TaskAdapter, TaskContext, TaskError,
    TaskFactory, TaskResult,
};

mod utils;

/// Spawns one rank of a job on its own OS thread.
fn spawn_rank(configuration: Configuration, factory: Arc<dyn TaskFactory>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        Job::new(configuration)
            .with_task_factory(factory)
            .run()
            .expect("the job failed");
    })
}

/// Reads the single run log produced under `dir`.
fn read_log(dir: &Path) -> String {
    let mut logs: Vec<_> = std::fs::read_dir(dir)
        .expect("could not list the log dir")
        .map(|entry| entry.expect("could not read a dir entry").path())
        .filter(|path| path.extension().map(|ext| ext == "txt").unwrap_or(false))
        .collect();
    assert_eq!(logs.len(), 1, "expected exactly one run log, got {:?}", logs);
    std::fs::read_to_string(logs.pop().expect("no log file")).expect("could not read the run log")
}

/// A batch task that sleeps proportionally to its rank, then completes.
struct SleepyTask {
    context: TaskContext,
}

impl TaskAdapter for SleepyTask {
    fn initialize(&mut self) -> TaskResult {
        Ok(State::Initialized)
    }

    fn start(&mut self) -> TaskResult {
        thread::sleep(Duration::from_micros(100_000 * self.context.rank() as u64));
        self.context.log("work done");
        Ok(State::Completed)
    }

    fn stop(&mut self) -> TaskResult {
        Ok(State::Terminated)
    }
}

struct SleepyFactory;

impl TaskFactory for SleepyFactory {
    fn create(&self, context: TaskContext) -> Result<Box<dyn TaskAdapter>, TaskError> {
        Ok(Box::new(SleepyTask { context }))
    }
}

#[test]
fn batch_job_completes_and_logs() {
    let dir = tempfile::tempdir().expect("could not create a temp dir");
    let root = dir.path().join("run").to_string_lossy().into_owned();

    let mut ranks = Vec::new();
    for rank in 0..4 {
        let configuration =
            utils::job_configuration(9310, 4, rank).with_log_file_root(&root);
        ranks.push(spawn_rank(configuration, Arc::new(SleepyFactory)));
    }
    for rank in ranks {
        rank.join().expect("a rank thread panicked");
    }

    let log = read_log(dir.path());
    assert!(
        log.contains("Tracker ID 1: state = COMPLETED"),
        "missing task 1 completion in:\n{}",
        log
    );
    assert!(
        log.contains("Tracker ID 2: state = COMPLETED"),
        "missing task 2 completion in:\n{}",
        log
    );
    assert_eq!(
        log.matches("Blackboard stopped.").count(),
        1,
        "expected exactly one blackboard stop record in:\n{}",
        log
    );

    // The job timer spans both workers' sleeps (0.2 s and 0.3 s, concurrent).
    let elapsed: f64 = log
        .split("Elapsed time for all tasks (seconds): ")
        .nth(1)
        .expect("missing the elapsed-time record")
        .split_whitespace()
        .next()
        .expect("empty elapsed-time record")
        .parse()
        .expect("unparsable elapsed-time record");
    assert!(elapsed > 0.2, "elapsed {} not above 0.2 s", elapsed);
}

/// A batch task that ships one result payload before completing.
struct RatioTask {
    context: TaskContext,
}

impl TaskAdapter for RatioTask {
    fn initialize(&mut self) -> TaskResult {
        Ok(State::Initialized)
    }

    fn start(&mut self) -> TaskResult {
        let ratio = 1.5 * self.context.task_id() as f64;
        self.context
            .send_results(&format!("results: ratio * id = {}", ratio));
        Ok(State::Completed)
    }

    fn stop(&mut self) -> TaskResult {
        Ok(State::Terminated)
    }
}

struct RatioFactory;

impl TaskFactory for RatioFactory {
    fn create(&self, context: TaskContext) -> Result<Box<dyn TaskAdapter>, TaskError> {
        Ok(Box::new(RatioTask { context }))
    }
}

struct CollectingManager {
    results: Arc<Mutex<Vec<(Rank, String)>>>,
}

impl OutputManager for CollectingManager {
    fn write(&mut self, source: Rank, payload: &[u8]) {
        self.results
            .lock()
            .expect("poisoned results")
            .push((source, String::from_utf8_lossy(payload).into_owned()));
    }
}

#[test]
fn output_manager_receives_one_result_per_worker() {
    let dir = tempfile::tempdir().expect("could not create a temp dir");
    let root = dir.path().join("run").to_string_lossy().into_owned();
    let results = Arc::new(Mutex::new(Vec::new()));

    let mut ranks = Vec::new();
    for rank in 0..4 {
        let configuration =
            utils::job_configuration(9320, 4, rank).with_log_file_root(&root);
        let factory: Arc<dyn TaskFactory> = Arc::new(RatioFactory);
        if rank == 1 {
            let manager = Box::new(CollectingManager {
                results: results.clone(),
            });
            ranks.push(thread::spawn(move || {
                Job::new(configuration)
                    .with_task_factory(factory)
                    .with_output_manager(manager)
                    .run()
                    .expect("the blackboard rank failed");
            }));
        } else {
            ranks.push(spawn_rank(configuration, factory));
        }
    }
    for rank in ranks {
        rank.join().expect("a rank thread panicked");
    }

    let mut results = results.lock().expect("poisoned results").clone();
    results.sort();
    assert_eq!(results.len(), 2, "expected one result per worker");
    assert_eq!(results[0].0, 2);
    assert_eq!(results[1].0, 3);
    for (_, payload) in &results {
        assert!(!payload.is_empty());
        assert!(payload.contains("ratio * id ="), "payload: {}", payload);
    }
}

/// A long-running task: `start` returns `RUNNING` and the task finishes only
/// when stopped. Task 1 asks the controller to stop the whole job.
struct StubbornTask {
    context: TaskContext,
}

impl TaskAdapter for StubbornTask {
    fn initialize(&mut self) -> TaskResult {
        Ok(State::Initialized)
    }

    fn start(&mut self) -> TaskResult {
        if self.context.task_id() == 1 {
            thread::sleep(Duration::from_millis(150));
            self.context.request_stop();
        } else {
            thread::sleep(Duration::from_millis(10));
        }
        Ok(State::Running)
    }

    fn stop(&mut self) -> TaskResult {
        Ok(State::Terminated)
    }
}

struct StubbornFactory;

impl TaskFactory for StubbornFactory {
    fn create(&self, context: TaskContext) -> Result<Box<dyn TaskAdapter>, TaskError> {
        Ok(Box::new(StubbornTask { context }))
    }
}

#[test]
fn forced_stop_terminates_running_tasks() {
    let dir = tempfile::tempdir().expect("could not create a temp dir");
    let root = dir.path().join("run").to_string_lossy().into_owned();

    let mut ranks = Vec::new();
    for rank in 0..4 {
        let configuration =
            utils::job_configuration(9330, 4, rank).with_log_file_root(&root);
        ranks.push(spawn_rank(configuration, Arc::new(StubbornFactory)));
    }
    for rank in ranks {
        rank.join().expect("a rank thread panicked");
    }

    let log = read_log(dir.path());
    assert!(
        log.contains("Controller: received stop request."),
        "missing the stop request record in:\n{}",
        log
    );
    let stopping = log
        .find("Controller stopping all tasks.")
        .expect("missing the stop-all record");
    let terminated = log
        .rfind("state = TERMINATED")
        .expect("missing a terminated transition");
    assert!(
        stopping < terminated,
        "stop-all record must precede the terminated transition in:\n{}",
        log
    );
    assert_eq!(log.matches("Blackboard stopped.").count(), 1);
}

#[test]
fn below_minimum_process_count_is_a_clean_noop() {
    let dir = tempfile::tempdir().expect("could not create a temp dir");
    let root = dir.path().join("run").to_string_lossy().into_owned();

    let mut ranks = Vec::new();
    for rank in 0..2 {
        let configuration =
            utils::job_configuration(9340, 2, rank).with_log_file_root(&root);
        ranks.push(spawn_rank(configuration, Arc::new(SleepyFactory)));
    }
    for rank in ranks {
        rank.join().expect("a rank thread panicked");
    }

    // No role loop ran: the blackboard never opened a run log.
    let logs = std::fs::read_dir(dir.path())
        .expect("could not list the log dir")
        .count();
    assert_eq!(logs, 0, "no run log may be created below the minimum");
}
