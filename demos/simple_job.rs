//! A minimal foreman job: every worker sleeps proportionally to its rank,
//! then completes.
//!
//! Launch one process per rank, e.g. for a 4-rank job on one machine:
//!
//! ```text
//! simple_job --index 0 --addresses 127.0.0.1:9000,127.0.0.1:9001,127.0.0.1:9002,127.0.0.1:9003 &
//! simple_job --index 1 --addresses ... &
//! simple_job --index 2 --addresses ... &
//! simple_job --index 3 --addresses ... &
//! ```

use std::{sync::Arc, thread, time::Duration};

use foreman::{
    Configuration, Job, State, TaskAdapter, TaskContext, TaskError, TaskFactory, TaskResult,
};

struct SleepTask {
    context: TaskContext,
}

impl TaskAdapter for SleepTask {
    fn initialize(&mut self) -> TaskResult {
        self.context.log("initialized");
        Ok(State::Initialized)
    }

    fn start(&mut self) -> TaskResult {
        let pause = Duration::from_micros(100_000 * self.context.rank() as u64);
        tracing::info!("{} sleeping for {:?}", self.context.name(), pause);
        thread::sleep(pause);
        self.context.log("work done");
        Ok(State::Completed)
    }

    fn stop(&mut self) -> TaskResult {
        Ok(State::Terminated)
    }
}

struct SleepFactory;

impl TaskFactory for SleepFactory {
    fn create(&self, context: TaskContext) -> Result<Box<dyn TaskAdapter>, TaskError> {
        Ok(Box::new(SleepTask { context }))
    }
}

fn main() {
    let matches = foreman::new_app("simple_job").get_matches();
    let configuration = Configuration::from_args(&matches);
    if let Err(error) = Job::new(configuration)
        .with_task_factory(Arc::new(SleepFactory))
        .run()
    {
        eprintln!("simple_job: {}", error);
        std::process::exit(1);
    }
}
