//! A foreman job with an output manager: every worker ships one result
//! payload to the blackboard, which prints it.

use std::sync::Arc;

use foreman::{
    Configuration, Job, OutputManager, Rank, State, TaskAdapter, TaskContext, TaskError,
    TaskFactory, TaskResult,
};

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

/// Prints every result payload as it arrives on the blackboard rank.
struct PrintingManager;

impl OutputManager for PrintingManager {
    fn write(&mut self, source: Rank, payload: &[u8]) {
        println!("rank {}: {}", source, String::from_utf8_lossy(payload));
    }
}

fn main() {
    let matches = foreman::new_app("output_manager").get_matches();
    let configuration = Configuration::from_args(&matches);
    if let Err(error) = Job::new(configuration)
        .with_task_factory(Arc::new(RatioFactory))
        .with_output_manager(Box::new(PrintingManager))
        .run()
    {
        eprintln!("output_manager: {}", error);
        std::process::exit(1);
    }
}
