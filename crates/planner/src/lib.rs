// Multi-step action planner/executor and task scheduler
//
// Depends only on runtime-contracts, never on runtime-core: the runtime
// implements ActionInvoker and PlanModelCaller over its own registry and
// model dispatcher and hands this crate trait objects, keeping the
// dependency edge pointing one way.

pub mod action_invoker;
pub mod context;
pub mod error;
pub mod executor;
pub mod generation;
pub mod model_caller;
pub mod scheduler;
pub mod validation;
pub mod working_memory;

pub use action_invoker::ActionInvoker;
pub use context::{AbortHandle, AbortSignal, ActionContext};
pub use error::{PlanError, SchedulerError, StepError};
pub use executor::PlanExecutor;
pub use generation::{generate_plan, PlanConstraints};
pub use model_caller::PlanModelCaller;
pub use scheduler::{InMemoryTaskStore, TaskScheduler, TaskStore, TaskWorker};
pub use validation::validate_plan;
pub use working_memory::WorkingMemory;
