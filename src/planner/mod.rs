//! Generation planning.
//!
//! A plan is a description of what an external executor should run, in what
//! order. `auto` mode delegates to the module's aggregate script when one is
//! declared; `chain` mode resolves the per-capability sequence db-bean,
//! document-bean, dao, with transactional-dao appended when discovered or
//! explicitly requested.
//!
//! Every plan passes through preflight before it is returned. Preflight
//! inspects generated-output locations and installed node dependencies;
//! missing outputs are metadata (generation repopulates them), while missing
//! dependencies pause the plan with the exact remedial command. Nothing is
//! ever executed and no state is carried between invocations; resuming a
//! paused plan means invoking the planner again.

pub mod plan;
pub mod preflight;

pub use plan::{plan, GenerationPlan, PlanMode, PlanState, PlanStep};
pub use preflight::{run_preflight, PreflightResult};
