pub mod host;
pub mod reports;
pub mod script;
pub mod simulation;
pub mod tester;

pub use host::{HostError, ScriptedHost};
pub use script::{Activity, Script, ScriptError, ScriptStep};
pub use simulation::{
    SessionPlan, SessionSummary, SimulationExpectation, SimulationPlan, SimulationSummary,
    Simulator, StorageTarget,
};
pub use tester::*;
