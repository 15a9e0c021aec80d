pub use crate::errors::{skip, ErrorKind, MetamorphicError, SourceFault};
pub use crate::generator::{CaseGenerator, ParameterGrid, TestingStrategy};
pub use crate::relation::{
    BatchFnSystem, FnSystem, MetamorphicRelation, MrId, SutId, System, TestOutcome,
};
pub use crate::runner::{run_suite, write_json_reports, RunConfig, RunSummary};
pub use crate::suite::{RelationBuilder, Suite};
pub use crate::value::{ParamMap, Value};

pub mod case;
pub mod errors;
pub mod generator;
pub mod loader;
pub mod params;
pub mod queue;
pub mod relation;
pub mod relations;
pub mod report;
pub mod runner;
pub mod suite;
pub mod value;
