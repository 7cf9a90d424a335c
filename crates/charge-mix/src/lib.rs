pub mod adapter;
pub mod builder;
pub mod config;
pub mod error;
pub mod material;
pub mod optimizer;
pub mod property;
pub mod relax;
pub mod report;
pub mod request;
pub mod sample;

pub use adapter::{BlendStatus, SolvedBlend, SolverAdapter};
pub use builder::{ConstraintBuilder, LinearRow, LpDefinition};
pub use config::{BoundUnits, ConfigError, DisplayUnits, OptimizerConfig, RelaxationConfig, SolverSettings};
pub use error::{ChargeError, InputError};
pub use material::{ElementSet, MaterialBound, RawMaterial, TargetRange};
pub use optimizer::{Attempt, ChargeMixOptimizer, Optimization};
pub use property::{Composition, DerivedProperty, EvaluationMode, LinearForm, PropertyModel};
pub use relax::relax;
pub use report::{BlendReport, BlendResult, MaterialUsage, ResultInterpreter};
pub use request::{ChargeRequest, ValidatedRequest};
