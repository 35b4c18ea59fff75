//! The worker POMDP: spaces, parameters, priors and solver export.

pub mod export;
pub mod math;
pub mod params;
pub mod pomdp;
pub mod prior;
pub mod reward;
pub mod space;

pub use params::{ParamKey, ParamName, ParamValues, Params, Scope};
pub use pomdp::{ModelTables, PomdpModel, Step};
pub use prior::{PriorVariant, VARIANTS};
pub use reward::Utility;
pub use space::{Action, Dimensions, Observation, Spaces, State, TeachMode};
