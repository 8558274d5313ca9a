// specforge - requirements refinement engine
// Library exports

pub mod budget;
pub mod config;
pub mod context;
pub mod errors;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod refinement;

pub use errors::RefineError;
pub use refinement::{RefinementSession, SessionEvent};
