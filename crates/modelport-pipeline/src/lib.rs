pub mod convert;
pub mod correctness;
pub mod performance;
pub mod samples;
pub mod telemetry;
pub mod tolerance;

pub use convert::*;
pub use correctness::*;
pub use performance::*;
pub use samples::*;
pub use telemetry::*;
pub use tolerance::*;
