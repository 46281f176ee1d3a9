pub mod artifact;
pub mod metadata;
pub mod runner;
pub mod sample;
pub mod tensor;

pub use artifact::*;
pub use metadata::*;
pub use runner::*;
pub use sample::*;
pub use tensor::*;
