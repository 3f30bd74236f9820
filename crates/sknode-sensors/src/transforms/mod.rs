//! Transforms: nodes that consume one or more inputs and produce an output.
//!
//! Every transform recomputes from its most recent inputs and calls `set` on
//! its own output, so chains are built by wiring alone.

pub mod change_filter;
pub mod difference;
pub mod lambda;
pub mod linear;

pub use change_filter::ChangeFilter;
pub use difference::Difference;
pub use lambda::LambdaTransform;
pub use linear::Linear;
