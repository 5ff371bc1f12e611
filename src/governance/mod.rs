// ABOUTME: Agent governance control plane: policy, approval tokens, audit chain, rate limits.
// ABOUTME: Every component is a function over a ConfigDir snapshot plus an explicit persist step.

pub mod approval;
pub mod audit;
pub mod gate;
pub mod policy;
pub mod ratelimit;

pub use approval::*;
pub use audit::*;
pub use gate::*;
pub use policy::*;
pub use ratelimit::*;
