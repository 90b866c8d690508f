//! Policy runtime: memoizing factory, condition decorator, legacy bridge,
//! sequential chain and the per-API manager tying them to flows.

pub mod chain;
pub mod conditional;
pub mod factory;
pub mod legacy;
pub mod manager;

pub use chain::PolicyChain;
pub use conditional::ConditionalPolicy;
pub use factory::DefaultPolicyFactory;
pub use legacy::LegacyPolicyAdapter;
pub use manager::{FlowSource, PolicyManager};
