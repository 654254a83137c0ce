pub mod contract;
pub mod receipt;
pub mod registry;

pub use contract::{Contract, ContractSpec, CONTRACT_MULTIPLIER};
pub use receipt::Receipt;
pub use registry::Options;
