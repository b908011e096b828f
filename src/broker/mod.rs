pub mod registry;
pub mod topic;

pub use registry::Registry;
