pub mod manager;
pub mod models;
pub mod operations;
pub mod report;
pub mod traversal;


pub use manager::LifecycleManager;
pub use models::{
    CascadeRoot, DeletionType, LifecycleAction, LifecycleError, LifecycleRequest, Report,
};
pub use operations::{HardDelete, Restore, SoftDelete, Validate, operation_for};
pub use report::ReportAccumulator;
pub use traversal::{CascadeContext, CascadeOperation, Timing, traverse};
