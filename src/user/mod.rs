//! The current user: identity transitions and the operations synchronizing them with the backend.
mod ids;
mod legacy;
mod manager;
mod operation_repo;
mod operations;
mod switcher;

pub use ids::{create_local_id, is_local_id};
pub use manager::UserManager;
pub use operation_repo::OperationRepo;
pub use operations::{ExecutionResult, Operation, OperationExecutor, OperationQueue};
pub(crate) use switcher::UserSwitcher;
