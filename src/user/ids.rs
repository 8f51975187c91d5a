//! Locally generated ids. A user or subscription created on the device gets a `local-` id until
//! the backend assigns its permanent id.
use uuid::Uuid;

const LOCAL_PREFIX: &str = "local-";

/// Create a new local id.
pub fn create_local_id() -> String {
    format!("{LOCAL_PREFIX}{}", Uuid::new_v4())
}

/// Returns `true` if `id` was generated by [`create_local_id`].
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_PREFIX)
}
