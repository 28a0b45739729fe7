use std::sync::Arc;

use uuid::Uuid;

/// Generates candidate worker identifiers.
///
/// The pool calls it again whenever it returns an identifier that is already
/// tracked, so a generator with a small output space can stall the pool.
pub type IdFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Default identifier generator: a random UUID v4 as 32 lowercase hex chars.
///
/// Callers must not depend on the format.
pub fn default_id() -> String {
    Uuid::new_v4().simple().to_string()
}
