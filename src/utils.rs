use std::sync::atomic::{AtomicU64, Ordering};

static CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique connection ID
pub fn generate_connection_id() -> u64 {
    CONNECTION_ID.fetch_add(1, Ordering::SeqCst)
}
