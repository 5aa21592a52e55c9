/*!
Helpers pour tests asynchrones du kernel
*/

use std::time::{Duration, Instant};

/// Init du logging pour tests (RUST_LOG), sans erreur si déjà fait
pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Attend qu'une condition devienne vraie, en la réévaluant toutes les 10ms.
/// Retourne false si `timeout_ms` est dépassé.
pub async fn wait_until<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < Duration::from_millis(timeout_ms) {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let satisfied = condition();
    if !satisfied {
        log::warn!("⏰ Timeout after {}ms waiting for condition", timeout_ms);
    }
    satisfied
}
