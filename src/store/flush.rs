use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;

use super::Inner;

/// 后台 flush：按周期检查 dirty，脏则持锁落盘
///
/// 唯一的主动写盘路径。失败只记录日志，下个周期重试。
/// 收到 shutdown 通知或 store 已被释放即退出。
pub(crate) async fn flush_loop(store: Weak<Inner>, shutdown: Arc<Notify>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval 的第一次 tick 立即完成
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            _ = shutdown.notified() => {
                tracing::debug!("Flush worker stopping");
                return;
            }
        }

        let Some(inner) = store.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().await;
        if state.closed {
            return;
        }
        if !state.dirty {
            continue;
        }
        if let Err(e) = inner.persist_locked(&mut state).await {
            tracing::error!("Background flush failed (retrying next tick): {}", e);
        }
    }
}
