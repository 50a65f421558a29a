//! 退出信号处理
//!
//! Unix 下监听 SIGINT / SIGTERM，其余平台监听 Ctrl+C。

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// 退出原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断信号 (Ctrl+C)
    Interrupt,
    /// 终止信号 (SIGTERM)
    Terminate,
}

/// 等待第一个退出信号。
///
/// 信号处理器注册失败时记录错误并永久挂起，服务继续运行，
/// 只能由外部强制结束。
pub async fn wait_for_signal() -> ShutdownReason {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(i), Ok(t)) => (i, t),
                (Err(e), _) | (_, Err(e)) => {
                    error!("信号处理器注册失败: {}", e);
                    return std::future::pending().await;
                }
            };

        tokio::select! {
            _ = sigint.recv() => {
                info!("接收到SIGINT信号 (Ctrl+C)");
                ShutdownReason::Interrupt
            }
            _ = sigterm.recv() => {
                info!("接收到SIGTERM信号");
                ShutdownReason::Terminate
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("监听Ctrl+C信号失败: {}", e);
            return std::future::pending().await;
        }
        info!("接收到Ctrl+C信号");
        ShutdownReason::Interrupt
    }
}

/// 运行服务直到 `server` 结束；`started` 触发（已收到退出信号）后最多再等待 `drain_timeout`。
///
/// 返回 `true` 表示在超时之前完成退出。
pub async fn drain_with_timeout<F>(
    server: F,
    started: oneshot::Receiver<ShutdownReason>,
    drain_timeout: Duration,
) -> bool
where
    F: Future<Output = ()>,
{
    tokio::pin!(server);

    tokio::select! {
        _ = &mut server => return true,
        reason = started => {
            if let Ok(reason) = reason {
                info!("接收到退出信号: {:?}，开始优雅退出...", reason);
            }
        }
    }

    match tokio::time::timeout(drain_timeout, server).await {
        Ok(()) => {
            info!("优雅退出完成");
            true
        }
        Err(_) => {
            warn!("优雅退出超时（{}秒），强制退出", drain_timeout.as_secs());
            false
        }
    }
}
