//! The device-facing side of node execution.
//!
//! Implementations talk to a connected device (shell transport, UI automation,
//! app lifecycle). The engine never reaches the device any other way.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{
    ClickConfig, CloseConfig, ConditionConfig, InputConfig, ScreenshotConfig, ScrollConfig,
    StartConfig, SwipeConfig,
};
use crate::OperationError;

/// One operation per node kind, each bound to a device key.
///
/// Every call is a suspension point. Calls are never issued concurrently for
/// the same engine, so implementations may assume serialized access.
#[async_trait]
pub trait DeviceOperations: Send + Sync {
    async fn start_application(
        &self,
        device_key: &str,
        config: &StartConfig,
    ) -> Result<(), OperationError>;

    async fn perform_click(
        &self,
        device_key: &str,
        config: &ClickConfig,
    ) -> Result<(), OperationError>;

    async fn perform_input(
        &self,
        device_key: &str,
        config: &InputConfig,
    ) -> Result<(), OperationError>;

    /// Capture the screen and return where the image was written.
    async fn take_screenshot(
        &self,
        device_key: &str,
        config: &ScreenshotConfig,
    ) -> Result<PathBuf, OperationError>;

    async fn perform_scroll(
        &self,
        device_key: &str,
        config: &ScrollConfig,
    ) -> Result<(), OperationError>;

    async fn perform_swipe(
        &self,
        device_key: &str,
        config: &SwipeConfig,
    ) -> Result<(), OperationError>;

    async fn check_condition(
        &self,
        device_key: &str,
        config: &ConditionConfig,
    ) -> Result<bool, OperationError>;

    /// Idle for `duration`. The default sleeps on the tokio timer.
    async fn perform_wait(&self, _device_key: &str, duration: Duration) -> Result<(), OperationError> {
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn close_application(
        &self,
        device_key: &str,
        config: &CloseConfig,
    ) -> Result<(), OperationError>;

    /// Human-readable size of a file produced on the host (e.g. `"1.2 MB"`).
    async fn get_file_size(&self, path: &Path) -> Result<String, OperationError>;
}

/// Format a byte count the way file sizes appear in the execution log.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
