//! `MockDevice`: an in-memory stand-in for a connected device.
//!
//! Used by the test suites and by the CLI's `simulate` command. Every call is
//! recorded; condition results, failures and per-operation hooks are
//! injected at construction time.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::{
    generated_screenshot_name, ClickConfig, CloseConfig, ConditionConfig, InputConfig,
    ScreenshotConfig, ScrollConfig, StartConfig, SwipeConfig,
};
use crate::device::format_file_size;
use crate::{DeviceOperations, OperationError};

/// Which adapter operation a call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    StartApplication,
    Click,
    Input,
    Screenshot,
    Scroll,
    Swipe,
    CheckCondition,
    Wait,
    CloseApplication,
    FileSize,
}

/// One recorded adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCall {
    pub operation: Operation,
    pub device_key: String,
    /// The configuration the call received, as JSON.
    pub detail: Value,
}

/// Callback run when an operation is invoked, before it returns.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// Reported size of every fake screenshot.
const SCREENSHOT_BYTES: u64 = 245_760;

pub struct MockDevice {
    calls: Arc<Mutex<Vec<DeviceCall>>>,
    condition_results: Mutex<VecDeque<Result<bool, OperationError>>>,
    default_condition: bool,
    failures: HashMap<Operation, String>,
    hooks: HashMap<Operation, Hook>,
    latency: Option<Duration>,
    screenshot_dir: PathBuf,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// A device on which every operation succeeds and every condition holds.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            condition_results: Mutex::new(VecDeque::new()),
            default_condition: true,
            failures: HashMap::new(),
            hooks: HashMap::new(),
            latency: None,
            screenshot_dir: PathBuf::from("screenshots"),
        }
    }

    /// Queue results for successive `check_condition` calls. Once drained,
    /// the default result applies.
    pub fn with_condition_results(
        self,
        results: impl IntoIterator<Item = Result<bool, OperationError>>,
    ) -> Self {
        self.condition_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
        self
    }

    pub fn with_default_condition(mut self, result: bool) -> Self {
        self.default_condition = result;
        self
    }

    /// Make every call to `operation` fail with `message`.
    pub fn failing(mut self, operation: Operation, message: impl Into<String>) -> Self {
        self.failures.insert(operation, message.into());
        self
    }

    /// Run `hook` whenever `operation` is invoked.
    pub fn on(mut self, operation: Operation, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks.insert(operation, Arc::new(hook));
        self
    }

    /// Delay every gesture by `latency`, as a real device would.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    async fn invoke(
        &self,
        operation: Operation,
        device_key: &str,
        detail: impl Serialize,
    ) -> Result<(), OperationError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DeviceCall {
                operation,
                device_key: device_key.to_owned(),
                detail: serde_json::to_value(detail).unwrap_or(Value::Null),
            });

        if let Some(hook) = self.hooks.get(&operation) {
            hook();
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.failures.get(&operation) {
            Some(message) => Err(OperationError::new(message.clone()).with_kind("mock_failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceOperations for MockDevice {
    async fn start_application(
        &self,
        device_key: &str,
        config: &StartConfig,
    ) -> Result<(), OperationError> {
        self.invoke(Operation::StartApplication, device_key, config).await
    }

    async fn perform_click(
        &self,
        device_key: &str,
        config: &ClickConfig,
    ) -> Result<(), OperationError> {
        self.invoke(Operation::Click, device_key, config).await
    }

    async fn perform_input(
        &self,
        device_key: &str,
        config: &InputConfig,
    ) -> Result<(), OperationError> {
        self.invoke(Operation::Input, device_key, config).await
    }

    async fn take_screenshot(
        &self,
        device_key: &str,
        config: &ScreenshotConfig,
    ) -> Result<PathBuf, OperationError> {
        self.invoke(Operation::Screenshot, device_key, config).await?;
        let dir = config
            .save_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.screenshot_dir.clone());
        let filename = config
            .filename
            .clone()
            .unwrap_or_else(generated_screenshot_name);
        Ok(dir.join(filename))
    }

    async fn perform_scroll(
        &self,
        device_key: &str,
        config: &ScrollConfig,
    ) -> Result<(), OperationError> {
        self.invoke(Operation::Scroll, device_key, config).await
    }

    async fn perform_swipe(
        &self,
        device_key: &str,
        config: &SwipeConfig,
    ) -> Result<(), OperationError> {
        self.invoke(Operation::Swipe, device_key, config).await
    }

    async fn check_condition(
        &self,
        device_key: &str,
        config: &ConditionConfig,
    ) -> Result<bool, OperationError> {
        self.invoke(Operation::CheckCondition, device_key, config).await?;
        let scripted = self
            .condition_results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or(Ok(self.default_condition))
    }

    /// Records the wait without sleeping.
    async fn perform_wait(&self, device_key: &str, duration: Duration) -> Result<(), OperationError> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.invoke(Operation::Wait, device_key, json!({ "duration": millis }))
            .await
    }

    async fn close_application(
        &self,
        device_key: &str,
        config: &CloseConfig,
    ) -> Result<(), OperationError> {
        self.invoke(Operation::CloseApplication, device_key, config).await
    }

    async fn get_file_size(&self, path: &Path) -> Result<String, OperationError> {
        self.invoke(Operation::FileSize, "", json!({ "path": path.display().to_string() }))
            .await?;
        Ok(format_file_size(SCREENSHOT_BYTES))
    }
}
