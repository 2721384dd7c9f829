//! Typed node configuration.
//!
//! The editor hands every node an untyped JSON object. Each kind parses it
//! into its own struct here, collecting non-fatal problems as warnings and
//! rejecting the few fields a node cannot run without.
//!
//! The resolved structs serialise back to camelCase JSON; the dispatcher uses
//! that form as the contextual detail of a node's log entries.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{NodeError, NodeKind};

/// Default element lookup timeout for click and condition nodes (ms).
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Accepted range for element lookup timeouts (ms).
pub const TIMEOUT_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=60_000;
/// Default wait node duration (ms).
pub const DEFAULT_WAIT_MS: u64 = 1_000;
/// Waits longer than this are honoured but flagged (ms).
pub const LONG_WAIT_MS: u64 = 300_000;
pub const DEFAULT_SCROLL_DISTANCE: u32 = 500;
pub const DEFAULT_SWIPE_DURATION_MS: u64 = 300;
/// Default swipe: bottom to top on a 1080x1920 portrait screen.
pub const DEFAULT_SWIPE: (i32, i32, i32, i32) = (540, 1600, 540, 400);

/// A parsed configuration plus the warnings raised while resolving it.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub config: T,
    pub warnings: Vec<String>,
}

impl<T: Serialize> Parsed<T> {
    /// Contextual log fields: the resolved configuration as a JSON object.
    pub fn details(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.config) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field reader
// ---------------------------------------------------------------------------

/// Reads fields out of a node's JSON configuration.
///
/// A field that is present but unusable (wrong type, negative, unknown
/// variant) is reported as a warning and read as absent, so the caller falls
/// back to its default. Only the callers decide what is required.
struct Fields<'a> {
    map: Option<&'a Map<String, Value>>,
    warnings: Vec<String>,
}

impl<'a> Fields<'a> {
    fn new(kind: NodeKind, config: &'a Value) -> Self {
        let mut warnings = Vec::new();
        let map = match config {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                warnings.push(format!(
                    "{kind} configuration should be an object, ignoring {other}"
                ));
                None
            }
        };
        Self { map, warnings }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map?.get(key).filter(|v| !v.is_null())
    }

    fn is_missing(&self, key: &str) -> bool {
        self.get(key).is_none()
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn read<T>(&mut self, key: &str, expected: &str, convert: impl FnOnce(&Value) -> Option<T>) -> Option<T> {
        let value = self.get(key)?;
        let converted = convert(value);
        if converted.is_none() {
            self.warn(format!("ignoring {key}: expected {expected}, got {value}"));
        }
        converted
    }

    /// A non-blank string. Blank strings read as absent without a warning.
    fn string(&mut self, key: &str) -> Option<String> {
        self.read(key, "a string", |v| v.as_str().map(str::to_owned))
            .filter(|s| !s.trim().is_empty())
    }

    /// Any string, empty included.
    fn text(&mut self, key: &str) -> Option<String> {
        self.read(key, "a string", |v| v.as_str().map(str::to_owned))
    }

    fn bool(&mut self, key: &str) -> Option<bool> {
        self.read(key, "true or false", Value::as_bool)
    }

    fn u64(&mut self, key: &str) -> Option<u64> {
        self.read(key, "a non-negative integer", Value::as_u64)
    }

    fn u32(&mut self, key: &str) -> Option<u32> {
        self.read(key, "a non-negative integer", |v| {
            v.as_u64().and_then(|n| u32::try_from(n).ok())
        })
    }

    fn i32(&mut self, key: &str) -> Option<i32> {
        self.read(key, "an integer", |v| v.as_i64().and_then(|n| i32::try_from(n).ok()))
    }

    fn i64(&mut self, key: &str) -> Option<i64> {
        self.read(key, "an integer", Value::as_i64)
    }

    /// A serde-decoded value, e.g. a closed enum.
    fn choice<T: DeserializeOwned>(&mut self, key: &str, expected: &str) -> Option<T> {
        self.read(key, expected, |v| serde_json::from_value(v.clone()).ok())
    }

    fn finish<T>(self, config: T) -> Parsed<T> {
        Parsed {
            config,
            warnings: self.warnings,
        }
    }
}

fn resolve_timeout(fields: &mut Fields<'_>) -> u64 {
    match fields.u64("timeout") {
        None => DEFAULT_TIMEOUT_MS,
        Some(t) if TIMEOUT_RANGE_MS.contains(&t) => t,
        Some(t) => {
            fields.warn(format!(
                "timeout {t}ms is outside {}..={}ms, using {DEFAULT_TIMEOUT_MS}ms",
                TIMEOUT_RANGE_MS.start(),
                TIMEOUT_RANGE_MS.end()
            ));
            DEFAULT_TIMEOUT_MS
        }
    }
}

// ---------------------------------------------------------------------------
// start / close
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<String>,
    pub clear_data: bool,
}

impl StartConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Start, config);
        let package_name = fields.string("packageName");
        if package_name.is_none() {
            fields.warn("no packageName configured; start node will not launch an application");
        }
        let parsed = Self {
            package_name,
            activity: fields.string("activity"),
            clear_data: fields.bool("clearData").unwrap_or(false),
        };
        Ok(fields.finish(parsed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

impl CloseConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Close, config);
        let package_name = fields.string("packageName");
        if package_name.is_none() {
            fields.warn("no packageName configured; the foreground application will be closed");
        }
        Ok(fields.finish(Self { package_name }))
    }
}

// ---------------------------------------------------------------------------
// click / input
// ---------------------------------------------------------------------------

/// A click either targets an element or a raw screen position.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<(i32, i32)>,
    pub timeout: u64,
    pub long_press: bool,
}

impl ClickConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Click, config);
        let selector = fields.string("selector");
        let x = fields.i32("x");
        let y = fields.i32("y");
        let coordinates = x.zip(y);

        if selector.is_none() && coordinates.is_none() {
            return Err(NodeError::configuration(
                "click node requires a selector or both x and y coordinates",
            ));
        }
        if x.is_some() != y.is_some() {
            fields.warn("only one coordinate given; clicking the selector instead");
        }

        let timeout = resolve_timeout(&mut fields);
        let parsed = Self {
            selector,
            coordinates,
            timeout,
            long_press: fields.bool("longPress").unwrap_or(false),
        };
        Ok(fields.finish(parsed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    pub selector: String,
    pub text: String,
    pub clear_first: bool,
}

impl InputConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Input, config);
        let selector = fields
            .string("selector")
            .ok_or_else(|| NodeError::configuration("input node requires a selector"))?;

        let text = match fields.text("text") {
            Some(text) => text,
            None => {
                fields.warn("no text configured; an empty string will be entered");
                String::new()
            }
        };

        let parsed = Self {
            selector,
            text,
            clear_first: fields.bool("clearFirst").unwrap_or(true),
        };
        Ok(fields.finish(parsed))
    }
}

// ---------------------------------------------------------------------------
// wait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitConfig {
    /// Milliseconds.
    pub duration: u64,
}

impl WaitConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Wait, config);
        let missing = fields.is_missing("duration");

        let duration = match fields.u64("duration") {
            Some(d) => d,
            None => {
                if missing {
                    fields.warn(format!("no duration configured, waiting {DEFAULT_WAIT_MS}ms"));
                }
                DEFAULT_WAIT_MS
            }
        };
        if duration > LONG_WAIT_MS {
            fields.warn(format!("wait of {duration}ms exceeds {LONG_WAIT_MS}ms"));
        }

        Ok(fields.finish(Self { duration }))
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.duration)
    }
}

// ---------------------------------------------------------------------------
// scroll / swipe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollConfig {
    pub direction: ScrollDirection,
    pub distance: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

impl ScrollConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Scroll, config);
        let missing = fields.is_missing("direction");

        let direction = match fields.string("direction").map(|d| d.to_ascii_lowercase()).as_deref() {
            Some("up") => ScrollDirection::Up,
            Some("down") => ScrollDirection::Down,
            Some("left") => ScrollDirection::Left,
            Some("right") => ScrollDirection::Right,
            Some(other) => {
                fields.warn(format!("unknown scroll direction '{other}', scrolling down"));
                ScrollDirection::Down
            }
            None => {
                if missing {
                    fields.warn("no scroll direction configured, scrolling down");
                }
                ScrollDirection::Down
            }
        };

        let parsed = Self {
            direction,
            distance: fields.u32("distance").unwrap_or(DEFAULT_SCROLL_DISTANCE),
            selector: fields.string("selector"),
        };
        Ok(fields.finish(parsed))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeConfig {
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    /// Milliseconds.
    pub duration: u64,
}

impl SwipeConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Swipe, config);

        let (dx0, dy0, dx1, dy1) = DEFAULT_SWIPE;
        let mut coord = |name: &str, default: i32| {
            let missing = fields.is_missing(name);
            fields.i32(name).unwrap_or_else(|| {
                if missing {
                    fields.warn(format!("{name} not configured, using {default}"));
                }
                default
            })
        };
        let start_x = coord("startX", dx0);
        let start_y = coord("startY", dy0);
        let end_x = coord("endX", dx1);
        let end_y = coord("endY", dy1);

        let parsed = Self {
            start_x,
            start_y,
            end_x,
            end_y,
            duration: fields.u64("duration").unwrap_or(DEFAULT_SWIPE_DURATION_MS),
        };
        Ok(fields.finish(parsed))
    }
}

// ---------------------------------------------------------------------------
// screenshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotConfig {
    /// Configured file name. The screenshot node fills in a generated one
    /// before the device is called.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
}

impl ScreenshotConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Screenshot, config);
        let parsed = Self {
            filename: fields.string("filename"),
            save_path: fields.string("savePath"),
        };
        Ok(fields.finish(parsed))
    }
}

/// `screenshot_<unix_ms>.png`, used when no file name is configured.
pub fn generated_screenshot_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("screenshot_{millis}.png")
}

// ---------------------------------------------------------------------------
// condition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    Exists,
    NotExists,
    TextEquals,
    TextContains,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    pub selector: String,
    pub condition_type: ConditionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_text: Option<String>,
    pub timeout: u64,
}

impl ConditionConfig {
    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Condition, config);
        let selector = fields
            .string("selector")
            .ok_or_else(|| NodeError::configuration("condition node requires a selector"))?;

        let condition_type = fields
            .choice(
                "conditionType",
                "one of exists, not_exists, text_equals, text_contains",
            )
            .unwrap_or(ConditionType::Exists);
        let expected_text = fields.text("expectedText");
        if matches!(condition_type, ConditionType::TextEquals | ConditionType::TextContains)
            && expected_text.is_none()
        {
            fields.warn("text condition without expectedText; comparing against an empty string");
        }
        let timeout = resolve_timeout(&mut fields);

        let parsed = Self {
            selector,
            condition_type,
            expected_text,
            timeout,
        };
        Ok(fields.finish(parsed))
    }
}

// ---------------------------------------------------------------------------
// loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    pub loop_type: String,
    pub count: u32,
}

impl LoopConfig {
    pub const COUNT: &'static str = "count";

    pub fn parse(config: &Value) -> Result<Parsed<Self>, NodeError> {
        let mut fields = Fields::new(NodeKind::Loop, config);
        let missing = fields.is_missing("count");

        let count = match fields.i64("count") {
            Some(c) if c >= 1 => u32::try_from(c).unwrap_or(u32::MAX),
            Some(c) => {
                fields.warn(format!("loop count {c} is below 1, using 1"));
                1
            }
            None => {
                if missing {
                    fields.warn("no loop count configured, using 1");
                }
                1
            }
        };

        let parsed = Self {
            loop_type: fields.string("loopType").unwrap_or_else(|| Self::COUNT.into()),
            count,
        };
        Ok(fields.finish(parsed))
    }

    pub fn is_counted(&self) -> bool {
        self.loop_type == Self::COUNT
    }
}
