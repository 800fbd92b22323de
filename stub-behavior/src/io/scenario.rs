//! Scenario file parsing, validation and deterministic replay.
//!
//! A scenario is a JSON file that configures one stub and then calls it.
//! Argument values are plain JSON plus a few `$`-tagged forms:
//!
//! - `{"$callback": "name"}`: a recording callback. The same name yields the
//!   same function within one replay.
//! - `{"$error": {"name": "...", "message": "..."}}`: an error value.
//! - `{"$undefined": true}`: undefined.
//! - `{"$hook_arg": n}`: only inside hook injectors, the hook's `n`th argument.
//!
//! Replay runs on a fresh virtual-time [`Scheduler`] and reports every call
//! outcome and callback invocation as one JSON line each.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use crate::behavior::Behavior;
use crate::core::record::{HookOptions, Injector, MAX_INJECTOR_POS};
use crate::core::value::{ErrorObject, Function, Object, Value};
use crate::double::Stub;
use crate::error::{BehaviorError, BehaviorResult};
use crate::io::config::EngineConfig;
use crate::promise::Promise;
use crate::scheduler::Scheduler;

/// A parsed scenario file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Identifier echoed in the report summary.
    pub name: String,
    /// Overrides the configured double name.
    #[serde(default)]
    pub double: Option<String>,
    #[serde(default)]
    pub behaviors: Vec<BehaviorBlock>,
    pub calls: Vec<CallSpec>,
}

/// Builder steps applied to the default behavior or to one call slot.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BehaviorBlock {
    #[serde(default)]
    pub on_call: Option<usize>,
    pub steps: Vec<Step>,
}

/// One invocation of the stub.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CallSpec {
    /// Virtual milliseconds to advance before this call.
    #[serde(default)]
    pub after_ms: u64,
    #[serde(default)]
    pub this: Option<JsonValue>,
    #[serde(default)]
    pub args: Vec<JsonValue>,
}

/// One builder call.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Step {
    Returns {
        #[serde(default)]
        value: JsonValue,
    },
    ReturnsArg {
        index: JsonValue,
    },
    ReturnsThis,
    Throws {
        #[serde(default)]
        error: JsonValue,
        #[serde(default)]
        message: Option<String>,
    },
    CallsArg {
        index: JsonValue,
        #[serde(default)]
        context: Option<JsonValue>,
        #[serde(default)]
        args: Vec<JsonValue>,
        #[serde(default, rename = "async")]
        deferred: bool,
    },
    Yields {
        #[serde(default)]
        args: Vec<JsonValue>,
        #[serde(default)]
        context: Option<JsonValue>,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        right: bool,
        #[serde(default, rename = "async")]
        deferred: bool,
    },
    SetBeforeCallbackHook {
        #[serde(default)]
        inject: Vec<InjectSpec>,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        promise: Option<PromiseSpec>,
    },
    YieldsBeforeCallbackHook {
        #[serde(default)]
        context: JsonValue,
        #[serde(default)]
        args: Vec<JsonValue>,
        #[serde(default, rename = "async")]
        deferred: bool,
    },
}

/// A fixed injector returned by a scenario hook.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InjectSpec {
    pub pos: usize,
    #[serde(default)]
    pub value: JsonValue,
}

/// Makes a scenario hook return a promise that settles after a delay.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PromiseSpec {
    #[serde(default)]
    pub resolve_after_ms: u64,
    /// Reject with this reason instead of resolving with the injectors.
    #[serde(default)]
    pub reject: Option<JsonValue>,
}

/// One line of replay output.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportLine {
    Call {
        call: usize,
        at_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        returned: Option<JsonValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        threw: Option<JsonValue>,
    },
    Callback {
        callback: String,
        at_ms: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        this: Option<JsonValue>,
        args: Vec<JsonValue>,
    },
    /// An error raised by deferred work that no caller could observe.
    Unhandled { at_ms: u64, error: JsonValue },
    Summary {
        scenario: String,
        calls: usize,
        callbacks: usize,
        unhandled: usize,
        elapsed_ms: u64,
    },
}

/// Ordered replay output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    pub lines: Vec<ReportLine>,
}

impl ReplayReport {
    pub fn callbacks(&self) -> impl Iterator<Item = &ReportLine> {
        self.lines
            .iter()
            .filter(|line| matches!(line, ReportLine::Callback { .. }))
    }

    pub fn unhandled_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line, ReportLine::Unhandled { .. }))
            .count()
    }

    /// Render one JSON object per line.
    pub fn to_json_lines(&self) -> Result<String> {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&serde_json::to_string(line).context("serialize report line")?);
            out.push('\n');
        }
        Ok(out)
    }
}

type EventLog = Rc<RefCell<Vec<ReportLine>>>;

impl Scenario {
    /// Load and validate a scenario file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&contents)
            .with_context(|| format!("parse scenario {}", path.display()))?;
        scenario
            .validate()
            .with_context(|| format!("validate scenario {}", path.display()))?;
        debug!(path = %path.display(), name = %scenario.name, "loaded scenario");
        Ok(scenario)
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(contents).context("parse scenario")?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check structure, then apply every step to a throwaway stub so builder
    /// argument errors surface before replay.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name must be non-empty");
        }
        if let Some(double) = &self.double
            && double.trim().is_empty()
        {
            bail!("double must be non-empty when set");
        }
        if self.calls.is_empty() {
            bail!("calls must be a non-empty array");
        }
        for (index, block) in self.behaviors.iter().enumerate() {
            if block.steps.is_empty() {
                bail!("behaviors[{}].steps must be a non-empty array", index);
            }
        }
        let scheduler = Scheduler::new();
        let mut values = Materializer::new(&scheduler);
        self.build(&scheduler, &EngineConfig::default(), &mut values)?;
        Ok(())
    }

    fn build(
        &self,
        scheduler: &Scheduler,
        config: &EngineConfig,
        values: &mut Materializer,
    ) -> Result<Stub> {
        let mut config = config.clone();
        if let Some(double) = &self.double {
            config.double_name = double.clone();
        }
        let stub = Stub::with_config(&config, scheduler);
        for (block_index, block) in self.behaviors.iter().enumerate() {
            let behavior = match block.on_call {
                Some(index) => stub.on_call(index),
                None => stub.behavior(),
            };
            for (step_index, step) in block.steps.iter().enumerate() {
                step.apply(&behavior, values)
                    .with_context(|| format!("behaviors[{block_index}].steps[{step_index}]"))?;
            }
        }
        Ok(stub)
    }

    /// Run every call, drain the scheduler, and collect the report.
    #[instrument(skip_all, fields(scenario = %self.name))]
    pub fn replay(&self, config: &EngineConfig) -> Result<ReplayReport> {
        let scheduler = Scheduler::new();
        let mut values = Materializer::new(&scheduler);
        let stub = self.build(&scheduler, config, &mut values)?;
        let events = Rc::clone(&values.events);

        for (index, call) in self.calls.iter().enumerate() {
            if call.after_ms > 0 {
                let target = scheduler.now() + Duration::from_millis(call.after_ms);
                drain(&events, &scheduler, |s| s.advance(target.saturating_sub(s.now())));
            }
            let this = match &call.this {
                Some(json) => values.value(json).with_context(|| format!("calls[{index}].this"))?,
                None => Value::Undefined,
            };
            let args = values
                .values(&call.args)
                .with_context(|| format!("calls[{index}].args"))?;

            let outcome = stub.invoke(&this, &args);
            let (returned, threw) = match outcome {
                Ok(value) => (Some(value.to_json()), None),
                Err(err) => (None, Some(err.to_value().to_json())),
            };
            events.borrow_mut().push(ReportLine::Call {
                call: index,
                at_ms: millis(scheduler.now()),
                returned,
                threw,
            });
        }
        drain(&events, &scheduler, Scheduler::run_until_idle);

        let mut lines = events.take();
        let summary = ReportLine::Summary {
            scenario: self.name.clone(),
            calls: stub.call_count(),
            callbacks: lines
                .iter()
                .filter(|line| matches!(line, ReportLine::Callback { .. }))
                .count(),
            unhandled: lines
                .iter()
                .filter(|line| matches!(line, ReportLine::Unhandled { .. }))
                .count(),
            elapsed_ms: millis(scheduler.now()),
        };
        info!(calls = stub.call_count(), elapsed_ms = millis(scheduler.now()), "scenario replayed");
        lines.push(summary);
        Ok(ReplayReport { lines })
    }
}

/// Keep running `step` until it succeeds, logging each unhandled error.
///
/// A failing task is consumed before it reports, so every retry makes progress.
fn drain(
    events: &EventLog,
    scheduler: &Scheduler,
    step: impl Fn(&Scheduler) -> Result<(), BehaviorError>,
) {
    while let Err(err) = step(scheduler) {
        warn!(error = %err, "unhandled error during replay");
        events.borrow_mut().push(ReportLine::Unhandled {
            at_ms: millis(scheduler.now()),
            error: err.to_value().to_json(),
        });
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Library errors hold single-threaded values, so they are rendered into the
/// message before crossing into `anyhow`.
fn builder_error(err: BehaviorError) -> anyhow::Error {
    anyhow!("{err}")
}

impl Step {
    fn apply(&self, behavior: &Behavior, values: &mut Materializer) -> Result<()> {
        match self {
            Step::Returns { value } => {
                behavior.returns(values.value(value)?);
            }
            Step::ReturnsArg { index } => {
                behavior
                    .returns_arg(&Value::from_json(index))
                    .map_err(builder_error)?;
            }
            Step::ReturnsThis => {
                behavior.returns_this();
            }
            Step::Throws { error, message } => match (error, message) {
                (JsonValue::String(name), Some(message)) => {
                    behavior.throws_with_message(name, message);
                }
                (error, _) => {
                    behavior.throws(values.value(error)?);
                }
            },
            Step::CallsArg {
                index,
                context,
                args,
                deferred,
            } => {
                let index = Value::from_json(index);
                let args = values.values(args)?;
                let context = context.as_ref().map(|json| values.value(json)).transpose()?;
                let result = match (context, *deferred) {
                    (None, false) => behavior.calls_arg_with(&index, args),
                    (None, true) => behavior.calls_arg_with_async(&index, args),
                    (Some(context), false) => behavior.calls_arg_on_with(&index, context, args),
                    (Some(context), true) => {
                        behavior.calls_arg_on_with_async(&index, context, args)
                    }
                };
                result.map_err(builder_error)?;
            }
            Step::Yields {
                args,
                context,
                to,
                right,
                deferred,
            } => {
                let args = values.values(args)?;
                let context = context.as_ref().map(|json| values.value(json)).transpose()?;
                apply_yields(behavior, args, context, to.as_deref(), *right, *deferred)?;
            }
            Step::SetBeforeCallbackHook {
                inject,
                timeout_ms,
                promise,
            } => {
                let hook = values.hook(inject, promise.as_ref())?;
                let mut options = HookOptions::default();
                if promise.is_some() {
                    options = options.promisified();
                }
                if let Some(timeout_ms) = timeout_ms {
                    options = options.with_timeout(Duration::from_millis(*timeout_ms));
                }
                behavior
                    .set_before_callback_hook(hook, Some(options))
                    .map_err(builder_error)?;
            }
            Step::YieldsBeforeCallbackHook {
                context,
                args,
                deferred,
            } => {
                let context = values.value(context)?;
                let args = values.values(args)?;
                let armed = if *deferred {
                    behavior.yields_before_callback_hook_async(context, args)
                } else {
                    behavior.yields_before_callback_hook(context, args)
                };
                armed.map_err(builder_error)?;
            }
        }
        Ok(())
    }
}

fn apply_yields(
    behavior: &Behavior,
    args: Vec<Value>,
    context: Option<Value>,
    to: Option<&str>,
    right: bool,
    deferred: bool,
) -> Result<()> {
    match (to, context, right) {
        (Some(_), _, true) => bail!("yields: `to` and `right` are mutually exclusive"),
        (Some(property), None, false) if deferred => behavior.yields_to_async(property, args),
        (Some(property), None, false) => behavior.yields_to(property, args),
        (Some(property), Some(context), false) if deferred => {
            behavior.yields_to_on_async(property, context, args)
        }
        (Some(property), Some(context), false) => behavior.yields_to_on(property, context, args),
        (None, Some(_), true) => bail!("yields: `context` is not supported with `right`"),
        (None, None, true) if deferred => behavior.yields_right_async(args),
        (None, None, true) => behavior.yields_right(args),
        (None, Some(context), false) if deferred => behavior.yields_on_async(context, args),
        (None, Some(context), false) => behavior.yields_on(context, args),
        (None, None, false) if deferred => behavior.yields_async(args),
        (None, None, false) => behavior.yields(args),
    };
    Ok(())
}

/// Where an injector's value comes from.
#[derive(Debug, Clone)]
enum InjectedValue {
    Fixed(Value),
    HookArg(usize),
}

/// Turns scenario JSON into engine values and owns the recording callbacks.
struct Materializer {
    scheduler: Scheduler,
    events: EventLog,
    callbacks: BTreeMap<String, Value>,
}

impl Materializer {
    fn new(scheduler: &Scheduler) -> Self {
        Self {
            scheduler: scheduler.clone(),
            events: Rc::default(),
            callbacks: BTreeMap::new(),
        }
    }

    fn values(&mut self, items: &[JsonValue]) -> Result<Vec<Value>> {
        items.iter().map(|item| self.value(item)).collect()
    }

    fn value(&mut self, json: &JsonValue) -> Result<Value> {
        match json {
            JsonValue::Array(items) => Ok(Value::array(self.values(items)?)),
            JsonValue::Object(map) => {
                if let Some(name) = map.get("$callback") {
                    let name = name.as_str().context("$callback must be a string")?;
                    return Ok(self.callback(name));
                }
                if let Some(spec) = map.get("$error") {
                    let name = spec.get("name").and_then(JsonValue::as_str).unwrap_or("Error");
                    let message = spec
                        .get("message")
                        .and_then(JsonValue::as_str)
                        .unwrap_or_default();
                    return Ok(ErrorObject::new(name, message).into());
                }
                if map.contains_key("$undefined") {
                    return Ok(Value::Undefined);
                }
                if map.contains_key("$hook_arg") {
                    bail!("$hook_arg is only valid as an injector value");
                }
                let object = Object::new();
                for (key, value) in map {
                    object.set(key.as_str(), self.value(value)?);
                }
                Ok(object.into())
            }
            scalar => Ok(Value::from_json(scalar)),
        }
    }

    fn callback(&mut self, name: &str) -> Value {
        if let Some(existing) = self.callbacks.get(name) {
            return existing.clone();
        }
        let events = Rc::clone(&self.events);
        let scheduler = self.scheduler.clone();
        let label = name.to_string();
        let callback: Value = Function::named(name, move |this, args| {
            events.borrow_mut().push(ReportLine::Callback {
                callback: label.clone(),
                at_ms: millis(scheduler.now()),
                this: (!this.is_undefined()).then(|| this.to_json()),
                args: args.iter().map(Value::to_json).collect(),
            });
            Ok(Value::Undefined)
        })
        .into();
        self.callbacks.insert(name.to_string(), callback.clone());
        callback
    }

    fn injected(&mut self, json: &JsonValue) -> Result<InjectedValue> {
        if let Some(index) = json.get("$hook_arg") {
            let index = index
                .as_u64()
                .and_then(|index| usize::try_from(index).ok())
                .context("$hook_arg must be a non-negative integer")?;
            return Ok(InjectedValue::HookArg(index));
        }
        Ok(InjectedValue::Fixed(self.value(json)?))
    }

    /// A hook that returns the declared injectors, optionally through a promise.
    fn hook(&mut self, inject: &[InjectSpec], promise: Option<&PromiseSpec>) -> Result<Value> {
        let mut plan = Vec::with_capacity(inject.len());
        for (index, spec) in inject.iter().enumerate() {
            if spec.pos > MAX_INJECTOR_POS {
                bail!("inject[{index}].pos must be at most {MAX_INJECTOR_POS}");
            }
            let value = self
                .injected(&spec.value)
                .with_context(|| format!("inject[{index}]"))?;
            plan.push((spec.pos, value));
        }
        let settle = match promise {
            Some(spec) => Some((
                Duration::from_millis(spec.resolve_after_ms),
                spec.reject.as_ref().map(|json| self.value(json)).transpose()?,
            )),
            None => None,
        };
        let scheduler = self.scheduler.clone();

        let hook = Function::named("scenario_hook", move |_, args| {
            let injectors = Injector::list(plan.iter().map(|(pos, value)| match value {
                InjectedValue::Fixed(value) => Injector::new(*pos, value.clone()),
                InjectedValue::HookArg(index) => {
                    Injector::new(*pos, args.get(*index).cloned().unwrap_or_default())
                }
            }));
            let Some((delay, rejection)) = &settle else {
                return Ok(injectors);
            };
            let promise = Promise::new(&scheduler);
            let pending = promise.clone();
            let rejection = rejection.clone();
            let complete = move || -> BehaviorResult<()> {
                match rejection {
                    Some(reason) => pending.reject(reason),
                    None => pending.resolve(injectors),
                }
                Ok(())
            };
            if delay.is_zero() {
                complete()?;
            } else {
                scheduler.set_timeout(*delay, complete);
            }
            Ok(promise.into())
        });
        Ok(hook.into())
    }
}

/// Load a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    Scenario::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_FILE: &str = r#"{
        "name": "read-file",
        "double": "fs.readFile",
        "behaviors": [
            {
                "steps": [
                    { "op": "yields", "args": [null, "test file"] },
                    { "op": "set_before_callback_hook",
                      "inject": [{ "pos": 1, "value": { "$hook_arg": 0 } }] },
                    { "op": "yields_before_callback_hook",
                      "context": null, "args": ["hook invoked"] }
                ]
            }
        ],
        "calls": [ { "args": ["fake_path", { "$callback": "done" }] } ]
    }"#;

    fn callback_args(report: &ReplayReport) -> Vec<(u64, Vec<JsonValue>)> {
        report
            .callbacks()
            .filter_map(|line| match line {
                ReportLine::Callback { at_ms, args, .. } => Some((*at_ms, args.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_and_replays_hook_injection() {
        let scenario = Scenario::parse_str(READ_FILE).expect("parse");
        let report = scenario.replay(&EngineConfig::default()).expect("replay");

        assert_eq!(
            callback_args(&report),
            vec![(0, vec![JsonValue::Null, JsonValue::from("hook invoked")])]
        );
        assert_eq!(report.unhandled_count(), 0);
        let Some(ReportLine::Summary { calls, callbacks, .. }) = report.lines.last() else {
            panic!("missing summary");
        };
        assert_eq!((*calls, *callbacks), (1, 1));
    }

    #[test]
    fn promised_hook_with_timeout_fires_after_both_delays() {
        let input = r#"{
            "name": "promised",
            "behaviors": [{ "steps": [
                { "op": "yields", "args": [null, "test file"] },
                { "op": "set_before_callback_hook",
                  "inject": [{ "pos": 1, "value": "hook invoked" }],
                  "timeout_ms": 2000,
                  "promise": { "resolve_after_ms": 1000 } }
            ]}],
            "calls": [ { "args": [{ "$callback": "done" }] } ]
        }"#;
        let report = Scenario::parse_str(input)
            .expect("parse")
            .replay(&EngineConfig::default())
            .expect("replay");
        assert_eq!(
            callback_args(&report),
            vec![(3000, vec![JsonValue::Null, JsonValue::from("hook invoked")])]
        );
    }

    #[test]
    fn rejected_hook_reports_unhandled_and_skips_callback() {
        let input = r#"{
            "name": "rejected",
            "behaviors": [{ "steps": [
                { "op": "yields", "args": ["error"] },
                { "op": "set_before_callback_hook",
                  "promise": { "reject": { "$error": { "name": "Error", "message": "denied" } } } }
            ]}],
            "calls": [ { "args": [{ "$callback": "done" }] } ]
        }"#;
        let report = Scenario::parse_str(input)
            .expect("parse")
            .replay(&EngineConfig::default())
            .expect("replay");
        assert_eq!(report.callbacks().count(), 0);
        assert_eq!(report.unhandled_count(), 1);
    }

    #[test]
    fn per_call_blocks_and_thrown_errors_are_reported() {
        let input = r#"{
            "name": "sequence",
            "behaviors": [
                { "steps": [{ "op": "returns", "value": "default" }] },
                { "on_call": 1,
                  "steps": [{ "op": "throws", "error": "Boom", "message": "second" }] }
            ],
            "calls": [ {}, { "after_ms": 5 }, {} ]
        }"#;
        let report = Scenario::parse_str(input)
            .expect("parse")
            .replay(&EngineConfig::default())
            .expect("replay");
        let outcomes: Vec<_> = report
            .lines
            .iter()
            .filter_map(|line| match line {
                ReportLine::Call { at_ms, returned, threw, .. } => {
                    Some((*at_ms, returned.clone(), threw.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(outcomes[0], (0, Some(JsonValue::from("default")), None));
        assert_eq!(
            outcomes[1],
            (
                5,
                None,
                Some(serde_json::json!({ "$error": { "name": "Boom", "message": "second" } })),
            )
        );
        assert_eq!(outcomes[2].1, Some(JsonValue::from("default")));
    }

    #[test]
    fn builder_errors_name_the_step() {
        let input = r#"{
            "name": "bad-index",
            "behaviors": [{ "steps": [
                { "op": "returns_this" },
                { "op": "calls_arg", "index": 1.5 }
            ]}],
            "calls": [ {} ]
        }"#;
        let err = Scenario::parse_str(input).unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("behaviors[0].steps[1]"), "{rendered}");
        assert!(rendered.contains("non-negative integer"), "{rendered}");
    }

    #[test]
    fn oversized_injector_positions_are_rejected() {
        let input = r#"{
            "name": "huge-pos",
            "behaviors": [{ "steps": [
                { "op": "yields" },
                { "op": "set_before_callback_hook",
                  "inject": [{ "pos": 0, "value": 1 }, { "pos": 18446744073709551615 }] }
            ]}],
            "calls": [ { "args": [{ "$callback": "done" }] } ]
        }"#;
        let err = Scenario::parse_str(input).unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("behaviors[0].steps[1]"), "{rendered}");
        assert!(rendered.contains("inject[1].pos must be at most 65535"), "{rendered}");
    }

    #[test]
    fn hook_step_timeout_keeps_promise_mode_from_config() {
        let input = r#"{
            "name": "layered",
            "behaviors": [{ "steps": [
                { "op": "yields", "args": [null, "test file"] },
                { "op": "set_before_callback_hook", "inject": [{ "pos": 1, "value": "late" }] },
                { "op": "yields_before_callback_hook" }
            ]}],
            "calls": [ { "args": [{ "$callback": "done" }] } ]
        }"#;
        let config = EngineConfig {
            hook: crate::io::config::HookConfig {
                promisified: false,
                timeout_ms: Some(300),
            },
            ..EngineConfig::default()
        };
        let scenario = Scenario::parse_str(input).expect("parse");
        let report = scenario.replay(&config).expect("replay");
        assert_eq!(
            callback_args(&report),
            vec![(300, vec![JsonValue::Null, JsonValue::from("late")])]
        );
    }

    #[test]
    fn deferred_arming_skips_the_hook() {
        let input = r#"{
            "name": "deferred-arm",
            "behaviors": [{ "steps": [
                { "op": "yields", "args": ["original"] },
                { "op": "set_before_callback_hook", "inject": [{ "pos": 0, "value": "hooked" }] },
                { "op": "yields_before_callback_hook", "async": true }
            ]}],
            "calls": [ { "args": [{ "$callback": "done" }] } ]
        }"#;
        let scenario = Scenario::parse_str(input).expect("parse");
        let report = scenario.replay(&EngineConfig::default()).expect("replay");
        assert_eq!(callback_args(&report), vec![(0, vec![JsonValue::from("original")])]);
    }

    #[test]
    fn structural_errors_are_rejected() {
        assert!(Scenario::parse_str(r#"{ "name": "", "calls": [{}] }"#).is_err());
        assert!(Scenario::parse_str(r#"{ "name": "x", "calls": [] }"#).is_err());
        assert!(Scenario::parse_str(r#"{ "name": "x", "calls": [{}], "extra": 1 }"#).is_err());
        let arm_first = r#"{
            "name": "x",
            "behaviors": [{ "steps": [{ "op": "yields_before_callback_hook" }] }],
            "calls": [{}]
        }"#;
        assert!(Scenario::parse_str(arm_first).is_err());
    }

    #[test]
    fn load_reads_scenario_from_disk_and_renders_json_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("read_file.json");
        fs::write(&path, READ_FILE).expect("write");

        let report = load_scenario(&path)
            .expect("load")
            .replay(&EngineConfig::default())
            .expect("replay");
        let rendered = report.to_json_lines().expect("render");
        let kinds: Vec<String> = rendered
            .lines()
            .map(|line| {
                let json: JsonValue = serde_json::from_str(line).expect("json line");
                json["kind"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(kinds, vec!["callback", "call", "summary"]);
    }
}
