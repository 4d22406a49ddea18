//! Registry of named analysis functions
//!
//! The CLI resolves the names in a function-list file through this registry.
//! Downstream crates register their own analyses at startup with
//! [`register_analysis`]. The built-ins only describe the shape of a
//! recording; they never interpret signal contents.

use crate::analysis::{analysis_fn, AnalysisContext, AnalysisFn, CallArgs};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};
use simuran_common::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

static ANALYSES: Lazy<RwLock<HashMap<String, Arc<dyn AnalysisFn>>>> = Lazy::new(|| {
    let mut analyses: HashMap<String, Arc<dyn AnalysisFn>> = HashMap::new();
    for function in builtin_analyses() {
        analyses.insert(function.name().to_string(), function);
    }
    RwLock::new(analyses)
});

fn builtin_analyses() -> Vec<Arc<dyn AnalysisFn>> {
    vec![
        analysis_fn("available_data", available_data),
        analysis_fn("attrs_summary", attrs_summary),
        analysis_fn("payload_overview", payload_overview),
    ]
}

/// Register (or replace) an analysis under its own name
pub fn register_analysis(function: Arc<dyn AnalysisFn>) {
    let name = function.name().to_string();
    tracing::debug!("Registering analysis '{}'", name);
    ANALYSES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name, function);
}

pub fn lookup_analysis(name: &str) -> Result<Arc<dyn AnalysisFn>> {
    let found = ANALYSES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned();
    found.ok_or_else(|| {
        Error::Configuration(format!(
            "unknown analysis function '{}' (registered: {})",
            name,
            registered_analyses().join(", ")
        ))
    })
}

/// Registered analysis names, sorted
pub fn registered_analyses() -> Vec<String> {
    let mut names: Vec<String> = ANALYSES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Data tags of the recording
fn available_data(ctx: &mut AnalysisContext<'_>, _args: &CallArgs) -> anyhow::Result<Value> {
    let recording = ctx.require_recording()?;
    Ok(json!(recording.available_data.iter().collect::<Vec<_>>()))
}

/// Public attributes, optionally restricted to `keys`
fn attrs_summary(ctx: &mut AnalysisContext<'_>, args: &CallArgs) -> anyhow::Result<Value> {
    let recording = ctx.require_recording()?;
    let wanted: Option<Vec<String>> = args.arg(0, "keys").and_then(|keys| match keys {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect(),
        ),
        Value::String(key) => Some(vec![key.clone()]),
        _ => None,
    });

    let mut summary = Map::new();
    for (key, value) in recording.attrs.iter() {
        let selected = match &wanted {
            Some(keys) => keys.iter().any(|k| k == key),
            None => !key.starts_with('_'),
        };
        if selected {
            summary.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Object(summary))
}

/// Sections and signal sizes of the loaded payload
fn payload_overview(ctx: &mut AnalysisContext<'_>, _args: &CallArgs) -> anyhow::Result<Value> {
    let recording = ctx.require_recording()?;
    let Some(payload) = recording.data() else {
        return Ok(json!({ "loaded": false }));
    };
    let signals: Map<String, Value> = payload
        .signals
        .iter()
        .map(|(name, signal)| {
            (
                name.clone(),
                json!({ "samples": signal.len(), "duration": signal.duration() }),
            )
        })
        .collect();
    Ok(json!({
        "loaded": recording.is_loaded(),
        "sections": payload.sections.keys().collect::<Vec<_>>(),
        "signals": signals,
    }))
}
