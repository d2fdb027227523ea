use crate::db;
use crate::roster::AnalyticsConfig;
use rusqlite::Connection;
use serde_json::{Map, Value};

pub const ANALYTICS_CONFIG_KEY: &str = "analytics.config";
pub const WORKSPACE_ENV: &str = "RESULTSD_WORKSPACE";

const TOP_COUNT_MAX: i64 = 50;

fn parse_threshold(v: &Value, key: &str) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(0.0..=100.0).contains(&n) {
        return Err(format!("{} must be in 0..=100", key));
    }
    Ok(n)
}

fn parse_count(v: &Value, key: &str) -> Result<usize, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(1..=TOP_COUNT_MAX).contains(&n) {
        return Err(format!("{} must be in 1..={}", key, TOP_COUNT_MAX));
    }
    Ok(n as usize)
}

/// Apply a partial update. Nothing is changed unless every field is accepted.
pub fn merge_analytics_patch(
    current: &AnalyticsConfig,
    patch: &Map<String, Value>,
) -> Result<AnalyticsConfig, String> {
    let mut next = *current;
    for (k, v) in patch {
        match k.as_str() {
            "supportThreshold" => next.support_threshold = parse_threshold(v, k)?,
            "topCount" => next.top_count = parse_count(v, k)?,
            _ => return Err(format!("unknown analytics field: {}", k)),
        }
    }
    Ok(next)
}

pub fn load_analytics_config(conn: &Connection) -> anyhow::Result<AnalyticsConfig> {
    let defaults = AnalyticsConfig::default();
    let Some(saved) = db::settings_get_json(conn, ANALYTICS_CONFIG_KEY)? else {
        return Ok(defaults);
    };
    let Some(saved_obj) = saved.as_object() else {
        tracing::warn!("ignoring non-object {}", ANALYTICS_CONFIG_KEY);
        return Ok(defaults);
    };
    // A bad stored value must not block analytics; fall back to the defaults.
    match merge_analytics_patch(&defaults, saved_obj) {
        Ok(cfg) => Ok(cfg),
        Err(msg) => {
            tracing::warn!("ignoring stored {}: {}", ANALYTICS_CONFIG_KEY, msg);
            Ok(defaults)
        }
    }
}

pub fn save_analytics_config(conn: &Connection, cfg: &AnalyticsConfig) -> anyhow::Result<()> {
    db::settings_set_json(conn, ANALYTICS_CONFIG_KEY, &serde_json::to_value(cfg)?)
}
