//! Mapping of provider readings onto [`TelemetryRecord`].

mod timestamp;

use serde_json::{Map, Value};
use telemetry_client::domain::TelemetryRecord;
use time::PrimitiveDateTime;

pub use timestamp::{parse_fallback, parse_primary};

/// One reading exactly as the provider returned it.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.field(key).and_then(coerce_f64)
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Normalize a day's raw readings.
///
/// Output order follows input order. Readings without a usable timestamp are
/// dropped; bad numeric fields only null out that field.
pub fn normalize(raw: &[RawRecord]) -> Vec<TelemetryRecord> {
    let records: Vec<TelemetryRecord> = raw.iter().filter_map(normalize_one).collect();

    let dropped = raw.len() - records.len();
    if dropped > 0 {
        tracing::debug!(dropped, total = raw.len(), "dropped readings without a parseable timestamp");
        metrics::counter!("normalize_dropped_records_total").increment(dropped as u64);
    }

    records
}

fn normalize_one(item: &RawRecord) -> Option<TelemetryRecord> {
    let timestamp = reading_timestamp(item)?;

    let v_a = item.number("v_A");
    let v_b = item.number("v_B");
    let v_c = item.number("v_C");
    let v_ab = item.number("v_AD");
    let v_bc = item.number("v_BD");
    let v_ca = item.number("v_CD");

    let a_a = item.number("a_A");
    let a_b = item.number("a_B");
    let a_c = item.number("a_C");

    let pf_a = item.number("pF_A");
    let pf_b = item.number("pF_B");
    let pf_c = item.number("pF_C");

    Some(TelemetryRecord {
        timestamp,
        voltage_ab: round2(v_ab),
        voltage_bc: round2(v_bc),
        voltage_ca: round2(v_ca),
        voltage_ll_avg: round2(mean3(v_ab, v_bc, v_ca)),
        voltage_an: round2(v_a),
        voltage_bn: round2(v_b),
        voltage_cn: round2(v_c),
        voltage_ln_avg: round2(mean3(v_a, v_b, v_c)),
        current_a: round2(a_a),
        current_b: round2(a_b),
        current_c: round2(a_c),
        current_avg: round2(mean3(a_a, a_b, a_c)),
        power_a: round2(item.number("aP_A")),
        power_b: round2(item.number("aP_B")),
        power_c: round2(item.number("aP_C")),
        power_total: round2(item.number("aP_T")),
        power_factor_a: round2(pf_a),
        power_factor_b: round2(pf_b),
        power_factor_c: round2(pf_c),
        power_factor: round2(mean3(pf_a, pf_b, pf_c)),
        energy_kwh: round2(item.number("importkwh")),
        energy_bt: round2(item.number("impbt")),
        energy_cd: round2(item.number("impcd")),
        energy_td: round2(item.number("imptd")),
    })
}

/// `ngaygio` must be present; `gio` is only consulted when it fails to parse.
fn reading_timestamp(item: &RawRecord) -> Option<PrimitiveDateTime> {
    let primary = item.field("ngaygio").and_then(Value::as_str).filter(|s| !s.is_empty())?;

    parse_primary(primary).or_else(|| {
        item.field("gio")
            .and_then(Value::as_str)
            .and_then(parse_fallback)
    })
}

/// Numbers and numeric strings become `f64`; anything else is treated as missing.
fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    n.is_finite().then_some(n)
}

fn mean3(a: Option<f64>, b: Option<f64>, c: Option<f64>) -> Option<f64> {
    Some((a? + b? + c?) / 3.0)
}

fn round2(v: Option<f64>) -> Option<f64> {
    v.map(|x| (x * 100.0).round() / 100.0)
}
