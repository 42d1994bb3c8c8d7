use time::PrimitiveDateTime;

/// One normalized meter reading, keyed by `timestamp`.
///
/// Column names follow the target table. Every measurement is nullable and
/// already rounded to two decimals; the `*_avg` fields and `power_factor` are
/// only present when all three phases were reported.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryRecord {
    pub timestamp: PrimitiveDateTime,

    pub voltage_ab: Option<f64>,
    pub voltage_bc: Option<f64>,
    pub voltage_ca: Option<f64>,
    pub voltage_ll_avg: Option<f64>,

    pub voltage_an: Option<f64>,
    pub voltage_bn: Option<f64>,
    pub voltage_cn: Option<f64>,
    pub voltage_ln_avg: Option<f64>,

    pub current_a: Option<f64>,
    pub current_b: Option<f64>,
    pub current_c: Option<f64>,
    pub current_avg: Option<f64>,

    pub power_a: Option<f64>,
    pub power_b: Option<f64>,
    pub power_c: Option<f64>,
    pub power_total: Option<f64>,

    pub power_factor_a: Option<f64>,
    pub power_factor_b: Option<f64>,
    pub power_factor_c: Option<f64>,
    pub power_factor: Option<f64>,

    pub energy_kwh: Option<f64>,
    pub energy_bt: Option<f64>,
    pub energy_cd: Option<f64>,
    pub energy_td: Option<f64>,
}

impl TelemetryRecord {
    /// A record with only the key set.
    pub fn empty(timestamp: PrimitiveDateTime) -> Self {
        Self {
            timestamp,
            voltage_ab: None,
            voltage_bc: None,
            voltage_ca: None,
            voltage_ll_avg: None,
            voltage_an: None,
            voltage_bn: None,
            voltage_cn: None,
            voltage_ln_avg: None,
            current_a: None,
            current_b: None,
            current_c: None,
            current_avg: None,
            power_a: None,
            power_b: None,
            power_c: None,
            power_total: None,
            power_factor_a: None,
            power_factor_b: None,
            power_factor_c: None,
            power_factor: None,
            energy_kwh: None,
            energy_bt: None,
            energy_cd: None,
            energy_td: None,
        }
    }
}
