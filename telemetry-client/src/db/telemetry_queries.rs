use anyhow::Result;
use sqlx::PgExecutor;
use time::PrimitiveDateTime;

use super::SqlIdent;
use crate::domain::TelemetryRecord;

/// Insert column order; `timestamp` last so it can double as the key bind.
pub const TELEMETRY_COLUMNS: [&str; 25] = [
    "voltage_ab",
    "voltage_bc",
    "voltage_ca",
    "voltage_ll_avg",
    "voltage_an",
    "voltage_bn",
    "voltage_cn",
    "voltage_ln_avg",
    "current_a",
    "current_b",
    "current_c",
    "current_avg",
    "power_a",
    "power_b",
    "power_c",
    "power_total",
    "power_factor_a",
    "power_factor_b",
    "power_factor_c",
    "power_factor",
    "energy_kwh",
    "energy_bt",
    "energy_cd",
    "energy_td",
    "timestamp",
];

/// Latest reading time stored in `table`, or `None` when the table is empty.
pub async fn latest_timestamp<'e, E>(executor: E, table: &SqlIdent) -> Result<Option<PrimitiveDateTime>>
where
    E: PgExecutor<'e>,
{
    let sql = format!("SELECT MAX(timestamp) FROM {table}");
    let latest = sqlx::query_scalar::<_, Option<PrimitiveDateTime>>(&sql)
        .fetch_one(executor)
        .await?;

    Ok(latest)
}

/// Conditional insert statement for one record.
///
/// The `NOT EXISTS` guard is what keeps `timestamp` unique; callers must not
/// rely on a table constraint.
pub fn insert_if_absent_sql(table: &SqlIdent) -> String {
    let columns = TELEMETRY_COLUMNS.join(", ");
    let placeholders = (1..=TELEMETRY_COLUMNS.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let ts_param = TELEMETRY_COLUMNS.len();

    format!(
        "INSERT INTO {table} ({columns}) \
         SELECT {placeholders} \
         WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE timestamp = ${ts_param})"
    )
}

/// Insert `record` unless a row with the same timestamp exists.
///
/// Returns the number of rows written (0 or 1).
pub async fn insert_if_absent<'e, E>(executor: E, sql: &str, record: &TelemetryRecord) -> Result<u64>
where
    E: PgExecutor<'e>,
{
    let r = record;
    let result = sqlx::query(sql)
        .bind(r.voltage_ab)
        .bind(r.voltage_bc)
        .bind(r.voltage_ca)
        .bind(r.voltage_ll_avg)
        .bind(r.voltage_an)
        .bind(r.voltage_bn)
        .bind(r.voltage_cn)
        .bind(r.voltage_ln_avg)
        .bind(r.current_a)
        .bind(r.current_b)
        .bind(r.current_c)
        .bind(r.current_avg)
        .bind(r.power_a)
        .bind(r.power_b)
        .bind(r.power_c)
        .bind(r.power_total)
        .bind(r.power_factor_a)
        .bind(r.power_factor_b)
        .bind(r.power_factor_c)
        .bind(r.power_factor)
        .bind(r.energy_kwh)
        .bind(r.energy_bt)
        .bind(r.energy_cd)
        .bind(r.energy_td)
        .bind(r.timestamp)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Run the server-side cleaning procedure over `[from, to)`.
pub async fn run_transform<'e, E>(
    executor: E,
    procedure: &SqlIdent,
    from: PrimitiveDateTime,
    to: PrimitiveDateTime,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let sql = format!("CALL {procedure}($1, $2)");
    sqlx::query(&sql).bind(from).bind(to).execute(executor).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_guards_on_timestamp_and_binds_every_column() {
        let table = SqlIdent::parse("evncpc_tb_2").unwrap();
        let sql = insert_if_absent_sql(&table);

        assert!(sql.starts_with("INSERT INTO evncpc_tb_2 (voltage_ab, "));
        assert!(sql.contains("$25 WHERE NOT EXISTS"));
        assert!(sql.ends_with("WHERE timestamp = $25)"));
        assert!(!sql.contains("$26"));
    }
}
