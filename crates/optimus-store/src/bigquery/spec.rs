//! Kind-specific spec documents and their validation.
//!
//! A resource spec is a free-form JSON object; each kind decodes it into
//! one of the structs below. Unknown keys are ignored.

use chrono::{DateTime, Utc};
use optimus_core::error::{OptimusError, OptimusResult};
use optimus_core::models::resource::{Kind, Resource, Spec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::naming::ENTITY_BIGQUERY;

const FIELD_MODES: [&str; 3] = ["nullable", "required", "repeated"];
const RECORD_TYPES: [&str; 2] = ["record", "struct"];

pub const PARTITION_DAY: &str = "day";
pub const PARTITION_HOUR: &str = "hour";
pub const PARTITION_RANGE: &str = "range";

pub const SOURCE_GOOGLE_SHEETS: &str = "google_sheets";
pub const SOURCE_CSV: &str = "csv";

const MILLIS_PER_HOUR: i64 = 3_600_000;

fn invalid(message: impl Into<String>) -> OptimusError {
    OptimusError::invalid_argument(ENTITY_BIGQUERY, message)
}

/// Converts a lifetime in hours to the milliseconds BigQuery expects.
/// The result must be positive and fit in an `i64`.
pub fn expiration_millis(what: &str, hours: i64) -> OptimusResult<i64> {
    if hours <= 0 {
        return Err(invalid(format!("{what} must be positive, got {hours}")));
    }
    hours
        .checked_mul(MILLIS_PER_HOUR)
        .ok_or_else(|| invalid(format!("{what} of {hours} hours is too large")))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDetails {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Default lifetime of new tables, in hours.
    #[serde(default)]
    pub table_expiration: Option<i64>,
}

impl DatasetDetails {
    pub fn validate(&self) -> OptimusResult<()> {
        if let Some(hours) = self.table_expiration {
            expiration_millis("table_expiration", hours)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    /// Nested fields of a record.
    #[serde(default)]
    pub schema: Vec<Field>,
}

impl Field {
    pub fn validate(&self) -> OptimusResult<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("field name is empty"));
        }
        if self.field_type.trim().is_empty() {
            return Err(invalid(format!("field type is empty for {}", self.name)));
        }
        if let Some(mode) = &self.mode {
            let lowered = mode.to_lowercase();
            if !FIELD_MODES.contains(&lowered.as_str()) {
                return Err(invalid(format!(
                    "unknown field mode {mode} for {}",
                    self.name
                )));
            }
        }
        if RECORD_TYPES.contains(&self.field_type.to_lowercase().as_str()) {
            if self.schema.is_empty() {
                return Err(invalid(format!("record field {} has no schema", self.name)));
            }
            validate_schema(&self.schema)
                .map_err(|e| invalid(format!("invalid schema for record {}: {e}", self.name)))?;
        }
        Ok(())
    }
}

pub type Schema = Vec<Field>;

pub fn validate_schema(schema: &[Field]) -> OptimusResult<()> {
    if schema.is_empty() {
        return Err(invalid("schema is empty"));
    }
    schema.iter().try_for_each(Field::validate)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRange {
    pub start: i64,
    pub end: i64,
    pub interval: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(rename = "type", default)]
    pub partition_type: String,
    /// Partition lifetime in hours, time partitioning only.
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub range: Option<PartitionRange>,
}

impl Partition {
    pub fn kind(&self) -> String {
        self.partition_type.to_lowercase()
    }

    pub fn is_range(&self) -> bool {
        self.kind() == PARTITION_RANGE
    }

    pub fn validate(&self) -> OptimusResult<()> {
        match self.kind().as_str() {
            PARTITION_DAY | PARTITION_HOUR => {
                if self.range.is_some() {
                    return Err(invalid("range is only allowed for range partitioning"));
                }
                if let Some(hours) = self.expiration {
                    expiration_millis("partition expiration", hours)?;
                }
                Ok(())
            }
            PARTITION_RANGE => {
                if self.field.as_deref().is_none_or(|f| f.trim().is_empty()) {
                    return Err(invalid("range partition requires a field"));
                }
                let Some(range) = &self.range else {
                    return Err(invalid("range partition requires a range"));
                };
                if range.interval <= 0 {
                    return Err(invalid("range partition interval must be positive"));
                }
                if range.start >= range.end {
                    return Err(invalid("range partition start must be below end"));
                }
                if self.expiration.is_some() {
                    return Err(invalid("expiration is not allowed for range partitioning"));
                }
                Ok(())
            }
            other => Err(invalid(format!("unknown partition type {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub using: Vec<String>,
}

impl Cluster {
    pub fn validate(&self) -> OptimusResult<()> {
        if self.using.is_empty() {
            return Err(invalid("cluster columns are empty"));
        }
        if self.using.iter().any(|c| c.trim().is_empty()) {
            return Err(invalid("one of cluster columns is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub cluster: Option<Cluster>,
    #[serde(default)]
    pub partition: Option<Partition>,
    #[serde(default)]
    pub expiration_time: Option<DateTime<Utc>>,
}

impl Table {
    pub fn validate(&self) -> OptimusResult<()> {
        validate_schema(&self.schema)?;
        if let Some(partition) = &self.partition {
            partition.validate()?;
        }
        if let Some(cluster) = &self.cluster {
            cluster.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub view_query: String,
}

impl View {
    pub fn validate(&self) -> OptimusResult<()> {
        if self.view_query.trim().is_empty() {
            return Err(invalid("view query is empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Sheet range, e.g. `Sheet1!A1:D100`.
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub skip_leading_rows: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalSource {
    #[serde(rename = "type", default)]
    pub source_type: String,
    #[serde(default)]
    pub source_uris: Vec<String>,
    #[serde(default)]
    pub config: SourceConfig,
}

impl ExternalSource {
    pub fn kind(&self) -> String {
        self.source_type.to_lowercase()
    }

    pub fn validate(&self) -> OptimusResult<()> {
        let kind = self.kind();
        if kind != SOURCE_GOOGLE_SHEETS && kind != SOURCE_CSV {
            return Err(invalid(format!(
                "unsupported external source type {:?}",
                self.source_type
            )));
        }
        if self.source_uris.is_empty() {
            return Err(invalid("source uri list is empty"));
        }
        if self.source_uris.iter().any(|u| u.trim().is_empty()) {
            return Err(invalid("one of source uris is empty"));
        }
        if let Some(rows) = self.config.skip_leading_rows {
            if rows < 0 {
                return Err(invalid("skip_leading_rows cannot be negative"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalTable {
    #[serde(default)]
    pub description: String,
    /// Empty means the backend infers the schema from the source.
    #[serde(default)]
    pub schema: Schema,
    #[serde(default)]
    pub source: Option<ExternalSource>,
}

impl ExternalTable {
    pub fn validate(&self) -> OptimusResult<()> {
        if !self.schema.is_empty() {
            validate_schema(&self.schema)?;
        }
        match &self.source {
            Some(source) => source.validate(),
            None => Err(invalid("external table source is empty")),
        }
    }
}

/// Decodes a resource spec into `T`.
pub fn decode<T: DeserializeOwned>(full_name: &str, spec: &Spec) -> OptimusResult<T> {
    serde_json::from_value(serde_json::Value::Object(spec.clone())).map_err(|e| {
        invalid(format!("not able to decode spec for {full_name}: {e}"))
    })
}

/// Decodes and validates the spec for the resource's kind.
pub fn validate_spec(res: &Resource) -> OptimusResult<()> {
    let name = res.full_name();
    let outcome = match res.kind() {
        Kind::Dataset => decode::<DatasetDetails>(name, res.spec())?.validate(),
        Kind::Table => decode::<Table>(name, res.spec())?.validate(),
        Kind::View => decode::<View>(name, res.spec())?.validate(),
        Kind::ExternalTable => decode::<ExternalTable>(name, res.spec())?.validate(),
    };
    outcome.map_err(|e| invalid(format!("invalid {} spec for {name}: {e}", res.kind())))
}

#[cfg(test)]
mod tests {
    use optimus_core::ErrorKind;
    use serde_json::json;

    use super::*;

    fn table_spec(value: serde_json::Value) -> OptimusResult<()> {
        let spec = value.as_object().cloned().unwrap_or_default();
        decode::<Table>("p.d.t", &spec)?.validate()
    }

    #[test]
    fn table_requires_schema() {
        assert!(table_spec(json!({ "description": "d" })).is_err());
        assert!(table_spec(json!({ "schema": [{ "name": "id", "type": "STRING" }] })).is_ok());
    }

    #[test]
    fn field_rules() {
        assert!(table_spec(json!({ "schema": [{ "name": "", "type": "STRING" }] })).is_err());
        assert!(table_spec(json!({ "schema": [{ "name": "id" }] })).is_err());
        assert!(
            table_spec(json!({ "schema": [{ "name": "id", "type": "STRING", "mode": "Repeated" }] }))
                .is_ok()
        );
        assert!(
            table_spec(json!({ "schema": [{ "name": "id", "type": "STRING", "mode": "sometimes" }] }))
                .is_err()
        );
    }

    #[test]
    fn nested_record_schema_is_validated() {
        let ok = json!({ "schema": [{
            "name": "address", "type": "RECORD",
            "schema": [{ "name": "city", "type": "STRING" }]
        }]});
        assert!(table_spec(ok).is_ok());

        let bad = json!({ "schema": [{
            "name": "address", "type": "RECORD",
            "schema": [{ "name": "city", "type": "" }]
        }]});
        assert!(table_spec(bad).is_err());

        let empty = json!({ "schema": [{ "name": "address", "type": "record" }] });
        assert!(table_spec(empty).is_err());
    }

    #[test]
    fn partition_rules() {
        let schema = json!([{ "name": "id", "type": "INTEGER" }]);
        assert!(table_spec(json!({ "schema": schema, "partition": { "field": "ts", "type": "DAY", "expiration": 24 } })).is_ok());
        assert!(table_spec(json!({ "schema": schema, "partition": { "type": "hour" } })).is_ok());
        assert!(table_spec(json!({ "schema": schema, "partition": { "type": "month" } })).is_err());
        assert!(table_spec(json!({ "schema": schema, "partition": { "field": "id", "type": "range" } })).is_err());
        assert!(table_spec(json!({
            "schema": schema,
            "partition": { "field": "id", "type": "range", "range": { "start": 0, "end": 100, "interval": 10 } }
        }))
        .is_ok());
        assert!(table_spec(json!({
            "schema": schema,
            "partition": { "field": "id", "type": "range", "range": { "start": 0, "end": 100, "interval": 0 } }
        }))
        .is_err());
    }

    #[test]
    fn expiration_must_fit_in_millis() {
        assert_eq!(expiration_millis("e", 24).unwrap(), 86_400_000);
        assert!(expiration_millis("e", 0).is_err());

        let err = expiration_millis("table_expiration", i64::MAX / 1_000).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("too large"), "{err}");

        let dataset = |hours: i64| {
            let spec = json!({ "table_expiration": hours }).as_object().cloned().unwrap();
            decode::<DatasetDetails>("p.d", &spec).unwrap().validate()
        };
        assert!(dataset(720).is_ok());
        assert!(dataset(i64::MAX).is_err());

        let schema = json!([{ "name": "id", "type": "INTEGER" }]);
        let huge = json!({ "schema": schema, "partition": { "type": "day", "expiration": i64::MAX } });
        assert!(table_spec(huge).is_err());
    }

    #[test]
    fn cluster_rules() {
        let schema = json!([{ "name": "id", "type": "INTEGER" }]);
        assert!(table_spec(json!({ "schema": schema, "cluster": { "using": ["id"] } })).is_ok());
        assert!(table_spec(json!({ "schema": schema, "cluster": { "using": [] } })).is_err());
        assert!(table_spec(json!({ "schema": schema, "cluster": { "using": ["id", " "] } })).is_err());
    }

    #[test]
    fn view_requires_query() {
        let spec = json!({ "description": "v" }).as_object().cloned().unwrap();
        assert!(decode::<View>("p.d.v", &spec).unwrap().validate().is_err());
        let spec = json!({ "view_query": "select 1" }).as_object().cloned().unwrap();
        assert!(decode::<View>("p.d.v", &spec).unwrap().validate().is_ok());
    }

    #[test]
    fn external_table_rules() {
        let check = |value: serde_json::Value| {
            let spec = value.as_object().cloned().unwrap();
            decode::<ExternalTable>("p.d.e", &spec).unwrap().validate()
        };
        assert!(check(json!({ "description": "e" })).is_err());
        assert!(check(json!({ "source": { "type": "google_sheets", "source_uris": [] } })).is_err());
        assert!(check(json!({ "source": { "type": "google_sheets", "source_uris": [""] } })).is_err());
        assert!(check(json!({ "source": { "type": "parquet", "source_uris": ["gs://b/f"] } })).is_err());
        assert!(check(json!({
            "source": {
                "type": "GOOGLE_SHEETS",
                "source_uris": ["https://docs.google.com/spreadsheets/d/abc"],
                "config": { "range": "Sheet1!A1:B10", "skip_leading_rows": 1 }
            }
        }))
        .is_ok());
        assert!(check(json!({
            "schema": [{ "name": "", "type": "STRING" }],
            "source": { "type": "csv", "source_uris": ["gs://b/f.csv"] }
        }))
        .is_err());
    }

    #[test]
    fn undecodable_spec_is_invalid_argument() {
        let spec = json!({ "schema": "not a list" }).as_object().cloned().unwrap();
        let err = decode::<Table>("p.d.t", &spec).unwrap_err();
        assert!(err.to_string().contains("not able to decode spec for p.d.t"));
    }
}
