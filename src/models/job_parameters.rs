//! Typed job parameters and the identity key derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value of a single job parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    String(String),
    Long(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

impl ParameterValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Date(_) => "date",
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobParameter {
    pub value: ParameterValue,
    /// Only identifying parameters take part in job instance identity
    pub identifying: bool,
}

/// Parameters a job was launched with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobParameters {
    parameters: BTreeMap<String, JobParameter>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> JobParametersBuilder {
        JobParametersBuilder::default()
    }

    pub fn get(&self, key: &str) -> Option<&JobParameter> {
        self.parameters.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.parameters.get(key).map(|p| &p.value) {
            Some(ParameterValue::String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.parameters.get(key).map(|p| &p.value) {
            Some(ParameterValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameters that define the job instance identity
    pub fn identifying(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.parameters
            .iter()
            .filter(|(_, p)| p.identifying)
            .map(|(k, p)| (k.as_str(), &p.value))
    }

    /// Canonical string for the identifying parameters.
    ///
    /// Keys are sorted and strings are quoted, so two parameter sets produce the
    /// same key exactly when their identifying entries are equal.
    pub fn identity_key(&self) -> String {
        let mut key = String::new();
        for (name, value) in self.identifying() {
            key.push_str(&format!(
                "{:?}={}:{:?};",
                name,
                value.type_name(),
                value.to_string()
            ));
        }
        key
    }
}

#[derive(Debug, Default)]
pub struct JobParametersBuilder {
    parameters: BTreeMap<String, JobParameter>,
}

impl JobParametersBuilder {
    fn add(mut self, key: impl Into<String>, value: ParameterValue, identifying: bool) -> Self {
        self.parameters
            .insert(key.into(), JobParameter { value, identifying });
        self
    }

    pub fn add_string(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, ParameterValue::String(value.into()), true)
    }

    pub fn add_long(self, key: impl Into<String>, value: i64) -> Self {
        self.add(key, ParameterValue::Long(value), true)
    }

    pub fn add_double(self, key: impl Into<String>, value: f64) -> Self {
        self.add(key, ParameterValue::Double(value), true)
    }

    pub fn add_date(self, key: impl Into<String>, value: DateTime<Utc>) -> Self {
        self.add(key, ParameterValue::Date(value), true)
    }

    /// Add a parameter that is recorded but ignored for instance identity
    pub fn add_non_identifying(self, key: impl Into<String>, value: ParameterValue) -> Self {
        self.add(key, value, false)
    }

    pub fn build(self) -> JobParameters {
        JobParameters {
            parameters: self.parameters,
        }
    }
}
