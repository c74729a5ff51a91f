//! Analysis data model
//!
//! Defines the records exchanged with the compute backend:
//! - Analysis and user identifiers
//! - The `Analysis` snapshot and its reduced `AnalysisContext` projection
//! - Pipeline module, model and variable enumerations
//!
//! Wire names follow the backend exactly; timestamps accept both RFC 3339
//! and the naive ISO-8601 form the backend emits.

use crate::error::InvariantViolation;
use crate::status::AnalyzeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque model configuration payload, set once during configuration
pub type ModelConfig = Map<String, Value>;

/// Unique analysis identifier, assigned by the backend at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisId(pub Uuid);

impl AnalysisId {
    /// Generate a random identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnalysisId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AnalysisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AnalysisId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Owning user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generate a random identifier
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Pipeline stage currently executing on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleName {
    /// Data loading and dataframe construction
    #[default]
    LoadModule,
    /// Descriptive statistics
    DescribeModule,
    /// Model estimation
    EstimateModule,
    /// Residual validation
    ValidateModule,
    /// Risk map generation
    RiskMapModule,
    /// Any stage this client does not recognise
    #[serde(other)]
    Unknown,
}

impl ModuleName {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadModule => "load_module",
            Self::DescribeModule => "describe_module",
            Self::EstimateModule => "estimate_module",
            Self::ValidateModule => "validate_module",
            Self::RiskMapModule => "risk_map_module",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistical model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Simple model
    #[serde(rename = "Model1_Simple")]
    Model1Simple,
    /// Autoregressive model
    #[serde(rename = "Model2_Autoregressive")]
    Model2Autoregressive,
    /// User-defined MB model
    #[serde(rename = "Model3_MB_User")]
    Model3MbUser,
    /// Urban heat island model
    #[serde(rename = "Model4_UHI")]
    Model4Uhi,
    /// RAB model
    #[serde(rename = "Model5_RAB")]
    Model5Rab,
    /// User-defined HSDPD model
    #[serde(rename = "Model6_HSDPD_user")]
    Model6HsdpdUser,
    /// Any model family this client does not recognise
    #[serde(other)]
    Unknown,
}

/// Climate variable available as endogenous or covariate input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisVariable {
    #[serde(rename = "maximum_air_temperature_adjusted")]
    MaximumAirTemperatureAdjusted,
    #[serde(rename = "mean_air_temperature_adjusted")]
    MeanAirTemperatureAdjusted,
    #[serde(rename = "minimum_air_temperature_adjusted")]
    MinimumAirTemperatureAdjusted,
    #[serde(rename = "mean_relative_humidity_adjusted")]
    MeanRelativeHumidityAdjusted,
    #[serde(rename = "accumulated_precipitation_adjusted")]
    AccumulatedPrecipitationAdjusted,
    #[serde(rename = "mean_wind_speed_adjusted")]
    MeanWindSpeedAdjusted,
    #[serde(rename = "black_sky_albedo_all_mean")]
    BlackSkyAlbedoAllMean,
    #[serde(rename = "LST_h18")]
    LstH18,
}

/// Summary statistic applied when aggregating series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SummaryStat {
    #[default]
    #[serde(rename = "mean")]
    Mean,
    #[serde(rename = "standard_deviation")]
    StandardDeviation,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "median")]
    Median,
    #[serde(rename = "range")]
    Range,
    #[serde(rename = "count.NAs")]
    CountNas,
}

/// Geographic point chosen for the analysis
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

/// Full state of one analysis as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Stable identifier
    pub id: AnalysisId,
    /// Owning user
    pub user_id: UserId,
    /// Lifecycle status
    pub status: AnalyzeStatus,
    /// Executing stage; meaningful only while in progress
    #[serde(default)]
    pub current_module: ModuleName,
    /// Configuration payload, absent until configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config_data: Option<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<ModelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Dynamic vs. static output rendering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dynamic_output: Option<bool>,
    #[serde(default, with = "timestamp::optional", skip_serializing_if = "Option::is_none")]
    pub analysis_date: Option<DateTime<Utc>>,
    #[serde(default, with = "timestamp::optional", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last backend-side modification; orders competing snapshots
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Failure description, present iff status is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Analysis {
    /// Fresh pending analysis, as returned by the create endpoint
    #[must_use]
    pub fn pending(id: AnalysisId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            status: AnalyzeStatus::Pending,
            current_module: ModuleName::LoadModule,
            model_config_data: None,
            model_type: None,
            coordinates: None,
            is_dynamic_output: None,
            analysis_date: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    /// Status is `completed` or `error`
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether an observer should keep polling this analysis
    #[inline]
    #[must_use]
    pub fn should_poll(&self) -> bool {
        self.status.should_poll()
    }

    /// Whether this snapshot may replace `current` on screen.
    ///
    /// Equal timestamps resolve to the incoming snapshot.
    #[inline]
    #[must_use]
    pub fn supersedes(&self, current: &Analysis) -> bool {
        self.updated_at >= current.updated_at
    }

    /// Reduced projection used by module pages
    #[must_use]
    pub fn context(&self) -> AnalysisContext {
        AnalysisContext {
            id: self.id,
            model_type: self.model_type,
            is_dynamic_output: self.is_dynamic_output,
            status: self.status,
            coordinates: self.coordinates,
            model_config_data: self.model_config_data.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Check the data-model invariants
    ///
    /// # Errors
    /// - `InvariantViolation::ConfigWhilePending` if a pending analysis carries configuration
    /// - `InvariantViolation::MissingConfig` if a configured-or-later analysis has none
    /// - `InvariantViolation::ErrorMessageMismatch` if `error_message` and `status = error` disagree
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        match self.status {
            AnalyzeStatus::Pending if self.model_config_data.is_some() => {
                return Err(InvariantViolation::ConfigWhilePending(self.id));
            }
            AnalyzeStatus::Configured | AnalyzeStatus::InProgress | AnalyzeStatus::Completed
                if self.model_config_data.is_none() =>
            {
                return Err(InvariantViolation::MissingConfig {
                    id: self.id,
                    status: self.status,
                });
            }
            _ => {}
        }

        let is_error = self.status == AnalyzeStatus::Error;
        if is_error != self.error_message.is_some() {
            return Err(InvariantViolation::ErrorMessageMismatch {
                id: self.id,
                status: self.status,
            });
        }

        Ok(())
    }
}

/// Essential analysis data for module pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub id: AnalysisId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_type: Option<ModelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dynamic_output: Option<bool>,
    pub status: AnalyzeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_config_data: Option<ModelConfig>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

/// Timestamp (de)serialization tolerant of naive backend timestamps
pub(crate) mod timestamp {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    /// Parse RFC 3339, falling back to naive ISO-8601 read as UTC
    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| Utc.from_utc_datetime(&naive))
    }

    pub(crate) fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(crate) mod optional {
        use chrono::{DateTime, Utc};
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<S>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|raw| {
                super::parse(&raw)
                    .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
            })
            .transpose()
        }
    }
}
