//! Request and response bodies for the mutation endpoints

use crate::status::AnalyzeStatus;
use crate::types::{Analysis, AnalysisId, AnalysisVariable, ModelType, SummaryStat, UserId};
use serde::{Deserialize, Serialize};

/// Body of `POST /analysis/create`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAnalysisRequest {
    pub user_id: UserId,
}

/// Spatial vectorisation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorOptions {
    pub groups: u32,
    pub px_core: u32,
    pub px_neighbors: u32,
    pub t_frequency: u32,
    pub na_rm: bool,
    /// Covariance NA handling method
    #[serde(rename = "NAcovs")]
    pub na_covs: String,
}

impl Default for VectorOptions {
    fn default() -> Self {
        Self {
            groups: 1,
            px_core: 1,
            px_neighbors: 3,
            t_frequency: 12,
            na_rm: true,
            na_covs: "pairwise.complete.obs".to_string(),
        }
    }
}

/// Body of `POST /analysis/parameters`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveParametersRequest {
    pub analysis_id: AnalysisId,
    pub model_type: ModelType,
    pub bool_update: bool,
    pub bool_trend: bool,
    pub summary_stat: SummaryStat,
    pub user_longitude_choice: f64,
    pub user_latitude_choice: f64,
    pub user_coeff_choice: f64,
    pub bool_dynamic: bool,
    pub endogenous_variable: AnalysisVariable,
    #[serde(default)]
    pub covariate_variables: Vec<AnalysisVariable>,
    /// One lag per covariate, or empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub covariate_legs: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_date_choice: Option<String>,
    #[serde(default)]
    pub vec_options: VectorOptions,
}

impl SaveParametersRequest {
    /// Request pre-filled with the dashboard's form defaults
    #[must_use]
    pub fn new(analysis_id: AnalysisId) -> Self {
        Self {
            analysis_id,
            model_type: ModelType::Model6HsdpdUser,
            bool_update: true,
            bool_trend: true,
            summary_stat: SummaryStat::Mean,
            user_longitude_choice: 11.2,
            user_latitude_choice: 45.1,
            user_coeff_choice: 1.0,
            bool_dynamic: true,
            endogenous_variable: AnalysisVariable::MeanAirTemperatureAdjusted,
            covariate_variables: Vec::new(),
            covariate_legs: None,
            user_date_choice: None,
            vec_options: VectorOptions::default(),
        }
    }

    /// Set the model family
    #[must_use]
    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = model_type;
        self
    }

    /// Set the analysed location
    #[must_use]
    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.user_latitude_choice = latitude;
        self.user_longitude_choice = longitude;
        self
    }

    /// Set endogenous variable and covariates
    #[must_use]
    pub fn with_variables(
        mut self,
        endogenous: AnalysisVariable,
        covariates: Vec<AnalysisVariable>,
    ) -> Self {
        self.endogenous_variable = endogenous;
        self.covariate_variables = covariates;
        self
    }

    /// Set the coefficient
    #[must_use]
    pub fn with_coefficient(mut self, coefficient: f64) -> Self {
        self.user_coeff_choice = coefficient;
        self
    }
}

/// Body of `POST /analysis/run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAnalysisRequest {
    pub analysis_id: AnalysisId,
}

/// Payload of a successful run request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAnalysisResponse {
    pub analysis_id: AnalysisId,
    pub status: AnalyzeStatus,
    pub execution_started: bool,
    #[serde(default)]
    pub message: String,
}

/// Payload of a successful delete request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAnalysisResponse {
    pub analysis_id: AnalysisId,
    pub deleted: bool,
    /// Whether a running compute container was torn down
    pub container_stopped: bool,
    #[serde(default)]
    pub message: String,
}

/// Payload of `GET /analysis/user/{user_id}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserAnalyses {
    #[serde(default)]
    pub analyses: Vec<Analysis>,
}
