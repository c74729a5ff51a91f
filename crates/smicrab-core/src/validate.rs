//! Configuration payload validation
//!
//! A payload must pass here before it is sent; this is the guard on the
//! pending -> configured transition.

use crate::error::ValidationErrors;
use crate::requests::{SaveParametersRequest, VectorOptions};
use crate::types::ModelType;

impl SaveParametersRequest {
    /// Collect every field error in the payload
    ///
    /// # Errors
    /// Returns all field errors found, never just the first.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.model_type == ModelType::Unknown {
            errors.push("model_type", "Unsupported model type");
        }
        if !(-180.0..=180.0).contains(&self.user_longitude_choice) {
            errors.push("user_longitude_choice", "Longitude must be between -180 and 180");
        }
        if !(-90.0..=90.0).contains(&self.user_latitude_choice) {
            errors.push("user_latitude_choice", "Latitude must be between -90 and 90");
        }
        if self.user_coeff_choice.is_nan() || self.user_coeff_choice < 0.0 {
            errors.push("user_coeff_choice", "Coefficient must be non-negative");
        }

        if self.covariate_variables.contains(&self.endogenous_variable) {
            errors.push(
                "covariate_variables",
                "Endogenous variable cannot be included in covariate variables",
            );
        }
        if let Some(legs) = &self.covariate_legs {
            if !legs.is_empty() && legs.len() != self.covariate_variables.len() {
                errors.push(
                    "covariate_legs",
                    format!(
                        "Expected {} lags, one per covariate, got {}",
                        self.covariate_variables.len(),
                        legs.len()
                    ),
                );
            }
        }

        self.vec_options.collect_errors(&mut errors);
        errors.into_result()
    }
}

impl VectorOptions {
    fn collect_errors(&self, errors: &mut ValidationErrors) {
        let minimums = [
            ("vec_options.groups", self.groups, "Groups must be at least 1"),
            ("vec_options.px_core", self.px_core, "Core pixels must be at least 1"),
            ("vec_options.px_neighbors", self.px_neighbors, "Neighbor pixels must be at least 1"),
            ("vec_options.t_frequency", self.t_frequency, "Time frequency must be at least 1"),
        ];
        for (field, value, message) in minimums {
            if value < 1 {
                errors.push(field, message);
            }
        }
        if self.na_covs.trim().is_empty() {
            errors.push("vec_options.NAcovs", "NA covariate handling method is required");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::requests::SaveParametersRequest;
    use crate::types::{AnalysisId, AnalysisVariable, ModelType};

    fn fields(request: &SaveParametersRequest) -> Vec<String> {
        request
            .validate()
            .err()
            .map(|e| e.fields().iter().map(|f| f.field.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(SaveParametersRequest::new(AnalysisId::new()).validate().is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut request = SaveParametersRequest::new(AnalysisId::new())
            .with_location(91.0, -181.0)
            .with_coefficient(-0.5);
        request.vec_options.groups = 0;
        request.vec_options.na_covs = "  ".into();

        assert_eq!(
            fields(&request),
            vec![
                "user_longitude_choice",
                "user_latitude_choice",
                "user_coeff_choice",
                "vec_options.groups",
                "vec_options.NAcovs",
            ]
        );
    }

    #[test]
    fn test_unrecognised_model_is_not_sent() {
        let request =
            SaveParametersRequest::new(AnalysisId::new()).with_model_type(ModelType::Unknown);
        assert_eq!(fields(&request), vec!["model_type"]);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let request = SaveParametersRequest::new(AnalysisId::new())
            .with_location(-90.0, 180.0)
            .with_coefficient(0.0);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_endogenous_not_a_covariate() {
        let request = SaveParametersRequest::new(AnalysisId::new()).with_variables(
            AnalysisVariable::LstH18,
            vec![AnalysisVariable::MeanWindSpeedAdjusted, AnalysisVariable::LstH18],
        );
        assert_eq!(fields(&request), vec!["covariate_variables"]);
    }

    #[test]
    fn test_lags_match_covariates() {
        let mut request = SaveParametersRequest::new(AnalysisId::new()).with_variables(
            AnalysisVariable::LstH18,
            vec![AnalysisVariable::MeanWindSpeedAdjusted],
        );
        request.covariate_legs = Some(vec![1, 2]);
        assert_eq!(fields(&request), vec!["covariate_legs"]);

        request.covariate_legs = Some(vec![]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_nan_coefficient_rejected() {
        let request = SaveParametersRequest::new(AnalysisId::new()).with_coefficient(f64::NAN);
        assert_eq!(fields(&request), vec!["user_coeff_choice"]);
    }
}
