//! Operation validation: structural checks before anything is persisted.

use crate::error::ValidationError;
use crate::operation::{NewOperation, ParamValue};

/// Validate an operation before it is enqueued.
///
/// This checks:
/// - The endpoint is non-empty
/// - Every parameter has a non-empty name
/// - Float parameters are finite (they must survive query encoding)
pub fn validate_operation(op: &NewOperation) -> Result<(), ValidationError> {
    if op.endpoint.trim().is_empty() {
        return Err(ValidationError::EmptyEndpoint);
    }

    for (name, value) in &op.parameters {
        if name.is_empty() {
            return Err(ValidationError::EmptyParameterName);
        }
        if let ParamValue::Float(x) = value {
            if !x.is_finite() {
                return Err(ValidationError::NonFiniteParameter(name.clone()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Parameters;

    #[test]
    fn test_valid_operation() {
        let mut params = Parameters::new();
        params.insert("id".into(), ParamValue::from(1));
        let op = NewOperation::new("/api/mark", params);
        assert!(validate_operation(&op).is_ok());
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let op = NewOperation::new("  ", Parameters::new());
        assert!(matches!(
            validate_operation(&op),
            Err(ValidationError::EmptyEndpoint)
        ));
    }

    #[test]
    fn test_empty_parameter_name_rejected() {
        let mut params = Parameters::new();
        params.insert(String::new(), ParamValue::from(1));
        let op = NewOperation::new("/api/mark", params);
        assert!(matches!(
            validate_operation(&op),
            Err(ValidationError::EmptyParameterName)
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let mut params = Parameters::new();
        params.insert("score".into(), ParamValue::Float(f64::NAN));
        let op = NewOperation::new("/api/mark", params);
        assert!(matches!(
            validate_operation(&op),
            Err(ValidationError::NonFiniteParameter(name)) if name == "score"
        ));
    }
}
