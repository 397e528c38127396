//! Request validation, run before a route handler executes.
//!
//! A handler declares validators per stage; the worker runs the stage
//! matching the request method in declared order and stops at the first
//! failure, which becomes a client-error response.

use crate::request::ParamMap;

/// Which parameter set a validator inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    /// Query-string parameters (non-POST requests).
    QueryParameters,
    /// Form parameters decoded from the request body (POST requests).
    BodyParameters,
}

/// Outcome of a single validator.
#[derive(Debug, Clone)]
pub enum ValidationOutcome {
    Success,
    Failure { reason: String },
}

impl ValidationOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure { reason: reason.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// A predicate over a request's parameter map.
pub trait Validator: Send + Sync {
    fn validate(&self, params: &ParamMap) -> ValidationOutcome;
}

struct FnValidator<F>(F);

impl<F: Fn(&ParamMap) -> ValidationOutcome + Send + Sync> Validator for FnValidator<F> {
    fn validate(&self, params: &ParamMap) -> ValidationOutcome {
        (self.0)(params)
    }
}

/// Wraps a closure as a [`Validator`].
pub fn validator_fn<F>(f: F) -> impl Validator
where
    F: Fn(&ParamMap) -> ValidationOutcome + Send + Sync,
{
    FnValidator(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_fn_wraps_the_closure() {
        let validator = validator_fn(|params: &ParamMap| {
            if params.contains("token") {
                ValidationOutcome::Success
            } else {
                ValidationOutcome::failure("token is required")
            }
        });

        assert!(!validator.validate(&ParamMap::default()).is_success());
    }
}
