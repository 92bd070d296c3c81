//! Provider-defined functions.

use std::collections::HashMap;

use crate::diagnostic::{Diagnostic, FunctionError};
use crate::schema::StringKind;
use crate::tftypes::Type;
use crate::types::DynamicValue;

/// Signature and documentation of a provider function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    /// Positional parameters.
    pub parameters: Vec<FunctionParameter>,
    /// Trailing parameter accepting any number of arguments.
    pub variadic_parameter: Option<FunctionParameter>,
    /// Return definition.
    pub returns: Option<FunctionReturn>,
    /// Short description.
    pub summary: String,
    /// Long description.
    pub description: String,
    /// Format of `description`.
    pub description_kind: StringKind,
    /// Set when the function is deprecated.
    pub deprecation_message: String,
}

impl Function {
    /// Create a function returning `return_type`.
    pub fn new(return_type: Type) -> Self {
        Self {
            returns: Some(FunctionReturn {
                ty: Some(return_type),
            }),
            ..Default::default()
        }
    }

    /// Add a positional parameter.
    pub fn with_parameter(mut self, parameter: FunctionParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Set the variadic parameter.
    pub fn with_variadic_parameter(mut self, parameter: FunctionParameter) -> Self {
        self.variadic_parameter = Some(parameter);
        self
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the function as deprecated.
    pub fn with_deprecation_message(mut self, message: impl Into<String>) -> Self {
        self.deprecation_message = message.into();
        self
    }

    /// Type of the argument at `index`, taking the variadic parameter into account.
    pub fn parameter_type(&self, index: usize) -> Option<&Type> {
        match self.parameters.get(index) {
            Some(param) => param.ty.as_ref(),
            None => self.variadic_parameter.as_ref().and_then(|p| p.ty.as_ref()),
        }
    }
}

/// A function parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionParameter {
    /// Parameter name, used in documentation and errors.
    pub name: String,
    /// Argument type.
    pub ty: Option<Type>,
    /// Null arguments are passed through instead of rejected by the host.
    pub allow_null_value: bool,
    /// Unknown arguments are passed through instead of short-circuiting.
    pub allow_unknown_values: bool,
    /// Human-readable description.
    pub description: String,
    /// Format of `description`.
    pub description_kind: StringKind,
}

impl FunctionParameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty),
            ..Default::default()
        }
    }

    /// Accept null arguments.
    pub fn allow_null(mut self) -> Self {
        self.allow_null_value = true;
        self
    }

    /// Accept unknown arguments.
    pub fn allow_unknown(mut self) -> Self {
        self.allow_unknown_values = true;
        self
    }
}

/// Return definition of a function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionReturn {
    /// Result type.
    pub ty: Option<Type>,
}

/// A function listed by GetMetadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionMetadata {
    /// Function name.
    pub name: String,
}

/// GetFunctions request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GetFunctionsRequest {}

/// GetFunctions response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetFunctionsResponse {
    /// Function definitions by name.
    pub functions: HashMap<String, Function>,
    /// Diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// CallFunction request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallFunctionRequest {
    /// Function name.
    pub name: String,
    /// Encoded arguments, in parameter order.
    pub arguments: Vec<DynamicValue>,
}

/// CallFunction response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallFunctionResponse {
    /// Encoded result.
    pub result: Option<DynamicValue>,
    /// Set when the call failed.
    pub error: Option<FunctionError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_type_with_variadic() {
        let function = Function::new(Type::String)
            .with_parameter(FunctionParameter::new("separator", Type::String))
            .with_variadic_parameter(FunctionParameter::new("parts", Type::Number).allow_null());

        assert_eq!(function.parameter_type(0), Some(&Type::String));
        assert_eq!(function.parameter_type(1), Some(&Type::Number));
        assert_eq!(function.parameter_type(7), Some(&Type::Number));
        assert!(function.variadic_parameter.as_ref().unwrap().allow_null_value);
    }

    #[test]
    fn test_parameter_type_without_variadic() {
        let function =
            Function::new(Type::Bool).with_parameter(FunctionParameter::new("input", Type::String));
        assert_eq!(function.parameter_type(1), None);
        assert_eq!(
            function.returns,
            Some(FunctionReturn {
                ty: Some(Type::Bool)
            })
        );
    }
}
