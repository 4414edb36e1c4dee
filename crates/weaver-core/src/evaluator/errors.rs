use thiserror::Error;

/// Evaluator-specific error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluatorError {
    #[error("Type error: {operation} requires {expected}, got {actual}")]
    TypeError {
        operation: String,
        expected: String,
        actual: String,
    },

    #[error("Type error: cannot {operation} {left_type} and {right_type}")]
    BinaryTypeError {
        operation: String,
        left_type: String,
        right_type: String,
    },

    #[error("Class '{0}' not found")]
    ClassNotFound(String),

    #[error("Property '{property}' not found on {class}")]
    PropertyNotFound { property: String, class: String },

    #[error("Method '{method}' not found on {class}")]
    MethodNotFound { method: String, class: String },

    #[error("Variable '{name}' not found")]
    VariableNotFound { name: String },

    #[error("Function '{0}' not found")]
    FunctionNotFound(String),

    #[error("{callable} expects {expected} argument(s), got {actual}")]
    Arity {
        callable: String,
        expected: String,
        actual: usize,
    },

    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in {0}")]
    Overflow(String),

    #[error("Maximum call depth {0} exceeded")]
    StackOverflow(usize),

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Advice failed: {0}")]
    Advice(String),
}

impl EvaluatorError {
    /// Create a type error for unary operations
    pub fn unary_type_error(operation: &str, expected: &str, actual: &str) -> Self {
        Self::TypeError {
            operation: operation.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a type error for binary operations
    pub fn binary_type_error(operation: &str, left_type: &str, right_type: &str) -> Self {
        Self::BinaryTypeError {
            operation: operation.to_string(),
            left_type: left_type.to_string(),
            right_type: right_type.to_string(),
        }
    }

    pub fn property_not_found(property: &str, class: &str) -> Self {
        Self::PropertyNotFound {
            property: property.to_string(),
            class: class.to_string(),
        }
    }

    pub fn method_not_found(method: &str, class: &str) -> Self {
        Self::MethodNotFound {
            method: method.to_string(),
            class: class.to_string(),
        }
    }

    pub fn variable_not_found(name: &str) -> Self {
        Self::VariableNotFound {
            name: name.to_string(),
        }
    }

    pub fn arity(callable: &str, expected: impl ToString, actual: usize) -> Self {
        Self::Arity {
            callable: callable.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}
