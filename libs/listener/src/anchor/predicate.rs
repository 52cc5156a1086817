use crate::error::{Error, Result};

use cel_interpreter::{Context as CelContext, Program, Value};
use tracing::warn;

/// Compiled CEL filter deciding whether a watched object triggers schema
/// generation.
///
/// The expression sees a single variable `object`, the watched resource as a
/// map. Compile errors fail controller setup; evaluation errors and
/// non-boolean results are logged and treated as "no match".
pub struct Predicate {
    program: Program,
    expression: String,
}

impl Predicate {
    pub fn compile(expression: &str) -> Result<Self> {
        let program =
            Program::compile(expression).map_err(|e| Error::PredicateCompileError(e.to_string()))?;
        Ok(Self {
            program,
            expression: expression.to_string(),
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn matches(&self, object: &serde_json::Value) -> bool {
        let mut context = CelContext::default();
        if let Err(e) = context.add_variable("object", object.clone()) {
            warn!(expression = %self.expression, error = %e, "predicate input not convertible");
            return false;
        }
        match self.program.execute(&context) {
            Ok(Value::Bool(matched)) => matched,
            Ok(_) => {
                warn!(expression = %self.expression, "predicate did not evaluate to a boolean");
                false
            }
            Err(e) => {
                warn!(expression = %self.expression, error = %e, "predicate evaluation failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_boolean_expression_matches() {
        let predicate = Predicate::compile(
            r#"object.kind == "ContentConfiguration" && object.metadata.name.startsWith("web")"#,
        )
        .unwrap();

        assert!(predicate.matches(&json!({
            "kind": "ContentConfiguration",
            "metadata": {"name": "web-ui"},
        })));
        assert!(!predicate.matches(&json!({
            "kind": "ContentConfiguration",
            "metadata": {"name": "backend"},
        })));
    }

    #[test]
    fn test_compile_error_is_fatal() {
        let result = Predicate::compile("object.kind ==");
        assert!(matches!(result, Err(Error::PredicateCompileError(_))));
    }

    #[test]
    fn test_runtime_error_evaluates_to_false() {
        // `missing` is an unknown variable, evaluation fails at runtime
        let predicate = Predicate::compile("missing == 1").unwrap();
        assert!(!predicate.matches(&json!({"kind": "X"})));
    }

    #[test]
    fn test_non_boolean_result_evaluates_to_false() {
        let predicate = Predicate::compile(r#"object.kind"#).unwrap();
        assert!(!predicate.matches(&json!({"kind": "X"})));
    }
}
