use crate::error::{Error, ValidationFailure};
use crate::vm::{ScriptFailure, ScriptVm};

/// Turn an evaluation failure into an [`Error::Validation`], re-running the
/// unoptimized program for a readable trace when possible.
///
/// The optimized validator strips trace messages, so without
/// `debug_program` (or without a failure context) only the evaluator's
/// message is reported.
pub fn recover(vm: &dyn ScriptVm, debug_program: Option<&[u8]>, failure: ScriptFailure) -> Error {
    let trace = match (&failure.context, debug_program) {
        (Some(context), Some(program)) => Some(
            match vm.run_program(program, &context.program_args()) {
                Ok(run) => render_run(&run.logs, &run.result),
                Err(e) => format!(
                    "error running program: {e} with error {}",
                    failure.message
                ),
            },
        ),
        (Some(_), None) => {
            log::warn!("script failed but no unoptimized program is available for tracing");
            None
        }
        (None, _) => None,
    };

    Error::Validation(Box::new(ValidationFailure {
        message: failure.message,
        trace,
    }))
}

fn render_run(logs: &[String], result: &std::result::Result<String, String>) -> String {
    let mut lines: Vec<String> = logs.to_vec();
    match result {
        Ok(term) => lines.push(format!("result: {term}")),
        Err(e) => lines.push(format!("error: {e}")),
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plutus_data::{PlutusData, PlutusDataExt};
    use crate::testing::MockVm;
    use crate::vm::FailureContext;

    fn failure(with_datum: bool) -> ScriptFailure {
        ScriptFailure {
            message: "validator returned false".into(),
            context: Some(FailureContext {
                datum: with_datum.then(|| PlutusData::integer(1)),
                redeemer: PlutusData::constr(1, vec![]),
                script_context: PlutusData::constr(0, vec![]),
            }),
        }
    }

    #[test]
    fn spending_failure_reruns_with_datum_first() {
        let vm = MockVm::default().with_debug_logs(vec!["owner signature missing".into()]);
        let err = recover(&vm, Some(b"debug"), failure(true));
        let Error::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(v.message, "validator returned false");
        let trace = v.trace.unwrap();
        assert!(trace.contains("owner signature missing"));
        assert_eq!(vm.last_run_arg_count(), Some(3));
    }

    #[test]
    fn non_spending_failure_runs_two_args() {
        let vm = MockVm::default();
        let _ = recover(&vm, Some(b"debug"), failure(false));
        assert_eq!(vm.last_run_arg_count(), Some(2));
    }

    #[test]
    fn missing_context_propagates_original() {
        let vm = MockVm::default();
        let err = recover(
            &vm,
            Some(b"debug"),
            ScriptFailure {
                message: "budget exceeded".into(),
                context: None,
            },
        );
        let Error::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert_eq!(v.trace, None);
        assert_eq!(v.to_string(), "budget exceeded");
        assert_eq!(vm.last_run_arg_count(), None);
    }

    #[test]
    fn failing_debug_run_is_reported() {
        let vm = MockVm::default().failing_debug_runs();
        let err = recover(&vm, Some(b"debug"), failure(true));
        let Error::Validation(v) = err else {
            panic!("expected validation error");
        };
        assert!(
            v.trace
                .unwrap()
                .starts_with("error running program: script VM error:")
        );
    }
}
