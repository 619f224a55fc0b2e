/// runbox-runner - the in-sandbox half of the execution contract
///
/// Invoked as `runbox-runner <path-to-script>` inside the jail. Whatever
/// happens, exactly one single-line JSON envelope is printed on stdout and
/// the exit code reflects `ok`: 0 on success, nonzero on any failure path.
/// The supervising worker recovers the diagnostic from the envelope even
/// when the exit code says the run failed.
mod engine;

use runbox_common::RunnerEnvelope;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        emit(&RunnerEnvelope::failure(
            "runbox-runner expects exactly one argument: path to user script",
            String::new(),
        ));
        std::process::exit(2);
    }

    let script_path = &args[1];
    let source = match std::fs::read_to_string(script_path) {
        Ok(source) => source,
        Err(e) => {
            emit(&RunnerEnvelope::failure(
                format!("LoadError: failed to read {}: {}", script_path, e),
                String::new(),
            ));
            std::process::exit(1);
        }
    };

    let heap_limit_mb = std::env::var("RUNNER_HEAP_MB")
        .ok()
        .and_then(|v| v.parse().ok());

    let evaluation = engine::evaluate(source, heap_limit_mb);
    match evaluation.outcome {
        Ok(value) => {
            emit(&RunnerEnvelope::success(value, evaluation.stdout));
            std::process::exit(0);
        }
        Err(e) => {
            emit(&RunnerEnvelope::failure(e.to_string(), evaluation.stdout));
            std::process::exit(1);
        }
    }
}

fn emit(envelope: &RunnerEnvelope) {
    match serde_json::to_string(envelope) {
        Ok(line) => println!("{}", line),
        // Last-resort envelope so the emitting guarantee holds even if
        // encoding the real one fails
        Err(_) => println!(
            "{}",
            r#"{"ok":false,"stdout":"","error":"RunnerInternal: failed to encode result envelope"}"#
        ),
    }
}
