//! Host globals: `Cmd(name, args)` runs a process and echoes its output to
//! the script console.

use std::process::{Command, Stdio};

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::TypeKind;
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, required_str, to_str, BuiltInObject, EvalContext};

pub fn register(registry: &mut BuiltInRegistry) {
    let globals = BuiltInObject::new(TypeKind::Globals).add_method("Cmd", globals_cmd);
    registry.register_object(globals);
}

/// Splits an argument string on whitespace, honouring double quotes.
fn split_arguments(args: &str) -> Vec<String> {
    let mut out = vec![];
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for c in args.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    out.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        out.push(current);
    }
    out
}

fn globals_cmd(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Cmd", &args, 1, 2)?;
    let name = required_str("Cmd", "fileName", &args[0])?;
    let arguments = match args.get(1) {
        Some(v) => to_str("Cmd", v)?.unwrap_or_default(),
        None => String::new(),
    };
    log::info!("Script started process '{}'", name);
    let output = Command::new(&name)
        .args(split_arguments(&arguments))
        .stdin(Stdio::null())
        .output()
        .map_err(|e| {
            ScriptError::invalid_operation(format!(
                "An error occurred trying to start process '{}'. {}",
                name, e
            ))
        })?;
    ctx.console.write(&String::from_utf8_lossy(&output.stdout));
    ctx.console.write("\n");
    ctx.console.write(&String::from_utf8_lossy(&output.stderr));
    ctx.console.write("\n");
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_respect_quotes() {
        assert_eq!(
            split_arguments(r#"-la "my dir"  x"#),
            vec!["-la".to_string(), "my dir".to_string(), "x".to_string()]
        );
        assert_eq!(split_arguments(r#""""#), vec![String::new()]);
        assert!(split_arguments("   ").is_empty());
    }

    #[test]
    fn missing_program_is_invalid_operation() {
        let mut ctx = EvalContext::default();
        let err = globals_cmd(&mut ctx, Value::Null, vec![Value::string("/no/such/program")]).unwrap_err();
        assert_eq!(err.kind(), TypeKind::InvalidOperationException);
    }
}
