//! Console built-in object.
//!
//! Output goes to the request-scoped sink on the [`EvalContext`], never to
//! the host's stdout.

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::TypeKind;
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{BuiltInObject, EvalContext};

use super::string::render_arguments;

/// Register the Console object with the registry.
pub fn register(registry: &mut BuiltInRegistry) {
    let console = BuiltInObject::new(TypeKind::Console)
        .add_method("Write", console_write)
        .add_method("WriteLine", console_write_line);

    registry.register_object(console);
}

/// Console.Write - append to the sink.
fn console_write(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let text = render_arguments(&args, ctx.limits.max_string_len)?;
    ctx.console.write(&text);
    Ok(Value::Null)
}

/// Console.WriteLine - append followed by a newline.
fn console_write_line(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let mut text = render_arguments(&args, ctx.limits.max_string_len)?;
    text.push('\n');
    ctx.console.write(&text);
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_line_uses_composite_format() {
        let mut ctx = EvalContext::default();
        console_write(&mut ctx, Value::Null, vec![Value::string("a")]).unwrap();
        console_write_line(
            &mut ctx,
            Value::Null,
            vec![Value::string("{0}+{1}"), Value::Int(1), Value::Bool(true)],
        )
        .unwrap();
        console_write_line(&mut ctx, Value::Null, vec![]).unwrap();
        assert_eq!(ctx.console.contents(), "a1+True\n\n");
    }
}
