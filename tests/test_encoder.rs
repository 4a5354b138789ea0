//! Tests for the safe result encoder and the wire payload.

extern crate cseval;

use cseval::encoder::{encode_value, EncodeError, EncoderLimits};
use cseval::eval::{EngineConfig, ScriptEngine};
use cseval::runner::ds::types::{TypeDesc, TypeKind};
use cseval::runner::ds::value::Value;
use serde_json::{json, Value as Json};

fn eval_json(code: &str) -> Json {
    let bytes = ScriptEngine::default().evaluate_to_json(code);
    serde_json::from_slice(&bytes).expect("valid JSON")
}

fn return_value(code: &str) -> Json {
    let doc = eval_json(code);
    assert!(doc["exception"].is_null(), "{:?} failed: {}", code, doc["exception"]);
    assert!(
        doc["diagnostics"].as_array().map_or(true, |d| d.is_empty()),
        "{:?} did not compile: {}",
        code,
        doc["diagnostics"]
    );
    doc["returnValue"].clone()
}

// ── Wire shape ────────────────────────────────────────────────

#[test]
fn test_wire_fields() {
    let doc = eval_json("Console.WriteLine(\"hi\"); 1+1");
    assert_eq!(doc["code"], "Console.WriteLine(\"hi\"); 1+1");
    assert_eq!(doc["consoleOut"], "hi\n");
    assert_eq!(doc["returnValue"], 2);
    assert_eq!(doc["returnTypeName"], "int");
    assert!(doc["exception"].is_null());
    assert!(doc["exceptionType"].is_null());
    assert_eq!(doc["diagnostics"], json!([]));
    let compile_time = doc["compileTime"].as_str().unwrap();
    assert_eq!(compile_time.len(), "00:00:00.0000000".len());
    assert_eq!(&compile_time[2..3], ":");
}

#[test]
fn test_exception_payload() {
    let doc = eval_json("throw new Exception(\"boom\")");
    assert_eq!(doc["exception"], "boom");
    assert_eq!(doc["exceptionType"], "Exception");
    assert!(doc["returnValue"].is_null());
    assert_eq!(doc["diagnostics"].as_array().map(Vec::len), Some(0));
    assert_ne!(doc["executionTime"], "00:00:00.0000000");
}

#[test]
fn test_diagnostics_payload() {
    let doc = eval_json("1+");
    let diagnostics = doc["diagnostics"].as_array().unwrap();
    assert!(!diagnostics.is_empty());
    assert_eq!(diagnostics[0]["severity"], "Error");
    assert!(diagnostics[0]["location"]["startLine"].is_number());
    assert!(doc["returnValue"].is_null());
}

// ── Rules ─────────────────────────────────────────────────────

#[test]
fn test_non_finite_doubles() {
    assert_eq!(return_value("double.NaN"), "NaN");
    assert_eq!(return_value("1.0 / 0.0"), "Infinity");
    assert_eq!(return_value("-1.0 / 0.0"), "-Infinity");
}

#[test]
fn test_number_like_values() {
    assert_eq!(return_value("(Int128)long.MaxValue + 1"), "9223372036854775808");
    assert_eq!(return_value("(Int128)42"), 42);
    assert_eq!(return_value("(UInt128)ulong.MaxValue"), json!(u64::MAX));
    assert_eq!(return_value("10000000000000000000m"), "10000000000000000000");
    assert_eq!(return_value("10m"), 10);
    assert_eq!(return_value("1.25m"), "1.25");
}

#[test]
fn test_chars_and_strings() {
    assert_eq!(return_value("'x'"), "x");
    assert_eq!(return_value("\"text\""), "text");
}

#[test]
fn test_byte_sequences_are_integer_arrays() {
    assert_eq!(return_value("Encoding.UTF8.GetBytes(\"AB\")"), json!([65, 66]));
    assert_eq!(return_value("new List<byte> { (byte)1, (byte)2 }"), json!([1, 2]));
}

#[test]
fn test_multi_dimensional_arrays_nest() {
    assert_eq!(return_value("new int[3, 2]"), json!([[0, 0], [0, 0], [0, 0]]));
    assert_eq!(return_value("new int[,] { { 1, 2 }, { 3, 4 } }"), json!([[1, 2], [3, 4]]));
}

#[test]
fn test_lower_bounds_are_honoured() {
    let code = r#"
var a = Array.CreateInstance(typeof(int), new[] { 3, 2 }, new[] { 1, 5 });
a.SetValue(7, 3, 6);
a
"#;
    assert_eq!(return_value(code), json!([[0, 0], [0, 0], [0, 7]]));
}

#[test]
fn test_structural_values() {
    assert_eq!(return_value("new List<int> { 1, 2, 3 }"), json!([1, 2, 3]));
    assert_eq!(
        return_value("new Dictionary<string, int> { { \"a\", 1 }, { \"b\", 2 } }"),
        json!({"a": 1, "b": 2})
    );
    assert_eq!(
        return_value("new Dictionary<int, bool> { { 1, true } }"),
        json!({"1": true})
    );
    assert_eq!(return_value("new { Name = \"n\", Count = 2 }"), json!({"Name": "n", "Count": 2}));
    assert_eq!(return_value("Enumerable.Range(1, 3)"), json!([1, 2, 3]));
}

#[test]
fn test_handles_are_names() {
    assert_eq!(return_value("typeof(string)"), "System.String");
    assert_eq!(return_value("typeof(int).TypeHandle"), "System.Int32");
}

#[test]
fn test_exceptions_as_values() {
    let value = return_value("new InvalidOperationException(\"bad\")");
    assert_eq!(value["message"], "bad");
    assert!(value["hResult"].is_number());
}

// ── Cycles and limits ─────────────────────────────────────────

#[test]
fn test_cyclic_object_member_is_dropped() {
    let code = r#"
var e = new ExpandoObject();
e.Name = "root";
e.Self = e;
e
"#;
    assert_eq!(return_value(code), json!({"Name": "root"}));
}

#[test]
fn test_cyclic_sequence_slot_is_null() {
    let code = r#"
var list = new List<object>();
list.Add(1);
list.Add(list);
list
"#;
    assert_eq!(return_value(code), json!([1, null]));
}

#[test]
fn test_node_limit_triggers_fallback() {
    let doc = eval_json("Enumerable.Range(0, 1000000)");
    assert_eq!(doc["exceptionType"], "JsonException");
    let message = doc["exception"].as_str().unwrap();
    assert!(message.starts_with("An exception occurred when serializing the response: JsonException: "));
    assert!(doc["returnValue"].is_null());
    assert_eq!(doc["code"], "Enumerable.Range(0, 1000000)");
}

#[test]
fn test_fallback_keeps_console_output() {
    let engine = ScriptEngine::new(EngineConfig::default().with_encoder_limits(EncoderLimits {
        max_depth: 256,
        max_nodes: 3,
    }));
    let bytes = engine.evaluate_to_json("Console.Write(\"kept\"); new List<int> { 1, 2, 3, 4 }");
    let doc: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(doc["consoleOut"], "kept");
    assert_eq!(doc["exceptionType"], "JsonException");
}

#[test]
fn test_depth_limit() {
    let mut value = Value::new_list(TypeDesc::object(), vec![]);
    for _ in 0..10 {
        value = Value::new_list(TypeDesc::object(), vec![value]);
    }
    let limits = EncoderLimits {
        max_depth: 4,
        max_nodes: 1000,
    };
    assert!(matches!(encode_value(&value, &limits), Err(EncodeError::TooDeep(4))));
    assert!(encode_value(&value, &EncoderLimits::default()).is_ok());
}

#[test]
fn test_unsupported_dictionary_key_kind() {
    let err = EncodeError::NotSupported("x".into());
    assert_eq!(err.kind(), "NotSupportedException");
    let key = Value::new_list(TypeDesc::of(TypeKind::Int32), vec![]);
    let dict = cseval::runner::ds::value::DictData::new(TypeDesc::object(), TypeDesc::of(TypeKind::Int32));
    let dict = Value::Dictionary(std::rc::Rc::new(std::cell::RefCell::new(dict)));
    if let Value::Dictionary(d) = &dict {
        d.borrow_mut().insert(key, Value::Int(1), false).unwrap();
    }
    let err = encode_value(&dict, &EncoderLimits::default()).unwrap_err();
    assert_eq!(err.kind(), "NotSupportedException");
}
