//! Tests for IL-style disassembly of method fragments.

extern crate cseval;

use cseval::eval::{DisassemblyEngine, DisassemblyResult};

fn disasm(fragment: &str) -> String {
    let text = DisassemblyEngine.disassemble(fragment).render();
    eprintln!("{}", text);
    text
}

#[test]
fn test_main_listing() {
    let text = disasm("int x = 40; return x + 2;");
    assert!(text.starts_with(".method public hidebysig instance object Main() cil managed\n{\n"));
    assert!(text.contains("  .maxstack "));
    assert!(text.contains("  .locals init (\n    [0] int32 x"));
    assert!(text.contains("IL_0000: "));
    assert!(text.contains("ldc.i4 40"));
    assert!(text.contains("add"));
    assert!(text.ends_with("}\n\n"));
}

#[test]
fn test_local_functions_follow_main() {
    let text = disasm("int Twice(int n) { return n * 2; } return Twice(21);");
    let main = text.find("Main() cil managed").expect("Main listed");
    let local = text.find(".method assembly").expect("local function listed");
    assert!(main < local);
    assert_eq!(text.matches(".method").count(), 2);
    assert!(text.contains("assembly hidebysig static int32"));
}

#[test]
fn test_constructor_is_not_listed() {
    let text = disasm("return null;");
    assert!(!text.contains(".ctor"));
    assert_eq!(text.matches(".method").count(), 1);
}

#[test]
fn test_missing_return_fails_to_emit() {
    match DisassemblyEngine.disassemble("var x = 1;") {
        DisassemblyResult::EmitFailed(diagnostics) => {
            assert!(!diagnostics.is_empty());
            assert!(diagnostics.iter().any(|d| d.message.contains("not all code paths return a value")));
        }
        DisassemblyResult::Listing(_) => panic!("expected an emit failure"),
    }
}

#[test]
fn test_emit_failed_rendering() {
    let text = disasm("return undefinedName;");
    assert!(text.starts_with("Emit Failed\n"));
    assert!(text.contains("The name 'undefinedName' does not exist in the current context"));
    assert!(text.ends_with('\n'));
}

#[test]
fn test_unsafe_is_allowed() {
    let text = disasm("unsafe { var y = 1; } return 0;");
    assert!(!text.starts_with("Emit Failed"));
}

#[test]
fn test_fragment_imports() {
    let text = disasm("return new List<int> { 1 }.Count;");
    assert!(!text.starts_with("Emit Failed"));
}

fn il_offset(line: &str) -> usize {
    usize::from_str_radix(&line[3..7], 16).unwrap()
}

#[test]
fn test_identity_return_has_no_conversion() {
    let text = disasm("int Same(int a) { return a; } return Same(1);");
    let local = &text[text.find(".method assembly").expect("local function listed")..];
    assert!(local.contains("ldarg.0"));
    assert!(!local.contains("conv.i4"));
}

#[test]
fn test_conversion_offsets_are_one_byte() {
    let text = disasm("long Widen(int a) { return a; } return Widen(1);");
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| l.starts_with("IL_")).collect();
    let at = lines
        .iter()
        .position(|l| l.ends_with("conv.i8"))
        .expect("widening conversion listed");
    assert_eq!(il_offset(lines[at + 1]), il_offset(lines[at]) + 1);
}

#[test]
fn test_pointer_locals_are_reported() {
    let text = disasm("unsafe { int* p = null; } return 1;");
    assert!(text.starts_with("Emit Failed\n"));
    assert!(text.contains("Pointer types are not supported"));
    assert!(!text.contains("left-hand side of an assignment"));
}
