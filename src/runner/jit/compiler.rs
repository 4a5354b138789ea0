//! AST-to-bytecode compiler.
//!
//! Walks the AST once per method and emits flat bytecode that the VM can
//! execute without tree-walking. Names are bound statically: locals to
//! slots, local functions to method indices and type names to the catalog
//! types visible through the context's imports and references.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::eval::context::{ExecutionContext, OptimizationLevel, SourceKind};
use crate::eval::result::Diagnostic;
use crate::parser::ast::{
    ArrayInitializer, AssignmentOperator, BinaryOperator, CatchClause, Declarator, ElementInitializer,
    Expr, ExprKind, ForInit, FunctionData, Initializer, InterpolationPart, Literal, LocalDeclaration,
    LogicalOperator, Meta, ProgramData, Statement, StatementType, TypeRef, UnaryOperator,
};
use crate::parser::{ParseError, ScriptParser};
use crate::runner::ds::decimal::Decimal;
use crate::runner::ds::types::{namespace_exists, types_named, TypeDesc, TypeKind};
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::CORE_REGISTRY;

use super::bytecode::{AnonShape, Chunk, Instruction, Method, MethodKind, OpCode, Parameter, Unit};

/// Output of one compilation: the unit when no error was reported, and every
/// diagnostic in the order it was produced.
#[derive(Debug)]
pub struct Compilation {
    pub unit: Option<Unit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Parses and compiles the context's source.
pub fn compile(context: &ExecutionContext, unit_name: &str) -> Compilation {
    let parsed = match context.options.kind {
        SourceKind::Script => ScriptParser::parse_to_ast_from_str(&context.source),
        SourceKind::Method => ScriptParser::parse_method_body(&context.source),
    };
    match parsed {
        Ok(program) => Compiler::new(context).compile_program(&program, unit_name),
        Err(err) => Compilation {
            unit: None,
            diagnostics: vec![parse_diagnostic(&err)],
        },
    }
}

fn parse_diagnostic(err: &ParseError) -> Diagnostic {
    Diagnostic::error(err.id, err.message.clone(), &err.meta)
}

/// What a simple name is bound to inside a method.
#[derive(Debug, Clone, Copy)]
enum Binding {
    Local(u32),
    Arg(u32),
    Function { index: usize, params: usize },
}

enum NameLookup {
    Found(Binding),
    /// A local of an enclosing method; local functions do not capture.
    Captured,
    Missing,
}

/// A name or member path that denotes a type or namespace rather than a value.
enum StaticTarget {
    Type(TypeDesc),
    Namespace(String),
}

/// Tracks loop context for break/continue resolution.
struct LoopContext {
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
    /// Protected regions open when the loop started.
    try_depth: usize,
    finally_depth: usize,
}

/// An open protected region. `protected` is false for catch bodies whose
/// handler has already been consumed.
#[derive(Clone, Copy)]
struct TryContext<'a> {
    protected: bool,
    finalizer: Option<&'a [Statement]>,
}

/// Assignable storage resolved by `prepare_place`.
enum Place {
    Local(u32),
    Arg(u32),
    Field { object: u32, name: u32 },
    Index { object: u32, indices: Vec<u32> },
    Invalid,
}

/// Per-method compilation state.
struct MethodBuilder<'a> {
    method: Method,
    index: usize,
    scopes: Vec<HashMap<String, Binding>>,
    loops: Vec<LoopContext>,
    tries: Vec<TryContext<'a>>,
    finally_depth: usize,
    /// Slots holding the exception of each enclosing catch, for `throw;`.
    catch_slots: Vec<u32>,
}

impl<'a> MethodBuilder<'a> {
    fn new(method: Method, index: usize) -> Self {
        MethodBuilder {
            method,
            index,
            scopes: vec![HashMap::new()],
            loops: vec![],
            tries: vec![],
            finally_depth: 0,
            catch_slots: vec![],
        }
    }

    fn lookup(&self, name: &str) -> Option<Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }
}

/// The bytecode compiler.
pub struct Compiler<'a> {
    context: &'a ExecutionContext,
    current: MethodBuilder<'a>,
    /// Builders of the methods enclosing `current`, outermost first.
    outer: Vec<MethodBuilder<'a>>,
    methods: Vec<Option<Method>>,
    /// Method index of each hoisted local function.
    functions: HashMap<*const FunctionData, usize>,
    anon_types: Vec<Rc<[String]>>,
    diagnostics: Vec<Diagnostic>,
    reported: HashSet<(String, usize, usize)>,
}

impl<'a> Compiler<'a> {
    pub fn new(context: &'a ExecutionContext) -> Self {
        let (name, kind) = match context.options.kind {
            SourceKind::Script => ("<Main>$", MethodKind::Script),
            SourceKind::Method => ("Main", MethodKind::Main),
        };
        Compiler {
            context,
            current: MethodBuilder::new(Method::new(name, kind, TypeDesc::object()), 0),
            outer: vec![],
            methods: vec![None],
            functions: HashMap::new(),
            anon_types: vec![],
            diagnostics: vec![],
            reported: HashSet::new(),
        }
    }

    /// Compile a full program AST into a unit.
    pub fn compile_program(mut self, program: &'a ProgramData, unit_name: &str) -> Compilation {
        self.compile_statements(&program.body);
        match self.context.options.kind {
            SourceKind::Script => {
                match &program.trailing_expression {
                    Some(expr) => self.compile_expr(expr),
                    None => {
                        self.emit(OpCode::LoadNull);
                    }
                }
                self.emit(OpCode::Ret);
            }
            SourceKind::Method => {
                if completes_normally_all(&program.body) {
                    self.error(
                        "E0161",
                        "'Code.Main()': not all code paths return a value",
                        &program.meta,
                    );
                }
                self.emit(OpCode::LoadNull);
                self.emit(OpCode::Ret);
            }
        }

        let main = self.current.method;
        self.methods[0] = Some(main);
        if self.context.options.kind == SourceKind::Method {
            let mut ctor = Method::new(".ctor", MethodKind::Constructor, TypeDesc::of(TypeKind::Void));
            ctor.chunk.emit_op(OpCode::LoadNull);
            ctor.chunk.emit_op(OpCode::Ret);
            self.methods.push(Some(ctor));
        }

        let has_errors = self.diagnostics.iter().any(Diagnostic::is_error);
        let unit = if has_errors {
            None
        } else {
            Some(Unit {
                name: unit_name.to_string(),
                methods: self.methods.into_iter().flatten().collect(),
                entry: 0,
            })
        };
        Compilation {
            unit,
            diagnostics: self.diagnostics,
        }
    }

    // ════════════════════════════════════════════════════════════
    // Helpers
    // ════════════════════════════════════════════════════════════

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.current.method.chunk
    }

    fn emit(&mut self, op: OpCode) -> usize {
        self.chunk().emit_op(op)
    }

    fn emit_with(&mut self, op: OpCode, operand: u32) -> usize {
        self.chunk().emit_with(op, operand)
    }

    fn emit_const(&mut self, value: Value) {
        let idx = self.chunk().add_constant(value);
        self.emit_with(OpCode::LoadConst, idx);
    }

    fn emit_type_op(&mut self, op: OpCode, desc: &TypeDesc) {
        let idx = self.chunk().add_type(desc);
        self.emit_with(op, idx);
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_with(op, 0)
    }

    fn patch(&mut self, jump: usize) {
        self.chunk().patch_jump(jump);
    }

    fn patch_to(&mut self, jump: usize, target: usize) {
        self.chunk().code[jump].operand = target as u32;
    }

    fn temp(&mut self) -> u32 {
        let slot = self.chunk().locals.len();
        self.chunk().add_local(&format!("V_{}", slot), None)
    }

    fn error(&mut self, id: &str, message: impl Into<String>, meta: &Meta) {
        self.report(Diagnostic::error(id, message, meta));
    }

    fn warning(&mut self, id: &str, message: impl Into<String>, meta: &Meta) {
        self.report(Diagnostic::warning(id, message, meta));
    }

    /// Finally blocks are compiled once per exit path, so identical
    /// diagnostics are reported once.
    fn report(&mut self, diagnostic: Diagnostic) {
        let key = (
            diagnostic.id.clone(),
            diagnostic.location.start,
            diagnostic.location.end,
        );
        if self.reported.insert(key) {
            self.diagnostics.push(diagnostic);
        }
    }

    fn push_scope(&mut self) {
        self.current.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.current.scopes.pop();
    }

    fn lookup_name(&self, name: &str) -> NameLookup {
        if let Some(binding) = self.current.lookup(name) {
            return NameLookup::Found(binding);
        }
        for builder in self.outer.iter().rev() {
            match builder.lookup(name) {
                Some(binding @ Binding::Function { .. }) => return NameLookup::Found(binding),
                Some(_) => return NameLookup::Captured,
                None => {}
            }
        }
        NameLookup::Missing
    }

    /// Declares a local in the innermost scope, rejecting names already used
    /// by this or an enclosing scope of the same method.
    fn declare_local(&mut self, name: &str, declared_type: Option<TypeDesc>, meta: &Meta) -> u32 {
        let in_scope = self
            .current
            .scopes
            .last()
            .map_or(false, |scope| scope.contains_key(name));
        if in_scope {
            self.error(
                "E0128",
                format!("A local variable or function named '{}' is already defined in this scope", name),
                meta,
            );
        } else if self.current.lookup(name).is_some() {
            self.error(
                "E0136",
                format!(
                    "A local or parameter named '{}' cannot be declared in this scope because that name is used in an enclosing local scope to define a local or parameter",
                    name
                ),
                meta,
            );
        }
        let slot = self.chunk().add_local(name, declared_type);
        if let Some(scope) = self.current.scopes.last_mut() {
            scope.insert(name.to_string(), Binding::Local(slot));
        }
        slot
    }

    // ════════════════════════════════════════════════════════════
    // Types
    // ════════════════════════════════════════════════════════════

    /// Public catalog types named `metadata_name` that this context can see.
    fn find_types(&self, metadata_name: &str, namespace: Option<&str>) -> Vec<TypeKind> {
        types_named(metadata_name)
            .iter()
            .copied()
            .filter(|kind| match namespace {
                Some(ns) => self.context.references(*kind) && kind.namespace() == ns,
                None => self.context.imports_type(*kind),
            })
            .collect()
    }

    fn resolve_type(&mut self, type_ref: &TypeRef, meta: &Meta) -> Option<TypeDesc> {
        match type_ref {
            TypeRef::Predefined(p) => Some(TypeDesc::from_predefined(*p)),
            TypeRef::Array { element, rank } => {
                let element = self.resolve_type(element, meta)?;
                Some(TypeDesc::array_of(element, *rank))
            }
            TypeRef::Named { path, args } => {
                let mut resolved_args = vec![];
                for arg in args {
                    resolved_args.push(self.resolve_type(arg, meta)?);
                }
                let (name, namespace) = match path.split_last() {
                    Some((name, ns)) if !ns.is_empty() => (name.as_str(), Some(ns.join("."))),
                    Some((name, _)) => (name.as_str(), None),
                    None => return None,
                };
                let metadata_name = if args.is_empty() {
                    name.to_string()
                } else {
                    format!("{}`{}", name, args.len())
                };
                let candidates = self.find_types(&metadata_name, namespace.as_deref());
                match candidates.as_slice() {
                    [kind] => Some(TypeDesc::Named(*kind, resolved_args)),
                    [] => {
                        self.report_missing_type(name, args.len(), namespace.as_deref(), meta);
                        None
                    }
                    [first, second, ..] => {
                        self.error(
                            "E0104",
                            format!(
                                "'{}' is an ambiguous reference between '{}' and '{}'",
                                name,
                                TypeDesc::of(*first).full_name(),
                                TypeDesc::of(*second).full_name()
                            ),
                            meta,
                        );
                        None
                    }
                }
            }
        }
    }

    fn report_missing_type(&mut self, name: &str, arity: usize, namespace: Option<&str>, meta: &Meta) {
        let other_arity = (0..=2)
            .filter(|n| *n != arity)
            .map(|n| if n == 0 { name.to_string() } else { format!("{}`{}", name, n) })
            .find_map(|metadata| self.find_types(&metadata, namespace).first().copied());
        if let Some(kind) = other_arity {
            let expected = kind.info().arity;
            if expected == 0 {
                self.error(
                    "E0308",
                    format!("The non-generic type '{}' cannot be used with type arguments", TypeDesc::of(kind).full_name()),
                    meta,
                );
            } else {
                self.error(
                    "E0305",
                    format!(
                        "Using the generic type '{}' requires {} type arguments",
                        TypeDesc::of(kind).full_name().split('`').next().unwrap_or(name),
                        expected
                    ),
                    meta,
                );
            }
            return;
        }
        match namespace {
            Some(ns) if namespace_exists(ns) => self.error(
                "E0234",
                format!(
                    "The type or namespace name '{}' does not exist in the namespace '{}' (are you missing an assembly reference?)",
                    name, ns
                ),
                meta,
            ),
            _ => self.error(
                "E0246",
                format!(
                    "The type or namespace name '{}' could not be found (are you missing a using directive or an assembly reference?)",
                    name
                ),
                meta,
            ),
        }
    }

    /// Resolves an expression used as the receiver of a member access to a
    /// type or namespace, without reporting anything.
    fn resolve_static(&self, expr: &Expr) -> Option<StaticTarget> {
        match &expr.kind {
            ExprKind::PredefinedType(p) => Some(StaticTarget::Type(TypeDesc::from_predefined(*p))),
            ExprKind::Name(name) => {
                if !matches!(self.lookup_name(name), NameLookup::Missing) {
                    return None;
                }
                match self.find_types(name, None).as_slice() {
                    [kind] if kind.info().arity == 0 => Some(StaticTarget::Type(TypeDesc::of(*kind))),
                    _ if namespace_exists(name) => Some(StaticTarget::Namespace(name.clone())),
                    _ => None,
                }
            }
            ExprKind::Member { object, name } => match self.resolve_static(object)? {
                StaticTarget::Namespace(ns) => {
                    let qualified = format!("{}.{}", ns, name);
                    match self.find_types(name, Some(&ns)).as_slice() {
                        [kind] if kind.info().arity == 0 => Some(StaticTarget::Type(TypeDesc::of(*kind))),
                        _ if namespace_exists(&qualified) => Some(StaticTarget::Namespace(qualified)),
                        _ => None,
                    }
                }
                StaticTarget::Type(_) => None,
            },
            _ => None,
        }
    }

    fn has_static_method(desc: &TypeDesc, name: &str) -> bool {
        match desc.kind() {
            Some(kind) => {
                CORE_REGISTRY.has_method(kind, name)
                    || (kind == TypeKind::Enumerable && CORE_REGISTRY.extension_method(name).is_some())
            }
            None => false,
        }
    }

    fn has_static_property(desc: &TypeDesc, name: &str) -> bool {
        desc.kind()
            .map_or(false, |kind| CORE_REGISTRY.get_property(kind, name).is_some())
    }

    // ════════════════════════════════════════════════════════════
    // Statements
    // ════════════════════════════════════════════════════════════

    fn compile_statements(&mut self, statements: &'a [Statement]) {
        self.hoist_functions(statements);
        let mut exited = false;
        let mut warned = false;
        for stmt in statements {
            let skippable = matches!(stmt.kind, StatementType::Empty | StatementType::LocalFunction(_));
            if exited && !warned && !skippable {
                self.warning("E0162", "Unreachable code detected", &stmt.meta);
                warned = true;
            }
            self.compile_statement(stmt);
            if !completes_normally(stmt) {
                exited = true;
            }
        }
    }

    /// Local functions are callable anywhere in their block.
    fn hoist_functions(&mut self, statements: &'a [Statement]) {
        for stmt in statements {
            let StatementType::LocalFunction(function) = &stmt.kind else {
                continue;
            };
            let key = Rc::as_ptr(function);
            let index = match self.functions.get(&key) {
                Some(index) => *index,
                None => {
                    let index = self.methods.len();
                    self.methods.push(None);
                    self.functions.insert(key, index);
                    index
                }
            };
            let exists = self
                .current
                .scopes
                .last()
                .map_or(false, |scope| scope.contains_key(&function.name));
            if exists {
                self.error(
                    "E0128",
                    format!(
                        "A local variable or function named '{}' is already defined in this scope",
                        function.name
                    ),
                    &function.meta,
                );
                continue;
            }
            let binding = Binding::Function {
                index,
                params: function.params.len(),
            };
            if let Some(scope) = self.current.scopes.last_mut() {
                scope.insert(function.name.clone(), binding);
            }
        }
    }

    fn compile_block(&mut self, statements: &'a [Statement]) {
        self.push_scope();
        self.compile_statements(statements);
        self.pop_scope();
    }

    fn compile_statement(&mut self, stmt: &'a Statement) {
        let is_block = matches!(stmt.kind, StatementType::Block(_) | StatementType::LocalFunction(_));
        if self.context.options.optimization == OptimizationLevel::Debug && !is_block {
            self.emit(OpCode::Nop);
        }
        match &stmt.kind {
            StatementType::Empty => {}
            StatementType::Expression(expr) => {
                let allowed = matches!(
                    expr.kind,
                    ExprKind::Assign { .. } | ExprKind::Update { .. } | ExprKind::Call { .. } | ExprKind::New { .. }
                );
                if !allowed {
                    self.error(
                        "E0201",
                        "Only assignment, call, increment, decrement, await, and new object expressions can be used as a statement",
                        &expr.meta,
                    );
                }
                self.compile_discarded(expr);
            }
            StatementType::Declaration(decl) => self.compile_local_declaration(decl),
            StatementType::Block(body) => self.compile_block(body),
            StatementType::Unsafe(body) => {
                if !self.context.options.allow_unsafe {
                    self.error(
                        "E0227",
                        "Unsafe code may only appear if compiling with /unsafe",
                        &stmt.meta,
                    );
                }
                self.compile_block(body);
            }
            StatementType::If {
                test,
                consequent,
                alternate,
            } => {
                self.compile_expr(test);
                let jump_to_else = self.emit_jump(OpCode::BrFalse);
                self.compile_embedded(consequent);
                if let Some(alternate) = alternate {
                    let jump_over_else = self.emit_jump(OpCode::Br);
                    self.patch(jump_to_else);
                    self.compile_embedded(alternate);
                    self.patch(jump_over_else);
                } else {
                    self.patch(jump_to_else);
                }
            }
            StatementType::While { test, body } => {
                let loop_start = self.chunk().current_pos();
                self.begin_loop();
                self.compile_expr(test);
                let exit_jump = self.emit_jump(OpCode::BrFalse);
                self.compile_embedded(body);
                self.emit_with(OpCode::Br, loop_start as u32);
                self.patch(exit_jump);
                self.end_loop(loop_start);
            }
            StatementType::DoWhile { body, test } => {
                let loop_start = self.chunk().current_pos();
                self.begin_loop();
                self.compile_embedded(body);
                let continue_target = self.chunk().current_pos();
                self.compile_expr(test);
                self.emit_with(OpCode::BrTrue, loop_start as u32);
                self.end_loop(continue_target);
            }
            StatementType::For {
                init,
                test,
                update,
                body,
            } => self.compile_for(init.as_ref(), test.as_ref(), update, body),
            StatementType::Foreach {
                declared_type,
                name,
                iterable,
                body,
            } => self.compile_foreach(declared_type.as_ref(), name, iterable, body, &stmt.meta),
            StatementType::Try {
                block,
                handlers,
                finalizer,
            } => self.compile_try(block, handlers, finalizer.as_deref()),
            StatementType::Break => self.compile_loop_exit(true, &stmt.meta),
            StatementType::Continue => self.compile_loop_exit(false, &stmt.meta),
            StatementType::Return(argument) => self.compile_return(argument.as_ref(), &stmt.meta),
            StatementType::Throw(argument) => self.compile_throw(argument.as_ref(), &stmt.meta),
            StatementType::LocalFunction(function) => self.compile_local_function(function),
        }
    }

    /// Statements in embedded positions (`if` branches, loop bodies) get
    /// their own scope even without braces.
    fn compile_embedded(&mut self, stmt: &'a Statement) {
        if let StatementType::Declaration(decl) = &stmt.kind {
            self.error(
                "E1023",
                "Embedded statement cannot be a declaration or labeled statement",
                &decl.meta,
            );
        }
        self.push_scope();
        self.compile_statements(std::slice::from_ref(stmt));
        self.pop_scope();
    }

    fn compile_local_declaration(&mut self, decl: &'a LocalDeclaration) {
        let declared = match &decl.declared_type {
            Some(type_ref) => match self.resolve_type(type_ref, &decl.meta) {
                Some(desc) => Some(desc),
                None => return,
            },
            None => None,
        };
        if declared.is_none() && decl.declarators.len() > 1 {
            self.error(
                "E0819",
                "Implicitly-typed variables cannot have multiple declarators",
                &decl.meta,
            );
        }
        if declared.as_ref().map_or(false, |d| d.is(TypeKind::Void)) {
            self.error("E1547", "Keyword 'void' cannot be used in this context", &decl.meta);
        }
        for declarator in &decl.declarators {
            self.compile_declarator(declared.as_ref(), declarator);
        }
    }

    fn compile_declarator(&mut self, declared: Option<&TypeDesc>, declarator: &'a Declarator) {
        let meta = &declarator.meta;
        match (declared, &declarator.init) {
            (None, None) => {
                self.error("E0818", "Implicitly-typed variables must be initialized", meta);
            }
            (None, Some(Initializer::Array(_))) => {
                self.error(
                    "E0820",
                    "Cannot initialize an implicitly-typed variable with an array initializer",
                    meta,
                );
            }
            (None, Some(Initializer::Expr(expr))) => {
                if matches!(expr.kind, ExprKind::Literal(Literal::Null)) {
                    self.error("E0815", "Cannot assign <null> to an implicitly-typed variable", meta);
                }
                self.compile_expr(expr);
            }
            (Some(_), Some(Initializer::Expr(expr))) => self.compile_expr(expr),
            (Some(desc), Some(Initializer::Array(init))) => match desc {
                TypeDesc::Array(element, rank) => {
                    let element = (**element).clone();
                    self.compile_array_initializer(&element, *rank, init, &[], meta);
                }
                _ => {
                    self.error(
                        "E0622",
                        "Can only use array initializer expressions to assign to array types. Try using a new expression instead.",
                        meta,
                    );
                    self.emit(OpCode::LoadNull);
                }
            },
            (Some(_), None) => {
                self.declare_local(&declarator.name, declared.cloned(), meta);
                return;
            }
        }
        let slot = self.declare_local(&declarator.name, declared.cloned(), meta);
        self.emit_with(OpCode::StoreLocal, slot);
    }

    fn begin_loop(&mut self) {
        let context = LoopContext {
            break_jumps: vec![],
            continue_jumps: vec![],
            try_depth: self.current.tries.len(),
            finally_depth: self.current.finally_depth,
        };
        self.current.loops.push(context);
    }

    fn end_loop(&mut self, continue_target: usize) {
        if let Some(context) = self.current.loops.pop() {
            for jump in context.break_jumps {
                self.patch(jump);
            }
            for jump in context.continue_jumps {
                self.patch_to(jump, continue_target);
            }
        }
    }

    fn compile_for(
        &mut self,
        init: Option<&'a ForInit>,
        test: Option<&'a Expr>,
        update: &'a [Expr],
        body: &'a Statement,
    ) {
        self.push_scope();
        match init {
            Some(ForInit::Declaration(decl)) => self.compile_local_declaration(decl),
            Some(ForInit::Expressions(exprs)) => {
                for expr in exprs {
                    self.compile_discarded(expr);
                }
            }
            None => {}
        }
        let loop_start = self.chunk().current_pos();
        self.begin_loop();
        let exit_jump = test.map(|test| {
            self.compile_expr(test);
            self.emit_jump(OpCode::BrFalse)
        });
        self.compile_embedded(body);
        let continue_target = self.chunk().current_pos();
        for expr in update {
            self.compile_discarded(expr);
        }
        self.emit_with(OpCode::Br, loop_start as u32);
        if let Some(jump) = exit_jump {
            self.patch(jump);
        }
        self.end_loop(continue_target);
        self.pop_scope();
    }

    fn compile_foreach(
        &mut self,
        declared_type: Option<&'a TypeRef>,
        name: &str,
        iterable: &'a Expr,
        body: &'a Statement,
        meta: &Meta,
    ) {
        let declared = match declared_type {
            Some(type_ref) => match self.resolve_type(type_ref, meta) {
                Some(desc) => Some(desc),
                None => return,
            },
            None => None,
        };
        self.push_scope();
        self.compile_expr(iterable);
        self.emit(OpCode::GetIter);
        let iterator = self.temp();
        self.emit_with(OpCode::StoreLocal, iterator);
        let variable = self.declare_local(name, declared.clone(), meta);

        let loop_start = self.chunk().current_pos();
        self.begin_loop();
        self.emit_with(OpCode::LoadLocal, iterator);
        let exit_jump = self.emit_jump(OpCode::IterNext);
        if let Some(desc) = &declared {
            self.emit_type_op(OpCode::CastClass, desc);
        }
        self.emit_with(OpCode::StoreLocal, variable);
        self.compile_embedded(body);
        self.emit_with(OpCode::Br, loop_start as u32);
        self.patch(exit_jump);
        self.end_loop(loop_start);
        self.pop_scope();
    }

    fn compile_finally(&mut self, finalizer: &'a [Statement]) {
        self.current.finally_depth += 1;
        self.compile_block(finalizer);
        self.current.finally_depth -= 1;
    }

    /// Emits `leave` and the inlined finally body of every protected region
    /// above `depth`, innermost first.
    fn unwind_tries(&mut self, depth: usize) {
        let regions: Vec<TryContext<'a>> = self.current.tries[depth..].iter().rev().copied().collect();
        for region in regions {
            if region.protected {
                self.emit(OpCode::LeaveTry);
            }
            if let Some(finalizer) = region.finalizer {
                self.compile_finally(finalizer);
            }
        }
    }

    /// Layout:
    ///
    /// ```text
    ///   .try H; <block>; leave; <finally>; br END
    /// H: stloc exc
    ///   per catch: ldloc exc; isinst T; brinst MATCH; br NEXT
    ///   MATCH: [.try H2] <catch> [leave; <finally>]; br END
    ///   [H2: stloc e2; <finally>; ldloc e2; throw]
    ///   NEXT: ...
    ///   <finally>; ldloc exc; throw
    /// END:
    /// ```
    fn compile_try(
        &mut self,
        block: &'a [Statement],
        handlers: &'a [CatchClause],
        finalizer: Option<&'a [Statement]>,
    ) {
        let enter = self.emit_jump(OpCode::EnterTry);
        self.current.tries.push(TryContext {
            protected: true,
            finalizer,
        });
        self.compile_block(block);
        self.current.tries.pop();
        self.emit(OpCode::LeaveTry);
        if let Some(finalizer) = finalizer {
            self.compile_finally(finalizer);
        }
        let mut end_jumps = vec![self.emit_jump(OpCode::Br)];

        self.patch(enter);
        let exception = self.temp();
        self.emit_with(OpCode::StoreLocal, exception);

        let mut caught: Vec<TypeDesc> = vec![];
        for clause in handlers {
            let catch_type = match &clause.exception_type {
                Some(type_ref) => match self.resolve_type(type_ref, &clause.meta) {
                    Some(desc) => desc,
                    None => continue,
                },
                None => TypeDesc::of(TypeKind::Exception),
            };
            if !catch_type.kind().map_or(false, |k| k.is_exception()) {
                self.error(
                    "E0155",
                    "The type caught or thrown must be derived from System.Exception",
                    &clause.meta,
                );
                continue;
            }
            if let Some(earlier) = caught.iter().find(|c| catch_type.is_assignable_to(c)) {
                let message = format!(
                    "A previous catch clause already catches all exceptions of this or of a super type ('{}')",
                    earlier.full_name()
                );
                self.error("E0160", message, &clause.meta);
                continue;
            }
            caught.push(catch_type.clone());

            let next_jump = if catch_type.is(TypeKind::Exception) {
                None
            } else {
                self.emit_with(OpCode::LoadLocal, exception);
                self.emit_type_op(OpCode::IsInst, &catch_type);
                let to_match = self.emit_jump(OpCode::BrNonNull);
                let to_next = self.emit_jump(OpCode::Br);
                self.patch(to_match);
                Some(to_next)
            };

            self.push_scope();
            if let Some(binding) = &clause.binding {
                let slot = self.declare_local(binding, Some(catch_type.clone()), &clause.meta);
                self.emit_with(OpCode::LoadLocal, exception);
                self.emit_with(OpCode::StoreLocal, slot);
            }
            self.current.catch_slots.push(exception);
            let inner_enter = finalizer.map(|_| self.emit_jump(OpCode::EnterTry));
            self.current.tries.push(TryContext {
                protected: finalizer.is_some(),
                finalizer,
            });
            self.compile_statements(&clause.body);
            self.current.tries.pop();
            self.current.catch_slots.pop();
            self.pop_scope();

            if let (Some(finalizer), Some(inner_enter)) = (finalizer, inner_enter) {
                self.emit(OpCode::LeaveTry);
                self.compile_finally(finalizer);
                end_jumps.push(self.emit_jump(OpCode::Br));
                self.patch(inner_enter);
                let rethrown = self.temp();
                self.emit_with(OpCode::StoreLocal, rethrown);
                self.compile_finally(finalizer);
                self.emit_with(OpCode::LoadLocal, rethrown);
                self.emit(OpCode::Throw);
            } else {
                end_jumps.push(self.emit_jump(OpCode::Br));
            }
            if let Some(jump) = next_jump {
                self.patch(jump);
            }
        }

        if let Some(finalizer) = finalizer {
            self.compile_finally(finalizer);
        }
        self.emit_with(OpCode::LoadLocal, exception);
        self.emit(OpCode::Throw);
        for jump in end_jumps {
            self.patch(jump);
        }
    }

    fn compile_loop_exit(&mut self, is_break: bool, meta: &Meta) {
        let Some(context) = self.current.loops.last() else {
            self.error("E0139", "No enclosing loop out of which to break or continue", meta);
            return;
        };
        let (try_depth, finally_depth) = (context.try_depth, context.finally_depth);
        if self.current.finally_depth > finally_depth {
            self.error("E0157", "Control cannot leave the body of a finally clause", meta);
            return;
        }
        self.unwind_tries(try_depth);
        let jump = self.emit_jump(OpCode::Br);
        if let Some(context) = self.current.loops.last_mut() {
            if is_break {
                context.break_jumps.push(jump);
            } else {
                context.continue_jumps.push(jump);
            }
        }
    }

    /// Static type of typed locals, parameters and literals.
    fn known_type(&self, expr: &Expr) -> Option<TypeDesc> {
        let kind = match &expr.kind {
            ExprKind::Name(name) => {
                return match self.current.lookup(name)? {
                    Binding::Local(slot) => self
                        .current
                        .method
                        .chunk
                        .locals
                        .get(slot as usize)?
                        .declared_type
                        .clone(),
                    Binding::Arg(index) => self
                        .current
                        .method
                        .params
                        .get(index as usize)
                        .map(|param| param.declared_type.clone()),
                    Binding::Function { .. } => None,
                }
            }
            ExprKind::Literal(literal) => match literal {
                Literal::Bool(_) => TypeKind::Boolean,
                Literal::Char(_) => TypeKind::Char,
                Literal::Int(_) => TypeKind::Int32,
                Literal::UInt(_) => TypeKind::UInt32,
                Literal::Long(_) => TypeKind::Int64,
                Literal::ULong(_) => TypeKind::UInt64,
                Literal::Float(_) => TypeKind::Single,
                Literal::Double(_) => TypeKind::Double,
                _ => return None,
            },
            _ => return None,
        };
        Some(TypeDesc::of(kind))
    }

    fn compile_return(&mut self, argument: Option<&'a Expr>, meta: &Meta) {
        if self.current.finally_depth > 0 {
            self.error("E0157", "Control cannot leave the body of a finally clause", meta);
            return;
        }
        let return_type = self.current.method.return_type.clone();
        let kind = self.current.method.kind;
        let is_void = return_type.is(TypeKind::Void);
        match argument {
            Some(expr) => {
                if is_void {
                    let message = format!(
                        "Since '{}' returns void, a return keyword must not be followed by an object expression",
                        self.current.method.name
                    );
                    self.error("E0127", message, meta);
                }
                self.compile_expr(expr);
                if kind == MethodKind::Local
                    && !is_void
                    && !return_type.is(TypeKind::Object)
                    && self.known_type(expr).as_ref() != Some(&return_type)
                {
                    self.emit_type_op(OpCode::ConvImplicit, &return_type);
                }
            }
            None => {
                if !is_void && kind != MethodKind::Script {
                    let message = format!(
                        "An object of a type convertible to '{}' is required",
                        return_type.friendly_name()
                    );
                    self.error("E0126", message, meta);
                }
                self.emit(OpCode::LoadNull);
            }
        }
        if !self.current.tries.is_empty() {
            let slot = self.temp();
            self.emit_with(OpCode::StoreLocal, slot);
            self.unwind_tries(0);
            self.emit_with(OpCode::LoadLocal, slot);
        }
        self.emit(OpCode::Ret);
    }

    fn compile_throw(&mut self, argument: Option<&'a Expr>, meta: &Meta) {
        match argument {
            Some(expr) => self.compile_expr(expr),
            None => match self.current.catch_slots.last().copied() {
                Some(slot) if self.current.finally_depth == 0 => {
                    self.emit_with(OpCode::LoadLocal, slot);
                }
                Some(_) => {
                    self.error(
                        "E0724",
                        "A throw statement with no arguments is not allowed in a finally clause that is nested inside the nearest enclosing catch clause",
                        meta,
                    );
                    return;
                }
                None => {
                    self.error(
                        "E0156",
                        "A throw statement with no arguments is not allowed outside of a catch clause",
                        meta,
                    );
                    return;
                }
            },
        }
        self.emit(OpCode::Throw);
    }

    fn compile_local_function(&mut self, function: &'a Rc<FunctionData>) {
        let Some(index) = self.functions.get(&Rc::as_ptr(function)).copied() else {
            return;
        };
        if self.methods.get(index).map_or(true, |m| m.is_some()) {
            return;
        }
        let return_type = self
            .resolve_type(&function.return_type, &function.meta)
            .unwrap_or_else(TypeDesc::object);
        let outer_name = match self.outer.first() {
            Some(root) => root.method.name.clone(),
            None => self.current.method.name.clone(),
        };
        let name = format!(
            "<{}>g__{}|0_{}",
            outer_name.trim_start_matches('<').trim_end_matches("$").trim_end_matches('>'),
            function.name,
            index - 1
        );
        let mut method = Method::new(name, MethodKind::Local, return_type.clone());

        let mut params = HashMap::new();
        for (i, param) in function.params.iter().enumerate() {
            let declared = self
                .resolve_type(&param.declared_type, &function.meta)
                .unwrap_or_else(TypeDesc::object);
            if params.insert(param.name.clone(), Binding::Arg(i as u32)).is_some() {
                self.error(
                    "E0100",
                    format!("The parameter name '{}' is a duplicate", param.name),
                    &function.meta,
                );
            }
            method.params.push(Parameter {
                name: param.name.clone(),
                declared_type: declared,
            });
        }

        let mut builder = MethodBuilder::new(method, index);
        builder.scopes = vec![params];
        let enclosing = std::mem::replace(&mut self.current, builder);
        self.outer.push(enclosing);

        self.compile_block(&function.body);
        if return_type.is(TypeKind::Void) {
            self.emit(OpCode::LoadNull);
            self.emit(OpCode::Ret);
        } else {
            if completes_normally_all(&function.body) {
                self.error(
                    "E0161",
                    format!("'{}()': not all code paths return a value", function.name),
                    &function.meta,
                );
            }
            self.emit(OpCode::LoadNull);
            self.emit(OpCode::Ret);
        }

        if let Some(enclosing) = self.outer.pop() {
            let finished = std::mem::replace(&mut self.current, enclosing);
            self.methods[finished.index] = Some(finished.method);
        }
    }

    // ════════════════════════════════════════════════════════════
    // Expressions
    // ════════════════════════════════════════════════════════════

    /// Compiles an expression whose value is not used.
    fn compile_discarded(&mut self, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Assign {
                operator,
                target,
                value,
            } => self.compile_assign(*operator, target, value, false),
            ExprKind::Update {
                target,
                increment,
                prefix,
            } => self.compile_update(target, *increment, *prefix, false),
            _ => {
                self.compile_expr(expr);
                self.emit(OpCode::Pop);
            }
        }
    }

    fn compile_expr(&mut self, expr: &'a Expr) {
        let meta = &expr.meta;
        match &expr.kind {
            ExprKind::Literal(literal) => self.compile_literal(literal, meta),
            ExprKind::Name(name) => self.compile_name(name, expr),
            ExprKind::PredefinedType(p) => {
                let desc = TypeDesc::from_predefined(*p);
                self.type_used_as_value(&desc, meta);
            }
            ExprKind::Member { object, name } => self.compile_member(object, name, expr),
            ExprKind::Call { callee, arguments } => self.compile_call(callee, arguments, meta),
            ExprKind::Index { object, arguments } => {
                self.compile_expr(object);
                for arg in arguments {
                    self.compile_expr(arg);
                }
                self.emit_with(OpCode::LdElem, arguments.len() as u32);
            }
            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand);
                self.emit(match operator {
                    UnaryOperator::Negate => OpCode::Neg,
                    UnaryOperator::Plus => OpCode::Plus,
                    UnaryOperator::Not => OpCode::Not,
                    UnaryOperator::BitNot => OpCode::BitNot,
                });
            }
            ExprKind::Update {
                target,
                increment,
                prefix,
            } => self.compile_update(target, *increment, *prefix, true),
            ExprKind::Binary {
                operator,
                left,
                right,
            } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.emit_binary(*operator, false);
            }
            ExprKind::Logical {
                operator,
                left,
                right,
            } => {
                self.compile_expr(left);
                self.emit(OpCode::Dup);
                let short_circuit = self.emit_jump(match operator {
                    LogicalOperator::And => OpCode::BrFalse,
                    LogicalOperator::Or => OpCode::BrTrue,
                    LogicalOperator::Coalesce => OpCode::BrNonNull,
                });
                self.emit(OpCode::Pop);
                self.compile_expr(right);
                self.patch(short_circuit);
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.compile_expr(test);
                let to_else = self.emit_jump(OpCode::BrFalse);
                self.compile_expr(consequent);
                let to_end = self.emit_jump(OpCode::Br);
                self.patch(to_else);
                self.compile_expr(alternate);
                self.patch(to_end);
            }
            ExprKind::Assign {
                operator,
                target,
                value,
            } => self.compile_assign(*operator, target, value, true),
            ExprKind::Cast { target, operand } => {
                let desc = self.resolve_type(target, meta);
                self.compile_expr(operand);
                if let Some(desc) = desc {
                    self.emit_type_op(OpCode::CastClass, &desc);
                }
            }
            ExprKind::Is { operand, target } => {
                let desc = self.resolve_type(target, meta);
                self.compile_expr(operand);
                if let Some(desc) = desc {
                    self.emit_type_op(OpCode::IsInst, &desc);
                }
                self.emit(OpCode::LoadNull);
                self.emit(OpCode::Cne);
            }
            ExprKind::As { operand, target } => {
                let desc = self.resolve_type(target, meta);
                self.compile_expr(operand);
                if let Some(desc) = desc {
                    self.emit_type_op(OpCode::IsInst, &desc);
                }
            }
            ExprKind::TypeOf(target) => match self.resolve_type(target, meta) {
                Some(desc) => self.emit_type_op(OpCode::LoadToken, &desc),
                None => {
                    self.emit(OpCode::LoadNull);
                }
            },
            ExprKind::New {
                target,
                arguments,
                initializer,
            } => self.compile_new(target, arguments, initializer.as_deref(), meta),
            ExprKind::NewArray {
                element,
                sizes,
                rank,
                initializer,
            } => {
                let Some(element) = self.resolve_type(element, meta) else {
                    self.emit(OpCode::LoadNull);
                    return;
                };
                match initializer {
                    Some(init) => self.compile_array_initializer(&element, *rank, init, sizes, meta),
                    None => {
                        for size in sizes {
                            self.compile_expr(size);
                        }
                        let idx = self.chunk().add_type(&element);
                        self.chunk()
                            .emit(Instruction::with_two_operands(OpCode::NewArr, idx, sizes.len() as u32));
                    }
                }
            }
            ExprKind::ImplicitArray(items) => {
                if items.is_empty() {
                    self.error("E0826", "No best type found for implicitly-typed array", meta);
                }
                for item in items {
                    self.compile_expr(item);
                }
                self.emit_with(OpCode::NewArrInfer, items.len() as u32);
            }
            ExprKind::AnonymousObject(members) => self.compile_anonymous(members, meta),
            ExprKind::Interpolated(parts) => {
                self.emit_const(Value::string(""));
                for part in parts {
                    match part {
                        InterpolationPart::Text(text) => self.emit_const(Value::string(text)),
                        InterpolationPart::Hole(expr) => self.compile_expr(expr),
                    }
                    self.emit_binary(BinaryOperator::Add, false);
                }
            }
        }
    }

    fn compile_literal(&mut self, literal: &Literal, meta: &Meta) {
        let value = match literal {
            Literal::Null => {
                self.emit(OpCode::LoadNull);
                return;
            }
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Char(c) => Value::Char(*c),
            Literal::Int(v) => Value::Int(*v),
            Literal::UInt(v) => Value::UInt(*v),
            Literal::Long(v) => Value::Long(*v),
            Literal::ULong(v) => Value::ULong(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Double(v) => Value::Double(*v),
            Literal::Decimal(text) => match Decimal::parse(text) {
                Some(d) => Value::Decimal(d),
                None => {
                    self.error(
                        "E0594",
                        "Floating-point constant is outside the range of type 'decimal'",
                        meta,
                    );
                    Value::Decimal(Decimal::ZERO)
                }
            },
            Literal::String(s) => Value::string(s),
        };
        self.emit_const(value);
    }

    fn emit_binary(&mut self, operator: BinaryOperator, compound: bool) {
        let op = match operator {
            BinaryOperator::Add => OpCode::Add,
            BinaryOperator::Subtract => OpCode::Sub,
            BinaryOperator::Multiply => OpCode::Mul,
            BinaryOperator::Divide => OpCode::Div,
            BinaryOperator::Remainder => OpCode::Rem,
            BinaryOperator::ShiftLeft => OpCode::Shl,
            BinaryOperator::ShiftRight => OpCode::Shr,
            BinaryOperator::BitAnd => OpCode::BitAnd,
            BinaryOperator::BitOr => OpCode::BitOr,
            BinaryOperator::BitXor => OpCode::BitXor,
            BinaryOperator::Equal => OpCode::Ceq,
            BinaryOperator::NotEqual => OpCode::Cne,
            BinaryOperator::LessThan => OpCode::Clt,
            BinaryOperator::LessThanOrEqual => OpCode::Cle,
            BinaryOperator::GreaterThan => OpCode::Cgt,
            BinaryOperator::GreaterThanOrEqual => OpCode::Cge,
        };
        self.emit_with(op, compound as u32);
    }

    fn type_used_as_value(&mut self, desc: &TypeDesc, meta: &Meta) {
        self.error(
            "E0119",
            format!("'{}' is a type, which is not valid in the given context", desc.full_name()),
            meta,
        );
        self.emit(OpCode::LoadNull);
    }

    fn compile_name(&mut self, name: &str, expr: &'a Expr) {
        let meta = &expr.meta;
        match self.lookup_name(name) {
            NameLookup::Found(Binding::Local(slot)) => {
                self.emit_with(OpCode::LoadLocal, slot);
            }
            NameLookup::Found(Binding::Arg(index)) => {
                self.emit_with(OpCode::LoadArg, index);
            }
            NameLookup::Found(Binding::Function { .. }) => {
                self.error(
                    "E0428",
                    format!("Cannot convert method group '{}' to non-delegate type 'object'. Did you intend to invoke the method?", name),
                    meta,
                );
                self.emit(OpCode::LoadNull);
            }
            NameLookup::Captured => self.capture_error(name, meta),
            NameLookup::Missing => match self.resolve_static(expr) {
                Some(StaticTarget::Type(desc)) => self.type_used_as_value(&desc, meta),
                Some(StaticTarget::Namespace(ns)) => {
                    self.error("E0118", format!("'{}' is a namespace but is used like a variable", ns), meta);
                    self.emit(OpCode::LoadNull);
                }
                None => {
                    if self.context.imports_type(TypeKind::Globals)
                        && CORE_REGISTRY.get_property(TypeKind::Globals, name).is_some()
                    {
                        let desc = TypeDesc::of(TypeKind::Globals);
                        self.emit_static_field(&desc, name);
                    } else {
                        self.missing_name(name, meta);
                    }
                }
            },
        }
    }

    fn capture_error(&mut self, name: &str, meta: &Meta) {
        self.error(
            "E8421",
            format!("A static local function cannot contain a reference to '{}'.", name),
            meta,
        );
        self.emit(OpCode::LoadNull);
    }

    fn missing_name(&mut self, name: &str, meta: &Meta) {
        self.error(
            "E0103",
            format!("The name '{}' does not exist in the current context", name),
            meta,
        );
        self.emit(OpCode::LoadNull);
    }

    fn emit_static_field(&mut self, desc: &TypeDesc, name: &str) {
        let type_idx = self.chunk().add_type(desc);
        let name_idx = self.chunk().add_name(name);
        self.chunk()
            .emit(Instruction::with_two_operands(OpCode::LdSFld, type_idx, name_idx));
    }

    fn missing_member(&mut self, desc: &TypeDesc, name: &str, meta: &Meta) {
        self.error(
            "E0117",
            format!("'{}' does not contain a definition for '{}'", desc.full_name(), name),
            meta,
        );
        self.emit(OpCode::LoadNull);
    }

    fn missing_in_namespace(&mut self, ns: &str, name: &str, meta: &Meta) {
        self.error(
            "E0234",
            format!(
                "The type or namespace name '{}' does not exist in the namespace '{}' (are you missing an assembly reference?)",
                name, ns
            ),
            meta,
        );
        self.emit(OpCode::LoadNull);
    }

    fn compile_member(&mut self, object: &'a Expr, name: &str, expr: &'a Expr) {
        let meta = &expr.meta;
        match self.resolve_static(object) {
            Some(StaticTarget::Type(desc)) => {
                if Self::has_static_property(&desc, name) {
                    self.emit_static_field(&desc, name);
                } else if Self::has_static_method(&desc, name) {
                    self.error(
                        "E0428",
                        format!("Cannot convert method group '{}' to non-delegate type 'object'. Did you intend to invoke the method?", name),
                        meta,
                    );
                    self.emit(OpCode::LoadNull);
                } else {
                    self.missing_member(&desc, name, meta);
                }
            }
            Some(StaticTarget::Namespace(ns)) => match self.resolve_static(expr) {
                Some(StaticTarget::Type(desc)) => self.type_used_as_value(&desc, meta),
                Some(StaticTarget::Namespace(qualified)) => {
                    self.error(
                        "E0118",
                        format!("'{}' is a namespace but is used like a variable", qualified),
                        meta,
                    );
                    self.emit(OpCode::LoadNull);
                }
                None => self.missing_in_namespace(&ns, name, meta),
            },
            None => {
                self.compile_expr(object);
                let name_idx = self.chunk().add_name(name);
                self.emit_with(OpCode::LdFld, name_idx);
            }
        }
    }

    fn compile_arguments(&mut self, arguments: &'a [Expr]) -> u32 {
        for arg in arguments {
            self.compile_expr(arg);
        }
        arguments.len() as u32
    }

    fn emit_call_static(&mut self, desc: &TypeDesc, name: &str, argc: u32) {
        let type_idx = self.chunk().add_type(desc);
        let name_idx = self.chunk().add_name(name);
        self.chunk()
            .emit(Instruction::with_three_operands(OpCode::CallStatic, type_idx, name_idx, argc));
    }

    fn compile_call(&mut self, callee: &'a Expr, arguments: &'a [Expr], meta: &Meta) {
        match &callee.kind {
            ExprKind::Name(name) => match self.lookup_name(name) {
                NameLookup::Found(Binding::Function { index, params }) => {
                    if params != arguments.len() {
                        self.error(
                            "E1501",
                            format!("No overload for method '{}' takes {} arguments", name, arguments.len()),
                            meta,
                        );
                    }
                    let argc = self.compile_arguments(arguments);
                    self.chunk()
                        .emit(Instruction::with_two_operands(OpCode::Call, index as u32, argc));
                }
                NameLookup::Found(_) => {
                    self.error(
                        "E0149",
                        "Method name expected",
                        meta,
                    );
                    self.emit(OpCode::LoadNull);
                }
                NameLookup::Captured => self.capture_error(name, meta),
                NameLookup::Missing => {
                    let globals = TypeDesc::of(TypeKind::Globals);
                    if self.context.imports_type(TypeKind::Globals) && Self::has_static_method(&globals, name) {
                        let argc = self.compile_arguments(arguments);
                        self.emit_call_static(&globals, name, argc);
                    } else {
                        self.missing_name(name, meta);
                    }
                }
            },
            ExprKind::Member { object, name } => match self.resolve_static(object) {
                Some(StaticTarget::Type(desc)) => {
                    if Self::has_static_method(&desc, name) {
                        let argc = self.compile_arguments(arguments);
                        self.emit_call_static(&desc, name, argc);
                    } else {
                        self.missing_member(&desc, name, &callee.meta);
                    }
                }
                Some(StaticTarget::Namespace(ns)) => self.missing_in_namespace(&ns, name, &callee.meta),
                None => {
                    self.compile_expr(object);
                    let argc = self.compile_arguments(arguments);
                    let name_idx = self.chunk().add_name(name);
                    self.chunk()
                        .emit(Instruction::with_two_operands(OpCode::CallVirt, name_idx, argc));
                }
            },
            _ => {
                self.error("E0149", "Method name expected", meta);
                self.emit(OpCode::LoadNull);
            }
        }
    }

    fn compile_new(
        &mut self,
        target: &TypeRef,
        arguments: &'a [Expr],
        initializer: Option<&'a [ElementInitializer]>,
        meta: &Meta,
    ) {
        let Some(desc) = self.resolve_type(target, meta) else {
            self.emit(OpCode::LoadNull);
            return;
        };
        let constructible = desc
            .kind()
            .map_or(false, |kind| CORE_REGISTRY.get_constructor(kind).is_some());
        if !constructible {
            self.error(
                "E1729",
                format!(
                    "'{}' does not contain a constructor that takes {} arguments",
                    desc.full_name(),
                    arguments.len()
                ),
                meta,
            );
            self.emit(OpCode::LoadNull);
            return;
        }
        let argc = self.compile_arguments(arguments);
        let type_idx = self.chunk().add_type(&desc);
        self.chunk()
            .emit(Instruction::with_two_operands(OpCode::NewObj, type_idx, argc));

        let add = self.chunk().add_name("Add");
        for element in initializer.unwrap_or_default() {
            self.emit(OpCode::Dup);
            let argc = match element {
                ElementInitializer::Single(expr) => {
                    self.compile_expr(expr);
                    1
                }
                ElementInitializer::Pair(key, value) => {
                    self.compile_expr(key);
                    self.compile_expr(value);
                    2
                }
            };
            self.chunk()
                .emit(Instruction::with_two_operands(OpCode::CallVirt, add, argc));
            self.emit(OpCode::Pop);
        }
    }

    /// Flattens a nested initializer into per-rank lengths and row-major items.
    fn array_shape(
        &mut self,
        init: &'a ArrayInitializer,
        rank: usize,
        depth: usize,
        lengths: &mut Vec<Option<usize>>,
        items: &mut Vec<&'a Expr>,
    ) -> bool {
        match init {
            ArrayInitializer::Expr(expr) => {
                if depth < rank {
                    self.error("E0846", "A nested array initializer is expected", &expr.meta);
                    return false;
                }
                items.push(expr.as_ref());
                true
            }
            ArrayInitializer::Nested(children, nested_meta) => {
                if depth >= rank {
                    self.error(
                        "E0623",
                        "Array initializers can only be used in a variable or field initializer. Try using a new expression instead.",
                        nested_meta,
                    );
                    return false;
                }
                match lengths[depth] {
                    Some(expected) if expected != children.len() => {
                        self.error(
                            "E0847",
                            format!("An array initializer of length '{}' is expected", expected),
                            nested_meta,
                        );
                        return false;
                    }
                    _ => lengths[depth] = Some(children.len()),
                }
                children
                    .iter()
                    .all(|child| self.array_shape(child, rank, depth + 1, lengths, items))
            }
        }
    }

    fn compile_array_initializer(
        &mut self,
        element: &TypeDesc,
        rank: usize,
        init: &'a ArrayInitializer,
        sizes: &'a [Expr],
        meta: &Meta,
    ) {
        let mut lengths: Vec<Option<usize>> = vec![None; rank];
        for (i, size) in sizes.iter().enumerate() {
            let constant = match &size.kind {
                ExprKind::Literal(Literal::Int(v)) if *v >= 0 => Some(*v as usize),
                ExprKind::Literal(Literal::Long(v)) if *v >= 0 => Some(*v as usize),
                _ => None,
            };
            match constant {
                Some(n) if i < rank => lengths[i] = Some(n),
                _ => self.error("E0150", "A constant value is expected", &size.meta),
            }
        }
        let mut items = vec![];
        if !self.array_shape(init, rank, 0, &mut lengths, &mut items) {
            self.emit(OpCode::LoadNull);
            return;
        }
        let lengths: Vec<usize> = lengths.into_iter().map(|l| l.unwrap_or(0)).collect();
        for length in &lengths {
            self.emit_const(Value::Int(*length as i32));
        }
        let type_idx = self.chunk().add_type(element);
        self.chunk()
            .emit(Instruction::with_two_operands(OpCode::NewArr, type_idx, rank as u32));
        for (n, item) in items.into_iter().enumerate() {
            self.emit(OpCode::Dup);
            let mut remainder = n;
            let mut indices = vec![0usize; rank];
            for dim in (0..rank).rev() {
                let length = lengths[dim].max(1);
                indices[dim] = remainder % length;
                remainder /= length;
            }
            for index in indices {
                self.emit_const(Value::Int(index as i32));
            }
            self.compile_expr(item);
            self.emit_with(OpCode::StElem, rank as u32);
        }
    }

    fn compile_anonymous(&mut self, members: &'a [(String, Expr)], meta: &Meta) {
        let names: Vec<String> = members.iter().map(|(name, _)| name.clone()).collect();
        let unique: HashSet<&String> = names.iter().collect();
        if unique.len() != names.len() {
            self.error(
                "E0833",
                "An anonymous type cannot have multiple properties with the same name",
                meta,
            );
        }
        let index = match self.anon_types.iter().position(|t| **t == names[..]) {
            Some(index) => index,
            None => {
                self.anon_types.push(Rc::from(names.clone()));
                self.anon_types.len() - 1
            }
        };
        for (_, value) in members {
            self.compile_expr(value);
        }
        let shape = self.chunk().add_shape(AnonShape {
            index,
            members: Rc::from(names),
        });
        self.emit_with(OpCode::NewAnon, shape);
    }

    // ── Assignment ───────────────────────────────────────────

    /// Evaluates the receiver and indices of an assignment target into
    /// temporaries so the target can be read and written.
    fn prepare_place(&mut self, target: &'a Expr) -> Place {
        let meta = &target.meta;
        match &target.kind {
            ExprKind::Name(name) => match self.lookup_name(name) {
                NameLookup::Found(Binding::Local(slot)) => Place::Local(slot),
                NameLookup::Found(Binding::Arg(index)) => Place::Arg(index),
                NameLookup::Found(Binding::Function { .. }) => {
                    self.error(
                        "E1656",
                        format!("Cannot assign to '{}' because it is a 'method group'", name),
                        meta,
                    );
                    Place::Invalid
                }
                NameLookup::Captured => {
                    self.error(
                        "E8421",
                        format!("A static local function cannot contain a reference to '{}'.", name),
                        meta,
                    );
                    Place::Invalid
                }
                NameLookup::Missing => {
                    self.error(
                        "E0103",
                        format!("The name '{}' does not exist in the current context", name),
                        meta,
                    );
                    Place::Invalid
                }
            },
            ExprKind::Member { object, name } => {
                if let Some(target) = self.resolve_static(object) {
                    let owner = match target {
                        StaticTarget::Type(desc) => desc.full_name(),
                        StaticTarget::Namespace(ns) => ns,
                    };
                    self.error(
                        "E0200",
                        format!("Property or indexer '{}.{}' cannot be assigned to -- it is read only", owner, name),
                        meta,
                    );
                    return Place::Invalid;
                }
                self.compile_expr(object);
                let object = self.temp();
                self.emit_with(OpCode::StoreLocal, object);
                let name = self.chunk().add_name(name);
                Place::Field { object, name }
            }
            ExprKind::Index { object, arguments } => {
                self.compile_expr(object);
                let object = self.temp();
                self.emit_with(OpCode::StoreLocal, object);
                let mut indices = vec![];
                for arg in arguments {
                    self.compile_expr(arg);
                    let slot = self.temp();
                    self.emit_with(OpCode::StoreLocal, slot);
                    indices.push(slot);
                }
                Place::Index { object, indices }
            }
            _ => {
                self.error(
                    "E0131",
                    "The left-hand side of an assignment must be a variable, property or indexer",
                    meta,
                );
                Place::Invalid
            }
        }
    }

    fn load_place(&mut self, place: &Place) {
        match place {
            Place::Local(slot) => {
                self.emit_with(OpCode::LoadLocal, *slot);
            }
            Place::Arg(index) => {
                self.emit_with(OpCode::LoadArg, *index);
            }
            Place::Field { object, name } => {
                self.emit_with(OpCode::LoadLocal, *object);
                self.emit_with(OpCode::LdFld, *name);
            }
            Place::Index { object, indices } => {
                self.emit_with(OpCode::LoadLocal, *object);
                for slot in indices {
                    self.emit_with(OpCode::LoadLocal, *slot);
                }
                self.emit_with(OpCode::LdElem, indices.len() as u32);
            }
            Place::Invalid => {
                self.emit(OpCode::LoadNull);
            }
        }
    }

    /// Pops the value on top of the stack into the place.
    fn store_place(&mut self, place: &Place) {
        match place {
            Place::Local(slot) => {
                self.emit_with(OpCode::StoreLocal, *slot);
            }
            Place::Arg(index) => {
                self.emit_with(OpCode::StoreArg, *index);
            }
            Place::Field { object, name } => {
                let value = self.temp();
                self.emit_with(OpCode::StoreLocal, value);
                self.emit_with(OpCode::LoadLocal, *object);
                self.emit_with(OpCode::LoadLocal, value);
                self.emit_with(OpCode::StFld, *name);
            }
            Place::Index { object, indices } => {
                let value = self.temp();
                self.emit_with(OpCode::StoreLocal, value);
                self.emit_with(OpCode::LoadLocal, *object);
                for slot in indices {
                    self.emit_with(OpCode::LoadLocal, *slot);
                }
                self.emit_with(OpCode::LoadLocal, value);
                self.emit_with(OpCode::StElem, indices.len() as u32);
            }
            Place::Invalid => {
                self.emit(OpCode::Pop);
            }
        }
    }

    fn compile_assign(&mut self, operator: AssignmentOperator, target: &'a Expr, value: &'a Expr, want: bool) {
        match operator {
            AssignmentOperator::Assign => self.compile_simple_assign(target, value, want),
            AssignmentOperator::Compound(op) => {
                let place = self.prepare_place(target);
                self.load_place(&place);
                self.compile_expr(value);
                self.emit_binary(op, true);
                if want {
                    self.emit(OpCode::Dup);
                }
                self.store_place(&place);
            }
            AssignmentOperator::Coalesce => {
                let place = self.prepare_place(target);
                self.load_place(&place);
                self.emit(OpCode::Dup);
                let has_value = self.emit_jump(OpCode::BrNonNull);
                self.emit(OpCode::Pop);
                self.compile_expr(value);
                if want {
                    self.emit(OpCode::Dup);
                }
                self.store_place(&place);
                let to_end = self.emit_jump(OpCode::Br);
                self.patch(has_value);
                if !want {
                    self.emit(OpCode::Pop);
                }
                self.patch(to_end);
            }
        }
    }

    fn compile_simple_assign(&mut self, target: &'a Expr, value: &'a Expr, want: bool) {
        match &target.kind {
            ExprKind::Member { object, name } if self.resolve_static(object).is_none() => {
                self.compile_expr(object);
                self.compile_expr(value);
                let saved = want.then(|| self.save_top());
                let name_idx = self.chunk().add_name(name);
                self.emit_with(OpCode::StFld, name_idx);
                if let Some(slot) = saved {
                    self.emit_with(OpCode::LoadLocal, slot);
                }
            }
            ExprKind::Index { object, arguments } => {
                self.compile_expr(object);
                for arg in arguments {
                    self.compile_expr(arg);
                }
                self.compile_expr(value);
                let saved = want.then(|| self.save_top());
                self.emit_with(OpCode::StElem, arguments.len() as u32);
                if let Some(slot) = saved {
                    self.emit_with(OpCode::LoadLocal, slot);
                }
            }
            _ => {
                let place = self.prepare_place(target);
                self.compile_expr(value);
                self.store_place(&place);
                if want {
                    self.load_place(&place);
                }
            }
        }
    }

    /// Copies the top of the stack into a fresh temporary, leaving it in place.
    fn save_top(&mut self) -> u32 {
        let slot = self.temp();
        self.emit(OpCode::Dup);
        self.emit_with(OpCode::StoreLocal, slot);
        slot
    }

    fn compile_update(&mut self, target: &'a Expr, increment: bool, prefix: bool, want: bool) {
        let step = if increment { OpCode::Inc } else { OpCode::Dec };
        let place = self.prepare_place(target);
        self.load_place(&place);
        if prefix {
            self.emit(step);
            if want {
                self.emit(OpCode::Dup);
            }
        } else {
            if want {
                self.emit(OpCode::Dup);
            }
            self.emit(step);
        }
        self.store_place(&place);
    }
}

// ════════════════════════════════════════════════════════════
// Reachability
// ════════════════════════════════════════════════════════════

fn is_true_literal(expr: Option<&Expr>) -> bool {
    match expr {
        None => true,
        Some(expr) => matches!(expr.kind, ExprKind::Literal(Literal::Bool(true))),
    }
}

fn completes_normally_all(statements: &[Statement]) -> bool {
    statements.iter().all(completes_normally)
}

/// Whether control can flow past the end of the statement.
fn completes_normally(stmt: &Statement) -> bool {
    match &stmt.kind {
        StatementType::Return(_)
        | StatementType::Throw(_)
        | StatementType::Break
        | StatementType::Continue => false,
        StatementType::Block(body) | StatementType::Unsafe(body) => completes_normally_all(body),
        StatementType::If {
            consequent,
            alternate,
            ..
        } => match alternate {
            Some(alternate) => completes_normally(consequent) || completes_normally(alternate),
            None => true,
        },
        StatementType::While { test, body } => !is_true_literal(Some(test)) || breaks_out(body),
        StatementType::DoWhile { body, test } => !is_true_literal(Some(test)) || breaks_out(body),
        StatementType::For { test, body, .. } => !is_true_literal(test.as_ref()) || breaks_out(body),
        StatementType::Try {
            block,
            handlers,
            finalizer,
        } => {
            let finally_completes = finalizer.as_ref().map_or(true, |f| completes_normally_all(f));
            finally_completes
                && (completes_normally_all(block) || handlers.iter().any(|h| completes_normally_all(&h.body)))
        }
        _ => true,
    }
}

/// Whether a `break` inside `stmt` targets the loop `stmt` is the body of.
fn breaks_out(stmt: &Statement) -> bool {
    match &stmt.kind {
        StatementType::Break => true,
        StatementType::Block(body) | StatementType::Unsafe(body) => body.iter().any(breaks_out),
        StatementType::If {
            consequent,
            alternate,
            ..
        } => breaks_out(consequent) || alternate.as_ref().map_or(false, |a| breaks_out(a)),
        StatementType::Try {
            block,
            handlers,
            finalizer,
        } => {
            block.iter().any(breaks_out)
                || handlers.iter().any(|h| h.body.iter().any(breaks_out))
                || finalizer.as_ref().map_or(false, |f| f.iter().any(breaks_out))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::context::CompileOptions;

    fn compile_script(source: &str) -> Compilation {
        compile(&ExecutionContext::new(source), "test")
    }

    fn ids(compilation: &Compilation) -> Vec<String> {
        compilation.diagnostics.iter().map(|d| d.id.clone()).collect()
    }

    #[test]
    fn trailing_expression_returns() {
        let compilation = compile_script("1 + 1");
        assert!(!compilation.has_errors());
        let unit = compilation.unit.unwrap();
        let ops: Vec<OpCode> = unit.methods[0].chunk.code.iter().map(|i| i.op).collect();
        assert_eq!(ops, vec![OpCode::LoadConst, OpCode::LoadConst, OpCode::Add, OpCode::Ret]);
    }

    #[test]
    fn unknown_names_are_reported() {
        let compilation = compile_script("x + 1");
        assert_eq!(ids(&compilation), vec!["E0103"]);
        assert!(compilation.unit.is_none());
    }

    #[test]
    fn break_outside_loop() {
        assert_eq!(ids(&compile_script("break;")), vec!["E0139"]);
    }

    #[test]
    fn unsafe_requires_option() {
        assert_eq!(ids(&compile_script("unsafe { }")), vec!["E0227"]);
        let context = ExecutionContext::new("unsafe { } return 1;").with_options(CompileOptions {
            kind: SourceKind::Method,
            optimization: OptimizationLevel::Debug,
            allow_unsafe: true,
        });
        assert!(!compile(&context, "m").has_errors());
    }

    #[test]
    fn method_bodies_must_return() {
        let context = ExecutionContext::new("var x = 1;").with_options(CompileOptions {
            kind: SourceKind::Method,
            optimization: OptimizationLevel::Debug,
            allow_unsafe: true,
        });
        assert_eq!(ids(&compile(&context, "m")), vec!["E0161"]);
    }

    #[test]
    fn local_functions_cannot_capture() {
        let compilation = compile_script("var a = 1; int F() { return a; } F()");
        assert_eq!(ids(&compilation), vec!["E8421"]);
    }

    #[test]
    fn local_functions_are_hoisted() {
        let compilation = compile_script("var r = F(2); int F(int x) { return x * 2; } r");
        assert!(!compilation.has_errors(), "{:?}", compilation.diagnostics);
        assert_eq!(compilation.unit.unwrap().methods.len(), 2);
    }

    #[test]
    fn unreachable_code_warns_but_compiles() {
        let compilation = compile_script("return 1; Console.WriteLine(2);");
        assert_eq!(ids(&compilation), vec!["E0162"]);
        assert!(compilation.unit.is_some());
    }

    #[test]
    fn types_outside_imports_are_not_found() {
        let context = ExecutionContext::new("new List<int>()").with_imports(["System"]);
        assert_eq!(ids(&compile(&context, "t")), vec!["E0246"]);
        let qualified = ExecutionContext::new("new System.Collections.Generic.List<int>()").with_imports(["System"]);
        assert!(!compile(&qualified, "t").has_errors());
    }

    #[test]
    fn generic_arity_is_checked() {
        assert_eq!(ids(&compile_script("new List()")), vec!["E0305"]);
    }
}
