use tracing::{debug, trace};

use crate::bytecode::emitter::{Backend, MemoryRegion};
use crate::codegen::attrib::{Attrib, AttribKind};
use crate::codegen::predefined::PredefinedProc;
use crate::codegen::semantic_error::{SemanticError, SemanticErrorKind};
use crate::codegen::symbol::{Symbol, SymbolKind};
use crate::codegen::token::{BinaryOp, EqualOp, RelOp, Span, Token, UnaryOp};
use crate::codegen::types::{RecordType, Type};

/// Deepest array type `new` can allocate.
pub const MAX_ARRAY_DIMS: usize = 8;

pub type CodeGenResult<T> = Result<T, SemanticError>;

// =============================================================================
// CODEGEN - typed translation of source constructs
// =============================================================================

/// Translates typed operands and declarations into backend calls.
///
/// Expression operands are expected on the evaluation stack in source
/// order: the front end loads `x` before it evaluates `y`. Operations that
/// consume a single top-of-stack operand load it themselves if needed.
pub trait CodeGen {
    /// A fresh label, unique within this generator.
    fn new_label(&mut self) -> String;

    fn assign_label(&mut self, label: &str);

    /// Push the operand's value and mark it as stack resident.
    fn load_value(&mut self, attr: &mut Attrib);

    /// Push the operand's address. Arrays and records are handled by
    /// reference, so on a stack machine this pushes the stored reference.
    fn load_address(&mut self, attr: &mut Attrib);

    /// Release the register held by `attr`. Nothing to do on a stack machine.
    #[allow(dead_code)]
    fn free_reg(&mut self, _attr: &Attrib) {}

    /// Reserve one word for a variable or constant and record its offset.
    fn alloc_variable(&mut self, symbol: &mut Symbol);

    /// Give record fields offsets `0..n` in declaration order.
    fn set_field_offsets(&mut self, record: &mut RecordType);

    /// Record the length of dimension `dim` of a pending `new` array
    /// expression. Dimensions must be stored in order; storing dimension 0
    /// only evaluates it.
    fn store_array_dim(&mut self, dim: usize, length: &Attrib, at: Span) -> CodeGenResult<()>;

    /// Allocate an array whose dimension lengths were given by
    /// [`CodeGen::store_array_dim`]. A one-dimensional array takes its
    /// length from the top of the stack, stored or not.
    fn alloc_array(&mut self, ty: &Type, at: Span) -> CodeGenResult<Attrib>;

    fn alloc_record(&mut self, ty: &Type, at: Span) -> CodeGenResult<Attrib>;

    fn set_param_offset(&mut self, symbol: &mut Symbol, pos: usize);

    /// Turn the loaded array `arr` into an element operand for `index`.
    fn array_offset(&mut self, arr: &mut Attrib, index: &Attrib, at: Span) -> CodeGenResult<()>;

    /// Turn the loaded record `record` into an operand for `field`.
    fn record_offset(&mut self, record: &mut Attrib, field: &str, at: Span) -> CodeGenResult<()>;

    fn array_length(&mut self, arr: &mut Attrib, at: Span) -> CodeGenResult<Attrib>;

    /// Store `expr` into `lvalue`. Global constants are initialized at the
    /// start of the main procedure instead of here.
    fn assign(&mut self, lvalue: &Attrib, expr: &Attrib, at: Span) -> CodeGenResult<()>;

    /// Prefix operator; `None` means no operator and returns `x` unchanged.
    fn op1(&mut self, op: Option<Token<UnaryOp>>, x: Attrib) -> CodeGenResult<Attrib>;

    fn op2(&mut self, x: Attrib, op: Token<BinaryOp>, y: Attrib) -> CodeGenResult<Attrib>;

    fn rel_op(&mut self, x: Attrib, op: Token<RelOp>, y: Attrib) -> CodeGenResult<Attrib>;

    fn equal_op(&mut self, x: Attrib, op: Token<EqualOp>, y: Attrib) -> CodeGenResult<Attrib>;

    /// Procedure prologue. `None` or a program symbol opens the main
    /// procedure.
    fn enter_proc(&mut self, proc: Option<&Symbol>);

    fn exit_proc(&mut self, proc: Option<&Symbol>);

    /// `return`: the value, if any, is already on the stack.
    fn return_from_proc(&mut self, proc: Option<&Symbol>, return_value: Option<&Attrib>);

    /// Call `proc` with its arguments already on the stack. Returns the
    /// result operand, or `None` for a procedure without return value.
    fn call_proc(&mut self, proc: &Symbol, args: &[Attrib], at: Span) -> CodeGenResult<Option<Attrib>>;

    /// A call used as an expression.
    fn call_function(&mut self, proc: &Symbol, args: &[Attrib], at: Span) -> CodeGenResult<Attrib> {
        match &proc.ty {
            Type::Procedure(p) if !p.is_function() => Err(SemanticErrorKind::ProcNotFuncExpr {
                proc_name: proc.name.clone(),
            }
            .at(at)),
            _ => self.call_proc(proc, args, at)?.ok_or_else(|| {
                SemanticErrorKind::ProcNotFuncExpr {
                    proc_name: proc.name.clone(),
                }
                .at(at)
            }),
        }
    }

    /// Print a string literal, surrounding quotes included.
    fn write_string(&mut self, literal: &str);

    fn branch_if_false(&mut self, condition: &Attrib, label: &str, at: Span) -> CodeGenResult<()>;

    fn jump(&mut self, label: &str);
}

// =============================================================================
// CODEGEN MJ
// =============================================================================

/// Code generator for the MJ stack machine.
#[derive(Debug)]
pub struct CodeGenMj<B: Backend> {
    backend: B,
    label_counter: usize,
    /// Global constant initializers, `(static offset, value)`, in
    /// declaration order.
    pending_constants: Vec<(i32, i32)>,
    main_entered: bool,
    /// Epilogue label of the open procedure.
    current_end: Option<String>,
    /// Frame slots holding dimension lengths `1..` of every multi-dimensional
    /// `new` array expression under evaluation, innermost last.
    pending_dims: Vec<Vec<i32>>,
    newline: Option<usize>,
}

impl<B: Backend> CodeGenMj<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            label_counter: 0,
            pending_constants: Vec::new(),
            main_entered: false,
            current_end: None,
            pending_dims: Vec::new(),
            newline: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    fn region(attr: &Attrib) -> MemoryRegion {
        if attr.global {
            MemoryRegion::Static
        } else {
            MemoryRegion::Stack
        }
    }

    fn load_if_needed(&mut self, attr: &Attrib) {
        if !attr.is_on_stack() {
            let mut attr = attr.clone();
            self.load_value(&mut attr);
        }
    }

    fn alloc_temp(&mut self) -> i32 {
        self.backend.alloc_stack(1) as i32
    }

    fn write_raw(&mut self, text: &str) {
        let addr = self.backend.alloc_string_constant(text);
        self.backend.write_string(addr);
    }

    fn flush_global_constants(&mut self) {
        for (offset, value) in std::mem::take(&mut self.pending_constants) {
            debug!("initializing global constant at static {} = {}", offset, value);
            self.backend.load_const(value);
            self.backend.store_word(MemoryRegion::Static, offset);
        }
    }

    /// Allocate one level of a jagged array whose dimension lengths live in
    /// the frame slots `lengths`, leaving its address on the stack.
    fn alloc_array_level(&mut self, lengths: &[i32], level: usize) {
        self.backend.load_word(MemoryRegion::Stack, lengths[level]);
        self.backend.alloc_array();
        if level + 1 == lengths.len() {
            return;
        }

        let array = self.alloc_temp();
        let index = self.alloc_temp();
        self.backend.store_word(MemoryRegion::Stack, array);
        self.backend.load_const(0);
        self.backend.store_word(MemoryRegion::Stack, index);

        let top = self.new_label();
        let done = self.new_label();
        self.backend.assign_label(&top);
        self.backend.load_word(MemoryRegion::Stack, index);
        self.backend.load_word(MemoryRegion::Stack, lengths[level]);
        self.backend.is_greater_or_equal();
        self.backend.branch_if(true, &done);

        self.backend.load_word(MemoryRegion::Stack, array);
        self.backend.load_word(MemoryRegion::Stack, index);
        self.alloc_array_level(lengths, level + 1);
        self.backend.store_array_element();

        self.backend.load_word(MemoryRegion::Stack, index);
        self.backend.load_const(1);
        self.backend.add();
        self.backend.store_word(MemoryRegion::Stack, index);
        self.backend.jump(&top);

        self.backend.assign_label(&done);
        self.backend.load_word(MemoryRegion::Stack, array);
    }

    fn call_predefined(&mut self, builtin: PredefinedProc) {
        trace!("expanding {}", builtin.name());
        match builtin {
            PredefinedProc::WriteInt => self.backend.write_integer(),
            PredefinedProc::WriteBool => {
                let else_label = self.new_label();
                let end_label = self.new_label();
                self.backend.branch_if(false, &else_label);
                self.write_raw("True");
                self.backend.jump(&end_label);
                self.backend.assign_label(&else_label);
                self.write_raw("False");
                self.backend.assign_label(&end_label);
            }
            PredefinedProc::WriteLn => {
                let addr = match self.newline {
                    Some(addr) => addr,
                    None => {
                        let addr = self.backend.alloc_string_constant("\n");
                        self.newline = Some(addr);
                        addr
                    }
                };
                self.backend.write_string(addr);
            }
            PredefinedProc::ReadInt => self.backend.read_integer(),
        }
    }
}

impl<B: Backend> CodeGen for CodeGenMj<B> {
    fn new_label(&mut self) -> String {
        let label = format!("L{}", self.label_counter);
        self.label_counter += 1;
        label
    }

    fn assign_label(&mut self, label: &str) {
        self.backend.assign_label(label);
    }

    fn load_value(&mut self, attr: &mut Attrib) {
        match attr.kind {
            AttribKind::Constant { value } => self.backend.load_const(value),
            AttribKind::Memory => self.backend.load_word(Self::region(attr), attr.offset),
            AttribKind::ArrayElement => self.backend.load_array_element(),
            AttribKind::RecordField => self.backend.load_word(MemoryRegion::Heap, attr.offset),
            AttribKind::StackValue | AttribKind::StackAddress => return,
        }
        attr.kind = if attr.ty.is_reference() {
            AttribKind::StackAddress
        } else {
            AttribKind::StackValue
        };
    }

    fn load_address(&mut self, attr: &mut Attrib) {
        self.load_value(attr);
    }

    fn alloc_variable(&mut self, symbol: &mut Symbol) {
        if !matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Constant) {
            return;
        }
        let offset = if symbol.global {
            self.backend.alloc_static_data(1)
        } else {
            self.backend.alloc_stack(1)
        };
        debug!(
            "{} {} at {} {}",
            symbol.kind,
            symbol.name,
            if symbol.global { "static" } else { "frame" },
            offset
        );
        symbol.offset = Some(offset as i32);
    }

    fn set_field_offsets(&mut self, record: &mut RecordType) {
        for (i, field) in record.fields_mut().iter_mut().enumerate() {
            field.offset = Some(i as i32);
        }
    }

    fn store_array_dim(&mut self, dim: usize, length: &Attrib, at: Span) -> CodeGenResult<()> {
        if dim >= MAX_ARRAY_DIMS {
            return Err(SemanticErrorKind::TooManyDims {
                max: MAX_ARRAY_DIMS,
            }
            .at(at));
        }
        if !length.ty.is_int() {
            return Err(SemanticErrorKind::BadArraySelector.at(at));
        }
        self.load_if_needed(length);

        // dimension 0 stays on the stack until the array is allocated
        if dim == 0 {
            return Ok(());
        }

        let slot = self.alloc_temp();
        self.backend.store_word(MemoryRegion::Stack, slot);
        if dim == 1 {
            self.pending_dims.push(vec![slot]);
            return Ok(());
        }
        let Some(lengths) = self.pending_dims.last_mut() else {
            panic!("array dimension {} stored before dimension 1", dim);
        };
        assert_eq!(
            lengths.len() + 1,
            dim,
            "array dimensions must be stored in order"
        );
        lengths.push(slot);
        Ok(())
    }

    fn alloc_array(&mut self, ty: &Type, at: Span) -> CodeGenResult<Attrib> {
        let Type::Array(array) = ty else {
            return Err(SemanticErrorKind::InvalidNewType.at(at));
        };
        if array.dim > MAX_ARRAY_DIMS {
            return Err(SemanticErrorKind::TooManyDims {
                max: MAX_ARRAY_DIMS,
            }
            .at(at));
        }

        // a one-dimensional array never owns a pending entry; its length is
        // on the stack
        let inner = if array.dim == 1 {
            Vec::new()
        } else {
            match self.pending_dims.pop() {
                Some(inner) => inner,
                None => panic!(
                    "lengths of a {}-dimensional array must be stored before allocating it",
                    array.dim
                ),
            }
        };
        assert_eq!(
            inner.len() + 1,
            array.dim,
            "stored dimension lengths do not match array type {}",
            ty
        );

        if array.dim == 1 {
            self.backend.alloc_array();
        } else {
            let outer = self.alloc_temp();
            self.backend.store_word(MemoryRegion::Stack, outer);
            let mut lengths = Vec::with_capacity(array.dim);
            lengths.push(outer);
            lengths.extend(inner);
            self.alloc_array_level(&lengths, 0);
        }

        Ok(Attrib::value(ty.clone()))
    }

    fn alloc_record(&mut self, ty: &Type, at: Span) -> CodeGenResult<Attrib> {
        let Type::Record(record) = ty else {
            return Err(SemanticErrorKind::InvalidNewType.at(at));
        };
        self.backend.alloc_heap(record.n_fields());
        Ok(Attrib::value(ty.clone()))
    }

    fn set_param_offset(&mut self, symbol: &mut Symbol, pos: usize) {
        symbol.offset = Some(self.backend.param_offset(pos) as i32);
    }

    fn array_offset(&mut self, arr: &mut Attrib, index: &Attrib, at: Span) -> CodeGenResult<()> {
        let Type::Array(array) = &arr.ty else {
            return Err(SemanticErrorKind::SelectorNotArray.at(at));
        };
        if !index.ty.is_int() {
            return Err(SemanticErrorKind::BadArraySelector.at(at));
        }
        assert!(
            arr.is_on_stack(),
            "array base must be loaded before its index"
        );
        self.load_if_needed(index);

        // aload/astore take base and index from the stack
        arr.ty = array.elem_type();
        arr.kind = AttribKind::ArrayElement;
        arr.global = false;
        arr.constant = false;
        Ok(())
    }

    fn record_offset(&mut self, record: &mut Attrib, field: &str, at: Span) -> CodeGenResult<()> {
        let Type::Record(record_type) = record.ty.clone() else {
            return Err(SemanticErrorKind::SelectorNotRecord.at(at));
        };
        let Some(symbol) = record_type.field(field) else {
            return Err(SemanticErrorKind::InvalidRecordField {
                field: field.to_string(),
                record: record_type.name.clone(),
            }
            .at(at));
        };
        let Some(offset) = symbol.offset else {
            panic!("field offsets of record '{}' were never assigned", record_type.name);
        };

        self.load_address(record);
        record.kind = AttribKind::RecordField;
        record.ty = symbol.ty.clone();
        record.offset = offset;
        record.global = false;
        record.constant = false;
        Ok(())
    }

    fn array_length(&mut self, arr: &mut Attrib, at: Span) -> CodeGenResult<Attrib> {
        if !arr.ty.is_array() {
            return Err(SemanticErrorKind::ArrayLenNotArray.at(at));
        }
        self.load_address(arr);
        self.backend.array_length();
        Ok(Attrib::value(Type::Int))
    }

    fn assign(&mut self, lvalue: &Attrib, expr: &Attrib, at: Span) -> CodeGenResult<()> {
        if lvalue.readonly && !lvalue.constant {
            return Err(SemanticErrorKind::ReadonlyAssign.at(at));
        }
        if lvalue.ty != expr.ty {
            return Err(SemanticErrorKind::TypeMismatchAssign.at(at));
        }

        if lvalue.global && lvalue.constant {
            let Some(value) = expr.literal() else {
                panic!("global constant at static {} needs a literal initializer", lvalue.offset);
            };
            if self.main_entered {
                self.backend.load_const(value);
                self.backend.store_word(MemoryRegion::Static, lvalue.offset);
            } else {
                // code only runs from the start of main
                self.pending_constants.push((lvalue.offset, value));
            }
            return Ok(());
        }

        self.load_if_needed(expr);
        match lvalue.kind {
            AttribKind::Memory => self.backend.store_word(Self::region(lvalue), lvalue.offset),
            AttribKind::ArrayElement => self.backend.store_array_element(),
            AttribKind::RecordField => self.backend.store_word(MemoryRegion::Heap, lvalue.offset),
            other => panic!("cannot assign to an operand of kind {:?}", other),
        }
        Ok(())
    }

    fn op1(&mut self, op: Option<Token<UnaryOp>>, x: Attrib) -> CodeGenResult<Attrib> {
        let Some(op) = op else {
            return Ok(x);
        };

        let legal = match op.kind {
            UnaryOp::Plus | UnaryOp::Minus => x.ty.is_int(),
            UnaryOp::Not => x.ty.is_bool(),
        };
        if !legal {
            return Err(SemanticErrorKind::IllegalOp1Type { op: op.image() }.at(op.span));
        }

        self.load_if_needed(&x);
        match op.kind {
            UnaryOp::Plus => {}
            UnaryOp::Minus => self.backend.neg(),
            UnaryOp::Not => self.backend.not(),
        }
        Ok(Attrib::value(x.ty))
    }

    fn op2(&mut self, x: Attrib, op: Token<BinaryOp>, y: Attrib) -> CodeGenResult<Attrib> {
        let operand_ok = if op.kind.is_logical() {
            x.ty.is_bool()
        } else {
            x.ty.is_int()
        };
        if x.ty != y.ty || !operand_ok {
            return Err(SemanticErrorKind::IllegalOp2Type { op: op.image() }.at(op.span));
        }

        match op.kind {
            BinaryOp::Add => self.backend.add(),
            BinaryOp::Sub => self.backend.sub(),
            BinaryOp::Mul => self.backend.mul(),
            BinaryOp::Div => self.backend.div(),
            BinaryOp::Mod => self.backend.modulo(),
            BinaryOp::And => self.backend.and(),
            BinaryOp::Or => self.backend.or(),
        }
        Ok(Attrib::value(x.ty))
    }

    fn rel_op(&mut self, x: Attrib, op: Token<RelOp>, y: Attrib) -> CodeGenResult<Attrib> {
        if !(x.ty.is_int() && y.ty.is_int()) {
            return Err(SemanticErrorKind::IllegalRelOpType { op: op.image() }.at(op.span));
        }

        match op.kind {
            RelOp::Lt => self.backend.is_less(),
            RelOp::Le => self.backend.is_less_or_equal(),
            RelOp::Gt => self.backend.is_greater(),
            RelOp::Ge => self.backend.is_greater_or_equal(),
        }
        Ok(Attrib::value(Type::Bool))
    }

    fn equal_op(&mut self, x: Attrib, op: Token<EqualOp>, y: Attrib) -> CodeGenResult<Attrib> {
        let comparable = (x.ty.is_int() && y.ty.is_int()) || (x.ty.is_bool() && y.ty.is_bool());
        if !comparable {
            return Err(SemanticErrorKind::IllegalEqualOpType { op: op.image() }.at(op.span));
        }

        match op.kind {
            EqualOp::Eq => self.backend.is_equal(),
            EqualOp::Ne => self.backend.is_not_equal(),
        }
        Ok(Attrib::value(Type::Bool))
    }

    fn enter_proc(&mut self, proc: Option<&Symbol>) {
        let is_main = proc.is_none_or(|p| p.kind == SymbolKind::Program);

        let (label, end_label, n_params) = match proc {
            None => ("$main".to_string(), "$main_end".to_string(), 0),
            Some(p) if is_main => (p.label(), p.end_label(), 0),
            Some(p) => {
                let Type::Procedure(ty) = &p.ty else {
                    panic!("symbol '{}' of type {} is not a procedure", p.name, p.ty);
                };
                (p.label(), p.end_label(), ty.n_params())
            }
        };

        self.backend.enter_proc(&label, n_params, is_main);
        self.current_end = Some(end_label);

        if is_main {
            self.main_entered = true;
            self.flush_global_constants();
        }
    }

    fn exit_proc(&mut self, proc: Option<&Symbol>) {
        let Some(end_label) = self.current_end.take() else {
            panic!("exit_proc without an open procedure");
        };
        if let Some(p) = proc {
            assert_eq!(
                p.end_label(),
                end_label,
                "exit_proc for '{}' does not match the open procedure",
                p.name
            );
        }
        self.pending_dims.clear();
        self.backend.exit_proc(&end_label);
    }

    fn return_from_proc(&mut self, _proc: Option<&Symbol>, _return_value: Option<&Attrib>) {
        let Some(end_label) = self.current_end.clone() else {
            panic!("return outside of a procedure");
        };
        self.backend.jump(&end_label);
    }

    fn call_proc(&mut self, proc: &Symbol, args: &[Attrib], at: Span) -> CodeGenResult<Option<Attrib>> {
        let Type::Procedure(ty) = &proc.ty else {
            panic!("symbol '{}' of type {} is not a procedure", proc.name, proc.ty);
        };

        if args.len() < ty.n_params() {
            return Err(SemanticErrorKind::TooFewArgs {
                proc_name: proc.name.clone(),
            }
            .at(at));
        }
        if args.len() > ty.n_params() {
            return Err(SemanticErrorKind::TooManyArgs {
                proc_name: proc.name.clone(),
            }
            .at(at));
        }
        if let Some(index) = args
            .iter()
            .zip(&ty.params)
            .position(|(arg, (_, param))| arg.ty != *param)
        {
            return Err(SemanticErrorKind::ArgNotApplicable {
                index: index + 1,
                proc_name: proc.name.clone(),
            }
            .at(at));
        }

        match ty.builtin {
            Some(builtin) => self.call_predefined(builtin),
            None => self.backend.call_proc(&proc.label()),
        }

        Ok(ty
            .is_function()
            .then(|| Attrib::value(ty.return_type.clone())))
    }

    fn write_string(&mut self, literal: &str) {
        let text = literal
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(literal);
        self.write_raw(text);
    }

    fn branch_if_false(&mut self, condition: &Attrib, label: &str, at: Span) -> CodeGenResult<()> {
        if !condition.ty.is_bool() {
            return Err(SemanticErrorKind::CondNotBool.at(at));
        }
        self.load_if_needed(condition);
        self.backend.branch_if(false, label);
        Ok(())
    }

    fn jump(&mut self, label: &str) {
        self.backend.jump(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::bytecode::emitter::BackendMj;
    use crate::bytecode::object::ObjectImage;
    use crate::codegen::predefined::PredefinedProc;
    use crate::codegen::types::ProcedureType;
    use crate::runtime::vm::Vm;
    use pretty_assertions::assert_eq;

    const AT: Span = Span { line: 1, col: 1 };

    fn codegen() -> CodeGenMj<BackendMj> {
        CodeGenMj::new(BackendMj::new())
    }

    fn finish(cg: CodeGenMj<BackendMj>) -> ObjectImage {
        cg.into_backend().finish().expect("object image")
    }

    fn run(cg: CodeGenMj<BackendMj>) -> Vm {
        let image = finish(cg);
        let mut vm = Vm::new();
        vm.run(&image).expect("program runs");
        vm
    }

    fn loaded(cg: &mut CodeGenMj<BackendMj>, mut attr: Attrib) -> Attrib {
        cg.load_value(&mut attr);
        attr
    }

    fn call(cg: &mut CodeGenMj<BackendMj>, builtin: PredefinedProc, args: &[Attrib]) {
        cg.call_proc(&builtin.symbol(), args, AT).expect("valid call");
    }

    fn tok<K>(kind: K) -> Token<K> {
        Token::new(kind, AT)
    }

    fn local(cg: &mut CodeGenMj<BackendMj>, name: &str, ty: Type) -> Symbol {
        let mut sym = Symbol::new(name, SymbolKind::Variable, ty);
        cg.alloc_variable(&mut sym);
        sym
    }

    // =========================================================================
    // Globals
    // =========================================================================

    #[test]
    fn test_global_constant_initialized_at_main_entry() {
        let mut cg = codegen();
        let mut c = Symbol::new("c", SymbolKind::Constant, Type::Int)
            .global()
            .readonly();
        cg.alloc_variable(&mut c);
        assert_eq!(c.offset, Some(0));
        cg.assign(&Attrib::from_symbol(&c), &Attrib::int(5), AT).unwrap();
        assert!(cg.backend().code().is_empty());

        cg.enter_proc(None);
        cg.exit_proc(None);

        let image = finish(cg);
        // enter 0 0; const5; putstatic 0
        assert_eq!(&image.code[3..7], &[20, 12, 0, 0]);
        assert_eq!(image.header.data_words, 1);
    }

    #[test]
    fn test_global_constants_keep_declaration_order() {
        let mut cg = codegen();
        let mut constants = Vec::new();
        for (name, value) in [("a", 7), ("b", 2)] {
            let mut sym = Symbol::new(name, SymbolKind::Constant, Type::Int).global();
            cg.alloc_variable(&mut sym);
            cg.assign(&Attrib::from_symbol(&sym), &Attrib::int(value), AT)
                .unwrap();
            constants.push(sym);
        }
        cg.enter_proc(None);
        cg.exit_proc(None);

        let vm = run(cg);
        assert_eq!(vm.static_word(0), Some(7));
        assert_eq!(vm.static_word(1), Some(2));
    }

    #[test]
    fn test_global_variable_round_trip() {
        let mut cg = codegen();
        let mut g = Symbol::new("g", SymbolKind::Variable, Type::Int).global();
        cg.alloc_variable(&mut g);

        cg.enter_proc(None);
        let target = Attrib::from_symbol(&g);
        cg.assign(&target, &Attrib::int(41), AT).unwrap();
        let mut value = Attrib::from_symbol(&g);
        cg.load_value(&mut value);
        let one = loaded(&mut cg, Attrib::int(1));
        let sum = cg.op2(value, tok(BinaryOp::Add), one).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[sum]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "42");
    }

    // =========================================================================
    // Operators
    // =========================================================================

    #[test]
    fn test_expression_evaluation() {
        let mut cg = codegen();
        cg.enter_proc(None);
        // -(7 - 3) * 2 % 5
        let x = loaded(&mut cg, Attrib::int(7));
        let y = loaded(&mut cg, Attrib::int(3));
        let diff = cg.op2(x, tok(BinaryOp::Sub), y).unwrap();
        let neg = cg.op1(Some(tok(UnaryOp::Minus)), diff).unwrap();
        let two = loaded(&mut cg, Attrib::int(2));
        let prod = cg.op2(neg, tok(BinaryOp::Mul), two).unwrap();
        let five = loaded(&mut cg, Attrib::int(5));
        let rem = cg.op2(prod, tok(BinaryOp::Mod), five).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[rem]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "-3");
    }

    #[test]
    fn test_boolean_operators() {
        let mut cg = codegen();
        cg.enter_proc(None);
        // (1 < 2 And Not (3 == 3)) Or 4 != 5
        let a = loaded(&mut cg, Attrib::int(1));
        let b = loaded(&mut cg, Attrib::int(2));
        let lt = cg.rel_op(a, tok(RelOp::Lt), b).unwrap();
        let c = loaded(&mut cg, Attrib::int(3));
        let d = loaded(&mut cg, Attrib::int(3));
        let eq = cg.equal_op(c, tok(EqualOp::Eq), d).unwrap();
        let not = cg.op1(Some(tok(UnaryOp::Not)), eq).unwrap();
        let and = cg.op2(lt, tok(BinaryOp::And), not).unwrap();
        let e = loaded(&mut cg, Attrib::int(4));
        let f = loaded(&mut cg, Attrib::int(5));
        let ne = cg.equal_op(e, tok(EqualOp::Ne), f).unwrap();
        let or = cg.op2(and, tok(BinaryOp::Or), ne).unwrap();
        assert!(or.ty.is_bool());
        call(&mut cg, PredefinedProc::WriteBool, &[or]);
        let t = loaded(&mut cg, Attrib::bool(false));
        call(&mut cg, PredefinedProc::WriteBool, &[t]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "TrueFalse");
    }

    #[test]
    fn test_op1_without_operator_is_identity() {
        let mut cg = codegen();
        let x = Attrib::int(9);
        assert_eq!(cg.op1(None, x.clone()).unwrap(), x);
        assert!(cg.backend().code().is_empty());
    }

    #[test]
    fn test_operator_type_errors() {
        let mut cg = codegen();
        let at = Span::new(3, 7);

        let err = cg
            .op1(Some(Token::new(UnaryOp::Minus, at)), Attrib::bool(true))
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::IllegalOp1Type { op: "-".into() });
        assert_eq!(err.span, at);

        let err = cg
            .op2(Attrib::int(1), tok(BinaryOp::And), Attrib::int(2))
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::IllegalOp2Type { op: "And".into() });

        let err = cg
            .op2(Attrib::int(1), tok(BinaryOp::Add), Attrib::bool(true))
            .unwrap_err();
        assert_eq!(err.kind.number(), 24);

        let err = cg
            .rel_op(Attrib::bool(true), tok(RelOp::Ge), Attrib::bool(false))
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::IllegalRelOpType { op: ">=".into() });

        let err = cg
            .equal_op(Attrib::int(1), tok(EqualOp::Eq), Attrib::bool(true))
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::IllegalEqualOpType { op: "==".into() });
        assert_eq!(err.to_string(), "1:1: error 26: illegal operand type for equality operator '=='");
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    #[test]
    fn test_assign_errors() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let x = local(&mut cg, "x", Type::Int);

        let err = cg
            .assign(&Attrib::from_symbol(&x), &Attrib::bool(true), AT)
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::TypeMismatchAssign);

        let mut ro = Symbol::new("ro", SymbolKind::Parameter, Type::Int).readonly();
        cg.set_param_offset(&mut ro, 0);
        let err = cg
            .assign(&Attrib::from_symbol(&ro), &Attrib::int(1), AT)
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::ReadonlyAssign);
    }

    #[test]
    fn test_local_assignment_uses_frame() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let x = local(&mut cg, "x", Type::Int);
        let y = local(&mut cg, "y", Type::Int);
        assert_eq!((x.offset, y.offset), (Some(0), Some(1)));
        cg.assign(&Attrib::from_symbol(&y), &Attrib::int(6), AT).unwrap();
        let mut value = Attrib::from_symbol(&y);
        cg.load_value(&mut value);
        cg.assign(&Attrib::from_symbol(&x), &value, AT).unwrap();
        cg.exit_proc(None);

        let image = finish(cg);
        // enter 0 2; const 6; store 1; load 1; store 0
        assert_eq!(&image.code[..14], &[48, 0, 2, 22, 0, 0, 0, 6, 6, 1, 1, 1, 6, 0]);
    }

    // =========================================================================
    // Procedures
    // =========================================================================

    fn fact_symbol() -> Symbol {
        let ty = ProcedureType::new("fact", Type::Int).with_param("n", Type::Int);
        Symbol::new("fact", SymbolKind::Procedure, Type::Procedure(Rc::new(ty))).with_id(1)
    }

    #[test]
    fn test_recursive_function() {
        let mut cg = codegen();
        let fact = fact_symbol();
        let mut n = Symbol::new("n", SymbolKind::Parameter, Type::Int);
        cg.set_param_offset(&mut n, 0);

        cg.enter_proc(Some(&fact));
        let arg = loaded(&mut cg, Attrib::from_symbol(&n));
        let one = loaded(&mut cg, Attrib::int(1));
        let small = cg.rel_op(arg, tok(RelOp::Le), one).unwrap();
        let recurse = cg.new_label();
        cg.branch_if_false(&small, &recurse, AT).unwrap();
        let result = loaded(&mut cg, Attrib::int(1));
        cg.return_from_proc(Some(&fact), Some(&result));

        cg.assign_label(&recurse);
        let x = loaded(&mut cg, Attrib::from_symbol(&n));
        let y = loaded(&mut cg, Attrib::from_symbol(&n));
        let one = loaded(&mut cg, Attrib::int(1));
        let arg = cg.op2(y, tok(BinaryOp::Sub), one).unwrap();
        let rec = cg.call_function(&fact, &[arg], AT).unwrap();
        let product = cg.op2(x, tok(BinaryOp::Mul), rec).unwrap();
        cg.return_from_proc(Some(&fact), Some(&product));
        cg.exit_proc(Some(&fact));

        cg.enter_proc(None);
        let five = loaded(&mut cg, Attrib::int(5));
        let result = cg.call_function(&fact, &[five], AT).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[result]);
        call(&mut cg, PredefinedProc::WriteLn, &[]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "120\n");
    }

    #[test]
    fn test_main_program_symbol_labels() {
        let mut cg = codegen();
        let program = Symbol::new("demo", SymbolKind::Program, Type::Void).with_id(3);
        cg.enter_proc(Some(&program));
        cg.return_from_proc(Some(&program), None);
        cg.exit_proc(Some(&program));

        let backend = cg.into_backend();
        assert_eq!(backend.labels().address_of("demo#3"), Some(0));
        assert_eq!(backend.labels().address_of("demo#3_end"), Some(6));
    }

    #[test]
    fn test_call_argument_checks() {
        let mut cg = codegen();
        let fact = fact_symbol();

        let err = cg.call_proc(&fact, &[], AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::TooFewArgs { proc_name: "fact".into() });

        let err = cg
            .call_proc(&fact, &[Attrib::value(Type::Int), Attrib::value(Type::Int)], AT)
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::TooManyArgs { proc_name: "fact".into() });

        let err = cg
            .call_proc(&fact, &[Attrib::value(Type::Bool)], AT)
            .unwrap_err();
        assert_eq!(
            err.kind,
            SemanticErrorKind::ArgNotApplicable {
                index: 1,
                proc_name: "fact".into()
            }
        );
    }

    #[test]
    fn test_procedure_in_expression() {
        let mut cg = codegen();
        let writeln = PredefinedProc::WriteLn.symbol();
        let err = cg.call_function(&writeln, &[], AT).unwrap_err();
        assert_eq!(
            err.kind,
            SemanticErrorKind::ProcNotFuncExpr {
                proc_name: "writeln".into()
            }
        );
        assert!(cg.backend().code().is_empty());
        assert_eq!(cg.call_proc(&writeln, &[], AT).unwrap(), None);
    }

    #[test]
    fn test_readint_expands_to_read() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let value = cg
            .call_function(&PredefinedProc::ReadInt.symbol(), &[], AT)
            .unwrap();
        assert!(value.ty.is_int());
        call(&mut cg, PredefinedProc::WriteInt, &[value]);
        cg.exit_proc(None);

        let image = finish(cg);
        let mut vm = Vm::new().with_input("17\n");
        vm.run(&image).unwrap();
        assert_eq!(vm.output_string(), "17");
    }

    #[test]
    fn test_writeln_string_shared() {
        let mut cg = codegen();
        cg.enter_proc(None);
        call(&mut cg, PredefinedProc::WriteLn, &[]);
        call(&mut cg, PredefinedProc::WriteLn, &[]);
        cg.write_string("\"done\"");
        cg.exit_proc(None);

        // "\n" takes one word, "done" two
        assert_eq!(cg.backend().static_data().words(), 3);
        assert_eq!(run(cg).output_string(), "\n\ndone");
    }

    #[test]
    fn test_condition_must_be_bool() {
        let mut cg = codegen();
        let err = cg
            .branch_if_false(&Attrib::int(1), "L0", Span::new(2, 4))
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::CondNotBool);
        assert_eq!(err.to_string(), "2:4: error 34: condition is not a boolean expression");
    }

    #[test]
    fn test_new_labels_unique() {
        let mut cg = codegen();
        let a = cg.new_label();
        let b = cg.new_label();
        assert_eq!(a, "L0");
        assert_ne!(a, b);
    }

    // =========================================================================
    // Arrays and records
    // =========================================================================

    #[test]
    fn test_one_dimensional_array() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let ty = Type::array(1, Type::Int);
        let a = local(&mut cg, "a", ty.clone());

        let len = loaded(&mut cg, Attrib::int(4));
        cg.store_array_dim(0, &len, AT).unwrap();
        let arr = cg.alloc_array(&ty, AT).unwrap();
        cg.assign(&Attrib::from_symbol(&a), &arr, AT).unwrap();

        // a[3] := 11
        let mut elem = Attrib::from_symbol(&a);
        cg.load_address(&mut elem);
        cg.array_offset(&mut elem, &Attrib::int(3), AT).unwrap();
        cg.assign(&elem, &Attrib::int(11), AT).unwrap();

        // writeint(a[3] + #a)
        let mut elem = Attrib::from_symbol(&a);
        cg.load_address(&mut elem);
        cg.array_offset(&mut elem, &Attrib::int(3), AT).unwrap();
        cg.load_value(&mut elem);
        let len = cg.array_length(&mut Attrib::from_symbol(&a), AT).unwrap();
        let sum = cg.op2(elem, tok(BinaryOp::Add), len).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[sum]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "15");
    }

    #[test]
    fn test_array_length_from_stack_top() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let ty = Type::array(1, Type::Bool);
        loaded(&mut cg, Attrib::int(2));
        let mut arr = cg.alloc_array(&ty, AT).unwrap();
        assert_eq!(arr.kind, AttribKind::StackAddress);
        let len = cg.array_length(&mut arr, AT).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[len]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "2");
    }

    #[test]
    fn test_jagged_two_dimensional_array() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let ty = Type::array(2, Type::Int);
        let a = local(&mut cg, "a", ty.clone());

        // a := new int[3][2]
        let rows = loaded(&mut cg, Attrib::int(3));
        cg.store_array_dim(0, &rows, AT).unwrap();
        let cols = loaded(&mut cg, Attrib::int(2));
        cg.store_array_dim(1, &cols, AT).unwrap();
        let arr = cg.alloc_array(&ty, AT).unwrap();
        cg.assign(&Attrib::from_symbol(&a), &arr, AT).unwrap();

        // a[2][1] := 7
        let mut elem = Attrib::from_symbol(&a);
        cg.load_address(&mut elem);
        cg.array_offset(&mut elem, &Attrib::int(2), AT).unwrap();
        assert_eq!(elem.ty, Type::array(1, Type::Int));
        cg.load_address(&mut elem);
        cg.array_offset(&mut elem, &Attrib::int(1), AT).unwrap();
        cg.assign(&elem, &Attrib::int(7), AT).unwrap();

        // writeint(a[2][1]); writeint(#a[0]); writeint(#a)
        let mut elem = Attrib::from_symbol(&a);
        cg.load_address(&mut elem);
        cg.array_offset(&mut elem, &Attrib::int(2), AT).unwrap();
        cg.load_address(&mut elem);
        cg.array_offset(&mut elem, &Attrib::int(1), AT).unwrap();
        cg.load_value(&mut elem);
        call(&mut cg, PredefinedProc::WriteInt, &[elem]);

        let mut row = Attrib::from_symbol(&a);
        cg.load_address(&mut row);
        cg.array_offset(&mut row, &Attrib::int(0), AT).unwrap();
        let len = cg.array_length(&mut row, AT).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[len]);

        let len = cg.array_length(&mut Attrib::from_symbol(&a), AT).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[len]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "723");
    }

    #[test]
    fn test_three_dimensional_array_lengths() {
        let mut cg = codegen();
        cg.enter_proc(None);
        let ty = Type::array(3, Type::Int);
        for (dim, len) in [2, 3, 4].into_iter().enumerate() {
            let len = loaded(&mut cg, Attrib::int(len));
            cg.store_array_dim(dim, &len, AT).unwrap();
        }
        let mut arr = cg.alloc_array(&ty, AT).unwrap();
        // #arr[1][2]
        cg.array_offset(&mut arr, &Attrib::int(1), AT).unwrap();
        cg.load_address(&mut arr);
        cg.array_offset(&mut arr, &Attrib::int(2), AT).unwrap();
        let len = cg.array_length(&mut arr, AT).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[len]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "4");
    }

    #[test]
    fn test_nested_new_in_dimension_length() {
        // a := new int[3][#(new int[5])], with and without storing the
        // inner dimension 0
        for store_inner in [false, true] {
            let mut cg = codegen();
            cg.enter_proc(None);
            let ty = Type::array(2, Type::Int);
            let a = local(&mut cg, "a", ty.clone());

            let rows = loaded(&mut cg, Attrib::int(3));
            cg.store_array_dim(0, &rows, AT).unwrap();
            let inner_len = loaded(&mut cg, Attrib::int(5));
            if store_inner {
                cg.store_array_dim(0, &inner_len, AT).unwrap();
            }
            let mut inner = cg.alloc_array(&Type::array(1, Type::Int), AT).unwrap();
            let cols = cg.array_length(&mut inner, AT).unwrap();
            cg.store_array_dim(1, &cols, AT).unwrap();
            let arr = cg.alloc_array(&ty, AT).unwrap();
            cg.assign(&Attrib::from_symbol(&a), &arr, AT).unwrap();

            // writeint(#a); writeint(#a[2])
            let len = cg.array_length(&mut Attrib::from_symbol(&a), AT).unwrap();
            call(&mut cg, PredefinedProc::WriteInt, &[len]);
            let mut row = Attrib::from_symbol(&a);
            cg.load_address(&mut row);
            cg.array_offset(&mut row, &Attrib::int(2), AT).unwrap();
            let len = cg.array_length(&mut row, AT).unwrap();
            call(&mut cg, PredefinedProc::WriteInt, &[len]);
            cg.exit_proc(None);

            assert_eq!(run(cg).output_string(), "35", "store_inner = {}", store_inner);
        }
    }

    #[test]
    fn test_nested_jagged_new_in_last_dimension() {
        // #(new int[2][3][#(new int[4][6])][1][2])
        let mut cg = codegen();
        cg.enter_proc(None);
        let ty = Type::array(3, Type::Int);
        for (dim, len) in [2, 3].into_iter().enumerate() {
            let len = loaded(&mut cg, Attrib::int(len));
            cg.store_array_dim(dim, &len, AT).unwrap();
        }

        let inner_ty = Type::array(2, Type::Int);
        for (dim, len) in [4, 6].into_iter().enumerate() {
            let len = loaded(&mut cg, Attrib::int(len));
            cg.store_array_dim(dim, &len, AT).unwrap();
        }
        let mut inner = cg.alloc_array(&inner_ty, AT).unwrap();
        let last = cg.array_length(&mut inner, AT).unwrap();
        cg.store_array_dim(2, &last, AT).unwrap();

        let mut arr = cg.alloc_array(&ty, AT).unwrap();
        cg.array_offset(&mut arr, &Attrib::int(1), AT).unwrap();
        cg.load_address(&mut arr);
        cg.array_offset(&mut arr, &Attrib::int(2), AT).unwrap();
        let len = cg.array_length(&mut arr, AT).unwrap();
        call(&mut cg, PredefinedProc::WriteInt, &[len]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "4");
    }

    #[test]
    fn test_array_errors() {
        let mut cg = codegen();
        let err = cg
            .store_array_dim(MAX_ARRAY_DIMS, &Attrib::int(1), AT)
            .unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::TooManyDims { max: MAX_ARRAY_DIMS });

        let err = cg.store_array_dim(0, &Attrib::bool(true), AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::BadArraySelector);

        let err = cg.alloc_array(&Type::Int, AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::InvalidNewType);

        let mut scalar = Attrib::value(Type::Int);
        let err = cg.array_offset(&mut scalar, &Attrib::int(0), AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::SelectorNotArray);

        let mut arr = Attrib::value(Type::array(1, Type::Int));
        let err = cg.array_offset(&mut arr, &Attrib::bool(true), AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::BadArraySelector);

        let err = cg.array_length(&mut scalar, AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::ArrayLenNotArray);
    }

    fn point_type(cg: &mut CodeGenMj<BackendMj>) -> Type {
        let mut record = RecordType::new("Point");
        record.add_field(Symbol::new("x", SymbolKind::Field, Type::Int));
        record.add_field(Symbol::new("y", SymbolKind::Field, Type::Int));
        cg.set_field_offsets(&mut record);
        Type::Record(Rc::new(record))
    }

    #[test]
    fn test_record_fields() {
        let mut cg = codegen();
        let ty = point_type(&mut cg);
        cg.enter_proc(None);
        let p = local(&mut cg, "p", ty.clone());
        let rec = cg.alloc_record(&ty, AT).unwrap();
        cg.assign(&Attrib::from_symbol(&p), &rec, AT).unwrap();

        let mut field = Attrib::from_symbol(&p);
        cg.record_offset(&mut field, "y", AT).unwrap();
        assert_eq!(field.offset, 1);
        cg.assign(&field, &Attrib::int(9), AT).unwrap();

        let mut field = Attrib::from_symbol(&p);
        cg.record_offset(&mut field, "y", AT).unwrap();
        cg.load_value(&mut field);
        call(&mut cg, PredefinedProc::WriteInt, &[field]);
        cg.exit_proc(None);

        assert_eq!(run(cg).output_string(), "9");
    }

    #[test]
    fn test_record_errors() {
        let mut cg = codegen();
        let ty = point_type(&mut cg);

        let mut rec = Attrib::value(ty.clone());
        let err = cg.record_offset(&mut rec, "z", AT).unwrap_err();
        assert_eq!(
            err.kind,
            SemanticErrorKind::InvalidRecordField {
                field: "z".into(),
                record: "Point".into()
            }
        );

        let mut scalar = Attrib::value(Type::Int);
        let err = cg.record_offset(&mut scalar, "x", AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::SelectorNotRecord);

        let err = cg.alloc_record(&Type::array(1, Type::Int), AT).unwrap_err();
        assert_eq!(err.kind, SemanticErrorKind::InvalidNewType);
    }

    #[test]
    fn test_field_offsets_in_declaration_order() {
        let mut cg = codegen();
        let Type::Record(record) = point_type(&mut cg) else {
            unreachable!()
        };
        let offsets: Vec<_> = record.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![Some(0), Some(1)]);
    }

    #[test]
    #[should_panic(expected = "exit_proc without an open procedure")]
    fn test_exit_without_enter_panics() {
        codegen().exit_proc(None);
    }
}
