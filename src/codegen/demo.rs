use std::rc::Rc;

use crate::bytecode::emitter::BackendMj;
use crate::codegen::attrib::Attrib;
use crate::codegen::generator::{CodeGen, CodeGenMj, CodeGenResult};
use crate::codegen::predefined::PredefinedProc;
use crate::codegen::symbol::{Symbol, SymbolKind};
use crate::codegen::token::{BinaryOp, EqualOp, RelOp, Span, Token, UnaryOp};
use crate::codegen::types::{ProcedureType, RecordType, Type};

/// Drives the code generator the way a parser would for:
///
/// ```text
/// program demo
///   const LIMIT = 6;
///   int total;
///   record Point { int x; int y; }
///
///   int fact(int n) {
///     if (n <= 1) return 1;
///     return n * fact(n - 1);
///   }
///
/// {
///   int i;
///   i = 1;
///   while (i <= LIMIT) {
///     writeint(i); writestring("! = "); writeint(fact(i)); writeln();
///     total = total + i;
///     i = i + 1;
///   }
///   writestring("sum = "); writeint(total); writeln();
///   writebool(total % 2 == 1); writeln();
///
///   int[] squares; Point p;
///   squares = new int[LIMIT];
///   squares[LIMIT - 1] = -total;
///   p = new Point;
///   p.x = #squares;
///   p.y = squares[5];
///   writeint(p.x + p.y); writeln();
///   writebool(!(p.x < p.y)); writeln();
/// }
/// ```
pub fn demo_program() -> CodeGenResult<BackendMj> {
    let mut cg = CodeGenMj::new(BackendMj::new());
    let mut line = 0;
    let mut at = || {
        line += 1;
        Span::new(line, 1)
    };

    let program = Symbol::new("demo", SymbolKind::Program, Type::Void);

    let mut limit = Symbol::new("LIMIT", SymbolKind::Constant, Type::Int)
        .global()
        .readonly();
    cg.alloc_variable(&mut limit);
    cg.assign(&Attrib::from_symbol(&limit), &Attrib::int(6), at())?;

    let mut total = Symbol::new("total", SymbolKind::Variable, Type::Int).global();
    cg.alloc_variable(&mut total);

    let mut point = RecordType::new("Point");
    point.add_field(Symbol::new("x", SymbolKind::Field, Type::Int));
    point.add_field(Symbol::new("y", SymbolKind::Field, Type::Int));
    cg.set_field_offsets(&mut point);
    let point = Type::Record(Rc::new(point));

    // int fact(int n)
    let fact_type = ProcedureType::new("fact", Type::Int).with_param("n", Type::Int);
    let fact = Symbol::new("fact", SymbolKind::Procedure, Type::Procedure(Rc::new(fact_type)))
        .global()
        .with_id(1);
    let mut n = Symbol::new("n", SymbolKind::Parameter, Type::Int).with_id(2);
    cg.set_param_offset(&mut n, 0);

    cg.enter_proc(Some(&fact));
    let x = load(&mut cg, Attrib::from_symbol(&n));
    let one = load(&mut cg, Attrib::int(1));
    let small = cg.rel_op(x, Token::new(RelOp::Le, at()), one)?;
    let recurse = cg.new_label();
    cg.branch_if_false(&small, &recurse, at())?;
    let one = load(&mut cg, Attrib::int(1));
    cg.return_from_proc(Some(&fact), Some(&one));

    cg.assign_label(&recurse);
    let x = load(&mut cg, Attrib::from_symbol(&n));
    let y = load(&mut cg, Attrib::from_symbol(&n));
    let one = load(&mut cg, Attrib::int(1));
    let pred = cg.op2(y, Token::new(BinaryOp::Sub, at()), one)?;
    let rec = cg.call_function(&fact, &[pred], at())?;
    let product = cg.op2(x, Token::new(BinaryOp::Mul, at()), rec)?;
    cg.return_from_proc(Some(&fact), Some(&product));
    cg.exit_proc(Some(&fact));

    cg.enter_proc(Some(&program));
    let mut i = Symbol::new("i", SymbolKind::Variable, Type::Int).with_id(3);
    cg.alloc_variable(&mut i);
    cg.assign(&Attrib::from_symbol(&i), &Attrib::int(1), at())?;

    let top = cg.new_label();
    let done = cg.new_label();
    cg.assign_label(&top);
    let x = load(&mut cg, Attrib::from_symbol(&i));
    let bound = load(&mut cg, Attrib::from_symbol(&limit));
    let cond = cg.rel_op(x, Token::new(RelOp::Le, at()), bound)?;
    cg.branch_if_false(&cond, &done, at())?;

    let x = load(&mut cg, Attrib::from_symbol(&i));
    write(&mut cg, PredefinedProc::WriteInt, &[x], at())?;
    cg.write_string("\"! = \"");
    let x = load(&mut cg, Attrib::from_symbol(&i));
    let f = cg.call_function(&fact, &[x], at())?;
    write(&mut cg, PredefinedProc::WriteInt, &[f], at())?;
    write(&mut cg, PredefinedProc::WriteLn, &[], at())?;

    let sum = load(&mut cg, Attrib::from_symbol(&total));
    let x = load(&mut cg, Attrib::from_symbol(&i));
    let sum = cg.op2(sum, Token::new(BinaryOp::Add, at()), x)?;
    cg.assign(&Attrib::from_symbol(&total), &sum, at())?;

    let x = load(&mut cg, Attrib::from_symbol(&i));
    let one = load(&mut cg, Attrib::int(1));
    let next = cg.op2(x, Token::new(BinaryOp::Add, at()), one)?;
    cg.assign(&Attrib::from_symbol(&i), &next, at())?;
    cg.jump(&top);
    cg.assign_label(&done);

    cg.write_string("\"sum = \"");
    let sum = load(&mut cg, Attrib::from_symbol(&total));
    write(&mut cg, PredefinedProc::WriteInt, &[sum], at())?;
    write(&mut cg, PredefinedProc::WriteLn, &[], at())?;

    let sum = load(&mut cg, Attrib::from_symbol(&total));
    let two = load(&mut cg, Attrib::int(2));
    let rem = cg.op2(sum, Token::new(BinaryOp::Mod, at()), two)?;
    let one = load(&mut cg, Attrib::int(1));
    let odd = cg.equal_op(rem, Token::new(EqualOp::Eq, at()), one)?;
    write(&mut cg, PredefinedProc::WriteBool, &[odd], at())?;
    write(&mut cg, PredefinedProc::WriteLn, &[], at())?;

    let int_array = Type::array(1, Type::Int);
    let mut squares = Symbol::new("squares", SymbolKind::Variable, int_array.clone()).with_id(4);
    cg.alloc_variable(&mut squares);
    let mut p = Symbol::new("p", SymbolKind::Variable, point.clone()).with_id(5);
    cg.alloc_variable(&mut p);

    let len = load(&mut cg, Attrib::from_symbol(&limit));
    cg.store_array_dim(0, &len, at())?;
    let array = cg.alloc_array(&int_array, at())?;
    cg.assign(&Attrib::from_symbol(&squares), &array, at())?;

    let mut elem = Attrib::from_symbol(&squares);
    cg.load_address(&mut elem);
    let bound = load(&mut cg, Attrib::from_symbol(&limit));
    let one = load(&mut cg, Attrib::int(1));
    let last = cg.op2(bound, Token::new(BinaryOp::Sub, at()), one)?;
    cg.array_offset(&mut elem, &last, at())?;
    let sum = load(&mut cg, Attrib::from_symbol(&total));
    let neg = cg.op1(Some(Token::new(UnaryOp::Minus, at())), sum)?;
    cg.assign(&elem, &neg, at())?;

    let record = cg.alloc_record(&point, at())?;
    cg.assign(&Attrib::from_symbol(&p), &record, at())?;

    let mut field = Attrib::from_symbol(&p);
    cg.record_offset(&mut field, "x", at())?;
    let len = cg.array_length(&mut Attrib::from_symbol(&squares), at())?;
    cg.assign(&field, &len, at())?;

    let mut field = Attrib::from_symbol(&p);
    cg.record_offset(&mut field, "y", at())?;
    let mut elem = Attrib::from_symbol(&squares);
    cg.load_address(&mut elem);
    cg.array_offset(&mut elem, &Attrib::int(5), at())?;
    cg.load_value(&mut elem);
    cg.assign(&field, &elem, at())?;

    let x = load_field(&mut cg, &p, "x", at())?;
    let y = load_field(&mut cg, &p, "y", at())?;
    let sum = cg.op2(x, Token::new(BinaryOp::Add, at()), y)?;
    write(&mut cg, PredefinedProc::WriteInt, &[sum], at())?;
    write(&mut cg, PredefinedProc::WriteLn, &[], at())?;

    let x = load_field(&mut cg, &p, "x", at())?;
    let y = load_field(&mut cg, &p, "y", at())?;
    let less = cg.rel_op(x, Token::new(RelOp::Lt, at()), y)?;
    let not_less = cg.op1(Some(Token::new(UnaryOp::Not, at())), less)?;
    write(&mut cg, PredefinedProc::WriteBool, &[not_less], at())?;
    write(&mut cg, PredefinedProc::WriteLn, &[], at())?;
    cg.exit_proc(Some(&program));

    Ok(cg.into_backend())
}

fn load(cg: &mut CodeGenMj<BackendMj>, mut attr: Attrib) -> Attrib {
    cg.load_value(&mut attr);
    attr
}

fn load_field(
    cg: &mut CodeGenMj<BackendMj>,
    record: &Symbol,
    field: &str,
    at: Span,
) -> CodeGenResult<Attrib> {
    let mut attr = Attrib::from_symbol(record);
    cg.record_offset(&mut attr, field, at)?;
    cg.load_value(&mut attr);
    Ok(attr)
}

fn write(
    cg: &mut CodeGenMj<BackendMj>,
    builtin: PredefinedProc,
    args: &[Attrib],
    at: Span,
) -> CodeGenResult<()> {
    cg.call_proc(&builtin.symbol(), args, at).map(|_| ())
}
