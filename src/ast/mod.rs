//! Typed abstract syntax tree for Opal contract verification
//!
//! The parser and type checker run first; the verifier consumes modules in
//! which every type name is already resolved to a canonical identifier.
//! Expressions are immutable once constructed. Passes that rewrite
//! expressions return new nodes and signal "unchanged" through reference
//! identity (`Arc::ptr_eq`), so callers can skip reprocessing.

use crate::error::Span;
use crate::types::{IntWidth, Type};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Unique id assigned by the front end to named declarations
pub type NodeId = u32;

/// Shared handle to an immutable expression node
pub type ExprRef = Arc<Expression>;

/// Unary operators in the contract and statement sub-language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
    BitNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    /// Operators whose operand order does not matter for structural equality
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
        )
    }

    /// Whether this operator yields a boolean result
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

/// Quantifier kinds for contract expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    Forall,
    Exists,
}

/// A bound variable of an enclosing quantifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantifierBinder {
    pub name: String,
    pub ty: Type,
}

/// Expression node; every expression carries its source span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExprKind,
    pub span: Span,
}

/// Expression variants of the contract sub-language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Sized integer literal; `value` is the two's-complement value
    IntLiteral {
        value: i128,
        width: IntWidth,
        signed: bool,
    },

    /// IEEE-754 float literal
    FloatLiteral { value: f64, double: bool },

    BoolLiteral(bool),

    /// Exact decimal literal, kept textual (outside the QF_BV subset)
    DecimalLiteral(String),

    /// String literal (opaque to the encoder)
    StringLiteral(String),

    NullLiteral,

    /// Variable reference by resolved name
    Variable(String),

    Unary {
        op: UnaryOp,
        operand: ExprRef,
    },

    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
    },

    /// Ternary conditional
    Conditional {
        condition: ExprRef,
        then_expr: ExprRef,
        else_expr: ExprRef,
    },

    FieldAccess {
        object: ExprRef,
        field: String,
    },

    /// Array or list indexing
    Index {
        collection: ExprRef,
        index: ExprRef,
    },

    /// Array length
    Length(ExprRef),

    /// Collection element count
    Count(ExprRef),

    /// Collection membership test
    Contains {
        collection: ExprRef,
        element: ExprRef,
    },

    /// `a ?? b`
    NullCoalesce {
        value: ExprRef,
        fallback: ExprRef,
    },

    /// `a?.field`
    NullConditional {
        object: ExprRef,
        field: String,
    },

    OptionSome(ExprRef),
    OptionNone,
    ResultOk(ExprRef),
    ResultErr(ExprRef),

    /// Free function call
    Call {
        function: String,
        args: Vec<ExprRef>,
    },

    /// Method call on a receiver
    MethodCall {
        receiver: ExprRef,
        method: String,
        args: Vec<ExprRef>,
    },

    /// Quantifier over finite integer-typed bound variables
    Quantifier {
        kind: QuantifierKind,
        binders: Vec<QuantifierBinder>,
        body: ExprRef,
    },

    /// Logical implication `antecedent -> consequent`
    Implies {
        antecedent: ExprRef,
        consequent: ExprRef,
    },

    /// Record construction with named fields
    Record {
        fields: Vec<(String, ExprRef)>,
    },

    /// Tuple construction
    Tuple(Vec<ExprRef>),
}

impl Expression {
    pub fn new(kind: ExprKind, span: Span) -> ExprRef {
        Arc::new(Expression { kind, span })
    }

    /// Integer literal at the given width and signedness
    pub fn int(value: i128, width: IntWidth, signed: bool, span: Span) -> ExprRef {
        Expression::new(
            ExprKind::IntLiteral {
                value,
                width,
                signed,
            },
            span,
        )
    }

    /// Convenience: signed 32-bit literal, the surface default
    pub fn int32(value: i64, span: Span) -> ExprRef {
        Expression::int(value as i128, IntWidth::W32, true, span)
    }

    pub fn boolean(value: bool, span: Span) -> ExprRef {
        Expression::new(ExprKind::BoolLiteral(value), span)
    }

    pub fn variable(name: impl Into<String>, span: Span) -> ExprRef {
        Expression::new(ExprKind::Variable(name.into()), span)
    }

    pub fn unary(op: UnaryOp, operand: ExprRef, span: Span) -> ExprRef {
        Expression::new(ExprKind::Unary { op, operand }, span)
    }

    pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef, span: Span) -> ExprRef {
        Expression::new(ExprKind::Binary { op, left, right }, span)
    }

    pub fn not(operand: ExprRef, span: Span) -> ExprRef {
        Expression::unary(UnaryOp::Not, operand, span)
    }

    pub fn implies(antecedent: ExprRef, consequent: ExprRef, span: Span) -> ExprRef {
        Expression::new(
            ExprKind::Implies {
                antecedent,
                consequent,
            },
            span,
        )
    }

    /// Whether this node is the literal `true`
    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExprKind::BoolLiteral(true))
    }

    /// Whether this node is the literal `false`
    pub fn is_false(&self) -> bool {
        matches!(self.kind, ExprKind::BoolLiteral(false))
    }

    /// Integer literal value, if this node is one
    pub fn as_int_literal(&self) -> Option<i128> {
        match &self.kind {
            ExprKind::IntLiteral { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Structural node count, used to bound rewriting expansion
    pub fn size(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Invoke `visit` on this node and every descendant, preorder
    pub fn walk(&self, visit: &mut impl FnMut(&Expression)) {
        visit(self);
        match &self.kind {
            ExprKind::Unary { operand, .. } => operand.walk(visit),
            ExprKind::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                condition.walk(visit);
                then_expr.walk(visit);
                else_expr.walk(visit);
            }
            ExprKind::FieldAccess { object, .. } | ExprKind::NullConditional { object, .. } => {
                object.walk(visit)
            }
            ExprKind::Index { collection, index } => {
                collection.walk(visit);
                index.walk(visit);
            }
            ExprKind::Length(inner) | ExprKind::Count(inner) => inner.walk(visit),
            ExprKind::Contains {
                collection,
                element,
            } => {
                collection.walk(visit);
                element.walk(visit);
            }
            ExprKind::NullCoalesce { value, fallback } => {
                value.walk(visit);
                fallback.walk(visit);
            }
            ExprKind::OptionSome(inner) | ExprKind::ResultOk(inner) | ExprKind::ResultErr(inner) => {
                inner.walk(visit)
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                receiver.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            ExprKind::Quantifier { body, .. } => body.walk(visit),
            ExprKind::Implies {
                antecedent,
                consequent,
            } => {
                antecedent.walk(visit);
                consequent.walk(visit);
            }
            ExprKind::Record { fields } => {
                for (_, value) in fields {
                    value.walk(visit);
                }
            }
            ExprKind::Tuple(items) => {
                for item in items {
                    item.walk(visit);
                }
            }
            ExprKind::IntLiteral { .. }
            | ExprKind::FloatLiteral { .. }
            | ExprKind::BoolLiteral(_)
            | ExprKind::DecimalLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::NullLiteral
            | ExprKind::OptionNone
            | ExprKind::Variable(_) => {}
        }
    }

    /// Free variables of this expression, minus enclosing quantifier binders
    pub fn free_variables(&self) -> HashSet<String> {
        let mut free = HashSet::new();
        self.collect_free(&mut HashSet::new(), &mut free);
        free
    }

    fn collect_free(&self, bound: &mut HashSet<String>, free: &mut HashSet<String>) {
        match &self.kind {
            ExprKind::Variable(name) => {
                if !bound.contains(name) {
                    free.insert(name.clone());
                }
            }
            ExprKind::Quantifier { binders, body, .. } => {
                let added: Vec<String> = binders
                    .iter()
                    .filter(|b| bound.insert(b.name.clone()))
                    .map(|b| b.name.clone())
                    .collect();
                body.collect_free(bound, free);
                for name in added {
                    bound.remove(&name);
                }
            }
            _ => {
                // Every other variant only contributes through children.
                let mut children = Vec::new();
                self.for_each_child(&mut |c| children.push(c.clone()));
                for child in children {
                    child.collect_free(bound, free);
                }
            }
        }
    }

    /// Invoke `visit` on each direct child expression
    pub fn for_each_child(&self, visit: &mut impl FnMut(&ExprRef)) {
        match &self.kind {
            ExprKind::Unary { operand, .. } => visit(operand),
            ExprKind::Binary { left, right, .. } => {
                visit(left);
                visit(right);
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                visit(condition);
                visit(then_expr);
                visit(else_expr);
            }
            ExprKind::FieldAccess { object, .. } | ExprKind::NullConditional { object, .. } => {
                visit(object)
            }
            ExprKind::Index { collection, index } => {
                visit(collection);
                visit(index);
            }
            ExprKind::Length(inner) | ExprKind::Count(inner) => visit(inner),
            ExprKind::Contains {
                collection,
                element,
            } => {
                visit(collection);
                visit(element);
            }
            ExprKind::NullCoalesce { value, fallback } => {
                visit(value);
                visit(fallback);
            }
            ExprKind::OptionSome(inner) | ExprKind::ResultOk(inner) | ExprKind::ResultErr(inner) => {
                visit(inner)
            }
            ExprKind::Call { args, .. } => {
                for arg in args {
                    visit(arg);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                visit(receiver);
                for arg in args {
                    visit(arg);
                }
            }
            ExprKind::Quantifier { body, .. } => visit(body),
            ExprKind::Implies {
                antecedent,
                consequent,
            } => {
                visit(antecedent);
                visit(consequent);
            }
            ExprKind::Record { fields } => {
                for (_, value) in fields {
                    visit(value);
                }
            }
            ExprKind::Tuple(items) => {
                for item in items {
                    visit(item);
                }
            }
            ExprKind::IntLiteral { .. }
            | ExprKind::FloatLiteral { .. }
            | ExprKind::BoolLiteral(_)
            | ExprKind::DecimalLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::NullLiteral
            | ExprKind::OptionNone
            | ExprKind::Variable(_) => {}
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::IntLiteral { value, .. } => write!(f, "{}", value),
            ExprKind::FloatLiteral { value, .. } => write!(f, "{}", value),
            ExprKind::BoolLiteral(b) => write!(f, "{}", b),
            ExprKind::DecimalLiteral(text) => write!(f, "{}m", text),
            ExprKind::StringLiteral(s) => write!(f, "{:?}", s),
            ExprKind::NullLiteral => write!(f, "null"),
            ExprKind::Variable(name) => write!(f, "{}", name),
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Negate => write!(f, "(-{})", operand),
                UnaryOp::Not => write!(f, "(!{})", operand),
                UnaryOp::BitNot => write!(f, "(~{})", operand),
                UnaryOp::PreIncrement => write!(f, "(++{})", operand),
                UnaryOp::PreDecrement => write!(f, "(--{})", operand),
                UnaryOp::PostIncrement => write!(f, "({}++)", operand),
                UnaryOp::PostDecrement => write!(f, "({}--)", operand),
            },
            ExprKind::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            ExprKind::Conditional {
                condition,
                then_expr,
                else_expr,
            } => write!(f, "({} ? {} : {})", condition, then_expr, else_expr),
            ExprKind::FieldAccess { object, field } => write!(f, "{}.{}", object, field),
            ExprKind::Index { collection, index } => write!(f, "{}[{}]", collection, index),
            ExprKind::Length(inner) => write!(f, "{}.length", inner),
            ExprKind::Count(inner) => write!(f, "{}.count", inner),
            ExprKind::Contains {
                collection,
                element,
            } => write!(f, "{}.contains({})", collection, element),
            ExprKind::NullCoalesce { value, fallback } => write!(f, "({} ?? {})", value, fallback),
            ExprKind::NullConditional { object, field } => write!(f, "{}?.{}", object, field),
            ExprKind::OptionSome(inner) => write!(f, "Some({})", inner),
            ExprKind::OptionNone => write!(f, "None"),
            ExprKind::ResultOk(inner) => write!(f, "Ok({})", inner),
            ExprKind::ResultErr(inner) => write!(f, "Err({})", inner),
            ExprKind::Call { function, args } => {
                write!(f, "{}(", function)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                write!(f, "{}.{}(", receiver, method)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            ExprKind::Quantifier {
                kind,
                binders,
                body,
            } => {
                let word = match kind {
                    QuantifierKind::Forall => "forall",
                    QuantifierKind::Exists => "exists",
                };
                write!(f, "({}", word)?;
                for binder in binders {
                    write!(f, " {}: {}", binder.name, binder.ty)?;
                }
                write!(f, ". {})", body)
            }
            ExprKind::Implies {
                antecedent,
                consequent,
            } => write!(f, "({} -> {})", antecedent, consequent),
            ExprKind::Record { fields } => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            ExprKind::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Replace free variables by expressions, capture-avoiding with respect
/// to quantifier binders
///
/// Shares unchanged subtrees with the input; used for `result = body`
/// relations and the renamings of induction steps.
pub fn substitute(expr: &ExprRef, map: &HashMap<String, ExprRef>) -> ExprRef {
    if map.is_empty() {
        return expr.clone();
    }
    match &expr.kind {
        ExprKind::Variable(name) => match map.get(name) {
            Some(replacement) => replacement.clone(),
            None => expr.clone(),
        },
        ExprKind::Quantifier {
            kind,
            binders,
            body,
        } => {
            let mut inner = map.clone();
            for binder in binders {
                inner.remove(&binder.name);
            }
            let new_body = substitute(body, &inner);
            if Arc::ptr_eq(&new_body, body) {
                expr.clone()
            } else {
                Expression::new(
                    ExprKind::Quantifier {
                        kind: *kind,
                        binders: binders.clone(),
                        body: new_body,
                    },
                    expr.span.clone(),
                )
            }
        }
        _ => {
            let mut changed = false;
            let mut rebuilt = expr.kind.clone();
            rebuild_kind_children(&mut rebuilt, &mut |child| {
                let replaced = substitute(child, map);
                if !Arc::ptr_eq(&replaced, child) {
                    changed = true;
                }
                replaced
            });
            if changed {
                Expression::new(rebuilt, expr.span.clone())
            } else {
                expr.clone()
            }
        }
    }
}

/// Apply a rewrite to every direct child slot of a kind, in place
fn rebuild_kind_children(kind: &mut ExprKind, rewrite: &mut impl FnMut(&ExprRef) -> ExprRef) {
    match kind {
        ExprKind::Unary { operand, .. } => *operand = rewrite(operand),
        ExprKind::Binary { left, right, .. } => {
            *left = rewrite(left);
            *right = rewrite(right);
        }
        ExprKind::Conditional {
            condition,
            then_expr,
            else_expr,
        } => {
            *condition = rewrite(condition);
            *then_expr = rewrite(then_expr);
            *else_expr = rewrite(else_expr);
        }
        ExprKind::FieldAccess { object, .. } | ExprKind::NullConditional { object, .. } => {
            *object = rewrite(object)
        }
        ExprKind::Index { collection, index } => {
            *collection = rewrite(collection);
            *index = rewrite(index);
        }
        ExprKind::Length(inner) | ExprKind::Count(inner) => *inner = rewrite(inner),
        ExprKind::Contains {
            collection,
            element,
        } => {
            *collection = rewrite(collection);
            *element = rewrite(element);
        }
        ExprKind::NullCoalesce { value, fallback } => {
            *value = rewrite(value);
            *fallback = rewrite(fallback);
        }
        ExprKind::OptionSome(inner) | ExprKind::ResultOk(inner) | ExprKind::ResultErr(inner) => {
            *inner = rewrite(inner)
        }
        ExprKind::Call { args, .. } => {
            for arg in args {
                *arg = rewrite(arg);
            }
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            *receiver = rewrite(receiver);
            for arg in args {
                *arg = rewrite(arg);
            }
        }
        ExprKind::Implies {
            antecedent,
            consequent,
        } => {
            *antecedent = rewrite(antecedent);
            *consequent = rewrite(consequent);
        }
        ExprKind::Record { fields } => {
            for (_, value) in fields {
                *value = rewrite(value);
            }
        }
        ExprKind::Tuple(items) => {
            for item in items {
                *item = rewrite(item);
            }
        }
        _ => {}
    }
}

/// A pattern in a match arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Wildcard,
    Literal(ExprRef),
    /// Binds the scrutinee to a fresh name
    Binding(String),
    Some(Box<Pattern>),
    None,
    Ok(Box<Pattern>),
    Err(Box<Pattern>),
    /// Enum variant with optional payload bindings
    Variant {
        name: String,
        bindings: Vec<String>,
    },
}

impl Pattern {
    /// Whether matching this pattern binds the scrutinee's inner value
    pub fn binds_inner_value(&self) -> bool {
        match self {
            Pattern::Some(inner) | Pattern::Ok(inner) => {
                matches!(**inner, Pattern::Binding(_) | Pattern::Wildcard)
            }
            Pattern::Variant { bindings, .. } => !bindings.is_empty(),
            _ => false,
        }
    }
}

/// One arm of a match statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<ExprRef>,
    pub body: Block,
}

/// One catch clause of a try statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    pub exception_type: Option<Type>,
    pub binding: Option<String>,
    pub body: Block,
}

/// An `else if` continuation of an if statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElseIf {
    pub condition: ExprRef,
    pub body: Block,
}

/// A sequence of statements
pub type Block = Vec<Statement>;

/// Statement node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StmtKind,
    pub span: Span,
}

impl Statement {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Variable declaration with optional initializer
    Bind {
        name: String,
        ty: Option<Type>,
        mutable: bool,
        initializer: Option<ExprRef>,
    },

    Assign {
        target: ExprRef,
        value: ExprRef,
    },

    CompoundAssign {
        target: ExprRef,
        op: BinaryOp,
        value: ExprRef,
    },

    /// Expression statement (a call evaluated for effect)
    Call(ExprRef),

    Return(Option<ExprRef>),

    If {
        condition: ExprRef,
        then_body: Block,
        else_ifs: Vec<ElseIf>,
        else_body: Option<Block>,
    },

    While {
        condition: ExprRef,
        body: Block,
    },

    DoWhile {
        body: Block,
        condition: ExprRef,
    },

    /// Numeric range loop with step
    For {
        variable: String,
        start: ExprRef,
        end: ExprRef,
        step: Option<ExprRef>,
        body: Block,
    },

    ForEach {
        variable: String,
        iterable: ExprRef,
        body: Block,
    },

    Break,
    Continue,

    Try {
        body: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },

    Throw(ExprRef),
    Rethrow,

    Match {
        scrutinee: ExprRef,
        arms: Vec<MatchArm>,
    },

    /// Scoped resource acquisition
    Using {
        binding: String,
        resource: ExprRef,
        body: Block,
    },

    YieldReturn(ExprRef),
    YieldBreak,

    Print(Vec<ExprRef>),

    /// Verbatim passthrough for the emitter; opaque here
    Raw(String),
}

/// Parameter passing modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamModifier {
    ByValue,
    ByRef,
    ByOut,
    ByIn,
    Variadic,
}

/// A formal parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub modifier: ParamModifier,
    pub default: Option<ExprRef>,
    pub span: Span,
}

impl Parameter {
    pub fn by_value(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            modifier: ParamModifier::ByValue,
            default: None,
            span: Span::unknown(),
        }
    }
}

/// Declaration visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

/// A generic type parameter with constraint names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeParameter {
    pub name: String,
    pub constraints: Vec<String>,
}

/// A single contract clause with an optional failure message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractClause {
    pub expression: ExprRef,
    pub message: Option<String>,
    pub span: Span,
}

impl ContractClause {
    pub fn new(expression: ExprRef) -> Self {
        let span = expression.span.clone();
        Self {
            expression,
            message: None,
            span,
        }
    }
}

/// A free function or a class method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub id: NodeId,
    pub visibility: Visibility,
    pub type_params: Vec<TypeParameter>,
    pub params: Vec<Parameter>,
    pub output: Type,
    pub effects: Vec<String>,
    pub preconditions: Vec<ContractClause>,
    pub postconditions: Vec<ContractClause>,
    pub body: Block,
    pub is_async: bool,
    pub span: Span,
}

impl Function {
    /// Whether the function produces no value (`result` is out of scope)
    pub fn is_void(&self) -> bool {
        self.output == Type::Void
    }

    /// Whether any contract clause is attached
    pub fn has_contracts(&self) -> bool {
        !self.preconditions.is_empty() || !self.postconditions.is_empty()
    }

    /// Parameter types in declaration order, for signature matching
    pub fn parameter_types(&self) -> Vec<&Type> {
        self.params.iter().map(|p| &p.ty).collect()
    }
}

/// An interface method signature; interfaces carry no bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    pub id: NodeId,
    pub params: Vec<Parameter>,
    pub output: Type,
    pub preconditions: Vec<ContractClause>,
    pub postconditions: Vec<ContractClause>,
    pub span: Span,
}

impl MethodSignature {
    pub fn has_contracts(&self) -> bool {
        !self.preconditions.is_empty() || !self.postconditions.is_empty()
    }

    pub fn parameter_types(&self) -> Vec<&Type> {
        self.params.iter().map(|p| &p.ty).collect()
    }
}

/// An interface declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub id: NodeId,
    pub type_params: Vec<TypeParameter>,
    pub methods: Vec<MethodSignature>,
    pub span: Span,
}

/// A class field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub visibility: Visibility,
    pub initializer: Option<ExprRef>,
    pub span: Span,
}

/// Property accessor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessorKind {
    Get,
    Set,
    Init,
}

/// A property accessor with optional preconditions on its body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub preconditions: Vec<ContractClause>,
    pub body: Option<Block>,
    pub span: Span,
}

/// A class property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub ty: Type,
    pub accessors: Vec<Accessor>,
    pub span: Span,
}

/// Constructor initializer invocation (`this(...)` or `base(...)`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitializerCall {
    This(Vec<ExprRef>),
    Base(Vec<ExprRef>),
}

/// A class constructor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constructor {
    pub params: Vec<Parameter>,
    pub preconditions: Vec<ContractClause>,
    pub initializer: Option<InitializerCall>,
    pub body: Block,
    pub span: Span,
}

/// A class declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub id: NodeId,
    pub type_params: Vec<TypeParameter>,
    pub base: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Field>,
    pub properties: Vec<Property>,
    pub constructors: Vec<Constructor>,
    pub methods: Vec<Function>,
    pub span: Span,
}

impl Class {
    /// The implementing method matching an interface signature, by
    /// position-wise identical parameter types
    pub fn find_implementation(&self, signature: &MethodSignature) -> Option<&Function> {
        self.methods.iter().find(|m| {
            m.name == signature.name && m.parameter_types() == signature.parameter_types()
        })
    }
}

/// A variant of an enum declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumVariantDecl {
    pub name: String,
    pub payload: Option<Type>,
    pub span: Span,
}

/// An enum declaration with optional extension methods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub id: NodeId,
    pub variants: Vec<EnumVariantDecl>,
    pub extension_methods: Vec<Function>,
    pub span: Span,
}

/// A delegate (named function type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegate {
    pub name: String,
    pub id: NodeId,
    pub params: Vec<Parameter>,
    pub output: Type,
    pub span: Span,
}

/// A module-visible constant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub ty: Type,
    pub value: ExprRef,
    pub span: Span,
}

/// An import declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
}

/// A fully resolved module, the unit of verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub id: NodeId,
    pub imports: Vec<Import>,
    pub interfaces: Vec<Interface>,
    pub classes: Vec<Class>,
    pub enums: Vec<EnumDecl>,
    pub delegates: Vec<Delegate>,
    pub functions: Vec<Function>,
    pub constants: Vec<Constant>,
    pub invariants: Vec<ContractClause>,
    pub span: Span,
}

impl Module {
    /// A named, empty module for construction by the front end and tests
    pub fn new(name: impl Into<String>, id: NodeId) -> Self {
        Self {
            name: name.into(),
            id,
            imports: Vec::new(),
            interfaces: Vec::new(),
            classes: Vec::new(),
            enums: Vec::new(),
            delegates: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
            invariants: Vec::new(),
            span: Span::unknown(),
        }
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }

    pub fn constant_names(&self) -> HashSet<String> {
        self.constants.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::unknown()
    }

    #[test]
    fn test_expression_display() {
        let expr = Expression::binary(
            BinaryOp::Gt,
            Expression::variable("x", span()),
            Expression::int32(0, span()),
            span(),
        );
        assert_eq!(expr.to_string(), "(x > 0)");
    }

    #[test]
    fn test_free_variables_respect_binders() {
        // forall i: i32. arr[i] > x  -- free: arr, x
        let body = Expression::binary(
            BinaryOp::Gt,
            Expression::new(
                ExprKind::Index {
                    collection: Expression::variable("arr", span()),
                    index: Expression::variable("i", span()),
                },
                span(),
            ),
            Expression::variable("x", span()),
            span(),
        );
        let quantified = Expression::new(
            ExprKind::Quantifier {
                kind: QuantifierKind::Forall,
                binders: vec![QuantifierBinder {
                    name: "i".to_string(),
                    ty: Type::I32,
                }],
                body,
            },
            span(),
        );

        let free = quantified.free_variables();
        assert!(free.contains("arr"));
        assert!(free.contains("x"));
        assert!(!free.contains("i"));
    }

    #[test]
    fn test_commutative_operators() {
        assert!(BinaryOp::Add.is_commutative());
        assert!(BinaryOp::Eq.is_commutative());
        assert!(!BinaryOp::Sub.is_commutative());
        assert!(!BinaryOp::Lt.is_commutative());
        assert!(!BinaryOp::Shl.is_commutative());
    }

    #[test]
    fn test_pattern_binds_inner() {
        let some_binding = Pattern::Some(Box::new(Pattern::Binding("v".to_string())));
        assert!(some_binding.binds_inner_value());
        assert!(!Pattern::Wildcard.binds_inner_value());
        assert!(!Pattern::None.binds_inner_value());
    }

    #[test]
    fn test_find_implementation_matches_parameter_vector() {
        let sig = MethodSignature {
            name: "f".to_string(),
            id: 1,
            params: vec![Parameter::by_value("x", Type::I32)],
            output: Type::I32,
            preconditions: vec![],
            postconditions: vec![],
            span: span(),
        };
        let matching = Function {
            name: "f".to_string(),
            id: 2,
            visibility: Visibility::Public,
            type_params: vec![],
            params: vec![Parameter::by_value("x", Type::I32)],
            output: Type::I32,
            effects: vec![],
            preconditions: vec![],
            postconditions: vec![],
            body: vec![],
            is_async: false,
            span: span(),
        };
        let mut mismatched = matching.clone();
        mismatched.params[0].ty = Type::int(IntWidth::W64, true);

        let mut class = Class {
            name: "C".to_string(),
            id: 3,
            type_params: vec![],
            base: None,
            interfaces: vec!["I".to_string()],
            fields: vec![],
            properties: vec![],
            constructors: vec![],
            methods: vec![mismatched],
            span: span(),
        };
        assert!(class.find_implementation(&sig).is_none());

        class.methods.push(matching);
        assert!(class.find_implementation(&sig).is_some());
    }

    #[test]
    fn test_substitute_respects_binders() {
        // Substituting i in (forall i. i > x) must only touch x.
        let body = Expression::binary(
            BinaryOp::Gt,
            Expression::variable("i", span()),
            Expression::variable("x", span()),
            span(),
        );
        let quantified = Expression::new(
            ExprKind::Quantifier {
                kind: QuantifierKind::Forall,
                binders: vec![QuantifierBinder {
                    name: "i".to_string(),
                    ty: Type::I32,
                }],
                body,
            },
            span(),
        );
        let mut map = HashMap::new();
        map.insert("i".to_string(), Expression::int32(7, span()));
        map.insert("x".to_string(), Expression::int32(9, span()));
        let result = substitute(&quantified, &map);

        let free = result.free_variables();
        assert!(free.is_empty());
        assert_eq!(result.to_string(), "(forall i: i32. (i > 9))");
    }

    #[test]
    fn test_substitute_shares_unchanged_nodes() {
        let expr = Expression::binary(
            BinaryOp::Add,
            Expression::variable("a", span()),
            Expression::variable("b", span()),
            span(),
        );
        let map = HashMap::new();
        let same = substitute(&expr, &map);
        assert!(Arc::ptr_eq(&expr, &same));
    }

    #[test]
    fn test_size_counts_nodes() {
        let expr = Expression::binary(
            BinaryOp::Add,
            Expression::variable("a", span()),
            Expression::variable("b", span()),
            span(),
        );
        assert_eq!(expr.size(), 3);
    }
}
