//! AST-walking evaluator that renders a Program against a Context

use thiserror::Error;

use crate::context::Context;
use crate::parser::ast::{
    BinaryOp, Expr, Program, Span, Spanned, Statement, UnaryOp,
};
use crate::value::Value;

/// Failure during rendering, scoped to the single execution that
/// produced it
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown identifier '{name}' at {span:?}")]
    UnknownIdentifier { name: String, span: Span },

    #[error("'{name}' is not callable (found {type_name}) at {span:?}")]
    NotCallable {
        name: String,
        type_name: &'static str,
        span: Span,
    },

    #[error("helper '{name}' failed: {message}")]
    Helper {
        name: String,
        message: String,
        span: Span,
    },

    #[error("type error at {span:?}: {message}")]
    Type { message: String, span: Span },

    #[error("cannot iterate over {type_name} at {span:?}")]
    NotIterable {
        type_name: &'static str,
        span: Span,
    },
}

/// One rendering pass over a shared Program.
///
/// The compiler borrows the Program for the duration of the call and
/// never mutates it; the output string is built up statement by
/// statement. Block bodies run in child scopes, so loop variables and
/// `let` bindings never leak outward.
pub struct Compiler<'p> {
    program: &'p Program,
}

impl<'p> Compiler<'p> {
    pub fn new(program: &'p Program) -> Self {
        Compiler { program }
    }

    /// Render the program, writing into a fresh output buffer
    pub fn compile(&self, ctx: &mut Context<'_>) -> Result<String, EvalError> {
        let mut out = String::new();
        self.eval_statements(&self.program.statements, ctx, &mut out)?;
        Ok(out)
    }

    fn eval_statements(
        &self,
        statements: &[Spanned<Statement>],
        ctx: &mut Context<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        for statement in statements {
            self.eval_statement(statement, ctx, out)?;
        }
        Ok(())
    }

    fn eval_statement(
        &self,
        statement: &Spanned<Statement>,
        ctx: &mut Context<'_>,
        out: &mut String,
    ) -> Result<(), EvalError> {
        match &statement.node {
            Statement::Text(text) => out.push_str(text),
            Statement::Output(expr) => {
                let value = self.eval_expr(expr, ctx)?;
                out.push_str(&value.to_string());
            }
            Statement::Expression(expr) => {
                self.eval_expr(expr, ctx)?;
            }
            Statement::Let { name, value } | Statement::Assign { name, value } => {
                let value = self.eval_expr(value, ctx)?;
                ctx.set(name.node.as_str(), value);
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let branch = if self.eval_expr(condition, ctx)?.is_truthy() {
                    Some(then_branch)
                } else {
                    else_branch.as_ref()
                };
                if let Some(branch) = branch {
                    let mut scope = ctx.child();
                    self.eval_statements(branch, &mut scope, out)?;
                }
            }
            Statement::For {
                key,
                value,
                iterable,
                body,
            } => {
                let entries = self.eval_iterable(iterable, ctx)?;
                for (entry_key, entry_value) in entries {
                    let mut scope = ctx.child();
                    if let Some(key) = key {
                        scope.set(key.node.as_str(), entry_key);
                    }
                    scope.set(value.node.as_str(), entry_value);
                    self.eval_statements(body, &mut scope, out)?;
                }
            }
        }
        Ok(())
    }

    /// Expand an iterable expression into (key, value) pairs: index/item
    /// for arrays and ranges, sorted key/value for hashes.
    fn eval_iterable(
        &self,
        expr: &Spanned<Expr>,
        ctx: &Context<'_>,
    ) -> Result<Vec<(Value, Value)>, EvalError> {
        let value = self.eval_expr(expr, ctx)?;
        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i as i64), item))
                .collect()),
            Value::Hash(map) => {
                let mut keys: Vec<_> = map.keys().cloned().collect();
                keys.sort();
                Ok(keys
                    .into_iter()
                    .map(|k| {
                        let v = map[&k].clone();
                        (Value::String(k), v)
                    })
                    .collect())
            }
            other => Err(EvalError::NotIterable {
                type_name: other.type_name(),
                span: expr.span.clone(),
            }),
        }
    }

    fn eval_expr(&self, expr: &Spanned<Expr>, ctx: &Context<'_>) -> Result<Value, EvalError> {
        match &expr.node {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(n) => Ok(Value::Float(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item, ctx)?);
                }
                Ok(Value::Array(values))
            }
            Expr::Range { start, end } => {
                let start_value = self.int_operand(start, ctx, "range start")?;
                let end_value = self.int_operand(end, ctx, "range end")?;
                let items = (start_value..end_value).map(Value::Int).collect();
                Ok(Value::Array(items))
            }
            Expr::Ident(name) => match ctx.get(name.as_str()) {
                Some(value) => Ok(value.clone()),
                None => Err(EvalError::UnknownIdentifier {
                    name: name.as_str().to_string(),
                    span: expr.span.clone(),
                }),
            },
            Expr::Field { object, field } => {
                let object_value = self.eval_expr(object, ctx)?;
                match object_value {
                    // Missing keys resolve to nil so optional data renders empty
                    Value::Hash(map) => {
                        Ok(map.get(field.node.as_str()).cloned().unwrap_or(Value::Nil))
                    }
                    other => Err(EvalError::Type {
                        message: format!(
                            "cannot access field '{}' on {}",
                            field.node,
                            other.type_name()
                        ),
                        span: field.span.clone(),
                    }),
                }
            }
            Expr::Index { object, index } => {
                let object_value = self.eval_expr(object, ctx)?;
                let index_value = self.eval_expr(index, ctx)?;
                match (object_value, index_value) {
                    (Value::Array(items), Value::Int(i)) => {
                        if i < 0 || i as usize >= items.len() {
                            Err(EvalError::Type {
                                message: format!(
                                    "index {} out of range for array of length {}",
                                    i,
                                    items.len()
                                ),
                                span: index.span.clone(),
                            })
                        } else {
                            Ok(items[i as usize].clone())
                        }
                    }
                    (Value::Hash(map), Value::String(key)) => {
                        Ok(map.get(&key).cloned().unwrap_or(Value::Nil))
                    }
                    (object_value, index_value) => Err(EvalError::Type {
                        message: format!(
                            "cannot index {} with {}",
                            object_value.type_name(),
                            index_value.type_name()
                        ),
                        span: index.span.clone(),
                    }),
                }
            }
            Expr::Call { callee, args } => self.eval_call(callee, args, ctx),
            Expr::Unary { op, operand } => {
                let value = self.eval_expr(operand, ctx)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Int(n)) => {
                        n.checked_neg().map(Value::Int).ok_or_else(|| EvalError::Type {
                            message: "integer overflow".to_string(),
                            span: operand.span.clone(),
                        })
                    }
                    (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
                    (UnaryOp::Neg, value) => Err(EvalError::Type {
                        message: format!("cannot negate {}", value.type_name()),
                        span: operand.span.clone(),
                    }),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, ctx, &expr.span),
        }
    }

    fn eval_call(
        &self,
        callee: &Spanned<Expr>,
        args: &[Spanned<Expr>],
        ctx: &Context<'_>,
    ) -> Result<Value, EvalError> {
        let name = callee_name(callee);
        let callee_value = self.eval_expr(callee, ctx)?;
        let helper = match callee_value {
            Value::Helper(helper) => helper,
            other => {
                return Err(EvalError::NotCallable {
                    name,
                    type_name: other.type_name(),
                    span: callee.span.clone(),
                })
            }
        };

        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            arg_values.push(self.eval_expr(arg, ctx)?);
        }

        helper.call(&arg_values).map_err(|message| EvalError::Helper {
            name,
            message,
            span: callee.span.clone(),
        })
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Spanned<Expr>,
        rhs: &Spanned<Expr>,
        ctx: &Context<'_>,
        span: &Span,
    ) -> Result<Value, EvalError> {
        // Short-circuiting forms first
        match op {
            BinaryOp::And => {
                let lhs_value = self.eval_expr(lhs, ctx)?;
                if !lhs_value.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval_expr(rhs, ctx)?.is_truthy()));
            }
            BinaryOp::Or => {
                let lhs_value = self.eval_expr(lhs, ctx)?;
                if lhs_value.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval_expr(rhs, ctx)?.is_truthy()));
            }
            _ => {}
        }

        let left = self.eval_expr(lhs, ctx)?;
        let right = self.eval_expr(rhs, ctx)?;

        let type_error = |message: String| EvalError::Type {
            message,
            span: span.clone(),
        };

        match op {
            BinaryOp::Add => match (&left, &right) {
                // A string on the left concatenates the display form of
                // the right side
                (Value::String(a), b) => Ok(Value::String(format!("{}{}", a, b))),
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(*b)
                    .map(Value::Int)
                    .ok_or_else(|| type_error("integer overflow".to_string())),
                _ => numeric_op(&left, &right, |a, b| a + b).ok_or_else(|| {
                    type_error(format!(
                        "cannot add {} and {}",
                        left.type_name(),
                        right.type_name()
                    ))
                }),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Rem => {
                // Checked forms so overflow (and i64::MIN % -1) comes
                // back as an error instead of aborting the render
                let int_op: fn(i64, i64) -> Option<i64> = match op {
                    BinaryOp::Sub => i64::checked_sub,
                    BinaryOp::Mul => i64::checked_mul,
                    _ => i64::checked_rem,
                };
                let float_op: fn(f64, f64) -> f64 = match op {
                    BinaryOp::Sub => |a, b| a - b,
                    BinaryOp::Mul => |a, b| a * b,
                    _ => |a, b| a % b,
                };
                if matches!(op, BinaryOp::Rem) && matches!(right, Value::Int(0)) {
                    return Err(type_error("remainder by zero".to_string()));
                }
                match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
                        .map(Value::Int)
                        .ok_or_else(|| type_error("integer overflow".to_string())),
                    _ => numeric_op(&left, &right, float_op).ok_or_else(|| {
                        type_error(format!(
                            "cannot apply '{}' to {} and {}",
                            op.symbol(),
                            left.type_name(),
                            right.type_name()
                        ))
                    }),
                }
            }
            BinaryOp::Div => match (&left, &right) {
                (Value::Int(_), Value::Int(0)) => {
                    Err(type_error("division by zero".to_string()))
                }
                // checked_div also rejects i64::MIN / -1
                (Value::Int(a), Value::Int(b)) => a
                    .checked_div(*b)
                    .map(Value::Int)
                    .ok_or_else(|| type_error("integer overflow".to_string())),
                _ => numeric_op(&left, &right, |a, b| a / b).ok_or_else(|| {
                    type_error(format!(
                        "cannot divide {} by {}",
                        left.type_name(),
                        right.type_name()
                    ))
                }),
            },
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::NotEq => Ok(Value::Bool(left != right)),
            BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
                let ordering = compare(&left, &right).ok_or_else(|| {
                    type_error(format!(
                        "cannot compare {} and {}",
                        left.type_name(),
                        right.type_name()
                    ))
                })?;
                let result = match op {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::LessEq => ordering.is_le(),
                    BinaryOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Bool(result))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn int_operand(
        &self,
        expr: &Spanned<Expr>,
        ctx: &Context<'_>,
        what: &str,
    ) -> Result<i64, EvalError> {
        match self.eval_expr(expr, ctx)? {
            Value::Int(n) => Ok(n),
            other => Err(EvalError::Type {
                message: format!("{} must be an int, got {}", what, other.type_name()),
                span: expr.span.clone(),
            }),
        }
    }
}

/// Apply a float operation when both operands are numeric
fn numeric_op(left: &Value, right: &Value, f: impl Fn(f64, f64) -> f64) -> Option<Value> {
    let a = as_f64(left)?;
    let b = as_f64(right)?;
    Some(Value::Float(f(a, b)))
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(n) => Some(*n),
        _ => None,
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            let a = as_f64(left)?;
            let b = as_f64(right)?;
            a.partial_cmp(&b)
        }
    }
}

/// Human-readable name of a call target for error messages
fn callee_name(callee: &Spanned<Expr>) -> String {
    match &callee.node {
        Expr::Ident(name) => name.as_str().to_string(),
        Expr::Field { field, .. } => field.node.as_str().to_string(),
        _ => "<expression>".to_string(),
    }
}
