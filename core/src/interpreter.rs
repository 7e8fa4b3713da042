//! The tree-walking evaluator (§4). Evaluation is written as `async fn`
//! over `SharedCore = Rc<RefCell<Core>>` rather than `&mut self`: an
//! asynchronous external-value read (§4.8) must suspend mid-expression and
//! resume later from [`Interpreter::handle_response`], which means the
//! in-flight evaluation has to be stored as a boxed, `'static` future. A
//! `&mut self`-borrowing future can't be stored back into the struct it
//! borrows from, so the struct itself is shared through `Rc<RefCell<_>>`
//! and every recursive call takes a clone of the handle instead of a
//! borrow. Every `.borrow()`/`.borrow_mut()` is scoped tightly and never
//! held across an `.await` or a recursive call.

use crate::ast::{NodeId, NodeKind, NodeValue, Tree};
use crate::builtins;
use crate::codec;
use crate::command::{Command, CommandSink};
use crate::consts::{COMPONENT_NAME, INTERPRETER_VERSION};
use crate::error::{ConfigurationError, DecodeError, InternalError, RecoverableError, RuntimeError};
use crate::exec_stack::{ExecutionControlStack, ScopeKind, StopReason};
use crate::options::{ExternalValueMode, InterpreterOptions};
use crate::provider::{AsyncState, ExternalResponseOutcome, SyncProvider};
use crate::registry::Registry;
use crate::scope::ScopeStack;
use crate::value::Value;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// Shared, interior-mutable interpreter state. See module docs for why this
/// isn't a plain owned struct.
pub struct Core {
    pub(crate) tree: Tree,
    pub(crate) registry: Registry,
    pub(crate) scopes: ScopeStack,
    pub(crate) exec: ExecutionControlStack,
    pub(crate) sink: Rc<CommandSink>,
    pub(crate) options: InterpreterOptions,
    pub(crate) sync_provider: Option<Box<dyn SyncProvider>>,
    pub(crate) async_state: AsyncState,
    pub(crate) clock_ms: u64,
    pub(crate) destroyed: bool,
    pub(crate) pending_return: Option<Value>,
    pub(crate) statements_executed: u64,
    pub(crate) had_error: bool,
    pub(crate) terminated_by_iteration_limit: bool,
}

pub type SharedCore = Rc<RefCell<Core>>;

impl Core {
    pub fn now_ms(core: &SharedCore) -> u64 {
        core.borrow().clock_ms
    }

    pub fn advance_clock(core: &SharedCore, delta_ms: u64) {
        core.borrow_mut().clock_ms += delta_ms;
    }

    pub fn emit(core: &SharedCore, command: Command) {
        let sink = core.borrow().sink.clone();
        let _ = sink.emit(command);
    }

    pub fn emit_error(core: &SharedCore, error: RecoverableError) {
        core.borrow_mut().had_error = true;
        log::warn!("{}: {}", error.error_type(), error);
        let timestamp = Self::now_ms(core);
        Self::emit(
            core,
            Command::Error {
                timestamp,
                error_type: error.error_type().to_string(),
                message: error.to_string(),
            },
        );
    }
}

/// A future that polls the shared async state for the answer to one
/// external-value request. `Unpin` since it holds no self-references;
/// [`resolve_external`] awaits it directly inside a boxed outer future.
struct ExternalValueFuture {
    core: SharedCore,
    request_id: u64,
}

impl Future for ExternalValueFuture {
    type Output = ExternalResponseOutcome;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut core = self.core.borrow_mut();
        core.async_state.expire_into_resolved();
        match core.async_state.take_resolved(self.request_id) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

/// Resolve one external value (`digitalRead`, `millis`, a library call,
/// etc.), either directly against the configured [`SyncProvider`] or by
/// issuing a request command and suspending until
/// [`Interpreter::handle_response`] delivers an answer (§4.8). On failure —
/// no provider configured, or a timed-out/error response — emits `ERROR`
/// and yields [`Value::Null`], matching the spec's recoverable-error
/// policy (§7) rather than aborting the sketch.
pub(crate) async fn resolve_external<S, R>(
    core: SharedCore,
    function: &'static str,
    sync_call: S,
    make_request: R,
) -> Value
where
    S: FnOnce(&mut dyn SyncProvider) -> Value,
    R: FnOnce(u64, u64) -> Command,
{
    let mode = core.borrow().options.external_value_mode;
    match mode {
        ExternalValueMode::Sync => {
            let has_provider = core.borrow().sync_provider.is_some();
            if !has_provider {
                let err = RecoverableError::from(ConfigurationError::NoProvider { function });
                Core::emit_error(&core, err);
                return Value::Null;
            }
            // Sync mode still emits the `*_REQUEST` command before calling
            // the provider, so sync and async runs produce identical
            // request sequences for the same responses (§4.8 parity).
            let (request_id, timestamp) = {
                let mut core_mut = core.borrow_mut();
                let entry = core_mut.async_state.begin(function, 0);
                core_mut.async_state.resolve(entry.request_id);
                (entry.request_id, core_mut.clock_ms)
            };
            Core::emit(&core, make_request(timestamp, request_id));
            let mut core_mut = core.borrow_mut();
            let provider = core_mut.sync_provider.as_deref_mut().unwrap();
            sync_call(provider)
        }
        ExternalValueMode::Async => {
            let (request_id, timestamp) = {
                let mut core_mut = core.borrow_mut();
                let timeout_ms = core_mut.options.external_value_timeout_ms;
                let entry = core_mut.async_state.begin(function, timeout_ms);
                (entry.request_id, core_mut.clock_ms)
            };
            Core::emit(&core, make_request(timestamp, request_id));
            let outcome = ExternalValueFuture {
                core: core.clone(),
                request_id,
            }
            .await;
            match outcome {
                ExternalResponseOutcome::Value(v) => v,
                ExternalResponseOutcome::Error(message) => {
                    Core::emit_error(&core, RecoverableError::from(InternalError(message)));
                    Value::Null
                }
                ExternalResponseOutcome::TimedOut => {
                    Core::emit_error(
                        &core,
                        RecoverableError::from(ConfigurationError::ResponseTimeout { function }),
                    );
                    Value::Null
                }
            }
        }
    }
}

fn node_type_name(tree: &Tree, id: NodeId) -> String {
    tree.value_str(id).unwrap_or("").to_string()
}

/// Evaluate an expression node to a [`Value`]. Recursive calls are boxed so
/// the future's size doesn't blow up with AST depth.
pub(crate) fn eval_expr(core: SharedCore, id: NodeId) -> Pin<Box<dyn Future<Output = Value>>> {
    Box::pin(async move {
        let kind = core.borrow().tree.kind(id);
        log::trace!("eval node {}: {:?}", id, kind);
        match kind {
            NodeKind::NumberLiteral => {
                let v = core.borrow().tree.node(id).value.clone();
                match v {
                    Some(NodeValue::Int(n)) => Value::I32(n),
                    _ => Value::I32(0),
                }
            }
            NodeKind::UnsignedLiteral => {
                let v = core.borrow().tree.node(id).value.clone();
                match v {
                    Some(NodeValue::UInt(n)) => Value::U32(n),
                    _ => Value::U32(0),
                }
            }
            NodeKind::FloatLiteral => {
                let v = core.borrow().tree.node(id).value.clone();
                match v {
                    Some(NodeValue::Float(f)) => Value::F64(f),
                    _ => Value::F64(0.0),
                }
            }
            NodeKind::BoolLiteral => {
                let v = core.borrow().tree.node(id).value.clone();
                match v {
                    Some(NodeValue::Bool(b)) => Value::Bool(b),
                    _ => Value::Bool(false),
                }
            }
            NodeKind::StringLiteral => {
                let v = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                Value::Str(v)
            }
            NodeKind::CharLiteral => {
                let s = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                Value::I32(s.chars().next().map(|c| c as i32).unwrap_or(0))
            }
            NodeKind::NullLiteral => Value::Null,
            NodeKind::Identifier => {
                let name = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                let found = core.borrow().scopes.get(&name).map(|v| v.value.clone());
                match found {
                    Some(v) => v,
                    None => {
                        Core::emit_error(&core, RuntimeError::UndefinedVariable.into());
                        Value::Null
                    }
                }
            }
            NodeKind::BinaryOp => {
                let (left_id, right_id) = core.borrow().tree.binary_op_operands(id);
                let op = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                eval_binary_op(core.clone(), &op, left_id, right_id).await
            }
            NodeKind::UnaryOp => {
                let operand_id = core.borrow().tree.unary_operand(id);
                let op = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                let v = eval_expr(core.clone(), operand_id).await;
                eval_unary_op(&op, v)
            }
            NodeKind::Postfix => {
                let operand_id = core.borrow().tree.unary_operand(id);
                let op = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                eval_postfix(core.clone(), &op, operand_id).await
            }
            NodeKind::Assignment => {
                let (target_id, value_id) = core.borrow().tree.assignment_parts(id);
                let value = eval_expr(core.clone(), value_id).await;
                assign_to(core.clone(), target_id, value.clone()).await;
                value
            }
            NodeKind::CompoundAssignment => {
                let (target_id, value_id) = core.borrow().tree.assignment_parts(id);
                let op = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                let base = eval_expr(core.clone(), target_id).await;
                let rhs = eval_expr(core.clone(), value_id).await;
                let base_op = op.trim_end_matches('=').to_string();
                let result = if is_zero_divisor(&base_op, &base, &rhs) {
                    Core::emit_error(&core, RuntimeError::DivideByZero.into());
                    Value::Null
                } else {
                    eval_binary_values(&base_op, base, rhs)
                };
                assign_to(core.clone(), target_id, result.clone()).await;
                result
            }
            NodeKind::Ternary => {
                let (cond_id, then_id, else_id) = core.borrow().tree.ternary_parts(id);
                let cond = eval_expr(core.clone(), cond_id).await;
                if cond.is_truthy() {
                    eval_expr(core.clone(), then_id).await
                } else {
                    eval_expr(core.clone(), else_id).await
                }
            }
            NodeKind::ArrayLiteral => {
                let children = core.borrow().tree.children(id).to_vec();
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    values.push(eval_expr(core.clone(), child).await);
                }
                build_array_literal(values)
            }
            NodeKind::ArrayAccess => {
                let (array_id, index_id) = core.borrow().tree.array_access_parts(id);
                let array = eval_expr(core.clone(), array_id).await;
                let index = eval_expr(core.clone(), index_id).await.to_i32();
                index_array(&core, array, index)
            }
            NodeKind::MemberAccess => {
                let (object_id, field_id) = core.borrow().tree.member_access_parts(id);
                let field_name = core.borrow().tree.value_str(field_id).unwrap_or("").to_string();
                let object = eval_expr(core.clone(), object_id).await;
                read_struct_field(&core, object, &field_name)
            }
            NodeKind::AddressOf => {
                let operand_id = core.borrow().tree.unary_operand(id);
                let name = core.borrow().tree.value_str(operand_id).unwrap_or("").to_string();
                let pointer_id = core.borrow_mut().registry.next_pointer_id();
                Value::Pointer(crate::value::PointerValue {
                    target_variable: name,
                    offset: 0,
                    pointer_id,
                })
            }
            NodeKind::Dereference => {
                let operand_id = core.borrow().tree.unary_operand(id);
                let pointer = eval_expr(core.clone(), operand_id).await;
                deref_pointer(&core, pointer)
            }
            NodeKind::CastExpression => {
                let operand_id = core.borrow().tree.cast_operand(id);
                let type_name = core.borrow().tree.value_str(id).unwrap_or("").to_string();
                let value = eval_expr(core.clone(), operand_id).await;
                cast_value(&type_name, value)
            }
            NodeKind::FuncCall => eval_func_call(core.clone(), id).await,
            _ => {
                Core::emit_error(
                    &core,
                    InternalError(format!("node kind {:?} is not an expression", kind)).into(),
                );
                Value::Null
            }
        }
    })
}

async fn eval_binary_op(core: SharedCore, op: &str, left_id: NodeId, right_id: NodeId) -> Value {
    // Short-circuit logical operators must not evaluate the right operand
    // unless needed (§4.4).
    if op == "&&" {
        let left = eval_expr(core.clone(), left_id).await;
        if !left.is_truthy() {
            return Value::Bool(false);
        }
        return Value::Bool(eval_expr(core.clone(), right_id).await.is_truthy());
    }
    if op == "||" {
        let left = eval_expr(core.clone(), left_id).await;
        if left.is_truthy() {
            return Value::Bool(true);
        }
        return Value::Bool(eval_expr(core.clone(), right_id).await.is_truthy());
    }
    let left = eval_expr(core.clone(), left_id).await;
    let right = eval_expr(core.clone(), right_id).await;
    if is_zero_divisor(op, &left, &right) {
        Core::emit_error(&core, RuntimeError::DivideByZero.into());
        return Value::Null;
    }
    eval_binary_values(op, left, right)
}

/// Integer and unsigned division/modulo by zero are runtime errors (§4.4);
/// float division by zero is not, since it produces `inf`/`NaN` instead.
fn is_zero_divisor(op: &str, left: &Value, right: &Value) -> bool {
    if op != "/" && op != "%" {
        return false;
    }
    if left.is_float() || right.is_float() {
        return false;
    }
    if left.is_unsigned() || right.is_unsigned() {
        right.to_u32() == 0
    } else {
        right.to_i32() == 0
    }
}

/// Numeric coercion for binary arithmetic/comparison (§4.4): either operand
/// being `F64` promotes the whole operation to floating point; otherwise
/// either operand being `U32` promotes to unsigned; otherwise `I32`.
fn eval_binary_values(op: &str, left: Value, right: Value) -> Value {
    match op {
        "==" => return Value::Bool(values_equal(&left, &right)),
        "!=" => return Value::Bool(!values_equal(&left, &right)),
        _ => {}
    }
    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        if op == "+" {
            return Value::Str(format!("{}{}", left.display_string(), right.display_string()));
        }
    }
    if left.is_float() || right.is_float() {
        let (l, r) = (left.to_f64(), right.to_f64());
        return match op {
            "+" => Value::F64(l + r),
            "-" => Value::F64(l - r),
            "*" => Value::F64(l * r),
            "/" => Value::F64(l / r),
            "<" => Value::Bool(l < r),
            "<=" => Value::Bool(l <= r),
            ">" => Value::Bool(l > r),
            ">=" => Value::Bool(l >= r),
            _ => Value::Null,
        };
    }
    if left.is_unsigned() || right.is_unsigned() {
        let (l, r) = (left.to_u32(), right.to_u32());
        return match op {
            "+" => Value::U32(l.wrapping_add(r)),
            "-" => Value::U32(l.wrapping_sub(r)),
            "*" => Value::U32(l.wrapping_mul(r)),
            "/" => Value::U32(l / r),
            "%" => Value::U32(l % r),
            "&" => Value::U32(l & r),
            "|" => Value::U32(l | r),
            "^" => Value::U32(l ^ r),
            "<<" => Value::U32(l.wrapping_shl(r)),
            ">>" => Value::U32(l.wrapping_shr(r)),
            "<" => Value::Bool(l < r),
            "<=" => Value::Bool(l <= r),
            ">" => Value::Bool(l > r),
            ">=" => Value::Bool(l >= r),
            _ => Value::Null,
        };
    }
    let (l, r) = (left.to_i32(), right.to_i32());
    match op {
        "+" => Value::I32(l.wrapping_add(r)),
        "-" => Value::I32(l.wrapping_sub(r)),
        "*" => Value::I32(l.wrapping_mul(r)),
        "/" => Value::I32(l / r),
        "%" => Value::I32(l % r),
        "&" => Value::I32(l & r),
        "|" => Value::I32(l | r),
        "^" => Value::I32(l ^ r),
        "<<" => Value::I32(l.wrapping_shl(r as u32)),
        ">>" => Value::I32(l.wrapping_shr(r as u32)),
        "<" => Value::Bool(l < r),
        "<=" => Value::Bool(l <= r),
        ">" => Value::Bool(l > r),
        ">=" => Value::Bool(l >= r),
        _ => Value::Null,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if left.is_float() || right.is_float() {
        return left.to_f64() == right.to_f64();
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => left.to_i32() == right.to_i32(),
    }
}

fn eval_unary_op(op: &str, value: Value) -> Value {
    match op {
        "-" => {
            if value.is_float() {
                Value::F64(-value.to_f64())
            } else {
                Value::I32(-value.to_i32())
            }
        }
        "+" => value,
        "!" => Value::Bool(!value.is_truthy()),
        "~" => Value::I32(!value.to_i32()),
        _ => value,
    }
}

async fn eval_postfix(core: SharedCore, op: &str, operand_id: NodeId) -> Value {
    let before = eval_expr(core.clone(), operand_id).await;
    let delta = if op == "++" { 1 } else { -1 };
    let after = if before.is_float() {
        Value::F64(before.to_f64() + delta as f64)
    } else if before.is_unsigned() {
        Value::U32((before.to_u32() as i64 + delta as i64) as u32)
    } else {
        Value::I32(before.to_i32() + delta)
    };
    assign_to(core.clone(), operand_id, after).await;
    before
}

fn build_array_literal(values: Vec<Value>) -> Value {
    if values.iter().all(|v| matches!(v, Value::F64(_))) {
        Value::Arr1F64(values.iter().map(Value::to_f64).collect())
    } else if values.iter().any(|v| matches!(v, Value::Str(_))) {
        Value::Arr1Str(values.iter().map(Value::display_string).collect())
    } else {
        Value::Arr1I32(values.iter().map(Value::to_i32).collect())
    }
}

fn index_array(core: &SharedCore, array: Value, index: i32) -> Value {
    let report_oob = || {
        Core::emit_error(core, RuntimeError::ArrayIndexOutOfBounds.into());
        Value::Null
    };
    if index < 0 {
        return report_oob();
    }
    let idx = index as usize;
    match array {
        Value::Arr1I32(v) => v.get(idx).copied().map(Value::I32).unwrap_or_else(report_oob),
        Value::Arr1F64(v) => v.get(idx).copied().map(Value::F64).unwrap_or_else(report_oob),
        Value::Arr1Str(v) => v.get(idx).cloned().map(Value::Str).unwrap_or_else(report_oob),
        Value::Arr2I32(v) => v.get(idx).cloned().map(Value::Arr1I32).unwrap_or_else(report_oob),
        Value::Arr2F64(v) => v.get(idx).cloned().map(Value::Arr1F64).unwrap_or_else(report_oob),
        Value::Str(s) => s
            .chars()
            .nth(idx)
            .map(|c| Value::I32(c as i32))
            .unwrap_or_else(report_oob),
        _ => {
            Core::emit_error(core, RuntimeError::TypeMismatch.into());
            Value::Null
        }
    }
}

fn read_struct_field(core: &SharedCore, object: Value, field: &str) -> Value {
    match object {
        Value::Struct(handle) => {
            let instance = core.borrow().registry.struct_instance(handle).cloned();
            match instance {
                Some(ref inst) if inst.fields.contains_key(field) => {
                    let value = inst.fields.get(field).cloned().unwrap_or_default();
                    let timestamp = Core::now_ms(core);
                    Core::emit(
                        core,
                        Command::StructFieldAccess {
                            timestamp,
                            struct_name: inst.type_name.clone(),
                            field: field.to_string(),
                            value: value.to_json(),
                        },
                    );
                    value
                }
                _ => {
                    Core::emit_error(core, RuntimeError::UndefinedVariable.into());
                    Value::Null
                }
            }
        }
        _ => {
            Core::emit_error(core, RuntimeError::TypeMismatch.into());
            Value::Null
        }
    }
}

fn deref_pointer(core: &SharedCore, pointer: Value) -> Value {
    match pointer {
        Value::Pointer(p) => {
            let var = core.borrow().scopes.get(&p.target_variable).map(|v| v.value.clone());
            match var {
                Some(v) => index_or_self(&v, p.offset),
                None => {
                    Core::emit_error(core, RuntimeError::NullPointerDereference.into());
                    Value::Null
                }
            }
        }
        Value::Null => {
            Core::emit_error(core, RuntimeError::NullPointerDereference.into());
            Value::Null
        }
        _ => {
            Core::emit_error(core, RuntimeError::TypeMismatch.into());
            Value::Null
        }
    }
}

fn index_or_self(value: &Value, offset: i32) -> Value {
    if offset == 0 {
        return value.clone();
    }
    match value {
        Value::Arr1I32(v) => v.get(offset as usize).copied().map(Value::I32).unwrap_or_default(),
        Value::Arr1F64(v) => v.get(offset as usize).copied().map(Value::F64).unwrap_or_default(),
        _ => value.clone(),
    }
}

fn cast_value(type_name: &str, value: Value) -> Value {
    match type_name {
        "int" | "int16_t" | "short" => Value::I32(value.to_i32()),
        "unsigned int" | "uint16_t" | "unsigned long" | "uint32_t" | "byte" | "size_t" => {
            Value::U32(value.to_u32())
        }
        "float" | "double" => Value::F64(value.to_f64()),
        "bool" | "boolean" => Value::Bool(value.to_bool()),
        "char" => Value::I32(value.to_i32() as i8 as i32),
        "String" | "string" => Value::Str(value.display_string()),
        _ => value,
    }
}

async fn assign_to(core: SharedCore, target_id: NodeId, value: Value) {
    let kind = core.borrow().tree.kind(target_id);
    match kind {
        NodeKind::Identifier => {
            let name = core.borrow().tree.value_str(target_id).unwrap_or("").to_string();
            let result = core.borrow_mut().scopes.set(&name, value.clone());
            match result {
                Ok(()) => emit_var_set(&core, &name, &value),
                Err(err) => Core::emit_error(&core, err.into()),
            }
        }
        NodeKind::ArrayAccess => {
            let (array_id, index_id) = core.borrow().tree.array_access_parts(target_id);
            let index = eval_expr(core.clone(), index_id).await.to_i32();
            assign_array_element(core.clone(), array_id, index, value).await;
        }
        NodeKind::MemberAccess => {
            let (object_id, field_id) = core.borrow().tree.member_access_parts(target_id);
            let field_name = core.borrow().tree.value_str(field_id).unwrap_or("").to_string();
            let object = eval_expr(core.clone(), object_id).await;
            assign_struct_field(&core, object, &field_name, value);
        }
        NodeKind::Dereference => {
            let operand_id = core.borrow().tree.unary_operand(target_id);
            let pointer = eval_expr(core.clone(), operand_id).await;
            if let Value::Pointer(p) = pointer {
                let result = core.borrow_mut().scopes.set(&p.target_variable, value.clone());
                if let Err(err) = result {
                    Core::emit_error(&core, err.into());
                } else {
                    emit_var_set(&core, &p.target_variable, &value);
                }
            } else {
                Core::emit_error(&core, RuntimeError::NullPointerDereference.into());
            }
        }
        _ => Core::emit_error(&core, InternalError("invalid assignment target".to_string()).into()),
    }
}

async fn assign_array_element(core: SharedCore, array_id: NodeId, index: i32, value: Value) {
    let name = core.borrow().tree.value_str(array_id).unwrap_or("").to_string();
    if index < 0 {
        Core::emit_error(&core, RuntimeError::ArrayIndexOutOfBounds.into());
        return;
    }
    let idx = index as usize;
    let current = core.borrow().scopes.get(&name).map(|v| v.value.clone());
    let updated = match current {
        Some(Value::Arr1I32(mut v)) if idx < v.len() => {
            v[idx] = value.to_i32();
            Value::Arr1I32(v)
        }
        Some(Value::Arr1F64(mut v)) if idx < v.len() => {
            v[idx] = value.to_f64();
            Value::Arr1F64(v)
        }
        Some(Value::Arr1Str(mut v)) if idx < v.len() => {
            v[idx] = value.display_string();
            Value::Arr1Str(v)
        }
        Some(_) => {
            Core::emit_error(&core, RuntimeError::ArrayIndexOutOfBounds.into());
            return;
        }
        None => {
            Core::emit_error(&core, RuntimeError::UndefinedVariable.into());
            return;
        }
    };
    let result = core.borrow_mut().scopes.set(&name, updated.clone());
    if let Err(err) = result {
        Core::emit_error(&core, err.into());
    } else {
        emit_var_set(&core, &name, &updated);
    }
}

fn assign_struct_field(core: &SharedCore, object: Value, field: &str, value: Value) {
    if let Value::Struct(handle) = object {
        let (type_name, ok) = {
            let mut core_mut = core.borrow_mut();
            match core_mut.registry.struct_instance_mut(handle) {
                Some(instance) => {
                    instance.fields.insert(field.to_string(), value.clone());
                    (instance.type_name.clone(), true)
                }
                None => (String::new(), false),
            }
        };
        if !ok {
            Core::emit_error(core, RuntimeError::UndefinedVariable.into());
            return;
        }
        let timestamp = Core::now_ms(core);
        Core::emit(
            core,
            Command::StructFieldSet {
                timestamp,
                struct_name: type_name,
                field: field.to_string(),
                value: value.to_json(),
            },
        );
    } else {
        Core::emit_error(core, RuntimeError::TypeMismatch.into());
    }
}

fn emit_var_set(core: &SharedCore, name: &str, value: &Value) {
    let timestamp = Core::now_ms(core);
    let json = match value {
        Value::Struct(handle) => {
            let core_ref = core.borrow();
            match core_ref.registry.struct_instance(*handle) {
                Some(instance) => {
                    let fields: Vec<(String, Value)> = instance
                        .field_order
                        .iter()
                        .map(|n| (n.clone(), instance.fields.get(n).cloned().unwrap_or_default()))
                        .collect();
                    Command::struct_value_json(&instance.type_name, *handle, &fields)
                }
                None => value.to_json(),
            }
        }
        _ => value.to_json(),
    };
    Core::emit(
        core,
        Command::VarSet {
            timestamp,
            variable: name.to_string(),
            value: json,
        },
    );
}

async fn eval_func_call(core: SharedCore, id: NodeId) -> Value {
    let (callee_id, arg_ids) = {
        let c = core.borrow();
        let (callee, args) = c.tree.func_call_parts(id);
        (callee, args.to_vec())
    };
    let mut args = Vec::with_capacity(arg_ids.len());
    for arg_id in arg_ids {
        args.push(eval_expr(core.clone(), arg_id).await);
    }

    let callee_kind = core.borrow().tree.kind(callee_id);
    if callee_kind == NodeKind::MemberAccess {
        let (object_id, method_id) = core.borrow().tree.member_access_parts(callee_id);
        let library = core.borrow().tree.value_str(object_id).unwrap_or("").to_string();
        let method = core.borrow().tree.value_str(method_id).unwrap_or("").to_string();
        return match builtins::call_library_method(core.clone(), &library, &method, &args).await {
            Some(v) => v,
            None => {
                Core::emit_error(&core, RuntimeError::UndefinedFunction.into());
                Value::Null
            }
        };
    }

    let name = core.borrow().tree.value_str(callee_id).unwrap_or("").to_string();

    // Built-ins (`pinMode`, `delay`, ...) each emit their own dedicated
    // command; a generic `FUNCTION_CALL` is reserved for user-defined
    // functions, emitted by `call_user_function` below.
    if let Some(value) = builtins::call_builtin(core.clone(), &name, &args).await {
        return value;
    }

    let func_node = core.borrow().registry.function(&name);
    match func_node {
        Some(def_id) => call_user_function(core.clone(), def_id, &name, args).await,
        None => {
            Core::emit_error(&core, RuntimeError::UndefinedFunction.into());
            Value::Null
        }
    }
}

async fn call_user_function(core: SharedCore, def_id: NodeId, name: &str, args: Vec<Value>) -> Value {
    let timestamp = Core::now_ms(&core);
    Core::emit(
        &core,
        Command::FunctionCall {
            timestamp,
            function: name.to_string(),
            arguments: args.iter().map(Value::to_json).collect(),
            message: Command::format_call_message(name, &args),
        },
    );

    let (params_id, body_id) = {
        let c = core.borrow();
        let (_ret_type, params, body) = c.tree.func_def_parts(def_id);
        (params, body)
    };
    let param_ids = core.borrow().tree.children(params_id).to_vec();

    {
        let mut c = core.borrow_mut();
        c.scopes.push();
        c.exec.push(ScopeKind::Function);
    }
    for (param_id, value) in param_ids.iter().zip(args.iter()) {
        let (type_id, decl_id) = {
            let c = core.borrow();
            let children = c.tree.children(*param_id);
            (children.get(0).copied(), children.get(1).copied())
        };
        let type_name = type_id.map(|t| node_type_name(&core.borrow().tree, t)).unwrap_or_default();
        let param_name = decl_id
            .map(|d| core.borrow().tree.value_str(d).unwrap_or("").to_string())
            .unwrap_or_default();
        core.borrow_mut().scopes.declare(&param_name, &type_name, value.clone(), false);
    }

    let body_children = core.borrow().tree.children(body_id).to_vec();
    exec_block(core.clone(), &body_children).await;

    let frame = {
        let mut c = core.borrow_mut();
        c.scopes.pop();
        c.exec.pop()
    };
    let return_value = core.borrow_mut().take_return_value().unwrap_or_default();
    let timestamp = Core::now_ms(&core);
    Core::emit(
        &core,
        Command::FunctionReturn {
            timestamp,
            name: name.to_string(),
            value: return_value.to_json(),
        },
    );
    let _ = frame;
    return_value
}

/// Check the current frame's stop reason before running the next statement
/// in a list. Returns `true` if the caller should stop. A capped loop whose
/// `continue_in_parent` is false (anywhere other than directly inside
/// `setup`, §4.3) ends the whole program here rather than just this
/// statement list, since this is the point where control would otherwise
/// keep bubbling outward as if nothing happened.
fn should_stop_statement_list(core: &SharedCore) -> bool {
    let frame = *core.borrow().exec.current();
    if frame.stop_reason == StopReason::IterationLimit && !frame.continue_in_parent {
        let mut c = core.borrow_mut();
        c.destroyed = true;
        c.terminated_by_iteration_limit = true;
    }
    frame.stop_reason != StopReason::Normal
}

/// Execute a list of statements in order, stopping early the moment the
/// enclosing frame's stop reason leaves [`StopReason::Normal`] (§4.3).
pub(crate) fn exec_block(core: SharedCore, stmts: &[NodeId]) -> Pin<Box<dyn Future<Output = ()>>> {
    let stmts = stmts.to_vec();
    Box::pin(async move {
        for stmt in stmts {
            if should_stop_statement_list(&core) {
                break;
            }
            exec_stmt(core.clone(), stmt).await;
        }
    })
}

pub(crate) fn exec_stmt(core: SharedCore, id: NodeId) -> Pin<Box<dyn Future<Output = ()>>> {
    Box::pin(async move {
        let kind = core.borrow().tree.kind(id);
        {
            let mut c = core.borrow_mut();
            c.statements_executed += 1;
            if c.options.verbose {
                log::debug!("exec stmt #{}: {:?}", c.statements_executed, kind);
            }
        }
        match kind {
            NodeKind::CompoundStatement => {
                let children = core.borrow().tree.children(id).to_vec();
                core.borrow_mut().scopes.push();
                exec_block(core.clone(), &children).await;
                core.borrow_mut().scopes.pop();
            }
            NodeKind::ExpressionStatement => {
                let expr_id = core.borrow().tree.children(id)[0];
                eval_expr(core.clone(), expr_id).await;
            }
            NodeKind::EmptyStatement => {}
            NodeKind::VarDecl => exec_var_decl(core.clone(), id).await,
            NodeKind::If => {
                let (cond_id, then_id, else_id) = core.borrow().tree.if_parts(id);
                let cond = eval_expr(core.clone(), cond_id).await;
                if cond.is_truthy() {
                    exec_stmt(core.clone(), then_id).await;
                } else if let Some(else_id) = else_id {
                    exec_stmt(core.clone(), else_id).await;
                }
            }
            NodeKind::For => exec_for(core.clone(), id).await,
            NodeKind::While => exec_while(core.clone(), id, false).await,
            NodeKind::DoWhile => exec_while(core.clone(), id, true).await,
            NodeKind::Switch => exec_switch(core.clone(), id).await,
            NodeKind::Return => {
                let children = core.borrow().tree.children(id).to_vec();
                let value = if let Some(expr_id) = children.get(0) {
                    eval_expr(core.clone(), *expr_id).await
                } else {
                    Value::Null
                };
                core.borrow_mut().set_return_value(value);
                core.borrow_mut().exec.set_stop(StopReason::Return);
            }
            NodeKind::Break => {
                core.borrow_mut().exec.set_stop(StopReason::Break);
                let timestamp = Core::now_ms(&core);
                Core::emit(&core, Command::BreakStatement { timestamp });
            }
            NodeKind::Continue => core.borrow_mut().exec.set_stop(StopReason::Continue),
            _ => {
                eval_expr(core.clone(), id).await;
            }
        }
    })
}

async fn exec_var_decl(core: SharedCore, id: NodeId) {
    let (type_id, declarator_ids) = {
        let c = core.borrow();
        let (type_id, declarators) = c.tree.var_decl_parts(id);
        (type_id, declarators.to_vec())
    };
    let type_name = core.borrow().tree.value_str(type_id).unwrap_or("").to_string();
    let is_const = type_name.contains("const");
    for declarator_id in declarator_ids {
        let decl_kind = core.borrow().tree.kind(declarator_id);
        let (name, init_id) = {
            let c = core.borrow();
            let children = c.tree.children(declarator_id);
            let name = c.tree.value_str(declarator_id).unwrap_or("").to_string();
            (name, children.get(0).copied())
        };
        let value = match init_id {
            Some(expr_id) => eval_expr(core.clone(), expr_id).await,
            None => default_value_for_type(&core, &type_name),
        };
        let _ = decl_kind;
        core.borrow_mut().scopes.declare(&name, &type_name, value.clone(), is_const);
        emit_var_set(&core, &name, &value);
    }
}

/// A declaration with no initializer gets its type's zero value (§4.5); for
/// a struct type (after resolving typedefs and stripping a `struct`
/// keyword) that means allocating a fresh, field-defaulted instance rather
/// than falling through to `I32(0)`.
fn default_value_for_type(core: &SharedCore, type_name: &str) -> Value {
    let bare = type_name
        .trim_start_matches("const ")
        .trim_start_matches("struct ")
        .trim();
    let resolved = core.borrow().registry.resolve_type(bare);
    if core.borrow().registry.struct_layout(&resolved).is_some() {
        let handle = core.borrow_mut().registry.create_struct_instance(&resolved);
        return Value::Struct(handle);
    }
    if resolved.contains("float") || resolved.contains("double") {
        Value::F64(0.0)
    } else if resolved.contains("unsigned") || resolved.contains("uint") || resolved.contains("byte") {
        Value::U32(0)
    } else if resolved.contains("bool") {
        Value::Bool(false)
    } else if resolved.contains("String") || resolved.contains("char*") {
        Value::Str(String::new())
    } else {
        Value::I32(0)
    }
}

/// What a single loop iteration's post-body stop reason means for the
/// caller, after the iteration-cap check has already run.
enum LoopStep {
    Continue,
    Stop,
}

/// Apply loop-body control flow after one iteration (`break`/`continue`/
/// `return` handling) and the iteration-cap policy (§4.3). Shared logic
/// between `For`/`While`/`DoWhile`, called after each body execution.
fn post_iteration_step(core: &SharedCore, iterations: &mut u32, max_iterations: u32) -> LoopStep {
    let reason = core.borrow().exec.current().stop_reason;
    match reason {
        StopReason::Break => {
            core.borrow_mut().exec.current_mut().stop_reason = StopReason::Normal;
            return LoopStep::Stop;
        }
        StopReason::Continue => {
            core.borrow_mut().exec.current_mut().stop_reason = StopReason::Normal;
        }
        StopReason::Return | StopReason::IterationLimit => return LoopStep::Stop,
        StopReason::Normal => {}
    }
    *iterations += 1;
    if *iterations >= max_iterations {
        // The frame on top of the control stack belongs to whichever
        // region directly encloses this loop construct (`setup`, `loop`, a
        // function body, or a nested block) — exactly the scope kind the
        // policy needs to decide whether execution may continue past it.
        let enclosing = core.borrow().exec.current().scope_kind;
        core.borrow_mut().exec.apply_iteration_limit(enclosing);
        let timestamp = Core::now_ms(core);
        Core::emit(
            core,
            Command::LoopLimitReached {
                timestamp,
                phase: "end".to_string(),
                iterations: *iterations,
                message: format!("loop exceeded max_loop_iterations ({})", max_iterations),
            },
        );
        return LoopStep::Stop;
    }
    LoopStep::Continue
}

async fn exec_for(core: SharedCore, id: NodeId) {
    let (init_id, cond_id, update_id, body_id) = core.borrow().tree.for_parts(id);
    core.borrow_mut().scopes.push();
    exec_stmt(core.clone(), init_id).await;

    let max_iterations = core.borrow().options.max_loop_iterations;
    let mut iterations = 0u32;
    loop {
        let cond_kind = core.borrow().tree.kind(cond_id);
        let should_run = if cond_kind == NodeKind::EmptyStatement {
            true
        } else {
            eval_expr(core.clone(), cond_id).await.is_truthy()
        };
        if !should_run {
            break;
        }
        exec_stmt(core.clone(), body_id).await;
        let update_kind = core.borrow().tree.kind(update_id);
        if update_kind != NodeKind::EmptyStatement {
            eval_expr(core.clone(), update_id).await;
        }
        if matches!(post_iteration_step(&core, &mut iterations, max_iterations), LoopStep::Stop) {
            break;
        }
    }
    core.borrow_mut().scopes.pop();
}

async fn exec_while(core: SharedCore, id: NodeId, is_do_while: bool) {
    let (cond_id, body_id) = core.borrow().tree.while_parts(id);
    let max_iterations = core.borrow().options.max_loop_iterations;
    let mut iterations = 0u32;

    if is_do_while {
        exec_stmt(core.clone(), body_id).await;
        if matches!(post_iteration_step(&core, &mut iterations, max_iterations), LoopStep::Stop) {
            return;
        }
    }
    loop {
        if !eval_expr(core.clone(), cond_id).await.is_truthy() {
            break;
        }
        exec_stmt(core.clone(), body_id).await;
        if matches!(post_iteration_step(&core, &mut iterations, max_iterations), LoopStep::Stop) {
            break;
        }
    }
}

async fn exec_switch(core: SharedCore, id: NodeId) {
    let (subject_id, case_ids) = {
        let c = core.borrow();
        let (subject, cases) = c.tree.switch_parts(id);
        (subject, cases.to_vec())
    };
    let subject = eval_expr(core.clone(), subject_id).await;
    let switch_timestamp = Core::now_ms(&core);
    Core::emit(
        &core,
        Command::SwitchStatement {
            timestamp: switch_timestamp,
            discriminant: subject.to_i32(),
        },
    );
    core.borrow_mut().scopes.push();

    let mut matched = false;
    for case_id in &case_ids {
        let (test_id, consequents) = {
            let c = core.borrow();
            let (test, body) = c.tree.case_parts(*case_id);
            (test, body.to_vec())
        };
        if !matched {
            match test_id {
                Some(test_id) => {
                    let test_value = eval_expr(core.clone(), test_id).await;
                    if values_equal(&subject, &test_value) {
                        matched = true;
                        let timestamp = Core::now_ms(&core);
                        Core::emit(
                            &core,
                            Command::SwitchCase {
                                timestamp,
                                value: test_value.to_i32(),
                            },
                        );
                    }
                }
                None => {
                    // `default` matches once nothing above it did; it has no
                    // test value of its own, so the case record carries the
                    // discriminant it matched against.
                    matched = true;
                    let timestamp = Core::now_ms(&core);
                    Core::emit(
                        &core,
                        Command::SwitchCase {
                            timestamp,
                            value: subject.to_i32(),
                        },
                    );
                }
            }
        }
        if matched {
            // Fall-through (§4.3): once matched, every subsequent case's
            // statements run regardless of its own test, until `break`.
            for stmt in consequents {
                if should_stop_statement_list(&core) {
                    break;
                }
                exec_stmt(core.clone(), stmt).await;
            }
            if should_stop_statement_list(&core) {
                break;
            }
        }
    }
    let reason = core.borrow().exec.current().stop_reason;
    if reason == StopReason::Break {
        core.borrow_mut().exec.current_mut().stop_reason = StopReason::Normal;
    }
    core.borrow_mut().scopes.pop();
}

impl Core {
    fn set_return_value(&mut self, value: Value) {
        self.pending_return = Some(value);
    }

    fn take_return_value(&mut self) -> Option<Value> {
        self.pending_return.take()
    }
}

/// Walk the top-level `Program` children, registering struct/typedef/
/// function declarations and executing global `VarDecl`s in source order
/// (§4.2, §5.1). Returns the `setup`/`loop` function definition node ids,
/// if present.
async fn prepare_program(core: SharedCore) -> (Option<NodeId>, Option<NodeId>) {
    let top_level = core.borrow().tree.children(core.borrow().tree.root).to_vec();
    let mut setup_id = None;
    let mut loop_id = None;

    for node_id in &top_level {
        let kind = core.borrow().tree.kind(*node_id);
        match kind {
            NodeKind::StructDeclaration => {
                let (name_id, member_ids) = {
                    let c = core.borrow();
                    let (name, members) = c.tree.struct_decl_parts(*node_id);
                    (name, members.to_vec())
                };
                let struct_name = core.borrow().tree.value_str(name_id).unwrap_or("").to_string();
                let mut layout = Vec::new();
                for member_id in member_ids {
                    let member_kind = core.borrow().tree.kind(member_id);
                    if member_kind != NodeKind::MemberDecl {
                        continue;
                    }
                    let children = core.borrow().tree.children(member_id).to_vec();
                    if let (Some(type_id), Some(decl_id)) = (children.get(0), children.get(1)) {
                        let field_type = node_type_name(&core.borrow().tree, *type_id);
                        let field_name = core.borrow().tree.value_str(*decl_id).unwrap_or("").to_string();
                        layout.push((field_name, field_type));
                    }
                }
                core.borrow_mut().registry.declare_struct_type(&struct_name, layout);
            }
            NodeKind::TypedefDeclaration => {
                let alias = core.borrow().tree.value_str(*node_id).unwrap_or("").to_string();
                let children = core.borrow().tree.children(*node_id).to_vec();
                if let Some(target_id) = children.get(0) {
                    let target = node_type_name(&core.borrow().tree, *target_id);
                    core.borrow_mut().registry.declare_typedef(&alias, &target);
                }
            }
            NodeKind::FuncDef => {
                // The function's name rides on the `FuncDef` node's own
                // value; `func_def_parts` only exposes its (return type,
                // params, body) children.
                let name = core.borrow().tree.value_str(*node_id).unwrap_or("").to_string();
                core.borrow_mut().registry.declare_function(&name, *node_id);
                if name == "setup" {
                    setup_id = Some(*node_id);
                } else if name == "loop" {
                    loop_id = Some(*node_id);
                }
            }
            NodeKind::VarDecl => exec_var_decl(core.clone(), *node_id).await,
            _ => {}
        }
    }
    (setup_id, loop_id)
}

/// The full program lifecycle (§4.2, §6): emit startup commands, run global
/// declarations, run `setup()` once, then run `loop()` repeatedly until the
/// host calls [`Interpreter::destroy`] or a capped loop directly inside
/// `loop()`/the top level (not `setup()`) hits its iteration cap.
///
/// The top-level `loop()` call itself is also subject to
/// `max_loop_iterations`: an embedded interpreter that truly never returns
/// isn't practical to drive from a host that expects a finite command
/// stream, so repeated `loop()` invocations are capped the same way any
/// other loop construct is, and a host that wants more simply raises the
/// option.
async fn run_program(core: SharedCore) {
    let timestamp = Core::now_ms(&core);
    Core::emit(
        &core,
        Command::VersionInfo {
            timestamp,
            component: COMPONENT_NAME.to_string(),
            version: INTERPRETER_VERSION.to_string(),
        },
    );
    Core::emit(&core, Command::ProgramStart { timestamp });
    log::info!("program start");

    core.borrow_mut().exec.push(ScopeKind::Program);
    let (setup_id, loop_id) = prepare_program(core.clone()).await;

    if let Some(setup_id) = setup_id {
        log::debug!("setup start");
        let timestamp = Core::now_ms(&core);
        Core::emit(&core, Command::SetupStart { timestamp });
        {
            let mut c = core.borrow_mut();
            c.scopes.push();
            c.exec.push(ScopeKind::Setup);
        }
        let body_id = core.borrow().tree.func_def_parts(setup_id).2;
        let body_children = core.borrow().tree.children(body_id).to_vec();
        exec_block(core.clone(), &body_children).await;
        {
            let mut c = core.borrow_mut();
            c.scopes.pop();
            c.exec.pop();
        }
        let timestamp = Core::now_ms(&core);
        Core::emit(&core, Command::SetupEnd { timestamp });
        log::debug!("setup end");
    }

    if let Some(loop_id) = loop_id {
        let max_iterations = core.borrow().options.max_loop_iterations;
        let mut iteration = 0u32;
        loop {
            if core.borrow().destroyed {
                break;
            }
            let timestamp = Core::now_ms(&core);
            Core::emit(&core, Command::LoopStart { timestamp, iteration });
            {
                let mut c = core.borrow_mut();
                c.scopes.push();
                c.exec.push(ScopeKind::Loop);
            }
            let body_id = core.borrow().tree.func_def_parts(loop_id).2;
            let body_children = core.borrow().tree.children(body_id).to_vec();
            exec_block(core.clone(), &body_children).await;
            {
                let mut c = core.borrow_mut();
                c.scopes.pop();
                c.exec.pop();
            }
            let timestamp = Core::now_ms(&core);
            Core::emit(&core, Command::LoopEnd { timestamp, iteration });

            iteration += 1;
            if core.borrow().destroyed || iteration >= max_iterations {
                break;
            }
        }
    }

    core.borrow_mut().exec.pop();
    let timestamp = Core::now_ms(&core);
    Core::emit(&core, Command::ProgramEnd { timestamp });
    if core.borrow().terminated_by_iteration_limit {
        log::info!("program end (terminated by iteration limit)");
    } else {
        log::info!("program end");
    }
    core.borrow_mut().destroyed = true;
}

fn noop_raw_waker() -> RawWaker {
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        noop_raw_waker()
    }
    let vtable = &RawWakerVTable::new(clone, no_op, no_op, no_op);
    RawWaker::new(std::ptr::null(), vtable)
}

fn noop_waker() -> Waker {
    unsafe { Waker::from_raw(noop_raw_waker()) }
}

/// How a run has concluded, for hosts that want to distinguish a clean
/// finish from one cut short by a runaway loop, without parsing the
/// command stream's `ERROR` entries themselves.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Still executing, or hasn't been started.
    Running,
    /// Ran to completion (or was explicitly `destroy()`d) with no recovered
    /// runtime errors along the way.
    EndedNormally,
    /// Ran to completion but emitted at least one recoverable `ERROR`.
    EndedWithErrors,
    /// A capped loop outside `setup()` hit `max_loop_iterations` and ended
    /// the program early (§4.3).
    TerminatedByIterationLimit,
}

/// The embeddable interpreter (§6). Construction decodes the CompactAST
/// byte stream; nothing executes until [`Interpreter::start`] is called.
pub struct Interpreter {
    core: SharedCore,
    future: RefCell<Option<Pin<Box<dyn Future<Output = ()>>>>>,
}

impl Interpreter {
    /// Decode `ast_bytes` and construct an interpreter, with commands
    /// discarded until [`Interpreter::on_command`] registers a sink.
    pub fn new(ast_bytes: &[u8], options: InterpreterOptions) -> Result<Self, DecodeError> {
        let tree = codec::decode(ast_bytes).map_err(|err| {
            log::error!("failed to decode CompactAST: {err}");
            err
        })?;
        log::debug!("decoded CompactAST: {} nodes", tree.nodes.len());
        let mut scopes = ScopeStack::new();
        scopes.seed_arduino_constants();
        let core = Rc::new(RefCell::new(Core {
            tree,
            registry: Registry::new(),
            scopes,
            exec: ExecutionControlStack::new(),
            sink: CommandSink::in_memory(),
            options,
            sync_provider: None,
            async_state: AsyncState::new(),
            clock_ms: 0,
            destroyed: false,
            pending_return: None,
            statements_executed: 0,
            had_error: false,
            terminated_by_iteration_limit: false,
        }));
        Ok(Self {
            core,
            future: RefCell::new(None),
        })
    }

    /// Install the hardware provider consulted in synchronous mode.
    pub fn set_provider(&self, provider: impl SyncProvider + 'static) {
        self.core.borrow_mut().sync_provider = Some(Box::new(provider));
    }

    /// Register a callback invoked once per emitted command, replacing any
    /// previously configured sink.
    pub fn on_command(&self, callback: impl Fn(&Command) + 'static) {
        self.core.borrow_mut().sink = CommandSink::callback(callback);
    }

    /// Redirect the command stream to a file, NDJSON-per-line.
    pub fn set_file_sink(&self, file: std::fs::File) {
        self.core.borrow_mut().sink = CommandSink::file(file);
    }

    /// Redirect the command stream to stdout, NDJSON-per-line.
    pub fn set_stdout_sink(&self) {
        self.core.borrow_mut().sink = CommandSink::stdout();
    }

    /// Deliver the host's answer to a previously requested asynchronous
    /// external value (§4.8), then drive the suspended evaluation forward.
    pub fn handle_response(&self, request_id: u64, outcome: ExternalResponseOutcome) {
        let delivered = self.core.borrow_mut().async_state.deliver(request_id, outcome);
        if delivered {
            self.poll_once();
        }
    }

    /// Advance the logical clock by `elapsed_ms` and re-poll, giving any
    /// pending asynchronous request a chance to expire (§4.8). Needed on
    /// wasm32, where [`std::time::Instant`] isn't available to the
    /// interpreter itself, so the host is the one tracking wall-clock time.
    pub fn tick(&self, elapsed_ms: u64) {
        self.core.borrow_mut().clock_ms += elapsed_ms;
        self.poll_once();
    }

    /// Begin executing the decoded program: global declarations, `setup()`,
    /// then `loop()` (§4.2). Idempotent after the first call.
    pub fn start(&self) -> Result<(), RecoverableError> {
        if self.future.borrow().is_some() {
            return Ok(());
        }
        let fut: Pin<Box<dyn Future<Output = ()>>> = Box::pin(run_program(self.core.clone()));
        *self.future.borrow_mut() = Some(fut);
        self.poll_once();
        Ok(())
    }

    /// Whether the program has finished (ran to completion, hit
    /// `destroy()`, or terminated via an unrecovered iteration-limit
    /// outside `setup()`).
    pub fn is_destroyed(&self) -> bool {
        self.core.borrow().destroyed
    }

    /// Terminate the program immediately; the next poll of the in-flight
    /// future observes `destroyed` and stops advancing `loop()`.
    pub fn destroy(&self) {
        self.core.borrow_mut().destroyed = true;
    }

    /// In-memory buffered commands, only populated when no `on_command`/
    /// file/stdout sink was configured (the default at construction).
    pub fn buffered_commands(&self) -> Vec<Command> {
        self.core.borrow().sink.buffered()
    }

    /// How many lexical scopes are currently nested (program, setup/loop,
    /// function calls, blocks). Observability only; never consulted by
    /// evaluation logic.
    pub fn scope_depth(&self) -> usize {
        self.core.borrow().scopes.depth()
    }

    /// Total statements dispatched through the executor so far, across the
    /// whole run. Observability only.
    pub fn statements_executed(&self) -> u64 {
        self.core.borrow().statements_executed
    }

    /// How the run ended, or is currently proceeding. Observability only;
    /// never consulted by evaluation logic to decide program behaviour.
    pub fn outcome(&self) -> RunOutcome {
        let core = self.core.borrow();
        if !core.destroyed {
            RunOutcome::Running
        } else if core.terminated_by_iteration_limit {
            RunOutcome::TerminatedByIterationLimit
        } else if core.had_error {
            RunOutcome::EndedWithErrors
        } else {
            RunOutcome::EndedNormally
        }
    }

    fn poll_once(&self) {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut future_slot = self.future.borrow_mut();
        if let Some(future) = future_slot.as_mut() {
            if future.as_mut().poll(&mut cx).is_ready() {
                *future_slot = None;
            }
        }
    }
}
