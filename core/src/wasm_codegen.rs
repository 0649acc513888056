/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * WASM Code Generator for the WASM Transpiler.
 *
 * Lowers one type-annotated function to a WASM function body via
 * `wasm-encoder`. Module assembly (types, imports, exports, names) lives in
 * module_builder.rs.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use crate::ast::{
    AssignOp, BinaryOp, Expr, ExprKind, FunctionDeclaration, LogicalOp, Property, Statement,
    UnaryOp, UpdateOp,
};
use crate::declarations::VariableMapping;
use crate::error::CompileError;
use crate::inference::FunctionTypes;
use crate::types::{FunctionSignature, FunctionSignatures, ValueType};
use std::collections::HashMap;
use wasm_encoder::{BlockType, Function, Instruction, MemArg, ValType};

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// Everything the generator needs to know about one function.
pub struct FunctionContext<'a> {
    pub func: &'a FunctionDeclaration,
    pub signature: &'a FunctionSignature,
    pub signatures: &'a FunctionSignatures,
    /// Merged parameter + local slots.
    pub variables: &'a VariableMapping,
    pub types: &'a FunctionTypes,
    /// Function name → index in the module's function index space.
    pub function_indices: &'a HashMap<String, u32>,
}

/// A lowered function, ready to be placed in a module.
#[derive(Debug, Clone)]
pub struct GeneratedFunction {
    pub name: String,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    /// Declared locals followed by scratch locals; parameters excluded.
    pub locals: Vec<ValType>,
    /// Names of every local including parameters, in index order.
    pub local_names: Vec<String>,
    pub instructions: Vec<Instruction<'static>>,
}

impl GeneratedFunction {
    pub fn encode_body(&self) -> Function {
        let mut body = Function::new_with_locals_types(self.locals.iter().copied());
        for instr in &self.instructions {
            body.instruction(instr);
        }
        body
    }
}

pub fn generate_function(cx: &FunctionContext<'_>) -> Result<GeneratedFunction, CompileError> {
    let mut emitter = FunctionEmitter::new(cx);
    for stmt in &cx.func.body {
        emitter.lower_statement(stmt)?;
    }
    // Falling off the end returns the zero value of the result type.
    emitter.push_zero(cx.signature.return_type);
    emitter.emit(Instruction::End);
    emitter.pop()?;
    emitter.finish()
}

// =============================================================================
// Function Emission Context
// =============================================================================

const TEMP_LOCAL_TYPE: ValType = ValType::I32;

/// Mutable state threaded through lowering of one function body.
///
/// `stack` mirrors the operand stack with source-level types. Every lowering
/// pushes exactly what it leaves on the operand stack and pops what it
/// consumes; statements leave it at the depth they found it. `control` holds
/// one entry per open structured block, labelled when a branch targets it.
struct FunctionEmitter<'a> {
    cx: &'a FunctionContext<'a>,
    instructions: Vec<Instruction<'static>>,
    stack: Vec<ValueType>,
    control: Vec<Option<String>>,
    next_label: u32,
    temp_base: u32,
    temp_count: u32,
    free_temps: Vec<u32>,
}

impl<'a> FunctionEmitter<'a> {
    fn new(cx: &'a FunctionContext<'a>) -> Self {
        Self {
            cx,
            instructions: Vec::new(),
            stack: Vec::new(),
            control: Vec::new(),
            next_label: 0,
            temp_base: cx.variables.len() as u32,
            temp_count: 0,
            free_temps: Vec::new(),
        }
    }

    fn emit(&mut self, instr: Instruction<'static>) {
        self.instructions.push(instr);
    }

    fn push(&mut self, ty: ValueType) {
        self.stack.push(ty);
    }

    fn pop(&mut self) -> Result<ValueType, CompileError> {
        self.stack
            .pop()
            .ok_or_else(|| CompileError::Internal("expression stack underflow".to_string()))
    }

    fn top(&self) -> Result<ValueType, CompileError> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| CompileError::Internal("expression stack is empty".to_string()))
    }

    /// Emit an instruction that consumes `consumed` stack entries and
    /// produces one value of type `produced`.
    fn emit_op(
        &mut self,
        instr: Instruction<'static>,
        consumed: usize,
        produced: ValueType,
    ) -> Result<(), CompileError> {
        for _ in 0..consumed {
            self.pop()?;
        }
        self.emit(instr);
        self.push(produced);
        Ok(())
    }

    fn push_i32(&mut self, value: i32) {
        self.emit(Instruction::I32Const(value));
        self.push(ValueType::Int32);
    }

    fn push_zero(&mut self, ty: ValueType) {
        if ty.is_float() {
            self.emit(Instruction::F64Const(0.0.into()));
        } else {
            self.emit(Instruction::I32Const(0));
        }
        self.push(ty);
    }

    fn push_one(&mut self, ty: ValueType) {
        if ty.is_float() {
            self.emit(Instruction::F64Const(1.0.into()));
        } else {
            self.emit(Instruction::I32Const(1));
        }
        self.push(ty);
    }

    fn fresh_label(&mut self) -> String {
        let label = format!("label_{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// Relative branch depth of a labelled block on the control stack.
    fn depth_of(&self, label: &str) -> Result<u32, CompileError> {
        self.control
            .iter()
            .rev()
            .position(|entry| entry.as_deref() == Some(label))
            .map(|depth| depth as u32)
            .ok_or_else(|| CompileError::Internal(format!("branch to unknown label {}", label)))
    }

    fn acquire_temp(&mut self) -> u32 {
        if let Some(idx) = self.free_temps.pop() {
            return idx;
        }
        let idx = self.temp_base + self.temp_count;
        self.temp_count += 1;
        idx
    }

    fn release_temp(&mut self, idx: u32) {
        self.free_temps.push(idx);
    }

    /// A name nobody declared or typed is unknown; a typed name without a
    /// slot means resolution and inference disagree.
    fn slot(&self, name: &str) -> Result<u32, CompileError> {
        if !self.cx.variables.contains(name) && self.cx.types.variable(name).is_none() {
            return Err(CompileError::UnknownIdentifier(name.to_string()));
        }
        self.cx.variables.slot(name)
    }

    fn variable_type(&self, name: &str) -> Result<ValueType, CompileError> {
        self.cx
            .types
            .variable(name)
            .ok_or_else(|| CompileError::UntypedVariable(name.to_string()))
    }

    fn expr_type(&self, expr: &Expr) -> Result<ValueType, CompileError> {
        self.cx.types.expression(expr.id)
    }

    fn finish(self) -> Result<GeneratedFunction, CompileError> {
        if !self.stack.is_empty() || !self.control.is_empty() {
            return Err(CompileError::Internal(format!(
                "unbalanced function body ({} values, {} blocks left open)",
                self.stack.len(),
                self.control.len()
            )));
        }

        let cx = self.cx;
        let param_count = cx.signature.arity();
        let mut locals: Vec<ValType> = cx
            .variables
            .names()
            .skip(param_count)
            .map(|name| {
                cx.types
                    .variable(name)
                    .map(ValueType::val_type)
                    .unwrap_or(ValType::I32)
            })
            .collect();
        locals.extend((0..self.temp_count).map(|_| TEMP_LOCAL_TYPE));

        let mut local_names: Vec<String> = cx.variables.names().map(str::to_string).collect();
        local_names.extend((0..self.temp_count).map(|i| format!("tmp{}", i)));

        Ok(GeneratedFunction {
            name: cx.func.display_name().to_string(),
            params: cx.signature.parameters.iter().map(|ty| ty.val_type()).collect(),
            results: vec![cx.signature.return_type.val_type()],
            locals,
            local_names,
            instructions: self.instructions,
        })
    }

    // =========================================================================
    // Coercions
    // =========================================================================

    /// Convert the top of the stack to `to`.
    fn coerce_top(&mut self, to: ValueType) -> Result<(), CompileError> {
        let from = self.pop()?;
        match (from.is_float(), to) {
            (true, ValueType::Boolean) => {
                self.emit(Instruction::F64Const(0.0.into()));
                self.emit(Instruction::F64Ne);
            }
            (true, ValueType::Float64) => {}
            (true, _) => self.emit(Instruction::I32TruncSatF64S),
            (false, ValueType::Float64) => self.emit(Instruction::F64ConvertI32S),
            (false, _) => {}
        }
        self.push(to);
        Ok(())
    }

    /// Lower `expr` as a branch condition: an i32 that is non-zero for true.
    fn lower_condition(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.lower_expr(expr)?;
        if self.top()?.is_float() {
            self.emit(Instruction::F64Const(0.0.into()));
            self.push(ValueType::Float64);
            self.emit_op(Instruction::F64Ne, 2, ValueType::Boolean)?;
        }
        Ok(())
    }

    /// Lower `expr` normalized to exactly 0 or 1.
    fn lower_truthy(&mut self, expr: &Expr) -> Result<(), CompileError> {
        self.lower_expr(expr)?;
        match self.top()? {
            ValueType::Boolean => {}
            ValueType::Float64 => {
                self.emit(Instruction::F64Const(0.0.into()));
                self.push(ValueType::Float64);
                self.emit_op(Instruction::F64Ne, 2, ValueType::Boolean)?;
            }
            _ => {
                self.push_i32(0);
                self.emit_op(Instruction::I32Ne, 2, ValueType::Boolean)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Statement Lowering
    // =========================================================================

    fn lower_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        let depth = self.stack.len();
        self.lower_statement_inner(stmt)?;
        if self.stack.len() != depth {
            return Err(CompileError::Internal(format!(
                "{} left the expression stack at depth {} (expected {})",
                stmt.kind_name(),
                self.stack.len(),
                depth
            )));
        }
        Ok(())
    }

    fn lower_statement_inner(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            // -----------------------------------------------------------------
            // var/let/const: evaluate initializers, store into their slots
            // -----------------------------------------------------------------
            Statement::Variable { declarations, .. } => {
                for decl in declarations {
                    let name = decl.target.as_identifier().ok_or_else(|| {
                        CompileError::PatternDeclarator {
                            function: self.cx.func.display_name().to_string(),
                        }
                    })?;
                    if let Some(init) = &decl.init {
                        let slot = self.slot(name)?;
                        let ty = self.variable_type(name)?;
                        self.lower_expr(init)?;
                        self.coerce_top(ty)?;
                        self.emit(Instruction::LocalSet(slot));
                        self.pop()?;
                    }
                }
                Ok(())
            }

            // -----------------------------------------------------------------
            // Expression statement: assignments/updates store, others drop
            // -----------------------------------------------------------------
            Statement::Expression(expr) => self.lower_effect(expr),

            // -----------------------------------------------------------------
            // Return: coerce to the declared result type
            // -----------------------------------------------------------------
            Statement::Return(arg) => {
                let return_type = self.cx.signature.return_type;
                match arg {
                    Some(expr) => {
                        self.lower_expr(expr)?;
                        self.coerce_top(return_type)?;
                    }
                    None => self.push_zero(return_type),
                }
                self.emit(Instruction::Return);
                self.pop()?;
                Ok(())
            }

            // -----------------------------------------------------------------
            // If/Else: structured `if` with an optional `else` arm
            // -----------------------------------------------------------------
            Statement::If {
                test,
                consequent,
                alternate,
            } => {
                self.lower_condition(test)?;
                self.pop()?;
                self.emit(Instruction::If(BlockType::Empty));
                self.control.push(None);
                self.lower_statement(consequent)?;
                if let Some(alt) = alternate {
                    self.emit(Instruction::Else);
                    self.lower_statement(alt)?;
                }
                self.emit(Instruction::End);
                self.control.pop();
                Ok(())
            }

            Statement::While { test, body } => self.lower_loop(Some(test), body, None),

            // -----------------------------------------------------------------
            // For: init runs once before the loop, update after each body
            // -----------------------------------------------------------------
            Statement::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.lower_statement(init)?;
                }
                self.lower_loop(test.as_ref(), body, update.as_ref())
            }

            Statement::Block(stmts) => {
                for s in stmts {
                    self.lower_statement(s)?;
                }
                Ok(())
            }

            Statement::Empty => Ok(()),

            Statement::Function(func) => Err(CompileError::UnsupportedStatement(format!(
                "nested function declaration `{}`",
                func.display_name()
            ))),
        }
    }

    /// ```text
    /// loop $begin
    ///   block $end
    ///     br_if $end (cond == 0)
    ///     body
    ///     update
    ///     br $begin
    ///   end
    /// end
    /// ```
    fn lower_loop(
        &mut self,
        test: Option<&Expr>,
        body: &Statement,
        update: Option<&Expr>,
    ) -> Result<(), CompileError> {
        let end = self.fresh_label();
        let begin = self.fresh_label();

        self.emit(Instruction::Loop(BlockType::Empty));
        self.control.push(Some(begin.clone()));
        self.emit(Instruction::Block(BlockType::Empty));
        self.control.push(Some(end.clone()));

        if let Some(test) = test {
            self.lower_condition(test)?;
            self.emit_op(Instruction::I32Eqz, 1, ValueType::Boolean)?;
            let depth = self.depth_of(&end)?;
            self.emit(Instruction::BrIf(depth));
            self.pop()?;
        }

        self.lower_statement(body)?;
        if let Some(update) = update {
            self.lower_effect(update)?;
        }

        let depth = self.depth_of(&begin)?;
        self.emit(Instruction::Br(depth));

        self.emit(Instruction::End);
        self.control.pop();
        self.emit(Instruction::End);
        self.control.pop();
        Ok(())
    }

    /// Lower an expression for its side effects only.
    fn lower_effect(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Assign { op, target, value } => self.lower_assign(*op, target, value),
            ExprKind::Update { op, argument, .. } => self.lower_update(*op, argument),
            _ => {
                self.lower_expr(expr)?;
                self.emit(Instruction::Drop);
                self.pop()?;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Stores
    // =========================================================================

    fn lower_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> Result<(), CompileError> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                let slot = self.slot(name)?;
                let ty = self.variable_type(name)?;
                match op.binary_op() {
                    Some(bin) => {
                        self.emit(Instruction::LocalGet(slot));
                        self.push(ty);
                        self.lower_rhs(bin, value)?;
                    }
                    None => {
                        self.lower_expr(value)?;
                    }
                }
                self.coerce_top(ty)?;
                self.emit(Instruction::LocalSet(slot));
                self.pop()?;
                Ok(())
            }
            ExprKind::Member {
                object,
                property: Property::Computed(index),
            } => {
                let element = self.lower_address(object, index)?;
                match op.binary_op() {
                    Some(bin) => {
                        let temp = self.acquire_temp();
                        self.emit(Instruction::LocalTee(temp));
                        self.emit(Instruction::LocalGet(temp));
                        self.push(ValueType::Int32);
                        self.load_element(element)?;
                        self.lower_rhs(bin, value)?;
                        self.release_temp(temp);
                    }
                    None => {
                        self.lower_expr(value)?;
                    }
                }
                self.coerce_top(element)?;
                self.store_element(element)
            }
            _ => Err(CompileError::InvalidAssignmentTarget),
        }
    }

    fn lower_update(&mut self, op: UpdateOp, argument: &Expr) -> Result<(), CompileError> {
        let bin = match op {
            UpdateOp::Increment => BinaryOp::Add,
            UpdateOp::Decrement => BinaryOp::Sub,
        };
        match &argument.kind {
            ExprKind::Identifier(name) => {
                let slot = self.slot(name)?;
                let ty = self.variable_type(name)?;
                self.emit(Instruction::LocalGet(slot));
                self.push(ty);
                self.push_one(ty);
                self.emit_op(arithmetic_instruction(bin, ty.is_float())?, 2, ty)?;
                self.emit(Instruction::LocalSet(slot));
                self.pop()?;
                Ok(())
            }
            ExprKind::Member {
                object,
                property: Property::Computed(index),
            } => {
                let element = self.lower_address(object, index)?;
                let temp = self.acquire_temp();
                self.emit(Instruction::LocalTee(temp));
                self.emit(Instruction::LocalGet(temp));
                self.push(ValueType::Int32);
                self.load_element(element)?;
                self.push_one(element);
                self.emit_op(arithmetic_instruction(bin, element.is_float())?, 2, element)?;
                self.release_temp(temp);
                self.store_element(element)
            }
            _ => Err(CompileError::InvalidAssignmentTarget),
        }
    }

    // =========================================================================
    // Linear Memory Access
    // =========================================================================

    /// Push `base + index * elementSize` and return the element type.
    fn lower_address(&mut self, object: &Expr, index: &Expr) -> Result<ValueType, CompileError> {
        let array = self.lower_expr(object)?;
        self.lower_expr(index)?;
        self.coerce_top(ValueType::Int32)?;
        self.push_i32(array.element_size() as i32);
        self.emit_op(Instruction::I32Mul, 2, ValueType::Int32)?;
        self.emit_op(Instruction::I32Add, 2, ValueType::Int32)?;
        Ok(array.element_type())
    }

    fn load_element(&mut self, element: ValueType) -> Result<(), CompileError> {
        let instr = if element.is_float() {
            Instruction::F64Load(mem_arg(3))
        } else {
            Instruction::I32Load(mem_arg(2))
        };
        self.emit_op(instr, 1, element)
    }

    /// Consumes `[address, value]`.
    fn store_element(&mut self, element: ValueType) -> Result<(), CompileError> {
        self.pop()?;
        self.pop()?;
        self.emit(if element.is_float() {
            Instruction::F64Store(mem_arg(3))
        } else {
            Instruction::I32Store(mem_arg(2))
        });
        Ok(())
    }

    // =========================================================================
    // Expression Lowering
    // =========================================================================

    /// Lower `expr`, leaving exactly one value on the stack. Returns its type.
    fn lower_expr(&mut self, expr: &Expr) -> Result<ValueType, CompileError> {
        match &expr.kind {
            ExprKind::Number(value) => {
                let ty = self.expr_type(expr)?;
                if ty.is_float() {
                    self.emit(Instruction::F64Const((*value).into()));
                } else {
                    self.emit(Instruction::I32Const(*value as i32));
                }
                self.push(ty);
            }

            ExprKind::Boolean(value) => {
                self.emit(Instruction::I32Const(*value as i32));
                self.push(ValueType::Boolean);
            }

            ExprKind::Identifier(name) => {
                let slot = self.slot(name)?;
                let ty = self.expr_type(expr)?;
                self.emit(Instruction::LocalGet(slot));
                self.push(ty);
            }

            ExprKind::Unary { op, argument } => match op {
                UnaryOp::Not => {
                    self.lower_condition(argument)?;
                    self.emit_op(Instruction::I32Eqz, 1, ValueType::Boolean)?;
                }
                UnaryOp::Minus => {
                    if self.expr_type(argument)?.is_float() {
                        self.lower_expr(argument)?;
                        self.emit_op(Instruction::F64Neg, 1, ValueType::Float64)?;
                    } else {
                        self.push_i32(0);
                        self.lower_expr(argument)?;
                        self.coerce_top(ValueType::Int32)?;
                        self.emit_op(Instruction::I32Sub, 2, ValueType::Int32)?;
                    }
                }
                UnaryOp::Plus => {
                    let ty = self.lower_expr(argument)?;
                    let numeric = if ty.is_float() {
                        ValueType::Float64
                    } else {
                        ValueType::Int32
                    };
                    self.coerce_top(numeric)?;
                }
            },

            ExprKind::Binary { op, left, right } => {
                self.lower_expr(left)?;
                self.lower_rhs(*op, right)?;
            }

            // -----------------------------------------------------------------
            // Logical: both sides always evaluated, left first, then `select`
            //   a && b  →  select(b, 0, a)
            //   a || b  →  select(1, b, a)
            // -----------------------------------------------------------------
            ExprKind::Logical { op, left, right } => {
                self.lower_truthy(left)?;
                let temp = self.acquire_temp();
                self.emit(Instruction::LocalSet(temp));
                self.pop()?;
                match op {
                    LogicalOp::And => {
                        self.lower_truthy(right)?;
                        self.push_i32(0);
                    }
                    LogicalOp::Or => {
                        self.push_i32(1);
                        self.lower_truthy(right)?;
                    }
                }
                self.emit(Instruction::LocalGet(temp));
                self.push(ValueType::Boolean);
                self.release_temp(temp);
                self.emit_op(Instruction::Select, 3, ValueType::Boolean)?;
            }

            ExprKind::Member { object, property } => match property {
                Property::Computed(index) => {
                    let element = self.lower_address(object, index)?;
                    self.load_element(element)?;
                }
                // The length header sits one element width before the payload.
                Property::Named(name) if name == "length" => {
                    let array = self.lower_expr(object)?;
                    self.push_i32(array.element_size() as i32);
                    self.emit_op(Instruction::I32Sub, 2, ValueType::Int32)?;
                    self.emit_op(Instruction::I32Load(mem_arg(2)), 1, ValueType::Int32)?;
                }
                Property::Named(name) => return Err(CompileError::UnknownProperty(name.clone())),
            },

            ExprKind::Call { callee, arguments } => {
                let name = callee.as_identifier().ok_or_else(|| {
                    CompileError::UnsupportedExpression(format!(
                        "call through a {}",
                        callee.kind.kind_name()
                    ))
                })?;
                let index = *self
                    .cx
                    .function_indices
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownFunction(name.to_string()))?;
                let signature = self.cx.signatures.require(name)?;
                if signature.arity() != arguments.len() {
                    return Err(CompileError::CallArity {
                        callee: name.to_string(),
                        expected: signature.arity(),
                        found: arguments.len(),
                    });
                }
                for (arg, param) in arguments.iter().zip(&signature.parameters) {
                    self.lower_expr(arg)?;
                    self.coerce_top(*param)?;
                }
                self.emit_op(Instruction::Call(index), arguments.len(), signature.return_type)?;
            }

            ExprKind::Array(_) => {
                return Err(CompileError::UnsupportedExpression(
                    "array literal".to_string(),
                ))
            }

            ExprKind::Assign { .. } | ExprKind::Update { .. } => {
                return Err(CompileError::UnsupportedExpression(format!(
                    "{} used as a value",
                    expr.kind.kind_name()
                )))
            }
        }
        self.top()
    }

    /// With the left operand already on the stack, lower `right` and apply
    /// `op`. Mixed operands are promoted to f64.
    fn lower_rhs(&mut self, op: BinaryOp, right: &Expr) -> Result<(), CompileError> {
        let left_ty = self.top()?;
        let right_ty = self.expr_type(right)?;
        let float = left_ty.is_float() || right_ty.is_float();
        let operand = if float {
            ValueType::Float64
        } else {
            ValueType::Int32
        };

        let (instr, result) = if op.is_comparison() {
            (comparison_instruction(op, float), ValueType::Boolean)
        } else {
            (arithmetic_instruction(op, float)?, operand)
        };

        self.coerce_top(operand)?;
        self.lower_expr(right)?;
        self.coerce_top(operand)?;
        self.emit_op(instr, 2, result)
    }
}

// =============================================================================
// Instruction Selection
// =============================================================================

fn mem_arg(align: u32) -> MemArg {
    MemArg {
        offset: 0,
        align,
        memory_index: 0,
    }
}

fn arithmetic_instruction(op: BinaryOp, float: bool) -> Result<Instruction<'static>, CompileError> {
    let instr = match (op, float) {
        (BinaryOp::Add, false) => Instruction::I32Add,
        (BinaryOp::Sub, false) => Instruction::I32Sub,
        (BinaryOp::Mul, false) => Instruction::I32Mul,
        (BinaryOp::Div, false) => Instruction::I32DivS,
        (BinaryOp::Rem, false) => Instruction::I32RemS,
        (BinaryOp::Add, true) => Instruction::F64Add,
        (BinaryOp::Sub, true) => Instruction::F64Sub,
        (BinaryOp::Mul, true) => Instruction::F64Mul,
        (BinaryOp::Div, true) => Instruction::F64Div,
        (BinaryOp::Rem, true) => {
            return Err(CompileError::unsupported_operator_for(op, "on double operands"))
        }
        _ => return Err(CompileError::unsupported_operator(op)),
    };
    Ok(instr)
}

fn comparison_instruction(op: BinaryOp, float: bool) -> Instruction<'static> {
    match (op, float) {
        (BinaryOp::Lt, false) => Instruction::I32LtS,
        (BinaryOp::Le, false) => Instruction::I32LeS,
        (BinaryOp::Gt, false) => Instruction::I32GtS,
        (BinaryOp::Ge, false) => Instruction::I32GeS,
        (BinaryOp::Eq, false) => Instruction::I32Eq,
        (BinaryOp::Ne, false) => Instruction::I32Ne,
        (BinaryOp::Lt, true) => Instruction::F64Lt,
        (BinaryOp::Le, true) => Instruction::F64Le,
        (BinaryOp::Gt, true) => Instruction::F64Gt,
        (BinaryOp::Ge, true) => Instruction::F64Ge,
        (BinaryOp::Eq, true) => Instruction::F64Eq,
        (_, true) => Instruction::F64Ne,
        (_, false) => Instruction::I32Ne,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::resolve_declarations;
    use crate::inference::infer_types;
    use crate::parser::parse_source;
    use crate::signatures::derive_signatures;

    fn generate_with(
        source: &str,
        signatures: FunctionSignatures,
    ) -> Result<Vec<GeneratedFunction>, CompileError> {
        let program = parse_source(source, "test.js").unwrap();
        let function_indices: HashMap<String, u32> = program
            .functions()
            .enumerate()
            .map(|(i, f)| (f.display_name().to_string(), i as u32))
            .collect();
        program
            .functions()
            .map(|func| {
                let signature = signatures.require(func.display_name())?;
                let variables = resolve_declarations(func)?.merged();
                let types = infer_types(func, signature, &signatures)?;
                generate_function(&FunctionContext {
                    func,
                    signature,
                    signatures: &signatures,
                    variables: &variables,
                    types: &types,
                    function_indices: &function_indices,
                })
            })
            .collect()
    }

    fn generate(source: &str) -> Result<Vec<GeneratedFunction>, CompileError> {
        let program = parse_source(source, "test.js").unwrap();
        generate_with(source, derive_signatures(&program))
    }

    fn listing(func: &GeneratedFunction) -> Vec<String> {
        func.instructions.iter().map(|i| format!("{:?}", i)).collect()
    }

    #[test]
    fn test_compile_logical_and_uses_select() {
        let funcs = generate("function f(a, b): boolean { return a < b && b < 10; }").unwrap();
        assert_eq!(
            listing(&funcs[0]),
            vec![
                "LocalGet(0)",
                "LocalGet(1)",
                "I32LtS",
                "LocalSet(2)",
                "LocalGet(1)",
                "I32Const(10)",
                "I32LtS",
                "I32Const(0)",
                "LocalGet(2)",
                "Select",
                "Return",
                "I32Const(0)",
                "End",
            ]
        );
        // One scratch local for the left operand
        assert_eq!(funcs[0].locals, vec![ValType::I32]);
        assert_eq!(funcs[0].local_names, vec!["a", "b", "tmp0"]);
    }

    #[test]
    fn test_compile_while_loop_shape() {
        let funcs = generate(
            "function f(n) { var s = 0; while (n > 0) { s += n; n--; } return s; }",
        )
        .unwrap();
        let code = listing(&funcs[0]);
        let start = code.iter().position(|i| i == "Loop(Empty)").unwrap();
        assert_eq!(code[start + 1], "Block(Empty)");
        assert_eq!(
            &code[start + 2..start + 7],
            &["LocalGet(0)", "I32Const(0)", "I32GtS", "I32Eqz", "BrIf(0)"]
        );
        let br = code.iter().position(|i| i == "Br(1)").unwrap();
        assert_eq!(&code[br + 1..br + 3], &["End", "End"]);
        assert_eq!(funcs[0].locals, vec![ValType::I32]);
    }

    #[test]
    fn test_compile_nested_loops_resolve_depths() {
        let funcs = generate(
            "function f(n) { var t = 0; for (var i = 0; i < n; i++) { for (var j = 0; j < i; j++) { if (j > 2) { t += 1; } } } return t; }",
        )
        .unwrap();
        let code = listing(&funcs[0]);
        assert_eq!(code.iter().filter(|i| *i == "BrIf(0)").count(), 2);
        assert_eq!(code.iter().filter(|i| *i == "Br(1)").count(), 2);
        assert_eq!(code.iter().filter(|i| *i == "If(Empty)").count(), 1);
    }

    #[test]
    fn test_compile_array_access() {
        let funcs = generate("function f(a, i) { a[i] += 42; return a.length; }").unwrap();
        let code = listing(&funcs[0]);
        assert!(code.contains(&"LocalTee(2)".to_string()), "{:?}", code);
        assert!(code.iter().any(|i| i.starts_with("I32Store")));
        // length: load at base - 4
        let tail: Vec<&str> = code[code.len() - 7..].iter().map(String::as_str).collect();
        assert_eq!(&tail[..3], &["LocalGet(0)", "I32Const(4)", "I32Sub"]);
        assert!(tail[3].starts_with("I32Load"));
    }

    #[test]
    fn test_compile_float_array_and_promotion() {
        let funcs = generate(
            "function f(xs: double[], n: int): double { var s = 0.5; s = s + xs[n] * n; return s; }",
        )
        .unwrap();
        let code = listing(&funcs[0]);
        assert!(code.contains(&"I32Const(8)".to_string()));
        assert!(code.iter().any(|i| i.starts_with("F64Load")));
        assert!(code.contains(&"F64ConvertI32S".to_string()));
        assert_eq!(funcs[0].locals, vec![ValType::F64]);
        assert_eq!(funcs[0].results, vec![ValType::F64]);
    }

    #[test]
    fn test_compile_return_coercion() {
        let funcs = generate("function f(x: double): int { return x; }").unwrap();
        let code = listing(&funcs[0]);
        assert_eq!(&code[..3], &["LocalGet(0)", "I32TruncSatF64S", "Return"]);
    }

    #[test]
    fn test_compile_unary_minus_and_not() {
        let funcs = generate("function f(x): boolean { return !(-x == 3); }").unwrap();
        let code = listing(&funcs[0]);
        assert_eq!(
            &code[..6],
            &["I32Const(0)", "LocalGet(0)", "I32Sub", "I32Const(3)", "I32Eq", "I32Eqz"]
        );
    }

    #[test]
    fn test_compile_call_coerces_arguments() {
        let funcs = generate(
            "function f(n) { return half(n); } function half(x: double): double { return x / 2; }",
        )
        .unwrap();
        let code = listing(&funcs[0]);
        assert_eq!(
            &code[..4],
            &["LocalGet(0)", "F64ConvertI32S", "Call(1)", "I32TruncSatF64S"]
        );
    }

    #[test]
    fn test_float_remainder_rejected() {
        let err = generate("function f(x: double): double { return x % 2; }").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"unsupported operator `%` on double operands");
    }

    #[test]
    fn test_call_arity_mismatch() {
        let err = generate("function f(a) { return g(a, 1); } function g(x) { return x; }")
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::CallArity {
                callee: "g".to_string(),
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_unknown_function() {
        let sigs = FunctionSignatures::new()
            .with("f", FunctionSignature::new(vec![ValueType::Int32], ValueType::Int32))
            .with("ext", FunctionSignature::new(vec![ValueType::Int32], ValueType::Int32));
        let err = generate_with("function f(a) { return ext(a); }", sigs).unwrap_err();
        assert_eq!(err, CompileError::UnknownFunction("ext".to_string()));
    }

    #[test]
    fn test_typed_variable_without_slot() {
        let program = parse_source("function f(a) { return a; }", "test.js").unwrap();
        let sigs = derive_signatures(&program);
        let func = program.functions().next().unwrap();
        let signature = sigs.require("f").unwrap();
        let types = infer_types(func, signature, &sigs).unwrap();
        let err = generate_function(&FunctionContext {
            func,
            signature,
            signatures: &sigs,
            variables: &VariableMapping::default(),
            types: &types,
            function_indices: &HashMap::new(),
        })
        .unwrap_err();
        assert_eq!(err, CompileError::UnresolvedSlot("a".to_string()));

        let err = generate_function(&FunctionContext {
            func,
            signature,
            signatures: &sigs,
            variables: &VariableMapping::default(),
            types: &FunctionTypes::default(),
            function_indices: &HashMap::new(),
        })
        .unwrap_err();
        assert_eq!(err, CompileError::UnknownIdentifier("a".to_string()));
    }

    #[test]
    fn test_invalid_assignment_targets() {
        let err = generate("function f(a) { a.length = 3; return 0; }").unwrap_err();
        assert_eq!(err, CompileError::InvalidAssignmentTarget);
        let err = generate("function f(a) { f(a) = 3; return 0; }").unwrap_err();
        assert_eq!(err, CompileError::InvalidAssignmentTarget);
    }

    #[test]
    fn test_assignment_used_as_value_rejected() {
        let err = generate("function f(a) { var b = (a = 2); return b; }").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"unsupported expression: assignment expression used as a value");
    }

    #[test]
    fn test_array_literal_rejected() {
        let err = generate("function f(a) { var b = [1, 2]; return a; }").unwrap_err();
        assert_eq!(err, CompileError::UnsupportedExpression("array literal".to_string()));
    }

    #[test]
    fn test_nested_function_rejected() {
        let err = generate("function f(a) { function g() { return 1; } return a; }").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedStatement(_)), "got {:?}", err);
    }

    #[test]
    fn test_module_body_encodes() {
        let funcs = generate("function f(a, b) { return a + b; }").unwrap();
        let body = funcs[0].encode_body();
        // locals vector (0 groups) + local.get 0 + local.get 1 + i32.add + return + i32.const 0 + end
        assert!(body.byte_len() > 0);
    }
}
