//! LLVM IR generation for AddNMult programs using Inkwell.
//!
//! A program lowers to a single `i64 ()` function. Booleans share the `i64`
//! domain as 0/1, every variable lives in a stack slot, and `if` statements are
//! split into `then` / `else` / `ifcont` blocks.

use std::collections::HashMap;
use std::path::Path;

use inkwell::{
    basic_block::BasicBlock,
    builder::{Builder, BuilderError},
    context::Context as LlvmContext,
    module::Module,
    targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple},
    types::IntType,
    values::{FunctionValue, IntValue, PointerValue},
    IntPredicate, OptimizationLevel,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ast::{BinOp, Expr, Program, Stmt};

pub const DEFAULT_MODULE_NAME: &str = "addNMult";
pub const DEFAULT_FUNCTION_NAME: &str = "addNMult";

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("unbound variable `{0}`")]
    UnresolvedReference(String),
    #[error("function `{function}` failed verification: {detail}")]
    VerificationFailed { function: String, detail: String },
    #[error("ir builder error: {0}")]
    Builder(#[from] BuilderError),
    #[error("target error: {0}")]
    Target(String),
    #[error("write error: {0}")]
    Io(String),
}

/// Builds one function per `emit` call into a module it owns.
///
/// The variable-to-slot map is reset on every `emit`, so one generator can
/// lower several independent programs in sequence (never concurrently).
pub struct CodeGen<'ctx> {
    ctx: &'ctx LlvmContext,
    builder: Builder<'ctx>,
    module: Module<'ctx>,
    function_name: String,
    slots: HashMap<String, PointerValue<'ctx>>,
}

impl<'ctx> CodeGen<'ctx> {
    pub fn new(ctx: &'ctx LlvmContext, module_name: &str) -> Self {
        let module = ctx.create_module(module_name);
        let builder = ctx.create_builder();
        Self {
            ctx,
            builder,
            module,
            function_name: DEFAULT_FUNCTION_NAME.to_string(),
            slots: HashMap::new(),
        }
    }

    /// Name given to functions produced by subsequent `emit` calls.
    pub fn with_function_name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    fn i64_type(&self) -> IntType<'ctx> {
        self.ctx.i64_type()
    }

    /// Lower `program` into a new function and verify it.
    ///
    /// On any failure the half-built function is removed from the module, so
    /// callers never observe partial IR.
    pub fn emit(&mut self, program: &Program) -> Result<FunctionValue<'ctx>, CodegenError> {
        self.slots.clear();

        let fn_type = self.i64_type().fn_type(&[], false);
        let function = self.module.add_function(&self.function_name, fn_type, None);
        let entry = self.ctx.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);

        let lowered = program
            .stmts
            .iter()
            .try_for_each(|stmt| self.emit_stmt(stmt, function));
        if let Err(err) = lowered {
            self.discard(function, &err);
            return Err(err);
        }

        if !function.verify(false) {
            let detail = match self.module.verify() {
                Err(msg) => msg.to_string(),
                Ok(()) => String::from("invalid function"),
            };
            let err = CodegenError::VerificationFailed {
                function: self.function_name.clone(),
                detail,
            };
            self.discard(function, &err);
            return Err(err);
        }

        info!(
            function = %function.get_name().to_string_lossy(),
            blocks = function.count_basic_blocks(),
            "emitted function"
        );
        Ok(function)
    }

    fn discard(&mut self, function: FunctionValue<'ctx>, err: &CodegenError) {
        warn!(function = %self.function_name, error = %err, "discarding partially built function");
        self.builder.clear_insertion_position();
        self.slots.clear();
        // SAFETY: the function was created by this `emit` call and no handle to
        // it escapes when lowering fails.
        unsafe { function.delete() };
    }

    fn emit_stmt(&mut self, stmt: &Stmt, function: FunctionValue<'ctx>) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Let { name, init } => {
                debug!(name = %name, "lowering let");
                let slot = self.builder.build_alloca(self.i64_type(), name)?;
                // a later `let` of the same name (sibling branch) rebinds to a fresh slot
                self.slots.insert(name.clone(), slot);
                let value = self.emit_expr(init)?;
                self.builder.build_store(slot, value)?;
            }
            Stmt::Set { name, value } => {
                debug!(name = %name, "lowering set");
                let slot = self.slot(name)?;
                let value = self.emit_expr(value)?;
                self.builder.build_store(slot, value)?;
            }
            Stmt::Return { value } => {
                let value = self.emit_expr(value)?;
                self.builder.build_return(Some(&value))?;
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => self.emit_if(cond, then_body, else_body, function)?,
        }
        Ok(())
    }

    fn emit_if(
        &mut self,
        cond: &Expr,
        then_body: &[Stmt],
        else_body: &[Stmt],
        function: FunctionValue<'ctx>,
    ) -> Result<(), CodegenError> {
        let value = self.emit_expr(cond)?;
        let zero = self.i64_type().const_zero();
        let cond = self
            .builder
            .build_int_compare(IntPredicate::NE, value, zero, "ifcond")?;

        let then_bb = self.ctx.append_basic_block(function, "then");
        let else_bb = if else_body.is_empty() {
            None
        } else {
            Some(self.ctx.append_basic_block(function, "else"))
        };
        let merge_bb = self.ctx.append_basic_block(function, "ifcont");

        self.builder
            .build_conditional_branch(cond, then_bb, else_bb.unwrap_or(merge_bb))?;

        self.emit_branch(then_bb, then_body, merge_bb, function)?;
        if let Some(else_bb) = else_bb {
            self.emit_branch(else_bb, else_body, merge_bb, function)?;
        }

        self.builder.position_at_end(merge_bb);
        Ok(())
    }

    /// Lower `body` starting at `block`, falling through to `merge` unless the
    /// block we end up in already has a terminator.
    fn emit_branch(
        &mut self,
        block: BasicBlock<'ctx>,
        body: &[Stmt],
        merge: BasicBlock<'ctx>,
        function: FunctionValue<'ctx>,
    ) -> Result<(), CodegenError> {
        self.builder.position_at_end(block);
        for stmt in body {
            self.emit_stmt(stmt, function)?;
        }
        if !self.current_block_terminated() {
            self.builder.build_unconditional_branch(merge)?;
        }
        Ok(())
    }

    fn current_block_terminated(&self) -> bool {
        self.builder
            .get_insert_block()
            .and_then(|bb| bb.get_terminator())
            .is_some()
    }

    fn slot(&self, name: &str) -> Result<PointerValue<'ctx>, CodegenError> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::UnresolvedReference(name.to_string()))
    }

    /// Lower an expression to an `i64` value.
    fn emit_expr(&mut self, expr: &Expr) -> Result<IntValue<'ctx>, CodegenError> {
        let i64_t = self.i64_type();

        Ok(match expr {
            Expr::Number(v) => i64_t.const_int(*v, false),
            Expr::Bool(b) => i64_t.const_int(u64::from(*b), false),
            Expr::Var(name) => {
                let slot = self.slot(name)?;
                self.builder.build_load(slot, name)?.into_int_value()
            }
            Expr::Binary { op, lhs, rhs } => {
                // operands left-to-right
                let l = self.emit_expr(lhs)?;
                let r = self.emit_expr(rhs)?;
                debug!(op = %op, "lowering binary");
                match op {
                    BinOp::Add => self.builder.build_int_add(l, r, "addval")?,
                    BinOp::Mul => self.builder.build_int_mul(l, r, "mulval")?,
                    BinOp::Equal => {
                        let cmp = self.builder.build_int_compare(IntPredicate::EQ, l, r, "eq")?;
                        self.builder.build_int_z_extend(cmp, i64_t, "cmpeq")?
                    }
                    BinOp::NotEqual => {
                        let cmp = self.builder.build_int_compare(IntPredicate::NE, l, r, "ne")?;
                        self.builder.build_int_z_extend(cmp, i64_t, "cmpne")?
                    }
                }
            }
        })
    }

    /// Write the module as textual IR.
    pub fn write_ir(&self, out: &Path) -> Result<(), CodegenError> {
        self.module
            .print_to_file(out)
            .map_err(|e| CodegenError::Io(e.to_string()))
    }

    /// Emit a native object file for `triple`, tuned for the host CPU.
    pub fn write_object(&self, triple: &TargetTriple, out_obj: &Path) -> Result<(), CodegenError> {
        let machine = target_machine(triple)?;
        self.module.set_triple(triple);
        self.module.set_data_layout(&machine.get_target_data().get_data_layout());
        machine
            .write_to_file(&self.module, FileType::Object, out_obj)
            .map_err(|e| CodegenError::Io(e.to_string()))?;
        info!(path = %out_obj.display(), "wrote object file");
        Ok(())
    }
}

fn target_machine(triple: &TargetTriple) -> Result<TargetMachine, CodegenError> {
    Target::initialize_native(&InitializationConfig::default()).map_err(CodegenError::Target)?;
    let target = Target::from_triple(triple).map_err(|e| CodegenError::Target(e.to_string()))?;
    let cpu = TargetMachine::get_host_cpu_name().to_string();
    let features = TargetMachine::get_host_cpu_features().to_string();
    target
        .create_target_machine(
            triple,
            &cpu,
            &features,
            OptimizationLevel::Default,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| CodegenError::Target(format!("no target machine for {}", triple.as_str().to_string_lossy())))
}

/// Grab the default target triple for the build machine.
pub fn host_triple() -> TargetTriple {
    TargetMachine::get_default_triple()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn lower<'ctx>(cg: &mut CodeGen<'ctx>, src: &str) -> Result<FunctionValue<'ctx>, CodegenError> {
        let program = parse(src).expect("parse");
        cg.emit(&program)
    }

    fn block_names(function: FunctionValue<'_>) -> Vec<String> {
        function
            .get_basic_blocks()
            .iter()
            .map(|bb| bb.get_name().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn straight_line_program_has_single_block() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let f = lower(&mut cg, "let x = 1\nset x = x + 41\nreturn x == 42").unwrap();
        assert_eq!(block_names(f), vec!["entry"]);
        assert_eq!(f.count_params(), 0);
        let ir = cg.print_ir();
        assert!(ir.contains("define i64 @addNMult()"));
        assert!(ir.contains("icmp eq i64"));
        assert!(ir.contains("zext i1"));
    }

    #[test]
    fn if_else_creates_then_else_and_merge() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let f = lower(
            &mut cg,
            "let x = 2 + 2\nif x == 4 { set x = 2 } else { set x = 1 }\nreturn x",
        )
        .unwrap();
        assert_eq!(block_names(f), vec!["entry", "then", "else", "ifcont"]);
    }

    #[test]
    fn if_without_else_branches_straight_to_merge() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let f = lower(&mut cg, "let x = 0\nif true { set x = 7 }\nreturn x").unwrap();
        assert_eq!(block_names(f), vec!["entry", "then", "ifcont"]);
    }

    #[test]
    fn returning_branch_gets_no_extra_terminator() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let f = lower(&mut cg, "let x = 3\nif x == 3 { return 10 }\nreturn x").unwrap();
        let then_bb = f.get_basic_blocks()[1];
        let term = then_bb.get_terminator().expect("then terminator");
        assert_eq!(term.get_opcode(), inkwell::values::InstructionOpcode::Return);
        // exactly one terminator: the return is also the last instruction
        assert_eq!(then_bb.get_last_instruction(), Some(term));
    }

    #[test]
    fn missing_return_fails_verification_and_is_discarded() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let err = lower(&mut cg, "let x = 1").unwrap_err();
        assert!(matches!(err, CodegenError::VerificationFailed { .. }));
        assert!(cg.module().get_function(DEFAULT_FUNCTION_NAME).is_none());
    }

    #[test]
    fn both_branches_returning_leave_merge_unterminated() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let err = lower(&mut cg, "if true { return 1 } else { return 2 }").unwrap_err();
        assert!(matches!(err, CodegenError::VerificationFailed { .. }));
    }

    #[test]
    fn unbound_variable_is_reported_and_discarded() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let err = lower(&mut cg, "return ghost").unwrap_err();
        assert!(matches!(err, CodegenError::UnresolvedReference(ref n) if n == "ghost"));
        assert!(cg.module().get_first_function().is_none());

        let err = lower(&mut cg, "set ghost = 1\nreturn 0").unwrap_err();
        assert!(matches!(err, CodegenError::UnresolvedReference(_)));
    }

    #[test]
    fn slots_do_not_survive_between_emits() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME).with_function_name("prog");
        lower(&mut cg, "let x = 1\nreturn x").unwrap();
        let err = lower(&mut cg, "return x").unwrap_err();
        assert!(matches!(err, CodegenError::UnresolvedReference(_)));
        assert!(cg.module().get_function("prog").is_some());
    }

    #[test]
    fn returning_else_branch_gets_no_extra_terminator() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        let f = lower(&mut cg, "let x = 1\nif x == 2 { set x = 5 } else { return 7 }\nreturn x").unwrap();
        assert_eq!(block_names(f), vec!["entry", "then", "else", "ifcont"]);

        let blocks = f.get_basic_blocks();
        let else_term = blocks[2].get_terminator().expect("else terminator");
        assert_eq!(else_term.get_opcode(), inkwell::values::InstructionOpcode::Return);
        assert_eq!(blocks[2].get_last_instruction(), Some(else_term));

        let then_term = blocks[1].get_terminator().expect("then terminator");
        assert_eq!(then_term.get_opcode(), inkwell::values::InstructionOpcode::Br);
    }

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("addnmult-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn writes_textual_ir_and_object_files() {
        let ctx = LlvmContext::create();
        let mut cg = CodeGen::new(&ctx, DEFAULT_MODULE_NAME);
        lower(&mut cg, "let x = 6\nreturn x * 7").unwrap();

        let dir = scratch_dir("codegen-writers");
        let ll = dir.join("out.ll");
        let obj = dir.join("out.o");
        cg.write_ir(&ll).unwrap();
        cg.write_object(&host_triple(), &obj).unwrap();

        let text = std::fs::read_to_string(&ll).unwrap();
        assert!(text.contains("define i64 @addNMult()"));
        assert!(std::fs::metadata(&obj).unwrap().len() > 0);
        std::fs::remove_dir_all(&dir).ok();
    }
}
