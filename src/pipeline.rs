//! The full source-to-IR pipeline: lex, parse, analyze, emit.

use inkwell::values::FunctionValue;
use tracing::{info, info_span};

use crate::ast::Program;
use crate::codegen::CodeGen;
use crate::error::CompileError;
use crate::parser;
use crate::sema::Analyzer;

/// Parse and semantically check `source` without generating code.
pub fn parse_source(source: &str) -> Result<Program, CompileError> {
    let program = info_span!("parse").in_scope(|| parser::parse(source))?;
    info!(statements = program.stmts.len(), "parsed");

    info_span!("analyze").in_scope(|| Analyzer::new().analyze(&program))?;
    info!("semantic analysis passed");
    Ok(program)
}

/// Compile `source` into a verified function inside `codegen`'s module.
pub fn compile<'ctx>(
    codegen: &mut CodeGen<'ctx>,
    source: &str,
) -> Result<FunctionValue<'ctx>, CompileError> {
    let result = parse_source(source).and_then(|program| {
        info_span!("codegen")
            .in_scope(|| codegen.emit(&program))
            .map_err(CompileError::from)
    });
    result.map_err(CompileError::logged)
}
