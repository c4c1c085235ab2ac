use addnmult::{codegen::CodeGen, compile, jit, CompileError};
use inkwell::context::Context as LlvmContext;

/// Compile `src` in a fresh context and evaluate the resulting function.
pub fn compile_and_run(src: &str) -> Result<u64, CompileError> {
    let ctx = LlvmContext::create();
    let mut cg = CodeGen::new(&ctx, "test");
    let function = compile(&mut cg, src)?;
    let name = function.get_name().to_string_lossy().into_owned();
    Ok(jit::evaluate(cg.module(), &name).expect("jit evaluation"))
}

/// Compile `src` and return the module's textual IR.
#[allow(dead_code)]
pub fn compile_to_ir(src: &str) -> Result<String, CompileError> {
    let ctx = LlvmContext::create();
    let mut cg = CodeGen::new(&ctx, "test");
    compile(&mut cg, src)?;
    Ok(cg.print_ir())
}
