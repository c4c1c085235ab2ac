//! Run an emitted function in-process through LLVM's JIT.

use inkwell::{
    execution_engine::ExecutionEngine,
    module::Module,
    targets::{InitializationConfig, Target},
    OptimizationLevel,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum JitError {
    #[error("native target unavailable: {0}")]
    Target(String),
    #[error("failed to create execution engine: {0}")]
    Engine(String),
    #[error("function `{name}` not found: {reason}")]
    Lookup { name: String, reason: String },
}

type EntryFn = unsafe extern "C" fn() -> u64;

/// Call the zero-argument `i64` function `function_name` defined in `module`.
///
/// The engine runs over a clone, so the caller's module stays usable (and
/// can be evaluated again).
pub fn evaluate(module: &Module<'_>, function_name: &str) -> Result<u64, JitError> {
    Target::initialize_native(&InitializationConfig::default()).map_err(JitError::Target)?;
    ExecutionEngine::link_in_mc_jit();

    let module = module.clone();
    let engine = module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|e| JitError::Engine(e.to_string()))?;

    // SAFETY: every function produced by `CodeGen::emit` has type `i64 ()`.
    let entry = unsafe { engine.get_function::<EntryFn>(function_name) }.map_err(|e| {
        JitError::Lookup {
            name: function_name.to_string(),
            reason: e.to_string(),
        }
    })?;
    let result = unsafe { entry.call() };
    debug!(function = function_name, result, "evaluated");
    Ok(result)
}
