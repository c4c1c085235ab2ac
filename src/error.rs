use thiserror::Error;
use tracing::debug;

use crate::codegen::CodegenError;
use crate::parser::ParseError;
use crate::sema::SemanticError;

/// Failure of any compilation phase. Each phase stops at its first error.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("semantic error: {0}")]
    Semantic(#[from] SemanticError),
    #[error("codegen failed: {0}")]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    /// Short classification string used for logging.
    pub fn category(&self) -> &'static str {
        match self {
            CompileError::Parse(_) => "parse",
            CompileError::Semantic(_) => "semantic",
            CompileError::Codegen(_) => "codegen",
        }
    }

    /// Record the error with its phase attached and hand it back. Reporting
    /// to the user is left to the caller.
    pub fn logged(self) -> Self {
        debug!(category = %self.category(), error = ?self, message = %self, "compilation failed");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_the_phase() {
        let parse: CompileError = ParseError::Expected {
            expected: "'='",
            found: crate::lexer::TokenKind::Eof,
        }
        .into();
        assert_eq!(parse.category(), "parse");
        assert_eq!(parse.to_string(), "parse error: expected '=', found end of input");

        let sema: CompileError = SemanticError::UndeclaredVariable("q".into()).into();
        assert_eq!(sema.category(), "semantic");

        let cg: CompileError = CodegenError::UnresolvedReference("q".into()).into();
        assert_eq!(cg.category(), "codegen");
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn log_output(level: tracing::Level) -> String {
        let captured = Captured::default();
        let sink = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(move || sink.clone())
            .finish();
        let err: CompileError = SemanticError::Redeclaration("x".into()).into();
        let err = tracing::subscriber::with_default(subscriber, || err.logged());
        assert_eq!(err.category(), "semantic");
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn failure_record_is_quiet_at_default_level() {
        assert!(log_output(tracing::Level::WARN).is_empty());
        assert!(log_output(tracing::Level::DEBUG).contains("compilation failed"));
    }
}
