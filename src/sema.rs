//! Scope and definite-assignment checks over a parsed program.
//!
//! Each scope maps a variable to `Declared` or `Initialized`. Declaring a name
//! that exists in *any* active scope is a redeclaration, so an `if` block can
//! never shadow a variable of an enclosing block. Analysis stops at the first
//! violation.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::ast::{Expr, Program, Stmt};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    #[error("redeclaration of '{0}'")]
    Redeclaration(String),
    #[error("use of undeclared variable '{0}'")]
    UndeclaredVariable(String),
    #[error("use of variable '{0}' before an assignment")]
    UseBeforeInit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarState {
    Declared,
    Initialized,
}

#[derive(Debug, Default)]
pub struct Analyzer {
    scopes: Vec<HashMap<String, VarState>>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check every statement of `program`, failing on the first violation.
    pub fn analyze(&mut self, program: &Program) -> Result<(), SemanticError> {
        self.scopes.clear();
        self.analyze_block(&program.stmts)
    }

    /// Run `stmts` inside a fresh scope that is popped whether or not they pass.
    fn analyze_block(&mut self, stmts: &[Stmt]) -> Result<(), SemanticError> {
        self.push_scope();
        let result = stmts.iter().try_for_each(|stmt| self.analyze_stmt(stmt));
        self.pop_scope();
        result
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
        debug!(depth = self.scopes.len(), "enter scope");
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
        debug!(depth = self.scopes.len(), "leave scope");
    }

    fn declare(&mut self, name: &str) -> Result<(), SemanticError> {
        if self.scopes.iter().any(|scope| scope.contains_key(name)) {
            debug!(name, "redeclaration");
            return Err(SemanticError::Redeclaration(name.to_string()));
        }
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), VarState::Declared);
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<VarState> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn is_declared(&self, name: &str) -> Result<(), SemanticError> {
        match self.lookup(name) {
            Some(_) => Ok(()),
            None => {
                debug!(name, "undeclared variable");
                Err(SemanticError::UndeclaredVariable(name.to_string()))
            }
        }
    }

    fn set_initialized(&mut self, name: &str) -> Result<(), SemanticError> {
        let state = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
            .ok_or_else(|| SemanticError::UndeclaredVariable(name.to_string()))?;
        *state = VarState::Initialized;
        Ok(())
    }

    fn check_var_use(&self, name: &str) -> Result<(), SemanticError> {
        match self.lookup(name) {
            Some(VarState::Initialized) => Ok(()),
            Some(VarState::Declared) => {
                debug!(name, "use before assignment");
                Err(SemanticError::UseBeforeInit(name.to_string()))
            }
            None => {
                debug!(name, "use of undeclared variable");
                Err(SemanticError::UndeclaredVariable(name.to_string()))
            }
        }
    }

    fn analyze_stmt(&mut self, stmt: &Stmt) -> Result<(), SemanticError> {
        match stmt {
            Stmt::Let { name, init } => {
                self.declare(name)?;
                self.analyze_expr(init)?;
                self.set_initialized(name)
            }
            Stmt::Set { name, value } => {
                self.is_declared(name)?;
                self.analyze_expr(value)?;
                self.set_initialized(name)
            }
            // Each branch is checked on its own; initialization done inside a
            // branch is discarded with the branch scope.
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.analyze_expr(cond)?;
                self.analyze_block(then_body)?;
                if !else_body.is_empty() {
                    self.analyze_block(else_body)?;
                }
                Ok(())
            }
            Stmt::Return { value } => self.analyze_expr(value),
        }
    }

    fn analyze_expr(&self, expr: &Expr) -> Result<(), SemanticError> {
        match expr {
            Expr::Number(_) | Expr::Bool(_) => Ok(()),
            Expr::Var(name) => self.check_var_use(name),
            Expr::Binary { lhs, rhs, .. } => {
                self.analyze_expr(lhs)?;
                self.analyze_expr(rhs)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn check(src: &str) -> Result<(), SemanticError> {
        let program = parse(src).expect("parse");
        Analyzer::new().analyze(&program)
    }

    #[test]
    fn straight_line_program_passes() {
        assert_eq!(check("let x = 1\nset x = x + 41\nreturn x == 42"), Ok(()));
    }

    #[test]
    fn if_else_program_passes() {
        assert_eq!(
            check("let x = 2 + 2\nif x == 4 { set x = 2 } else { set x = 1 }\nreturn x"),
            Ok(())
        );
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        assert_eq!(
            check("let x = 1\nlet x = 2"),
            Err(SemanticError::Redeclaration("x".into()))
        );
    }

    #[test]
    fn inner_block_cannot_shadow_outer_variable() {
        assert_eq!(
            check("let x = 1\nif x == 1 { if true { let x = 5 } }\nreturn x"),
            Err(SemanticError::Redeclaration("x".into()))
        );
    }

    #[test]
    fn sibling_branches_may_reuse_a_name() {
        assert_eq!(
            check("if true { let y = 1 } else { let y = 2 }\nlet y = 3\nreturn y"),
            Ok(())
        );
    }

    #[test]
    fn branch_locals_do_not_leak() {
        assert_eq!(
            check("if true { let y = 1 }\nreturn y"),
            Err(SemanticError::UndeclaredVariable("y".into()))
        );
    }

    #[test]
    fn set_of_undeclared_fails() {
        assert_eq!(
            check("set z = 1"),
            Err(SemanticError::UndeclaredVariable("z".into()))
        );
    }

    #[test]
    fn undeclared_reference_fails() {
        assert_eq!(
            check("let a = b + 1"),
            Err(SemanticError::UndeclaredVariable("b".into()))
        );
    }

    #[test]
    fn self_reference_in_initializer_is_use_before_init() {
        assert_eq!(
            check("let x = x + 1"),
            Err(SemanticError::UseBeforeInit("x".into()))
        );
    }

    #[test]
    fn first_error_wins() {
        assert_eq!(
            check("return a == b"),
            Err(SemanticError::UndeclaredVariable("a".into()))
        );
    }

    #[test]
    fn analyzer_is_reusable_after_failure() {
        let mut analyzer = Analyzer::new();
        let bad = parse("let x = 1\nif true { let q = nope }").unwrap();
        assert!(analyzer.analyze(&bad).is_err());
        assert!(analyzer.scopes.is_empty());
        let good = parse("let q = 1\nreturn q").unwrap();
        assert_eq!(analyzer.analyze(&good), Ok(()));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            SemanticError::UseBeforeInit("x".into()).to_string(),
            "use of variable 'x' before an assignment"
        );
        assert_eq!(
            SemanticError::Redeclaration("x".into()).to_string(),
            "redeclaration of 'x'"
        );
    }
}
