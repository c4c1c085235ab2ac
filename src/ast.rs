/// Abstract syntax tree nodes for AddNMult programs.
use std::fmt;

/// Binary operators, lowest binding (comparisons) to highest (`*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Mul,
    Equal,
    NotEqual,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sym = match self {
            BinOp::Add => "+",
            BinOp::Mul => "*",
            BinOp::Equal => "==",
            BinOp::NotEqual => "!=",
        };
        f.write_str(sym)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    // unsigned 64-bit literal
    Number(u64),
    // `true` / `false`, lowered as 1 / 0
    Bool(bool),
    // variable reference
    Var(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `let name = expr`; the initializer is mandatory.
    Let { name: String, init: Expr },
    /// `set name = expr` on an already declared variable.
    Set { name: String, value: Expr },
    /// `if cond { .. } else { .. }`. An empty `else_body` means there was no `else`.
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    Return { value: Expr },
}

/// Top-level container for a parsed program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_display_as_source_symbols() {
        let shown: Vec<String> = [BinOp::Add, BinOp::Mul, BinOp::Equal, BinOp::NotEqual]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(shown, vec!["+", "*", "==", "!="]);
    }
}
