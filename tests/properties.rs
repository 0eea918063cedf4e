//! Generated expressions, checked against a direct evaluation of the same tree.

use lox_arith::compiler::compile;
use lox_arith::prelude::*;
use lox_arith::vm::factorial;
use proptest::prelude::*;

#[derive(Clone, Copy, Debug)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Clone, Debug)]
enum Expr {
    Num(f64),
    /// A small integer literal followed by `!`.
    Fact(u8),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "^",
        }
    }

    /// How tightly the operator binds, and the levels its operands need to avoid parentheses.
    fn levels(self) -> (u8, u8, u8) {
        match self {
            BinOp::Add | BinOp::Sub => (50, 50, 60),
            BinOp::Mul | BinOp::Div => (60, 60, 70),
            // Right-associative, and looser than postfix `!` but tighter than prefix `-`.
            BinOp::Pow => (80, 90, 70),
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinOp::Add => a + b,
            BinOp::Sub => a - b,
            BinOp::Mul => a * b,
            BinOp::Div => a / b,
            BinOp::Pow => a.powf(b),
        }
    }
}

impl Expr {
    fn level(&self) -> u8 {
        match self {
            Expr::Num(_) => 100,
            Expr::Fact(_) => 90,
            Expr::Neg(_) => 70,
            Expr::Binary(op, _, _) => op.levels().0,
        }
    }

    /// Prints the expression with as few parentheses as the grammar allows.
    fn render(&self) -> String {
        match self {
            Expr::Num(n) => format!("{n}"),
            Expr::Fact(n) => format!("{n}!"),
            Expr::Neg(operand) => format!("-{}", operand.render_at(70)),
            Expr::Binary(op, lhs, rhs) => {
                let (_, left, right) = op.levels();
                format!(
                    "{} {} {}",
                    lhs.render_at(left),
                    op.symbol(),
                    rhs.render_at(right)
                )
            }
        }
    }

    fn render_at(&self, level: u8) -> String {
        if self.level() >= level {
            self.render()
        } else {
            format!("({})", self.render())
        }
    }

    fn evaluate(&self) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Fact(n) => factorial(f64::from(*n)),
            Expr::Neg(operand) => -operand.evaluate(),
            Expr::Binary(op, lhs, rhs) => op.apply(lhs.evaluate(), rhs.evaluate()),
        }
    }
}

fn binop() -> impl Strategy<Value = BinOp> {
    prop_oneof![
        Just(BinOp::Add),
        Just(BinOp::Sub),
        Just(BinOp::Mul),
        Just(BinOp::Div),
        Just(BinOp::Pow),
    ]
}

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0u32..1000, 0u32..4).prop_map(|(whole, quarters)| {
            Expr::Num(f64::from(whole) + f64::from(quarters) / 4.0)
        }),
        (0u8..=10).prop_map(Expr::Fact),
    ];

    leaf.prop_recursive(6, 64, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|operand| Expr::Neg(Box::new(operand))),
            (binop(), inner.clone(), inner)
                .prop_map(|(op, lhs, rhs)| Expr::Binary(op, Box::new(lhs), Box::new(rhs))),
        ]
    })
}

proptest! {
    #[test]
    fn interpreting_matches_evaluating(expr in expr()) {
        let source = expr.render();
        let result = VM::default().interpret(&source);
        prop_assert_eq!(Value::Number(expr.evaluate()), result.unwrap(), "{}", source);
    }

    #[test]
    fn compiling_is_idempotent(expr in expr()) {
        let source = expr.render();
        prop_assert_eq!(compile(&source).unwrap(), compile(&source).unwrap());
    }

    #[test]
    fn instruction_widths_cover_the_chunk(expr in expr()) {
        let chunk = compile(&expr.render()).unwrap();
        let mut total = 0;
        for instruction in chunk.instructions() {
            prop_assert!(instruction.opcode.is_ok());
            total += instruction.opcode.map_or(1, OpCode::width);
        }
        prop_assert_eq!(chunk.len(), total);
        prop_assert_eq!(chunk.len(), chunk.lines().covered_len());
    }

    #[test]
    fn line_numbers_stay_within_the_source(expr in expr()) {
        let source = expr.render().replace(' ', "\n");
        let last_line = source.matches('\n').count() + 1;

        let chunk = compile(&source).unwrap();
        for offset in 0..chunk.len() {
            let line = chunk.line_number_for(offset);
            prop_assert!(matches!(line, Some(n) if (1..=last_line).contains(&n)), "{:?}", line);
        }

        let result = VM::default().interpret(&source);
        prop_assert_eq!(Value::Number(expr.evaluate()), result.unwrap());
    }
}
