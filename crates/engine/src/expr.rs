//! Formula expressions.
//!
//! Every computed cell carries an `Expr`: it evaluates to the number the
//! spreadsheet will show and renders to the formula text the spreadsheet
//! will store. A `Ref` captures the referenced cell's value at the moment
//! the reference is taken, so evaluation never needs the workbook.

use std::ops;

use crate::cell_id::CellId;
use crate::sheet::SheetId;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Num(f64),
    Ref { cell: CellId, value: f64 },
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Sum(Vec<Expr>),
}

// Binding strength, loosest first.
const PREC_ADD: u8 = 1;
const PREC_MUL: u8 = 2;
const PREC_POW: u8 = 3;
const PREC_NEG: u8 = 4;
const PREC_ATOM: u8 = 5;

impl Expr {
    pub fn num(value: f64) -> Self {
        Expr::Num(value)
    }

    pub fn cell(cell: CellId, value: f64) -> Self {
        Expr::Ref { cell, value }
    }

    pub fn sum(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Sum(items.into_iter().collect())
    }

    pub fn pow(self, exponent: Expr) -> Self {
        Expr::Pow(Box::new(self), Box::new(exponent))
    }

    /// Evaluate to a number. Division by zero yields NaN.
    pub fn eval(&self) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Ref { value, .. } => *value,
            Expr::Neg(e) => -e.eval(),
            Expr::Add(l, r) => l.eval() + r.eval(),
            Expr::Sub(l, r) => l.eval() - r.eval(),
            Expr::Mul(l, r) => l.eval() * r.eval(),
            Expr::Div(l, r) => {
                let d = r.eval();
                if d == 0.0 {
                    f64::NAN
                } else {
                    l.eval() / d
                }
            }
            Expr::Pow(b, e) => b.eval().powf(e.eval()),
            Expr::Sum(items) => items.iter().map(Expr::eval).sum(),
        }
    }

    /// Formula text as stored in a cell on `from` (leading `=` included).
    pub fn formula(&self, from: SheetId) -> String {
        let mut out = String::from("=");
        self.write(from, &mut out);
        out
    }

    /// Formula text without the leading `=`.
    pub fn render(&self, from: SheetId) -> String {
        let mut out = String::new();
        self.write(from, &mut out);
        out
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(v) if *v < 0.0 => PREC_NEG,
            Expr::Num(_) | Expr::Ref { .. } | Expr::Sum(_) => PREC_ATOM,
            Expr::Neg(_) => PREC_NEG,
            Expr::Add(..) | Expr::Sub(..) => PREC_ADD,
            Expr::Mul(..) | Expr::Div(..) => PREC_MUL,
            Expr::Pow(..) => PREC_POW,
        }
    }

    fn write(&self, from: SheetId, out: &mut String) {
        match self {
            Expr::Num(v) => out.push_str(&format_number(*v)),
            Expr::Ref { cell, .. } => out.push_str(&cell.qualified(from)),
            Expr::Neg(e) => {
                out.push('-');
                e.write_child(from, out, e.precedence() < PREC_ATOM);
            }
            Expr::Add(l, r) => self.write_binary(from, out, l, "+", r, PREC_ADD, false),
            Expr::Sub(l, r) => self.write_binary(from, out, l, "-", r, PREC_ADD, true),
            Expr::Mul(l, r) => self.write_binary(from, out, l, "*", r, PREC_MUL, false),
            Expr::Div(l, r) => self.write_binary(from, out, l, "/", r, PREC_MUL, true),
            Expr::Pow(b, e) => {
                b.write_child(from, out, b.precedence() < PREC_ATOM);
                out.push('^');
                e.write_child(from, out, e.precedence() < PREC_ATOM);
            }
            Expr::Sum(items) => {
                out.push_str("SUM(");
                match contiguous_range(items, from) {
                    Some(range) => out.push_str(&range),
                    None => {
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                out.push(',');
                            }
                            item.write(from, out);
                        }
                    }
                }
                out.push(')');
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_binary(
        &self,
        from: SheetId,
        out: &mut String,
        left: &Expr,
        op: &str,
        right: &Expr,
        prec: u8,
        strict_right: bool,
    ) {
        left.write_child(from, out, left.precedence() < prec);
        out.push_str(op);
        let rp = right.precedence();
        let paren = if strict_right { rp <= prec } else { rp < prec };
        right.write_child(from, out, paren);
    }

    fn write_child(&self, from: SheetId, out: &mut String, paren: bool) {
        if paren {
            out.push('(');
            self.write(from, out);
            out.push(')');
        } else {
            self.write(from, out);
        }
    }
}

/// `A1:A9`-style range when every item is a reference on one sheet laid
/// out along a single row or column with no gaps.
fn contiguous_range(items: &[Expr], from: SheetId) -> Option<String> {
    let cells: Vec<CellId> = items
        .iter()
        .map(|e| match e {
            Expr::Ref { cell, .. } => Some(*cell),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if cells.len() < 2 {
        return None;
    }
    let first = cells[0];
    let along_row = cells
        .iter()
        .enumerate()
        .all(|(i, c)| c.sheet == first.sheet && c.row == first.row && c.col == first.col + i);
    let along_col = cells
        .iter()
        .enumerate()
        .all(|(i, c)| c.sheet == first.sheet && c.col == first.col && c.row == first.row + i);
    if !(along_row || along_col) {
        return None;
    }
    let last = cells[cells.len() - 1];
    Some(format!("{}:{}", first.qualified(from), last.a1()))
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

impl ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

impl ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Num(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(sheet: SheetId, row: usize, col: usize, value: f64) -> Expr {
        Expr::cell(CellId::new(sheet, row, col), value)
    }

    #[test]
    fn test_eval_and_render_growth() {
        let prior = r(SheetId::SegmentRevenue, 5, 2, 100.0);
        let g = r(SheetId::Assumptions, 9, 3, 0.1);
        let e = prior * (Expr::num(1.0) + g);
        assert!((e.eval() - 110.0).abs() < 1e-9);
        assert_eq!(e.formula(SheetId::SegmentRevenue), "=D6*(1+Assumptions!E10)");
    }

    #[test]
    fn test_sub_right_operand_parenthesized() {
        let a = r(SheetId::Dcf, 0, 0, 10.0);
        let b = r(SheetId::Dcf, 1, 0, 4.0);
        let c = r(SheetId::Dcf, 2, 0, 1.0);
        let e = a.clone() - (b.clone() - c.clone());
        assert_eq!(e.render(SheetId::Dcf), "B1-(B2-B3)");
        assert_eq!(e.eval(), 7.0);

        let left_assoc = a - b - c;
        assert_eq!(left_assoc.render(SheetId::Dcf), "B1-B2-B3");
        assert_eq!(left_assoc.eval(), 5.0);
    }

    #[test]
    fn test_div_by_zero_is_nan() {
        let e = Expr::num(1.0) / Expr::num(0.0);
        assert!(e.eval().is_nan());
        assert_eq!(e.render(SheetId::Ratios), "1/0");
    }

    #[test]
    fn test_discount_factor_text() {
        let wacc = r(SheetId::Assumptions, 3, 4, 0.09);
        let df = Expr::num(1.0) / (Expr::num(1.0) + wacc).pow(Expr::num(2.0));
        assert_eq!(df.render(SheetId::Dcf), "1/(1+Assumptions!F4)^2");
        assert!((df.eval() - 1.0 / 1.09f64.powi(2)).abs() < 1e-12);
    }

    #[test]
    fn test_neg_wraps_compound() {
        let a = r(SheetId::BalanceSheet, 10, 3, 50.0);
        let b = r(SheetId::BalanceSheet, 10, 2, 40.0);
        let e = -(a - b);
        assert_eq!(e.render(SheetId::CashFlow), "-(BS!E11-BS!D11)");
        assert_eq!(e.eval(), -10.0);
    }

    #[test]
    fn test_sum_contiguous_range() {
        let items: Vec<Expr> = (0..5).map(|c| r(SheetId::Dcf, 12, c, 1.0)).collect();
        let e = Expr::sum(items);
        assert_eq!(e.render(SheetId::Sensitivity), "SUM(DCF!B13:F13)");
        assert_eq!(e.eval(), 5.0);
    }

    #[test]
    fn test_sum_scattered_refs() {
        let e = Expr::sum(vec![r(SheetId::BalanceSheet, 3, 0, 1.0), r(SheetId::BalanceSheet, 7, 0, 2.0)]);
        assert_eq!(e.render(SheetId::BalanceSheet), "SUM(B4,B8)");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(Expr::num(365.0).render(SheetId::BalanceSheet), "365");
        assert_eq!(Expr::num(0.04).render(SheetId::BalanceSheet), "0.04");
        let e = r(SheetId::CashFlow, 0, 0, 2.0) * Expr::num(-1.5);
        assert_eq!(e.render(SheetId::CashFlow), "B1*-1.5");
    }
}
