//! Cell identity for formula references.
//!
//! A `CellId` uniquely identifies a cell across all sheets of a model.

use crate::sheet::SheetId;

/// Unique identifier for a cell in a model.
///
/// `row` is the 0-based row index within the sheet (the spreadsheet row
/// number is `row + 1`). `col` is the 0-based data column; column A holds
/// row labels, so data column 0 renders as `B`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellId {
    pub sheet: SheetId,
    pub row: usize,
    pub col: usize,
}

impl CellId {
    #[inline]
    pub fn new(sheet: SheetId, row: usize, col: usize) -> Self {
        Self { sheet, row, col }
    }

    /// A1-style address without the sheet qualifier.
    pub fn a1(&self) -> String {
        format!("{}{}", col_to_letters(self.col + 1), self.row + 1)
    }

    /// Address as written from a formula living on `from`.
    /// Same-sheet references stay unqualified.
    pub fn qualified(&self, from: SheetId) -> String {
        if self.sheet == from {
            self.a1()
        } else {
            format!("{}!{}", self.sheet.tab_name(), self.a1())
        }
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}!{}", self.sheet.tab_name(), self.a1())
    }
}

/// Convert 0-based column index to Excel-style letter(s).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}
