use crate::spreadsheet::cell::Cell;

/// Smallest rectangle holding every cell of a sheet, inclusive on all sides.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub(crate) first_row: usize,
    pub(crate) last_row: usize,
    pub(crate) first_col: usize,
    pub(crate) last_col: usize,
}

impl Bounds {
    fn at(row: usize, col: usize) -> Self {
        Self {
            first_row: row,
            last_row: row,
            first_col: col,
            last_col: col,
        }
    }

    fn widen(&mut self, row: usize, col: usize) {
        self.first_row = self.first_row.min(row);
        self.last_row = self.last_row.max(row);
        self.first_col = self.first_col.min(col);
        self.last_col = self.last_col.max(col);
    }

    pub(crate) fn width(&self) -> usize {
        self.last_col - self.first_col + 1
    }

    pub(crate) fn height(&self) -> usize {
        self.last_row - self.first_row + 1
    }

    /// Cells in the rectangle, saturating instead of overflowing.
    pub(crate) fn area(&self) -> usize {
        self.width().saturating_mul(self.height())
    }
}

/// Sparse cells of one sheet plus the bounds of everything pushed.
#[derive(Debug, Default)]
pub(crate) struct Sheet {
    pub(crate) name: String,
    pub(crate) cells: Vec<Cell>,
    pub(crate) bounds: Option<Bounds>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, cell: Cell) {
        match &mut self.bounds {
            Some(bounds) => bounds.widen(cell.row, cell.col),
            None => self.bounds = Some(Bounds::at(cell.row, cell.col)),
        }
        self.cells.push(cell);
    }

    /// Puts cells in row-major order. When a position was written twice the
    /// later cell wins.
    pub(crate) fn finish(&mut self) {
        self.cells.reverse();
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
        self.cells.dedup_by_key(|cell| (cell.row, cell.col));
    }
}
