use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::database::naming::column_name;
use crate::database::naming::COLUMN_PLACEHOLDER;
use crate::database::value::Fields;
use crate::database::value::Record;
use crate::database::value::Scalar;
use crate::error::ParseError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::sheet::Sheet;
use std::collections::HashMap;
use tracing::warn;

/// Default cap on the cells a sheet's bounding box may span.
pub(crate) const MAX_SHEET_CELLS: usize = 10_000_000;

/// A sheet converted to typed rows, ready to be registered.
///
/// The first row of the sheet's bounding box is the header. `columns` keeps
/// the normalized names exactly as produced, duplicates included.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Table {
    pub(crate) sheet: String,
    pub(crate) columns: Vec<Column>,
    pub(crate) rows: Vec<Vec<Scalar>>,
}

/// A column as created in the engine. `source` indexes into the row values.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PhysicalColumn {
    pub(crate) name: String,
    pub(crate) kind: ColumnType,
    pub(crate) source: usize,
}

impl Table {
    /// Converts a finished sheet. The cell count of its bounding box must not
    /// exceed `max_cells`, since every position becomes a value.
    pub(crate) fn from_sheet(sheet: &Sheet, max_name_length: usize, max_cells: usize) -> Result<Self, ParseError> {
        let Some(bounds) = sheet.bounds else {
            return Ok(Self {
                sheet: sheet.name.to_owned(),
                columns: vec![Column {
                    name: COLUMN_PLACEHOLDER.to_owned(),
                    kind: ColumnType::Varchar,
                }],
                rows: Vec::new(),
            });
        };
        if bounds.area() > max_cells {
            Err(ParseError::SheetTooLarge {
                sheet: sheet.name.to_owned(),
                cells: bounds.area(),
                limit: max_cells,
            })?
        }

        let width = bounds.width();
        let (header, data): (Vec<&Cell>, Vec<&Cell>) =
            sheet.cells.iter().partition(|cell| cell.row == bounds.first_row);

        let mut titles = vec![None::<String>; width];
        for cell in header {
            titles[cell.col - bounds.first_col] = Some(cell.to_string());
        }
        let mut candidates = vec![Vec::<Option<ColumnType>>::new(); width];
        for cell in &data {
            candidates[cell.col - bounds.first_col].push(cell.column_type());
        }
        let mut columns: Vec<Column> = titles
            .iter()
            .zip(candidates)
            .enumerate()
            .map(|(index, (title, kinds))| Column {
                name: column_name(title.as_deref(), index, max_name_length),
                kind: ColumnType::detect(kinds),
            })
            .collect();

        for cell in &data {
            let column = &mut columns[cell.col - bounds.first_col];
            if column.kind != ColumnType::Varchar && cell.to_scalar(column.kind).is_err() {
                warn!(
                    "Column '{}' of sheet '{}' falls back to varchar at {}",
                    column.name,
                    sheet.name,
                    cell.reference()
                );
                column.kind = ColumnType::Varchar;
            }
        }

        let mut rows = vec![vec![Scalar::Null; width]; bounds.height() - 1];
        for cell in data {
            let col = cell.col - bounds.first_col;
            rows[cell.row - bounds.first_row - 1][col] =
                cell.to_scalar(columns[col].kind).map_err(|message| ParseError::CellValue {
                    sheet: sheet.name.to_owned(),
                    reference: cell.reference(),
                    message,
                })?;
        }

        Ok(Self {
            sheet: sheet.name.to_owned(),
            columns,
            rows,
        })
    }

    pub(crate) fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.to_owned()).collect()
    }

    /// Inferred type per column name; a repeated name reports its last column.
    pub(crate) fn dtypes(&self) -> Fields<ColumnType> {
        self.columns
            .iter()
            .map(|column| (column.name.to_owned(), column.kind))
            .collect()
    }

    /// Leading rows keyed by column name; a repeated name holds the value of
    /// its last column.
    pub(crate) fn sample(&self, limit: usize) -> Vec<Record> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(column, value)| (column.name.to_owned(), value.to_owned()))
                    .collect()
            })
            .collect()
    }

    /// One engine column per distinct name, compared case-insensitively as
    /// the engine does. Each sits at the position of the name's first
    /// occurrence and takes the values of its last.
    pub(crate) fn physical_columns(&self) -> Vec<PhysicalColumn> {
        let mut positions = HashMap::<String, usize>::new();
        let mut physical = Vec::<PhysicalColumn>::new();
        for (source, column) in self.columns.iter().enumerate() {
            let key = column.name.to_ascii_lowercase();
            match positions.get(&key) {
                Some(position) => {
                    physical[*position].kind = column.kind;
                    physical[*position].source = source;
                }
                None => {
                    positions.insert(key, physical.len());
                    physical.push(PhysicalColumn {
                        name: column.name.to_owned(),
                        kind: column.kind,
                        source,
                    });
                }
            }
        }
        physical
    }
}
