use serde_json::Value;
use tracing::warn;

use crate::utils::text::match_column;

/// One spreadsheet cell. Everything the pipeline touches is either text or a
/// number; formulas and dates never occur in these workbooks.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Numeric view, accepting numeric strings ("249.00").
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Empty => None,
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
        }
    }

    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Empty,
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            Value::String(s) => Cell::Text(s.clone()),
            Value::Bool(b) => Cell::Text(b.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Empty => Value::Null,
            Cell::Text(s) => Value::from(s.clone()),
            Cell::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

/// In-memory worksheet: a header row plus typed cells. Rows are kept
/// rectangular lazily — `get` treats missing trailing cells as empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&Cell::Empty)
    }

    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        while self.rows.len() <= row {
            self.rows.push(Vec::new());
        }
        let r = &mut self.rows[row];
        while r.len() <= col {
            r.push(Cell::Empty);
        }
        r[col] = cell;
    }

    /// Fuzzy header lookup. A missing column is logged and yields `None`, so
    /// downstream cells simply stay empty instead of failing the run.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let idx = match_column(name, &self.columns);
        if idx.is_none() {
            warn!("Column not found in sheet {:?}: {}", self.name, name);
        }
        idx
    }

    pub fn column_cells(&self, col: usize) -> Vec<Cell> {
        (0..self.n_rows()).map(|r| self.get(r, col).clone()).collect()
    }

    pub fn insert_column(&mut self, at: usize, name: impl Into<String>, values: Vec<Cell>) {
        let at = at.min(self.columns.len());
        self.columns.insert(at, name.into());
        let n = self.n_rows().max(values.len());
        while self.rows.len() < n {
            self.rows.push(Vec::new());
        }
        for (r, row) in self.rows.iter_mut().enumerate() {
            while row.len() < at {
                row.push(Cell::Empty);
            }
            row.insert(at, values.get(r).cloned().unwrap_or(Cell::Empty));
        }
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Cell>) {
        let at = self.columns.len();
        self.insert_column(at, name, values);
    }

    pub fn remove_column(&mut self, at: usize) {
        if at >= self.columns.len() {
            return;
        }
        self.columns.remove(at);
        for row in self.rows.iter_mut() {
            if at < row.len() {
                row.remove(at);
            }
        }
    }

    /// Column-wise merge: the first sheet has priority, later sheets only fill
    /// cells that are still empty, and previously unseen columns are appended.
    pub fn merge_horizontal(sheets: &[Sheet]) -> Sheet {
        let Some(first) = sheets.first() else {
            return Sheet::new("", Vec::new());
        };
        let mut merged = first.clone();
        for sheet in &sheets[1..] {
            for (src_col, col_name) in sheet.columns.iter().enumerate() {
                match merged.columns.iter().position(|c| c == col_name) {
                    None => {
                        let values = sheet.column_cells(src_col);
                        merged.push_column(col_name.clone(), values);
                    }
                    Some(dst_col) => {
                        let n = merged.n_rows().max(sheet.n_rows());
                        for row in 0..n {
                            if merged.get(row, dst_col).is_empty() {
                                let incoming = sheet.get(row, src_col).clone();
                                if !incoming.is_empty() {
                                    merged.set(row, dst_col, incoming);
                                }
                            }
                        }
                    }
                }
            }
        }
        merged
    }

    /// Row-wise concatenation; the column set is the union, in order of first
    /// appearance.
    pub fn merge_vertical(sheets: &[Sheet]) -> Sheet {
        let Some(first) = sheets.first() else {
            return Sheet::new("", Vec::new());
        };
        let mut merged = Sheet::new(first.name.clone(), first.columns.clone());
        for sheet in sheets {
            let mapping: Vec<usize> = sheet
                .columns
                .iter()
                .map(|col| {
                    merged
                        .columns
                        .iter()
                        .position(|c| c == col)
                        .unwrap_or_else(|| {
                            merged.columns.push(col.clone());
                            merged.columns.len() - 1
                        })
                })
                .collect();
            for row in 0..sheet.n_rows() {
                let at = merged.rows.len();
                merged.rows.push(Vec::new());
                for (src_col, dst_col) in mapping.iter().enumerate() {
                    let cell = sheet.get(row, src_col).clone();
                    if !matches!(cell, Cell::Empty) {
                        merged.set(at, *dst_col, cell);
                    }
                }
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet(name: &str, columns: &[&str], rows: &[&[Cell]]) -> Sheet {
        let mut s = Sheet::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            s.rows.push(row.to_vec());
        }
        s
    }

    #[test]
    fn test_merge_horizontal_first_non_empty_wins() {
        let a = sheet(
            "a",
            &["x", "y"],
            &[&[Cell::Number(1.0), Cell::Text(String::new())]],
        );
        let b = sheet(
            "b",
            &["x", "y"],
            &[&[Cell::Number(2.0), Cell::Number(5.0)]],
        );
        let merged = Sheet::merge_horizontal(&[a, b]);
        assert_eq!(merged.get(0, 0), &Cell::Number(1.0));
        assert_eq!(merged.get(0, 1), &Cell::Number(5.0));
    }

    #[test]
    fn test_merge_horizontal_appends_new_columns() {
        let a = sheet("a", &["x"], &[&[Cell::Number(1.0)]]);
        let b = sheet("b", &["x", "z"], &[&[Cell::Number(9.0), Cell::Text("u".into())]]);
        let merged = Sheet::merge_horizontal(&[a, b]);
        assert_eq!(merged.columns, vec!["x".to_string(), "z".to_string()]);
        assert_eq!(merged.get(0, 0), &Cell::Number(1.0));
        assert_eq!(merged.get(0, 1), &Cell::Text("u".into()));
    }

    #[test]
    fn test_merge_vertical_concatenates_rows() {
        let a = sheet("a", &["x"], &[&[Cell::Number(1.0)]]);
        let b = sheet("b", &["x"], &[&[Cell::Number(2.0)], &[Cell::Number(3.0)]]);
        let merged = Sheet::merge_vertical(&[a, b]);
        assert_eq!(merged.n_rows(), 3);
        assert_eq!(merged.get(2, 0), &Cell::Number(3.0));
    }

    #[test]
    fn test_insert_and_remove_column() {
        let mut s = sheet(
            "s",
            &["a", "c"],
            &[&[Cell::Number(1.0), Cell::Number(3.0)]],
        );
        s.insert_column(1, "b", vec![Cell::Number(2.0)]);
        assert_eq!(s.columns, vec!["a", "b", "c"]);
        assert_eq!(s.get(0, 1), &Cell::Number(2.0));
        assert_eq!(s.get(0, 2), &Cell::Number(3.0));
        s.remove_column(0);
        assert_eq!(s.columns, vec!["b", "c"]);
        assert_eq!(s.get(0, 0), &Cell::Number(2.0));
    }

    #[test]
    fn test_cell_numeric_coercion() {
        assert_eq!(Cell::Text("249.00".into()).as_f64(), Some(249.0));
        assert_eq!(Cell::Text("1 kg".into()).as_f64(), None);
        assert!(Cell::Text("  ".into()).is_empty());
        assert_eq!(Cell::Number(20.0).as_text(), "20");
    }
}
