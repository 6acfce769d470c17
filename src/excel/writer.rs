use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;
use tracing::info;

use crate::excel::sheet::{Cell, Sheet};

/// Write sheets to an xlsx file. Discount columns (`Disc_*` headers) get the
/// `0%` number format so the stored ratio renders as a percentage.
pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut workbook = Workbook::new();
    let percent = Format::new().set_num_format("0%");
    for sheet in sheets {
        let ws = workbook.add_worksheet();
        ws.set_name(&sheet.name)
            .with_context(|| format!("Invalid sheet name {:?}", sheet.name))?;
        for (col, header) in sheet.columns.iter().enumerate() {
            ws.write_string(0, col as u16, header)?;
        }
        for row in 0..sheet.n_rows() {
            for (col, header) in sheet.columns.iter().enumerate() {
                let is_disc = header.starts_with("Disc_");
                match sheet.get(row, col) {
                    Cell::Empty => {}
                    Cell::Text(s) => {
                        ws.write_string((row + 1) as u32, col as u16, s)?;
                    }
                    Cell::Number(n) => {
                        if is_disc {
                            ws.write_number_with_format((row + 1) as u32, col as u16, *n, &percent)?;
                        } else {
                            ws.write_number((row + 1) as u32, col as u16, *n)?;
                        }
                    }
                }
            }
        }
    }
    workbook
        .save(path)
        .with_context(|| format!("Failed to save workbook {}", path.display()))?;
    info!("Saved workbook: {}", path.display());
    Ok(())
}
