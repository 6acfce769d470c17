use anyhow::{Context, Result};
use calamine::{open_workbook, Data, Reader, Xlsx};
use std::path::Path;
use tracing::{debug, info};

use crate::excel::sheet::{Cell, Sheet};
use crate::models::Site;

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        other => Cell::Text(other.to_string()),
    }
}

fn range_to_sheet(name: &str, range: &calamine::Range<Data>) -> Sheet {
    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| {
            header
                .iter()
                .map(|d| data_to_cell(d).as_text())
                .collect()
        })
        .unwrap_or_default();
    let mut sheet = Sheet::new(name, columns);
    for row in rows {
        sheet.rows.push(row.iter().map(data_to_cell).collect());
    }
    sheet
}

/// Read one worksheet; the first sheet when no name is given.
pub fn read_worksheet(path: &Path, sheet_name: Option<&str>) -> Result<Sheet> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let name = match sheet_name {
        Some(n) => n.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("Workbook has no sheets: {}", path.display()))?,
    };
    let range = workbook
        .worksheet_range(&name)
        .with_context(|| format!("No worksheet {:?} in {}", name, path.display()))?;
    Ok(range_to_sheet(&name, &range))
}

/// Read every worksheet and concatenate them vertically, the way daily
/// workbooks (one sheet per location) are consumed by the checker/packager.
pub fn read_workbook_merged(path: &Path) -> Result<Sheet> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::new();
    for name in names {
        let range = workbook
            .worksheet_range(&name)
            .with_context(|| format!("No worksheet {:?} in {}", name, path.display()))?;
        sheets.push(range_to_sheet(&name, &range));
    }
    let merged = Sheet::merge_vertical(&sheets);
    debug!(
        "Read {} [{} rows x {} cols]",
        path.display(),
        merged.n_rows(),
        merged.columns.len()
    );
    Ok(merged)
}

/// The master SKU workbook: one row per tracked product, one `weblink_<site>`
/// column per site. Row index is the product identity across sites.
pub struct SkuWorkbook {
    pub sheet: Sheet,
}

impl SkuWorkbook {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Reading SKU workbook: {}", path.display());
        let sheet = read_worksheet(path, None)?;
        Ok(Self { sheet })
    }

    /// Product links for a site, one entry per master row; rows with an empty
    /// link cell (or a missing column) yield `None`.
    pub fn product_links(&self, site: Site) -> Vec<Option<String>> {
        let Some(col) = self.sheet.column_index(&site.weblink_column()) else {
            return vec![None; self.sheet.n_rows()];
        };
        (0..self.sheet.n_rows())
            .map(|row| {
                let cell = self.sheet.get(row, col);
                let text = cell.as_text();
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(text.to_string())
                }
            })
            .collect()
    }
}

/// Last path segment of a product link, the per-site product id.
pub fn product_id_from_link(link: &str) -> String {
    link.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_product_id_from_link() {
        assert_eq!(
            product_id_from_link("https://blinkit.com/prn/x/prid/514893"),
            "514893"
        );
        assert_eq!(
            product_id_from_link("https://www.zeptonow.com/pn/x/pvid/7851f4a9-cab6 "),
            "7851f4a9-cab6"
        );
        assert_eq!(product_id_from_link("no-slashes"), "no-slashes");
    }
}
