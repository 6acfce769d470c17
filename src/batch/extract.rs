use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::dump::{DumpStore, encode_product_id};
use crate::excel::reader::{product_id_from_link, SkuWorkbook};
use crate::excel::sheet::{Cell, Sheet};
use crate::excel::writer::write_workbook;
use crate::models::{ProductRecord, Site};
use crate::sites::{extract_record, verify_location};

/// Loads the reference MRP for one master row at one location, for the
/// Swiggy/Dmart variant-selection heuristic. Blinkit's extracted MRP is
/// preferred, Zepto's is the fallback.
pub struct RefMrpLoader<'a> {
    config: &'a Config,
    store: DumpStore,
}

impl<'a> RefMrpLoader<'a> {
    pub fn new(config: &'a Config, date: &str) -> Self {
        Self {
            config,
            store: DumpStore::new(&config.data_root, date),
        }
    }

    pub fn load(&self, sku: &SkuWorkbook, location_name: &str, row_idx: usize) -> Option<f64> {
        for site in [Site::Blinkit, Site::Zepto] {
            let Ok(settings) = self.config.site(site) else {
                continue;
            };
            let Some(link) = sku.product_links(site).into_iter().nth(row_idx).flatten() else {
                continue;
            };
            let product_id = product_id_from_link(&link);
            let path = self.store.dump_path(site, Some(location_name), &product_id);
            let Some(payload) = DumpStore::load_optional(&path) else {
                continue;
            };
            let record = extract_record(site, &payload, None, &settings.locations);
            if let Some(mrp) = record.mrp {
                return Some(mrp);
            }
        }
        None
    }
}

fn set_record_cell(sheet: &mut Sheet, row: usize, column: &str, cell: Cell) {
    let idx = match sheet.column_index(column) {
        Some(idx) => idx,
        None => {
            // output columns are gained on top of the master schema
            sheet.push_column(column.to_string(), Vec::new());
            sheet.columns.len() - 1
        }
    };
    sheet.set(row, idx, cell);
}

/// Write one extracted record into its master-sheet row, under the site's
/// column names.
pub fn apply_record_to_sheet(sheet: &mut Sheet, row: usize, site: Site, record: &ProductRecord) {
    let suffix = site.column_suffix();
    if let Some(unit) = &record.unit {
        set_record_cell(sheet, row, &format!("unit size_{}", suffix), Cell::Text(unit.clone()));
    }
    if let Some(price) = record.price {
        set_record_cell(sheet, row, &format!("price_{}", suffix), Cell::Number(price));
    }
    if site == Site::Zepto {
        if let Some(super_price) = record.super_price {
            set_record_cell(
                sheet,
                row,
                "price_supersaver_zepto",
                Cell::Number(super_price),
            );
        }
    }
    if let Some(mrp) = record.mrp {
        set_record_cell(sheet, row, &format!("mrp_{}", suffix), Cell::Number(mrp));
    }
    set_record_cell(
        sheet,
        row,
        &site.instock_column(),
        Cell::from_json(&record.in_stock.to_cell(site)),
    );
    if let Some(location) = &record.location {
        set_record_cell(sheet, row, &site.location_column(), Cell::Text(location.clone()));
    }
}

/// Replays one site's dumps for every (location, product) into per-location
/// xlsx files under `data/output/<date>/<site>/`.
pub struct ExtractBatcher<'a> {
    config: &'a Config,
    site: Site,
    store: DumpStore,
    ref_loader: Option<RefMrpLoader<'a>>,
}

impl<'a> ExtractBatcher<'a> {
    pub fn new(config: &'a Config, site: Site, date: &str) -> Self {
        // only the sites with multi-variant pages join against a reference MRP
        let ref_loader = matches!(site, Site::Swiggy | Site::Dmart)
            .then(|| RefMrpLoader::new(config, date));
        Self {
            config,
            site,
            store: DumpStore::new(&config.data_root, date),
            ref_loader,
        }
    }

    fn output_path(&self, location_name: &str) -> PathBuf {
        self.config
            .data_root
            .join("output")
            .join(self.store.date())
            .join(self.site.key())
            .join(format!(
                "{}_{}_{}.xlsx",
                self.store.date(),
                self.site.key(),
                location_name
            ))
    }

    pub fn run(&self, sku: &SkuWorkbook) -> Result<()> {
        let site = self.site;
        let settings = self.config.site(site)?;
        let links = sku.product_links(site);
        for location in &settings.locations {
            info!("Extracting {} dumps for location [{}]", site.key(), location.name);
            let mut sheet = sku.sheet.clone();
            for (row_idx, link) in links.iter().enumerate() {
                let Some(link) = link else {
                    continue;
                };
                let product_id = product_id_from_link(link);
                let dump_path = self
                    .store
                    .dump_path(site, Some(&location.name), &product_id);
                let payload = DumpStore::load(&dump_path).with_context(|| {
                    format!(
                        "{}.{}.{}",
                        site.key(),
                        location.name,
                        encode_product_id(site, &product_id)
                    )
                })?;
                verify_location(site, &payload, location).with_context(|| {
                    format!(
                        "{}.{}.{}: {}",
                        site.key(),
                        location.name,
                        product_id,
                        dump_path.display()
                    )
                })?;
                let ref_mrp = self
                    .ref_loader
                    .as_ref()
                    .and_then(|loader| loader.load(sku, &location.name, row_idx));
                let record = extract_record(site, &payload, ref_mrp, &settings.locations);
                if record == ProductRecord::default() {
                    warn!(
                        "Empty extracted data: {}.{}.{}",
                        site.key(),
                        location.name,
                        product_id
                    );
                    continue;
                }
                apply_record_to_sheet(&mut sheet, row_idx, site, &record);
            }
            let output_path = self.output_path(&location.name);
            sheet.name = output_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            write_workbook(&output_path, &[sheet])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StockStatus;
    use pretty_assertions::assert_eq;

    fn base_sheet() -> Sheet {
        let mut sheet = Sheet::new(
            "sku",
            vec![
                "#".to_string(),
                "weblink_zepto".to_string(),
                "price_zepto".to_string(),
                "mrp_zepto".to_string(),
                "instock_zepto".to_string(),
            ],
        );
        sheet.rows.push(vec![
            Cell::Number(1.0),
            Cell::Text("https://www.zeptonow.com/pn/x/pvid/a".into()),
        ]);
        sheet
    }

    #[test]
    fn test_apply_record_fills_site_columns() {
        let mut sheet = base_sheet();
        let record = ProductRecord {
            product_name: Some("Tata Salt".into()),
            unit: Some("1 kg".into()),
            price: Some(105.0),
            mrp: Some(120.0),
            super_price: Some(99.0),
            in_stock: StockStatus::InStock,
            location: Some("Bangalore - Sarjapur".into()),
            ..ProductRecord::default()
        };
        apply_record_to_sheet(&mut sheet, 0, Site::Zepto, &record);
        let price_idx = sheet.column_index("price_zepto").unwrap();
        assert_eq!(sheet.get(0, price_idx), &Cell::Number(105.0));
        let instock_idx = sheet.column_index("instock_zepto").unwrap();
        assert_eq!(sheet.get(0, instock_idx), &Cell::Text("Y".into()));
        // columns missing from the master are appended
        let ss_idx = sheet.column_index("price_supersaver_zepto").unwrap();
        assert_eq!(sheet.get(0, ss_idx), &Cell::Number(99.0));
        let unit_idx = sheet.column_index("unit size_zepto").unwrap();
        assert_eq!(sheet.get(0, unit_idx), &Cell::Text("1 kg".into()));
        let loc_idx = sheet.column_index("location_zepto").unwrap();
        assert_eq!(sheet.get(0, loc_idx), &Cell::Text("Bangalore - Sarjapur".into()));
    }

    #[test]
    fn test_apply_record_numeric_na_for_dmart() {
        let mut sheet = Sheet::new("sku", vec!["instock_dmart".to_string()]);
        let record = ProductRecord::default();
        apply_record_to_sheet(&mut sheet, 0, Site::Dmart, &record);
        assert_eq!(sheet.get(0, 0), &Cell::Text("N/A".into()));
    }
}
