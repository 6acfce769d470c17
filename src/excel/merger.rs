use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::excel::reader::read_workbook_merged;
use crate::excel::sheet::{Cell, Sheet};
use crate::excel::writer::write_workbook;
use crate::models::{Site, ALL_SITES};
use crate::utils::dates::{date_str, iso_week, past_dates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountFormat {
    Float,
    Percent,
}

/// (discount column, price column, mrp column) triplets, including the extra
/// Zepto supersaver pairing that reuses the regular Zepto MRP.
fn discount_column_maps() -> Vec<(String, String, String)> {
    let mut maps: Vec<(String, String, String)> = ALL_SITES
        .iter()
        .map(|site| {
            let suffix = site.column_suffix();
            (
                site.discount_column().to_string(),
                format!("price_{}", suffix),
                format!("mrp_{}", suffix),
            )
        })
        .collect();
    maps.push((
        "Disc_ZeptoSuperSaver".to_string(),
        "price_supersaver_zepto".to_string(),
        "mrp_zepto".to_string(),
    ));
    maps
}

fn positive_number(cell: &Cell) -> Option<f64> {
    cell.as_f64().filter(|n| *n > 0.0)
}

/// `discount = 1 - price/mrp`, rounded to 2 places. Zero, negative, or
/// non-numeric inputs mean "no discount available" and yield an empty cell.
pub fn discount_cell(price: &Cell, mrp: &Cell, format: DiscountFormat) -> Cell {
    let (Some(price), Some(mrp)) = (positive_number(price), positive_number(mrp)) else {
        return Cell::Empty;
    };
    let discount = 1.0 - price / mrp;
    match format {
        DiscountFormat::Float => Cell::Number((discount * 100.0).round() / 100.0),
        DiscountFormat::Percent => Cell::Text(format!("{:.0}%", discount * 100.0)),
    }
}

/// Insert a `Disc_*` column right of each price column that has a matching
/// mrp column. Sites whose columns are absent are skipped.
pub fn insert_discount_columns(sheet: &mut Sheet, format: DiscountFormat) {
    for (disc_col, price_col, mrp_col) in discount_column_maps() {
        let (Some(price_idx), Some(mrp_idx)) =
            (sheet.column_index(&price_col), sheet.column_index(&mrp_col))
        else {
            continue;
        };
        let values: Vec<Cell> = (0..sheet.n_rows())
            .map(|row| discount_cell(sheet.get(row, price_idx), sheet.get(row, mrp_idx), format))
            .collect();
        sheet.insert_column(price_idx + 1, disc_col, values);
    }
}

fn column_position_eq(sheet: &Sheet, name: &str) -> Option<usize> {
    sheet
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
}

/// Prepend the run date (slash form) and mapped location display value.
/// Presence checks are exact: `location_<site>` columns must not shadow the
/// `Location` column here.
pub fn insert_date_and_location_columns(sheet: &mut Sheet, location_label: &str, date: &str) {
    let n = sheet.n_rows();
    if column_position_eq(sheet, "date").is_none() {
        let date_val = date.replace('-', "/");
        sheet.insert_column(0, "Date", vec![Cell::Text(date_val); n]);
    }
    if column_position_eq(sheet, "location").is_none() {
        sheet.insert_column(1, "Location", vec![Cell::Text(location_label.to_string()); n]);
    }
}

/// Drop the per-site `location_<suffix>` helper columns from the merged view.
pub fn remove_location_columns(sheet: &mut Sheet) {
    for site in ALL_SITES {
        if let Some(idx) = column_position_eq(sheet, &site.location_column()) {
            sheet.remove_column(idx);
        }
    }
}

fn daily_output_root(config: &Config, date: &str) -> PathBuf {
    config.data_root.join("output").join(date)
}

pub fn daily_workbook_path(config: &Config, date: &str) -> PathBuf {
    daily_output_root(config, date).join(format!("sku_{}.xlsx", date))
}

/// Merges the per-site per-location extract outputs of one day into a single
/// workbook, one sheet per location.
pub struct DailyMerger<'a> {
    config: &'a Config,
    date: String,
}

impl<'a> DailyMerger<'a> {
    pub fn new(config: &'a Config, date: NaiveDate) -> Self {
        Self {
            config,
            date: date_str(date),
        }
    }

    fn xlsx_paths_for_location(&self, location_name: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for site in ALL_SITES {
            let site_dir = daily_output_root(self.config, &self.date).join(site.key());
            if !site_dir.is_dir() {
                warn!("No output for website: [{}]", site.key());
                continue;
            }
            let suffix = format!("_{}.xlsx", location_name);
            let mut site_paths: Vec<PathBuf> = std::fs::read_dir(&site_dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.path())
                        .filter(|p| {
                            p.is_file()
                                && p.file_name()
                                    .and_then(|n| n.to_str())
                                    .map(|n| n.ends_with(&suffix))
                                    .unwrap_or(false)
                        })
                        .collect()
                })
                .unwrap_or_default();
            site_paths.sort();
            paths.extend(site_paths);
        }
        paths
    }

    fn merged_sheet_for_location(&self, location_name: &str) -> Result<Sheet> {
        info!("Reading xlsx files for location: [{}]", location_name);
        let paths = self.xlsx_paths_for_location(location_name);
        if paths.is_empty() {
            anyhow::bail!("No xlsx files found for location: {}", location_name);
        }
        let mut sheets = Vec::new();
        for path in &paths {
            sheets.push(
                crate::excel::reader::read_worksheet(path, None)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
            );
        }
        let mut merged = Sheet::merge_horizontal(&sheets);
        insert_discount_columns(&mut merged, DiscountFormat::Float);
        insert_date_and_location_columns(
            &mut merged,
            &self.config.location_label(location_name),
            &self.date,
        );
        remove_location_columns(&mut merged);
        merged.name = format!("{}_{}", self.date, self.config.location_label(location_name));
        Ok(merged)
    }

    pub fn merge(&self) -> Result<PathBuf> {
        info!(
            "Merging xlsx files for locations: {:?}",
            self.config.location_list
        );
        let mut sheets = Vec::new();
        for location_name in &self.config.location_list {
            sheets.push(self.merged_sheet_for_location(location_name)?);
        }
        let out_path = daily_workbook_path(self.config, &self.date);
        write_workbook(&out_path, &sheets)?;
        Ok(out_path)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CheckIssue {
    pub website: String,
    pub location: String,
    pub date: String,
    pub link: String,
    pub column: String,
    pub value: Value,
    pub row: u64,
}

#[derive(Debug, Serialize)]
struct CheckLog {
    counts: Vec<CheckCount>,
    issues: Vec<CheckIssue>,
}

#[derive(Debug, Serialize)]
struct CheckCount {
    website: String,
    location: String,
    num: usize,
}

fn is_issue_value(cell: &Cell) -> bool {
    match cell {
        Cell::Empty => true,
        Cell::Text(s) => {
            let t = s.trim().to_lowercase();
            t.is_empty() || t == "n/a"
        }
        Cell::Number(_) => false,
    }
}

/// Does any configured skip rule fully match this row? A rule is a
/// conjunction of column=value pairs; one matching rule skips the check
/// (e.g. a deliberate out-of-stock marker).
fn should_skip_row(sheet: &Sheet, row: usize, rules: &[crate::config::SkipRule]) -> bool {
    rules.iter().any(|rule| {
        !rule.is_empty()
            && rule.iter().all(|(col, expected)| {
                let Some(idx) = sheet.column_index(col) else {
                    return false;
                };
                sheet.get(row, idx) == &Cell::from_json(expected)
            })
    })
}

/// Scans the merged daily workbook for missing/invalid stock cells.
pub struct ExcelChecker<'a> {
    config: &'a Config,
    date: String,
}

impl<'a> ExcelChecker<'a> {
    pub fn new(config: &'a Config, date: NaiveDate) -> Self {
        Self {
            config,
            date: date_str(date),
        }
    }

    fn log_path(&self) -> PathBuf {
        daily_workbook_path(self.config, &self.date).with_extension("log")
    }

    pub fn count_issues(issues: &[CheckIssue]) -> BTreeMap<(String, String), usize> {
        let mut counts = BTreeMap::new();
        for issue in issues {
            *counts
                .entry((issue.website.clone(), issue.location.clone()))
                .or_insert(0) += 1;
        }
        counts
    }

    fn dump_check_log(&self, issues: &[CheckIssue]) -> Result<()> {
        let counts = Self::count_issues(issues)
            .into_iter()
            .map(|((website, location), num)| CheckCount {
                website,
                location,
                num,
            })
            .collect();
        let log = CheckLog {
            counts,
            issues: issues.to_vec(),
        };
        let path = self.log_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(&log)?)?;
        info!("Dumped checks log: {}", path.display());
        Ok(())
    }

    pub fn check(&self) -> Result<Vec<CheckIssue>> {
        let xlsx_path = daily_workbook_path(self.config, &self.date);
        info!("Checking xlsx file: {}", xlsx_path.display());
        if !xlsx_path.exists() {
            anyhow::bail!("Daily workbook does not exist: {}", xlsx_path.display());
        }
        let sheet = read_workbook_merged(&xlsx_path)?;
        let issues = check_sheet(&sheet, self.config);
        if issues.is_empty() {
            info!("All items are good!");
        } else {
            warn!("Issues found: {}", issues.len());
            for ((website, location), num) in Self::count_issues(&issues) {
                warn!("  {} / {}: {}", website, location, num);
            }
        }
        self.dump_check_log(&issues)?;
        Ok(issues)
    }
}

/// Pure check over an already-loaded daily sheet.
pub fn check_sheet(sheet: &Sheet, config: &Config) -> Vec<CheckIssue> {
    let mut issues = Vec::new();
    let location_idx = sheet.column_index("location");
    let date_idx = sheet.column_index("date");
    let row_no_idx = sheet.column_index("#");
    for site in ALL_SITES {
        let Some(link_idx) = sheet.column_index(&site.weblink_column()) else {
            continue;
        };
        let Some(check_idx) = sheet.column_index(&site.instock_column()) else {
            continue;
        };
        let rules = config
            .skip_checks
            .get(site.key())
            .map(|r| r.as_slice())
            .unwrap_or(&[]);
        for row in 0..sheet.n_rows() {
            let link = sheet.get(row, link_idx);
            if link.is_empty() || should_skip_row(sheet, row, rules) {
                continue;
            }
            let cell = sheet.get(row, check_idx);
            if is_issue_value(cell) {
                let row_no = row_no_idx
                    .and_then(|idx| sheet.get(row, idx).as_f64())
                    .map(|n| n as u64 + 1)
                    .unwrap_or(row as u64 + 2);
                issues.push(CheckIssue {
                    website: site.key().to_string(),
                    location: location_idx
                        .map(|idx| sheet.get(row, idx).as_text())
                        .unwrap_or_default(),
                    date: date_idx
                        .map(|idx| sheet.get(row, idx).as_text())
                        .unwrap_or_default(),
                    link: link.as_text(),
                    column: sheet.columns[check_idx].clone(),
                    value: cell.to_json(),
                    row: row_no,
                });
            }
        }
    }
    issues
}

/// Packs the daily workbooks of one week into a single rollup, one sheet per
/// day.
pub struct WeeklyPackager<'a> {
    config: &'a Config,
    dates: Vec<NaiveDate>,
}

impl<'a> WeeklyPackager<'a> {
    pub fn new(config: &'a Config, end_date: NaiveDate, past_days: u32) -> Self {
        Self {
            config,
            dates: past_dates(end_date, past_days.max(1)),
        }
    }

    pub fn package_path(&self) -> PathBuf {
        let beg = date_str(self.dates[0]).replace('-', "");
        let end = date_str(*self.dates.last().unwrap()).replace('-', "");
        let week = iso_week(self.dates[0]);
        self.config
            .data_root
            .join("package")
            .join(format!("sku_ww{}_{}_{}.xlsx", week, beg, end))
    }

    pub fn package(&self) -> Result<PathBuf> {
        info!("Packaging xlsx files for {} days", self.dates.len());
        let mut sheets = Vec::new();
        for date in &self.dates {
            let ds = date_str(*date);
            let xlsx_path = daily_workbook_path(self.config, &ds);
            if !xlsx_path.exists() {
                warn!("Missing daily workbook: {}", xlsx_path.display());
                continue;
            }
            info!("  * {}", xlsx_path.display());
            let mut sheet = read_workbook_merged(&xlsx_path)?;
            sheet.name = ds;
            sheets.push(sheet);
        }
        if sheets.is_empty() {
            anyhow::bail!("No daily workbooks found to package");
        }
        let out_path = self.package_path();
        write_workbook(&out_path, &sheets)?;
        Ok(out_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_discount_cell_basic() {
        let d = discount_cell(&Cell::Number(80.0), &Cell::Number(100.0), DiscountFormat::Float);
        assert_eq!(d, Cell::Number(0.2));
        let p = discount_cell(&Cell::Number(80.0), &Cell::Number(100.0), DiscountFormat::Percent);
        assert_eq!(p, Cell::Text("20%".into()));
    }

    #[test]
    fn test_discount_cell_guards() {
        for (price, mrp) in [
            (Cell::Number(0.0), Cell::Number(100.0)),
            (Cell::Number(80.0), Cell::Number(0.0)),
            (Cell::Number(-5.0), Cell::Number(100.0)),
            (Cell::Text("n/a".into()), Cell::Number(100.0)),
            (Cell::Empty, Cell::Number(100.0)),
        ] {
            assert_eq!(
                discount_cell(&price, &mrp, DiscountFormat::Float),
                Cell::Empty,
                "price={:?} mrp={:?}",
                price,
                mrp
            );
        }
    }

    #[test]
    fn test_discount_cell_accepts_numeric_strings() {
        let d = discount_cell(
            &Cell::Text("75".into()),
            &Cell::Text("100".into()),
            DiscountFormat::Float,
        );
        assert_eq!(d, Cell::Number(0.25));
    }

    fn price_sheet() -> Sheet {
        let mut sheet = Sheet::new(
            "s",
            vec![
                "price_blinkit".to_string(),
                "mrp_blinkit".to_string(),
                "location_blinkit".to_string(),
            ],
        );
        sheet.rows.push(vec![
            Cell::Number(80.0),
            Cell::Number(100.0),
            Cell::Text("Bangalore".into()),
        ]);
        sheet
    }

    #[test]
    fn test_insert_discount_columns_position() {
        let mut sheet = price_sheet();
        insert_discount_columns(&mut sheet, DiscountFormat::Float);
        assert_eq!(
            sheet.columns,
            vec![
                "price_blinkit",
                "Disc_Blinkit",
                "mrp_blinkit",
                "location_blinkit"
            ]
        );
        assert_eq!(sheet.get(0, 1), &Cell::Number(0.2));
    }

    #[test]
    fn test_date_location_and_cleanup_columns() {
        let mut sheet = price_sheet();
        insert_date_and_location_columns(&mut sheet, "Bangalore - Sarjapur", "2026-08-06");
        assert_eq!(sheet.columns[0], "Date");
        assert_eq!(sheet.columns[1], "Location");
        assert_eq!(sheet.get(0, 0), &Cell::Text("2026/08/06".into()));
        assert_eq!(sheet.get(0, 1), &Cell::Text("Bangalore - Sarjapur".into()));
        remove_location_columns(&mut sheet);
        assert!(!sheet.columns.iter().any(|c| c == "location_blinkit"));
    }

    fn checker_config() -> Config {
        serde_json::from_value(json!({
            "sku_workbook": "configs/sku.xlsx",
            "location_list": ["L1"],
            "sites": {},
            "skip_checks": {
                "dmart": [{"instock_dmart": "N/A"}]
            }
        }))
        .unwrap()
    }

    fn daily_sheet() -> Sheet {
        let mut sheet = Sheet::new(
            "2026-08-06_L1",
            vec![
                "location".to_string(),
                "date".to_string(),
                "weblink_blinkit".to_string(),
                "instock_blinkit".to_string(),
                "weblink_dmart".to_string(),
                "instock_dmart".to_string(),
            ],
        );
        // row 0: blinkit instock missing -> issue
        sheet.rows.push(vec![
            Cell::Text("L1".into()),
            Cell::Text("2026/08/06".into()),
            Cell::Text("https://blinkit.com/prn/x/prid/1".into()),
            Cell::Empty,
            Cell::Empty,
            Cell::Empty,
        ]);
        // row 1: dmart N/A but covered by skip rule
        sheet.rows.push(vec![
            Cell::Text("L1".into()),
            Cell::Text("2026/08/06".into()),
            Cell::Empty,
            Cell::Empty,
            Cell::Text("https://www.dmart.in/product/x".into()),
            Cell::Text("N/A".into()),
        ]);
        // row 2: healthy
        sheet.rows.push(vec![
            Cell::Text("L1".into()),
            Cell::Text("2026/08/06".into()),
            Cell::Text("https://blinkit.com/prn/x/prid/2".into()),
            Cell::Number(1.0),
            Cell::Empty,
            Cell::Empty,
        ]);
        sheet
    }

    #[test]
    fn test_check_sheet_flags_and_skips() {
        let config = checker_config();
        let issues = check_sheet(&daily_sheet(), &config);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].website, "blinkit");
        assert_eq!(issues[0].column, "instock_blinkit");
        assert_eq!(issues[0].location, "L1");
        let counts = ExcelChecker::count_issues(&issues);
        assert_eq!(counts[&("blinkit".to_string(), "L1".to_string())], 1);
    }

    #[test]
    fn test_check_sheet_without_skip_rule_flags_na() {
        let mut config = checker_config();
        config.skip_checks.clear();
        let issues = check_sheet(&daily_sheet(), &config);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.website == "dmart"));
    }

    #[test]
    fn test_package_path_shape() {
        let config = checker_config();
        let end = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let packager = WeeklyPackager::new(&config, end, 7);
        let path = packager.package_path();
        assert_eq!(
            path,
            PathBuf::from("data/package/sku_ww31_20260731_20260806.xlsx")
        );
    }
}
