use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Site;

/// Canonical stock tri-state. Each site historically used its own sentinel
/// set; this enum is the single in-memory representation and `to_cell` is the
/// only place the historic spreadsheet encodings survive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockStatus {
    InStock,
    OutOfStock,
    Unknown,
}

impl StockStatus {
    pub fn from_bool(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => StockStatus::InStock,
            Some(false) => StockStatus::OutOfStock,
            None => StockStatus::Unknown,
        }
    }

    /// Spreadsheet cell value per site: Zepto and Swiggy sheets carry
    /// `Y`/`N`/`-`, Blinkit and Dmart `1`/`0`/`N/A`.
    pub fn to_cell(&self, site: Site) -> Value {
        match site {
            Site::Zepto | Site::Swiggy => match self {
                StockStatus::InStock => Value::from("Y"),
                StockStatus::OutOfStock => Value::from("N"),
                StockStatus::Unknown => Value::from("-"),
            },
            Site::Blinkit | Site::Dmart => match self {
                StockStatus::InStock => Value::from(1),
                StockStatus::OutOfStock => Value::from(0),
                StockStatus::Unknown => Value::from("N/A"),
            },
        }
    }
}

/// Flat record extracted from one product dump. Only ever flows into
/// spreadsheet cells; never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_name: Option<String>,
    pub product_id: Option<String>,
    pub unit: Option<String>,
    pub price: Option<f64>,
    pub mrp: Option<f64>,
    /// Zepto "super saver" price; absent everywhere else.
    pub super_price: Option<f64>,
    pub in_stock: StockStatus,
    pub location: Option<String>,
}

impl Default for ProductRecord {
    fn default() -> Self {
        Self {
            product_name: None,
            product_id: None,
            unit: None,
            price: None,
            mrp: None,
            super_price: None,
            in_stock: StockStatus::Unknown,
            location: None,
        }
    }
}

/// Index of the variant whose MRP is numerically closest to `reference`.
/// Cross-site join heuristic: Swiggy and Dmart list several SKU variants on
/// one page, and the tracked one is identified by the MRP already extracted
/// from Blinkit/Zepto for the same master row.
pub fn pick_closest_mrp<F>(items: &[Value], mrp_of: F, reference: f64) -> Option<usize>
where
    F: Fn(&Value) -> Option<f64>,
{
    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| mrp_of(item).map(|mrp| (idx, (mrp - reference).abs())))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(idx, _)| idx)
}
