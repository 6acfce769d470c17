pub mod merger;
pub mod reader;
pub mod sheet;
pub mod writer;

pub use merger::{DailyMerger, ExcelChecker, WeeklyPackager};
pub use reader::{read_workbook_merged, read_worksheet, SkuWorkbook};
pub use sheet::{Cell, Sheet};
pub use writer::write_workbook;
