pub mod records;
pub mod store;

pub use records::ScrapeRecords;
pub use store::{encode_product_id, payload_ok, AddressExtractor, DumpStore};
