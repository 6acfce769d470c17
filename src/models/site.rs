use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Site {
    Blinkit,
    Zepto,
    Swiggy,
    Dmart,
}

pub const ALL_SITES: [Site; 4] = [Site::Blinkit, Site::Zepto, Site::Swiggy, Site::Dmart];

impl Site {
    pub fn key(&self) -> &'static str {
        match self {
            Site::Blinkit => "blinkit",
            Site::Zepto => "zepto",
            Site::Swiggy => "swiggy",
            Site::Dmart => "dmart",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "blinkit" => Some(Site::Blinkit),
            "zepto" => Some(Site::Zepto),
            "swiggy" => Some(Site::Swiggy),
            "dmart" => Some(Site::Dmart),
            _ => None,
        }
    }

    /// Suffix used by the spreadsheet columns. Swiggy's columns carry the
    /// storefront brand ("instamart"), not the site key.
    pub fn column_suffix(&self) -> &'static str {
        match self {
            Site::Swiggy => "instamart",
            other => other.key(),
        }
    }

    pub fn weblink_column(&self) -> String {
        format!("weblink_{}", self.column_suffix())
    }

    pub fn instock_column(&self) -> String {
        format!("instock_{}", self.column_suffix())
    }

    pub fn location_column(&self) -> String {
        format!("location_{}", self.column_suffix())
    }

    pub fn discount_column(&self) -> &'static str {
        match self {
            Site::Blinkit => "Disc_Blinkit",
            Site::Zepto => "Disc_Zepto",
            Site::Swiggy => "Disc_Instamart",
            Site::Dmart => "Disc_Dmart",
        }
    }

    /// Dotted path of the delivery-address marker inside a dump. Blinkit and
    /// Dmart store it in cookies, Swiggy inside the dumped page state, Zepto
    /// in localStorage.
    pub fn dump_address_path(&self) -> &'static str {
        match self {
            Site::Blinkit => "cookies.gr_1_locality",
            Site::Swiggy => "userLocation.address",
            Site::Zepto => "local_storage.state.userPosition.shortAddress",
            Site::Dmart => "cookies.guest.preferredPIN",
        }
    }
}

impl std::fmt::Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_keys_round_trip() {
        for site in ALL_SITES {
            assert_eq!(Site::from_key(site.key()), Some(site));
        }
        assert_eq!(Site::from_key("amazon"), None);
    }

    #[test]
    fn test_swiggy_columns_use_instamart_suffix() {
        assert_eq!(Site::Swiggy.weblink_column(), "weblink_instamart");
        assert_eq!(Site::Swiggy.instock_column(), "instock_instamart");
        assert_eq!(Site::Blinkit.weblink_column(), "weblink_blinkit");
    }
}
