use serde::{Deserialize, Serialize};

/// Tells variant pages (one buyable configuration) apart from category pages.
///
/// - `https://www.apple.com/shop/buy-iphone` is a category page
/// - `https://www.apple.com/shop/buy-iphone/iphone-13/6.1-inch-display-128gb-starlight-unlocked`
///   is a variant page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFilter {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Minimum number of `/` separated segments, scheme included
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
}

impl Default for VariantFilter {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            min_segments: default_min_segments(),
        }
    }
}

fn default_prefix() -> String {
    String::from("https://www.apple.com/shop/buy-iphone")
}

fn default_min_segments() -> usize {
    7
}

impl VariantFilter {
    pub fn is_variant_page(&self, url: &str) -> bool {
        url.starts_with(&self.prefix) && url.split('/').count() >= self.min_segments
    }
}
