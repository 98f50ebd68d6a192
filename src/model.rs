use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// One normalized catalogue row, ready to bind into the product upsert.
#[derive(Debug, Clone)]
pub struct ProductRow {
    pub id: i64,
    pub name: Option<String>,
    pub url_key: Option<String>,
    pub price: Option<BigDecimal>,
    pub description: Option<String>,
    /// Coerced, ordered image URLs; drives child-table reconciliation.
    pub image_urls: Vec<String>,
    /// Verbatim `images` attribute from the source JSON. Always written
    /// to the JSONB column, whether or not normalization mode is on.
    pub images_doc: serde_json::Value,
    /// Basename of the originating file. Provenance, not business data.
    pub source_file: String,
    pub ingested_at: DateTime<Utc>,
}

/// One row of `tiki_product_images`.
#[derive(Debug, Clone)]
pub struct ImageRow {
    pub product_id: i64,
    pub position: i32,
    pub image_url: String,
}
