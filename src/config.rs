use std::path::PathBuf;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Immutable run configuration, assembled once at startup from CLI
/// flags and environment, then threaded into the coordinator.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory holding `products_*.json` files, or one explicit file.
    pub data_path: PathBuf,
    /// Rows per upsert transaction.
    pub batch_size: usize,
    /// Maintain the `tiki_product_images` child table.
    pub normalize_images: bool,
    pub max_connections: u32,
    pub database_url: String,
}
