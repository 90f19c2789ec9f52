pub mod config;
pub mod error;
pub mod schema;
pub mod store;

pub use config::{DATA_DIR_ENV, default_base_dir, load_config, open_data_dir};
pub use error::{Result, StoreError};
pub use store::Store;
