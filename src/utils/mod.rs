pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::{content_type_for, ensure_storage_sentinel, site_namespace, validate_target_url};
