// Data Models
pub mod copy_options;
pub mod request_config;

pub use copy_options::{CopyOptions, FileTreeFilter};
pub use request_config::RequestConfig;
