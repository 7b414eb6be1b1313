pub mod image_ops;
pub mod metrics;

// Re-export commonly used items
pub use image_ops::{
    encode_png_async, load_image_file_async, load_image_from_memory_async,
    validate_image_dimensions, write_png_async,
};
pub use metrics::{Metrics, MetricsSnapshot};
