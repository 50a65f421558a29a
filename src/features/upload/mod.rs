pub mod handler;
pub mod models;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod temp;

pub use handler::{IMAGE_FIELD, TYPE_FIELD, create_upload_router, upload_image};
pub use models::{ImageKey, KeyError, UploadForm, UploadResponse};
pub use pipeline::{TransformError, TransformOptions, fit_within, normalize};
pub use store::{ImageStore, StoreError};
pub use temp::TempUpload;
