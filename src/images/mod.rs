//! Image encoding, storage and management.
//!
//! Uploads are re-encoded to fit the inline payload budget, then persisted
//! through an [`ImageStore`] backed by `pixshare_db`.

mod encoder;
mod service;
mod store;

pub use encoder::{
    encode_for_inline, fit_within, AppliedTier, EncodeError, EncodedImage, EncoderPolicy,
    SizeTier, JPEG_MIME,
};
pub use service::{ImageService, Requester, UploadError};
pub use store::{ImageStore, SqliteImageStore};
