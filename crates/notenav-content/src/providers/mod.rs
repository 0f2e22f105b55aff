//! Content providers.
//!
//! Each provider extracts one [`ContentType`] from markdown notes read
//! through the shared [`ContentReader`]. A provider is enabled by its
//! settings and reprocesses a file only when the processed mtime stored
//! for its kind differs from the file's current mtime.

mod custom_property;
mod feature_image;
mod metadata;
mod preview;
mod tags;

use std::sync::Arc;

use notenav_core::{
    is_stale, ContentProvider, ContentType, ContentValue, FileData, ProcessOutcome, VaultFile,
};

use crate::read_cache::ContentReader;

pub use custom_property::CustomPropertyProvider;
pub use feature_image::FeatureImageProvider;
pub use metadata::{parse_date, MetadataProvider};
pub use preview::PreviewProvider;
pub use tags::{extract_inline_tags, TagsProvider};

/// One provider per content type, sharing `reader`.
pub fn default_providers(reader: ContentReader) -> Vec<Arc<dyn ContentProvider>> {
    vec![
        Arc::new(TagsProvider::new(reader.clone())),
        Arc::new(PreviewProvider::new(reader.clone())),
        Arc::new(FeatureImageProvider::new(reader.clone())),
        Arc::new(MetadataProvider::new(reader.clone())),
        Arc::new(CustomPropertyProvider::new(reader)),
    ]
}

/// Shared rule for the text providers.
fn needs_text_processing(
    kind: ContentType,
    enabled: bool,
    file_data: Option<&FileData>,
    file: &VaultFile,
) -> bool {
    enabled && file.is_markdown() && is_stale(kind, file_data, file)
}

/// Skip the write when the stored value already matches.
fn outcome<T: PartialEq>(
    extracted: Option<T>,
    stored: Option<&T>,
    wrap: fn(Option<T>) -> ContentValue,
) -> ProcessOutcome {
    if extracted.as_ref() == stored {
        ProcessOutcome::unchanged()
    } else {
        ProcessOutcome::updated(wrap(extracted))
    }
}
