//! Settings snapshot consumed by the content providers.

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Settings that affect derived content.
///
/// Processors hold this behind an `Arc` and replace it wholesale on change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSettings {
    pub show_tags: bool,
    pub show_file_preview: bool,
    pub skip_headings_in_preview: bool,
    pub skip_code_blocks_in_preview: bool,
    /// Frontmatter properties whose value replaces the generated preview.
    pub preview_properties: Vec<String>,
    pub preview_length: usize,
    pub show_feature_image: bool,
    pub feature_image_properties: Vec<String>,
    pub use_frontmatter_metadata: bool,
    pub metadata_name_field: String,
    pub metadata_created_field: String,
    pub metadata_modified_field: String,
    pub metadata_date_format: String,
    /// Frontmatter property shown as the custom property; empty disables it.
    pub custom_property_field: String,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            show_tags: true,
            show_file_preview: true,
            skip_headings_in_preview: true,
            skip_code_blocks_in_preview: true,
            preview_properties: Vec::new(),
            preview_length: defaults::PREVIEW_LENGTH,
            show_feature_image: true,
            feature_image_properties: defaults::FEATURE_IMAGE_PROPERTIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            use_frontmatter_metadata: false,
            metadata_name_field: String::new(),
            metadata_created_field: defaults::METADATA_CREATED_FIELD.to_string(),
            metadata_modified_field: defaults::METADATA_MODIFIED_FIELD.to_string(),
            metadata_date_format: defaults::METADATA_DATE_FORMAT.to_string(),
            custom_property_field: String::new(),
        }
    }
}

/// Identifies one field of [`ContentSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    ShowTags,
    ShowFilePreview,
    SkipHeadingsInPreview,
    SkipCodeBlocksInPreview,
    PreviewProperties,
    PreviewLength,
    ShowFeatureImage,
    FeatureImageProperties,
    UseFrontmatterMetadata,
    MetadataNameField,
    MetadataCreatedField,
    MetadataModifiedField,
    MetadataDateFormat,
    CustomPropertyField,
}

impl ContentSettings {
    /// Whether `key` has a different value in `other`.
    pub fn differs(&self, other: &ContentSettings, key: SettingKey) -> bool {
        match key {
            SettingKey::ShowTags => self.show_tags != other.show_tags,
            SettingKey::ShowFilePreview => self.show_file_preview != other.show_file_preview,
            SettingKey::SkipHeadingsInPreview => {
                self.skip_headings_in_preview != other.skip_headings_in_preview
            }
            SettingKey::SkipCodeBlocksInPreview => {
                self.skip_code_blocks_in_preview != other.skip_code_blocks_in_preview
            }
            SettingKey::PreviewProperties => self.preview_properties != other.preview_properties,
            SettingKey::PreviewLength => self.preview_length != other.preview_length,
            SettingKey::ShowFeatureImage => self.show_feature_image != other.show_feature_image,
            SettingKey::FeatureImageProperties => {
                self.feature_image_properties != other.feature_image_properties
            }
            SettingKey::UseFrontmatterMetadata => {
                self.use_frontmatter_metadata != other.use_frontmatter_metadata
            }
            SettingKey::MetadataNameField => self.metadata_name_field != other.metadata_name_field,
            SettingKey::MetadataCreatedField => {
                self.metadata_created_field != other.metadata_created_field
            }
            SettingKey::MetadataModifiedField => {
                self.metadata_modified_field != other.metadata_modified_field
            }
            SettingKey::MetadataDateFormat => {
                self.metadata_date_format != other.metadata_date_format
            }
            SettingKey::CustomPropertyField => {
                self.custom_property_field != other.custom_property_field
            }
        }
    }

    /// Whether any of `keys` differs between the two snapshots.
    pub fn any_differs(&self, other: &ContentSettings, keys: &[SettingKey]) -> bool {
        keys.iter().any(|key| self.differs(other, *key))
    }
}
