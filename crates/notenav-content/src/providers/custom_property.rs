//! Value of a user-selected frontmatter property.

use async_trait::async_trait;

use notenav_core::{
    ContentJob, ContentProvider, ContentSettings, ContentType, ContentValue, FileData,
    ProcessOutcome, Result, SettingKey, VaultFile,
};

use super::{needs_text_processing, outcome};
use crate::frontmatter;
use crate::read_cache::ContentReader;

pub struct CustomPropertyProvider {
    reader: ContentReader,
}

impl CustomPropertyProvider {
    pub fn new(reader: ContentReader) -> Self {
        Self { reader }
    }

    fn extract(text: &str, field: &str) -> Option<String> {
        let fm = frontmatter::parse(text).frontmatter?;
        let values = fm.get_list(field);
        (!values.is_empty()).then(|| values.join(", "))
    }
}

#[async_trait]
impl ContentProvider for CustomPropertyProvider {
    fn content_type(&self) -> ContentType {
        ContentType::CustomProperty
    }

    fn relevant_settings(&self) -> &'static [SettingKey] {
        &[SettingKey::CustomPropertyField]
    }

    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        settings: &ContentSettings,
    ) -> bool {
        needs_text_processing(
            ContentType::CustomProperty,
            !settings.custom_property_field.is_empty(),
            file_data,
            file,
        )
    }

    async fn process_file(
        &self,
        job: &ContentJob,
        file_data: Option<&FileData>,
        settings: &ContentSettings,
    ) -> Result<ProcessOutcome> {
        let text = self.reader.read(&job.file).await?;
        let value = Self::extract(&text, &settings.custom_property_field);
        Ok(outcome(
            value,
            file_data.and_then(|d| d.custom_property.as_ref()),
            ContentValue::CustomProperty,
        ))
    }
}
