//! Display name and dates from frontmatter.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use notenav_core::{
    ContentJob, ContentProvider, ContentSettings, ContentType, ContentValue, FileData,
    FileMetadata, ProcessOutcome, Result, SettingKey, VaultFile,
};

use super::{needs_text_processing, outcome};
use crate::frontmatter::{self, Frontmatter};
use crate::read_cache::ContentReader;

/// Parse a frontmatter date into epoch milliseconds.
///
/// Tries `format` as a date-time, then as a date, then `YYYY-MM-DD`, then
/// RFC 3339, then a bare millisecond timestamp. Times without an offset are
/// read as UTC.
pub fn parse_date(value: &str, format: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(dt.and_utc().timestamp_millis());
    }
    for date_format in [format, "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, date_format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    value.parse::<i64>().ok()
}

pub struct MetadataProvider {
    reader: ContentReader,
}

impl MetadataProvider {
    pub fn new(reader: ContentReader) -> Self {
        Self { reader }
    }

    fn date_field(fm: &Frontmatter, field: &str, format: &str) -> Option<i64> {
        if field.is_empty() {
            return None;
        }
        fm.get_str(field).and_then(|value| parse_date(&value, format))
    }

    fn extract(text: &str, settings: &ContentSettings) -> Option<FileMetadata> {
        let fm = frontmatter::parse(text).frontmatter?;
        let name = if settings.metadata_name_field.is_empty() {
            None
        } else {
            fm.get_str(&settings.metadata_name_field)
        };
        let metadata = FileMetadata {
            name,
            created: Self::date_field(
                &fm,
                &settings.metadata_created_field,
                &settings.metadata_date_format,
            ),
            modified: Self::date_field(
                &fm,
                &settings.metadata_modified_field,
                &settings.metadata_date_format,
            ),
        };
        (!metadata.is_empty()).then_some(metadata)
    }
}

#[async_trait]
impl ContentProvider for MetadataProvider {
    fn content_type(&self) -> ContentType {
        ContentType::Metadata
    }

    fn relevant_settings(&self) -> &'static [SettingKey] {
        &[
            SettingKey::UseFrontmatterMetadata,
            SettingKey::MetadataNameField,
            SettingKey::MetadataCreatedField,
            SettingKey::MetadataModifiedField,
            SettingKey::MetadataDateFormat,
        ]
    }

    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        settings: &ContentSettings,
    ) -> bool {
        needs_text_processing(
            ContentType::Metadata,
            settings.use_frontmatter_metadata,
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
        let metadata = Self::extract(&text, settings);
        Ok(outcome(
            metadata,
            file_data.and_then(|d| d.metadata.as_ref()),
            ContentValue::Metadata,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support;

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("1970-01-01T00:00:01", FORMAT), Some(1_000));
        assert_eq!(parse_date("1970-01-02", FORMAT), Some(86_400_000));
        assert_eq!(parse_date("1970-01-01T00:00:00+01:00", FORMAT), Some(-3_600_000));
        assert_eq!(parse_date("1700000000000", FORMAT), Some(1_700_000_000_000));
        assert_eq!(parse_date("02/01/1970", "%d/%m/%Y"), Some(86_400_000));
        assert_eq!(parse_date("yesterday", FORMAT), None);
        assert_eq!(parse_date("  ", FORMAT), None);
    }

    #[test]
    fn test_extract_uses_configured_fields() {
        let settings = ContentSettings {
            use_frontmatter_metadata: true,
            metadata_name_field: "title".into(),
            metadata_created_field: "date".into(),
            ..ContentSettings::default()
        };
        let text = "---\ntitle: My Note\ndate: 1970-01-02\nmodified: 1970-01-01T00:00:01\n---\n";
        assert_eq!(
            MetadataProvider::extract(text, &settings),
            Some(FileMetadata {
                name: Some("My Note".into()),
                created: Some(86_400_000),
                modified: Some(1_000),
            })
        );
    }

    #[test]
    fn test_extract_without_fields_is_none() {
        let settings = ContentSettings::default();
        assert_eq!(MetadataProvider::extract("no frontmatter", &settings), None);
        assert_eq!(MetadataProvider::extract("---\nother: 1\n---\n", &settings), None);
    }

    #[tokio::test]
    async fn test_disabled_by_default() {
        let (vault, reader) = test_support::reader();
        let provider = MetadataProvider::new(reader);
        let job = test_support::job(&vault, "a.md", "---\ncreated: 1970-01-02\n---\n");

        assert!(!provider.needs_processing(None, &job.file, &ContentSettings::default()));

        let enabled = ContentSettings {
            use_frontmatter_metadata: true,
            ..ContentSettings::default()
        };
        assert!(provider.needs_processing(None, &job.file, &enabled));
        let result = provider.process_file(&job, None, &enabled).await.unwrap();
        assert_eq!(
            result,
            ProcessOutcome::updated(ContentValue::Metadata(Some(FileMetadata {
                name: None,
                created: Some(86_400_000),
                modified: None,
            })))
        );
    }
}
