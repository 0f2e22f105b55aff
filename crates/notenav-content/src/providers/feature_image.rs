//! Feature image from frontmatter or the first embedded image.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use notenav_core::{
    ContentJob, ContentProvider, ContentSettings, ContentType, ContentValue, FileData,
    ProcessOutcome, Result, SettingKey, VaultFile,
};

use super::{needs_text_processing, outcome};
use crate::frontmatter;
use crate::read_cache::ContentReader;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif"];

static EMBEDDED_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[\[([^\]|#]+)[^\]]*\]\]|!\[[^\]]*\]\(\s*<?([^)\s>]+)").expect("valid regex")
});
static WIKILINK_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!?\[\[([^\]|#]+)[^\]]*\]\]$").expect("valid regex"));

fn has_image_extension(target: &str) -> bool {
    target
        .rsplit_once('.')
        .map(|(_, ext)| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Unwrap `[[target]]` property values.
fn property_target(value: &str) -> String {
    WIKILINK_VALUE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| value.to_string())
}

/// First image embedded in `body`: a `![[file.png]]` embed or a
/// `![alt](url)` image, whichever comes first.
fn first_embedded_image(body: &str) -> Option<String> {
    EMBEDDED_IMAGE.captures_iter(body).find_map(|caps| {
        if let Some(embed) = caps.get(1) {
            let target = embed.as_str().trim();
            return has_image_extension(target).then(|| target.to_string());
        }
        caps.get(2).map(|url| url.as_str().to_string())
    })
}

pub struct FeatureImageProvider {
    reader: ContentReader,
}

impl FeatureImageProvider {
    pub fn new(reader: ContentReader) -> Self {
        Self { reader }
    }

    fn extract(text: &str, settings: &ContentSettings) -> Option<String> {
        let note = frontmatter::parse(text);
        let from_property = note.frontmatter.as_ref().and_then(|fm| {
            settings
                .feature_image_properties
                .iter()
                .find_map(|key| fm.get_str(key))
                .map(|value| property_target(&value))
        });
        from_property.or_else(|| first_embedded_image(note.body))
    }
}

#[async_trait]
impl ContentProvider for FeatureImageProvider {
    fn content_type(&self) -> ContentType {
        ContentType::FeatureImage
    }

    fn relevant_settings(&self) -> &'static [SettingKey] {
        &[
            SettingKey::ShowFeatureImage,
            SettingKey::FeatureImageProperties,
        ]
    }

    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        settings: &ContentSettings,
    ) -> bool {
        needs_text_processing(
            ContentType::FeatureImage,
            settings.show_feature_image,
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
        let image = Self::extract(&text, settings);
        Ok(outcome(
            image,
            file_data.and_then(|d| d.feature_image.as_ref()),
            ContentValue::FeatureImage,
        ))
    }
}
