//! Plain-text preview of a note body.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use notenav_core::{
    ContentJob, ContentProvider, ContentSettings, ContentType, ContentValue, FileData,
    ProcessOutcome, Result, SettingKey, VaultFile,
};

use super::{needs_text_processing, outcome};
use crate::frontmatter;
use crate::read_cache::ContentReader;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}(\s+|$)").expect("valid regex"));
static LINE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:>\s*)*(?:[-*+]\s+(?:\[.\]\s+)?|\d+[.)]\s+)?").expect("valid regex")
});
static EMBED: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[\[[^\]]*\]\]").expect("valid regex"));
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));
static WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\]|]*)(?:\|([^\]]*))?\]\]").expect("valid regex"));
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("valid regex"));
static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)%%.*?%%").expect("valid regex"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*|__|~~|==|[*`]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Render `body` as a single line of plain text.
fn plain_text(body: &str, skip_headings: bool, skip_code_blocks: bool) -> String {
    let mut lines = Vec::new();
    let mut in_code = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code = !in_code;
            continue;
        }
        if in_code {
            if !skip_code_blocks {
                lines.push(line.trim().to_string());
            }
            continue;
        }
        if HEADING.is_match(trimmed) {
            if !skip_headings {
                lines.push(HEADING.replace(trimmed, "").into_owned());
            }
            continue;
        }
        lines.push(LINE_PREFIX.replace(line, "").into_owned());
    }

    let text = lines.join(" ");
    let text = COMMENT.replace_all(&text, "");
    let text = EMBED.replace_all(&text, "");
    let text = IMAGE.replace_all(&text, "");
    let text = WIKILINK.replace_all(&text, |caps: &Captures| {
        caps.get(2)
            .or_else(|| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    });
    let text = LINK.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    let text = EMPHASIS.replace_all(&text, "");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// First `max_chars` characters of `text`, or `None` if empty.
fn truncate(text: &str, max_chars: usize) -> Option<String> {
    let truncated: String = text.chars().take(max_chars).collect();
    let truncated = truncated.trim_end();
    (!truncated.is_empty()).then(|| truncated.to_string())
}

pub struct PreviewProvider {
    reader: ContentReader,
}

impl PreviewProvider {
    pub fn new(reader: ContentReader) -> Self {
        Self { reader }
    }

    fn extract(text: &str, settings: &ContentSettings) -> Option<String> {
        let note = frontmatter::parse(text);

        if let Some(fm) = &note.frontmatter {
            let property = settings
                .preview_properties
                .iter()
                .find_map(|key| fm.get_str(key));
            if let Some(value) = property {
                return truncate(&WHITESPACE.replace_all(&value, " "), settings.preview_length);
            }
        }

        let text = plain_text(
            note.body,
            settings.skip_headings_in_preview,
            settings.skip_code_blocks_in_preview,
        );
        truncate(&text, settings.preview_length)
    }
}

#[async_trait]
impl ContentProvider for PreviewProvider {
    fn content_type(&self) -> ContentType {
        ContentType::Preview
    }

    fn relevant_settings(&self) -> &'static [SettingKey] {
        &[
            SettingKey::ShowFilePreview,
            SettingKey::SkipHeadingsInPreview,
            SettingKey::SkipCodeBlocksInPreview,
            SettingKey::PreviewProperties,
            SettingKey::PreviewLength,
        ]
    }

    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        settings: &ContentSettings,
    ) -> bool {
        needs_text_processing(
            ContentType::Preview,
            settings.show_file_preview,
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
        let preview = Self::extract(&text, settings);
        Ok(outcome(
            preview,
            file_data.and_then(|d| d.preview.as_ref()),
            ContentValue::Preview,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::test_support;

    fn settings() -> ContentSettings {
        ContentSettings::default()
    }

    #[test]
    fn test_strips_markdown_syntax() {
        let body = "# Title\n\n> **Bold** and *italic* with [[Target|alias]] and [[Plain]].\n\
                    - item with [link](http://x) ![img](a.png) ![[b.png]]\n1. `code` ==mark==";
        assert_eq!(
            PreviewProvider::extract(body, &settings()).as_deref(),
            Some("Bold and italic with alias and Plain. item with link code mark")
        );
    }

    #[test]
    fn test_keeps_headings_and_code_when_asked() {
        let body = "## Intro\ntext\n```rust\nlet x = 1;\n```";
        let keep = ContentSettings {
            skip_headings_in_preview: false,
            skip_code_blocks_in_preview: false,
            ..settings()
        };
        assert_eq!(
            PreviewProvider::extract(body, &keep).as_deref(),
            Some("Intro text let x = 1;")
        );
        assert_eq!(PreviewProvider::extract(body, &settings()).as_deref(), Some("text"));
    }

    #[test]
    fn test_skips_frontmatter_and_comments() {
        let text = "---\ntitle: x\n---\nVisible %%hidden%% text";
        assert_eq!(
            PreviewProvider::extract(text, &settings()).as_deref(),
            Some("Visible text")
        );
    }

    #[test]
    fn test_truncates_by_characters() {
        let short = ContentSettings {
            preview_length: 4,
            ..settings()
        };
        assert_eq!(PreviewProvider::extract("héllo wörld", &short).as_deref(), Some("héll"));
        assert_eq!(PreviewProvider::extract("", &settings()), None);
    }

    #[test]
    fn test_preview_property_wins() {
        let custom = ContentSettings {
            preview_properties: vec!["summary".into(), "description".into()],
            ..settings()
        };
        let text = "---\ndescription: From  frontmatter\n---\nBody text";
        assert_eq!(
            PreviewProvider::extract(text, &custom).as_deref(),
            Some("From frontmatter")
        );
        assert_eq!(
            PreviewProvider::extract("---\nother: 1\n---\nBody text", &custom).as_deref(),
            Some("Body text")
        );
    }

    #[tokio::test]
    async fn test_process_file_writes_preview() {
        let (vault, reader) = test_support::reader();
        let provider = PreviewProvider::new(reader);
        let job = test_support::job(&vault, "a.md", "Hello world");

        let result = provider.process_file(&job, None, &settings()).await.unwrap();
        assert_eq!(
            result,
            ProcessOutcome::updated(ContentValue::Preview(Some("Hello world".into())))
        );
    }
}
