//! Tags from frontmatter and inline hashtags.

use std::collections::BTreeSet;

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

static CODE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(```|~~~).*?(```|~~~)").expect("valid regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`\n]+`").expect("valid regex"));
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>\[\]()]+|www\.[^\s<>\[\]()]+").expect("valid regex"));
static HASHTAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^\w/#-])#([A-Za-z_][\w/-]*)").expect("valid regex")
});
static TAG_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").expect("valid regex"));

/// Extract inline hashtags from a note body.
///
/// Code, headings, link targets and URLs are ignored. Tags may nest with
/// `/` and are returned lowercase, deduplicated and sorted.
///
/// ```
/// use notenav_content::providers::extract_inline_tags;
///
/// let tags = extract_inline_tags("Meeting #Work and #project/alpha, see `#not`");
/// assert_eq!(tags, vec!["project/alpha", "work"]);
/// ```
pub fn extract_inline_tags(body: &str) -> Vec<String> {
    let without_code = CODE_BLOCK.replace_all(body, "");
    let without_inline = INLINE_CODE.replace_all(&without_code, "");
    let without_headings = remove_headings(&without_inline);
    let without_links = MARKDOWN_LINK.replace_all(&without_headings, "$1");
    let text = URL.replace_all(&without_links, "");

    let mut tags = BTreeSet::new();
    for line in text.lines() {
        for cap in HASHTAG.captures_iter(line) {
            if let Some(tag) = cap.get(1).and_then(|m| normalize(m.as_str())) {
                tags.insert(tag);
            }
        }
    }
    tags.into_iter().collect()
}

fn remove_headings(content: &str) -> String {
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            let hashes = trimmed.chars().take_while(|&c| c == '#').count();
            hashes == 0 || !matches!(trimmed[hashes..].chars().next(), None | Some(' '))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_start_matches('#').trim_end_matches('/');
    if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(tag.to_lowercase())
}

/// Tags listed in frontmatter, either as a list or a comma/space
/// separated string.
fn frontmatter_tags(fm: &frontmatter::Frontmatter) -> Vec<String> {
    ["tags", "tag"]
        .iter()
        .flat_map(|key| fm.get_list(key))
        .flat_map(|value| {
            TAG_SEPARATOR
                .split(&value)
                .filter_map(normalize)
                .collect::<Vec<_>>()
        })
        .collect()
}

pub struct TagsProvider {
    reader: ContentReader,
}

impl TagsProvider {
    pub fn new(reader: ContentReader) -> Self {
        Self { reader }
    }

    fn extract(text: &str) -> Option<Vec<String>> {
        let note = frontmatter::parse(text);
        let mut tags: BTreeSet<String> = extract_inline_tags(note.body).into_iter().collect();
        if let Some(fm) = &note.frontmatter {
            tags.extend(frontmatter_tags(fm));
        }
        (!tags.is_empty()).then(|| tags.into_iter().collect())
    }
}

#[async_trait]
impl ContentProvider for TagsProvider {
    fn content_type(&self) -> ContentType {
        ContentType::Tags
    }

    fn relevant_settings(&self) -> &'static [SettingKey] {
        &[SettingKey::ShowTags]
    }

    fn needs_processing(
        &self,
        file_data: Option<&FileData>,
        file: &VaultFile,
        settings: &ContentSettings,
    ) -> bool {
        needs_text_processing(ContentType::Tags, settings.show_tags, file_data, file)
    }

    async fn process_file(
        &self,
        job: &ContentJob,
        file_data: Option<&FileData>,
        _settings: &ContentSettings,
    ) -> Result<ProcessOutcome> {
        let text = self.reader.read(&job.file).await?;
        let tags = Self::extract(&text);
        Ok(outcome(
            tags,
            file_data.and_then(|d| d.tags.as_ref()),
            ContentValue::Tags,
        ))
    }
}
