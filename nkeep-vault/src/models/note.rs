//! Note records: the fixed-shape schema stored as `metadata.json`
//!
//! A note enters the system as a [`RemoteSummary`] from a listing, is
//! enriched from a [`NoteDetail`] when fetched, and is immutable afterwards
//! apart from media repair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::naming::media_extension;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];

/// Kind of post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    /// Remote platform calls these "normal"
    #[default]
    #[serde(alias = "normal")]
    ImageSet,
    Video,
}

/// Engagement counters, snapshotted at scrape time and never recomputed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    pub likes: u64,
    pub collects: u64,
    pub comments: u64,
    pub shares: u64,
}

/// One media file of a note: local file name plus the URL it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub file: String,
    pub url: String,
}

/// Persisted note metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub desc: String,
    pub author: String,
    #[serde(default)]
    pub author_id: String,
    #[serde(default)]
    pub author_avatar_url: String,
    #[serde(rename = "type", default)]
    pub note_type: NoteType,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub engagement: Engagement,
    /// Album the note was collected under remotely
    pub remote_album: String,
    /// Images in display order, then at most one video
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    /// When the note was downloaded; unset while it is listing-only
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl Note {
    /// Listing-only note built from a summary; no media yet
    pub fn from_summary(summary: &RemoteSummary, remote_album: &str) -> Self {
        let note_ref = summary.note_ref();
        Self {
            id: note_ref.id,
            title: summary.title.clone(),
            desc: String::new(),
            author: summary.author.clone(),
            author_id: String::new(),
            author_avatar_url: summary.author_avatar.clone(),
            note_type: summary.note_type,
            tags: normalize_tags(summary.tags.iter().cloned()),
            engagement: Engagement {
                likes: summary.likes,
                collects: summary.collects,
                ..Engagement::default()
            },
            remote_album: remote_album.to_string(),
            media: Vec::new(),
            cover_url: summary.cover.clone(),
            source_url: (!summary.link.is_empty()).then(|| summary.link.clone()),
            published_at: None,
            scraped_at: None,
        }
    }

    /// Full note from a fetched detail; summary fields fill gaps in the detail
    pub fn from_detail(detail: NoteDetail, summary: &RemoteSummary, remote_album: &str) -> Self {
        let note_ref = summary.note_ref();

        let mut media: Vec<MediaRef> = detail
            .image_urls
            .iter()
            .filter(|url| !url.is_empty())
            .enumerate()
            .map(|(idx, url)| MediaRef {
                file: format!("image_{}.{}", idx, media_extension(url, IMAGE_EXTENSIONS, "jpg")),
                url: url.clone(),
            })
            .collect();

        if let Some(url) = detail.video_url.as_ref().filter(|u| !u.is_empty()) {
            media.push(MediaRef {
                file: format!("video.{}", media_extension(url, VIDEO_EXTENSIONS, "mp4")),
                url: url.clone(),
            });
        }

        let note_type = if media.iter().any(|m| m.file.starts_with("video.")) {
            NoteType::Video
        } else {
            detail.note_type.unwrap_or(summary.note_type)
        };

        let tags = if detail.tags.is_empty() {
            normalize_tags(summary.tags.iter().cloned())
        } else {
            normalize_tags(detail.tags)
        };

        Self {
            id: note_ref.id,
            title: non_empty_or(detail.title, &summary.title),
            desc: detail.desc,
            author: non_empty_or(detail.author, &summary.author),
            author_id: detail.author_id,
            author_avatar_url: non_empty_or(detail.author_avatar_url, &summary.author_avatar),
            note_type,
            tags,
            engagement: Engagement {
                likes: detail.likes,
                collects: detail.collects,
                comments: detail.comments,
                shares: detail.shares,
            },
            remote_album: remote_album.to_string(),
            media,
            cover_url: summary.cover.clone(),
            source_url: (!summary.link.is_empty()).then(|| summary.link.clone()),
            published_at: detail.published_at,
            scraped_at: Some(Utc::now()),
        }
    }

    /// Local media file names in display order
    pub fn media_refs(&self) -> Vec<&str> {
        self.media.iter().map(|m| m.file.as_str()).collect()
    }

    /// Case-insensitive substring match over title, author and tags
    ///
    /// `needle` must already be lowercased.
    pub fn matches_keyword(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.author.to_lowercase().contains(needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Tags form a set: drop blanks and duplicates, keep first-seen order
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Note identity plus the access token some remote ids carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRef {
    pub id: String,
    pub xsec_token: Option<String>,
    pub xsec_source: Option<String>,
}

/// Split `"<id>?xsec_token=..&xsec_source=.."` into identity and token
///
/// A path prefix (`/explore/<id>`, full URL) is also stripped.
pub fn parse_note_ref(raw: &str) -> NoteRef {
    let (base, query) = match raw.split_once('?') {
        Some((b, q)) => (b, q),
        None => (raw, ""),
    };
    let id = base.trim_end_matches('/').rsplit('/').next().unwrap_or("").trim();

    let mut xsec_token = None;
    let mut xsec_source = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("xsec_token", v)) if !v.is_empty() => xsec_token = Some(v.to_string()),
            Some(("xsec_source", v)) if !v.is_empty() => xsec_source = Some(v.to_string()),
            _ => {}
        }
    }

    NoteRef {
        id: id.to_string(),
        xsec_token,
        xsec_source,
    }
}

/// Parse a display counter: "856", "1.2万", "3k", "2亿"; garbage becomes 0
pub fn parse_count(text: &str) -> u64 {
    let text = text.trim().replace([',', '+'], "");
    if text.is_empty() {
        return 0;
    }

    let (number, multiplier) = if let Some(n) = text.strip_suffix('万') {
        (n, 10_000.0)
    } else if let Some(n) = text.strip_suffix('亿') {
        (n, 100_000_000.0)
    } else if let Some(n) = text.strip_suffix(['w', 'W']) {
        (n, 10_000.0)
    } else if let Some(n) = text.strip_suffix(['k', 'K']) {
        (n, 1_000.0)
    } else {
        (text.as_str(), 1.0)
    };

    match number.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v * multiplier).round() as u64,
        _ => 0,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CountValue {
    Int(u64),
    Float(f64),
    Text(String),
}

fn de_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(match Option::<CountValue>::deserialize(deserializer)? {
        Some(CountValue::Int(n)) => n,
        Some(CountValue::Float(f)) if f.is_finite() && f >= 0.0 => f.round() as u64,
        Some(CountValue::Float(_)) => 0,
        Some(CountValue::Text(s)) => parse_count(&s),
        None => 0,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TagValue {
    Name { name: String },
    Text(String),
}

fn de_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let values = Option::<Vec<TagValue>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .map(|v| match v {
            TagValue::Name { name } => name,
            TagValue::Text(s) => s,
        })
        .collect())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextValue {
    Text(String),
    Int(i64),
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<TextValue>::deserialize(deserializer)? {
        Some(TextValue::Text(s)) if !s.is_empty() => Some(s),
        Some(TextValue::Int(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Lightweight item from a remote listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSummary {
    /// Raw id, possibly carrying `?xsec_token=...`
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub author_avatar: String,
    #[serde(rename = "type", default)]
    pub note_type: NoteType,
    #[serde(default, deserialize_with = "de_count")]
    pub likes: u64,
    #[serde(default, deserialize_with = "de_count")]
    pub collects: u64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RemoteSummary {
    /// Minimal summary, mostly for tests and manual imports
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            cover: String::new(),
            author: String::new(),
            author_avatar: String::new(),
            note_type: NoteType::ImageSet,
            likes: 0,
            collects: 0,
            link: String::new(),
            tags: Vec::new(),
        }
    }

    /// Identity and access token; the token falls back to the link's query
    pub fn note_ref(&self) -> NoteRef {
        let mut note_ref = parse_note_ref(&self.id);
        if note_ref.xsec_token.is_none() && self.link.contains('?') {
            let from_link = parse_note_ref(&self.link);
            note_ref.xsec_token = from_link.xsec_token;
            note_ref.xsec_source = note_ref.xsec_source.or(from_link.xsec_source);
        }
        note_ref
    }
}

/// One remote album with its ordered summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAlbum {
    pub name: String,
    #[serde(default)]
    pub notes: Vec<RemoteSummary>,
}

/// A full remote listing, in the shape the listing scraper writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteListing {
    pub albums: Vec<RemoteAlbum>,
}

impl RemoteListing {
    /// Flatten into reconcilable items, in listing order
    pub fn items(&self) -> Vec<RemoteItem> {
        self.albums
            .iter()
            .flat_map(|album| {
                album.notes.iter().map(move |summary| RemoteItem {
                    album: album.name.clone(),
                    summary: summary.clone(),
                })
            })
            .collect()
    }
}

/// A summary together with the remote album it was listed under
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteItem {
    pub album: String,
    pub summary: RemoteSummary,
}

impl RemoteItem {
    pub fn new(album: impl Into<String>, summary: RemoteSummary) -> Self {
        Self {
            album: album.into(),
            summary,
        }
    }

    pub fn id(&self) -> String {
        self.summary.note_ref().id
    }
}

/// Full detail returned by the detail-fetch collaborator
///
/// Field aliases accept the crawler's native vocabulary
/// (`note_id`, `nickname`, `liked_count`, `tag_list`, ...).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NoteDetail {
    #[serde(default, alias = "note_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(rename = "type", default)]
    pub note_type: Option<NoteType>,
    #[serde(default, alias = "user_id")]
    pub author_id: String,
    #[serde(default, alias = "nickname")]
    pub author: String,
    #[serde(default, alias = "avatar")]
    pub author_avatar_url: String,
    #[serde(default, alias = "tag_list", deserialize_with = "de_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default, alias = "liked_count", deserialize_with = "de_count")]
    pub likes: u64,
    #[serde(default, alias = "collected_count", deserialize_with = "de_count")]
    pub collects: u64,
    #[serde(default, alias = "comment_count", deserialize_with = "de_count")]
    pub comments: u64,
    #[serde(default, alias = "share_count", deserialize_with = "de_count")]
    pub shares: u64,
    #[serde(default, alias = "time", deserialize_with = "de_opt_text")]
    pub published_at: Option<String>,
}
