//! Front matter: the metadata block at the top of a markdown document.
//!
//! ```text
//! ---
//! tags:
//!   - rust
//!   - build
//! created: 2024-01-02 10:00
//! ---
//! # Title
//! ```
//!
//! ## Block rules
//!
//! - The opening `---` must be the first non-blank line of the document.
//! - The block ends at the next `---` line. Both marker lines belong to the
//!   block and are removed by [`strip`].
//! - An opening marker that is never closed makes the block
//!   [`Block::Unterminated`]: the document is treated as having no front
//!   matter at all. Nothing is stripped and no metadata is extracted.
//! - `---` lines further down the body are horizontal rules, never metadata.
//!
//! ## Fields
//!
//! - `tags:` followed by a run of `- value` bullet lines (any indentation).
//!   Collection stops at the first non-bullet line. Inline values on the key
//!   line (`tags: a, b` or `tags: [a, b]`) are collected first.
//! - `created:` followed by a timestamp in [`CREATED_FORMAT`]. A missing line
//!   yields `None`; a present but unparsable one is an error.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Line that opens and closes the block.
pub const MARKER: &str = "---";

/// `chrono` format of the `created:` value, e.g. `2024-01-02 10:00`.
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M";

const TAGS_KEY: &str = "tags:";
const CREATED_KEY: &str = "created:";
const BULLET: &str = "- ";

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("Malformed created date {value:?} (expected YYYY-MM-DD HH:MM): {source}")]
    MalformedCreated {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Structured fields extracted from a document's front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    /// Tags in document order.
    pub tags: Vec<String>,
    /// Creation timestamp; `None` when the document has no `created:` line.
    pub created: Option<NaiveDateTime>,
}

/// Where the front matter sits in a document, as byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    /// The first non-blank line is not a marker.
    Absent,
    /// An opening marker with no closing marker.
    Unterminated,
    /// `start..end` covers both marker lines (end is past the closing
    /// line's newline); `inner` is the text between them.
    Closed {
        start: usize,
        inner_start: usize,
        inner_end: usize,
        end: usize,
    },
}

/// Locate the front-matter block of `text`. A byte-order mark before the
/// opening marker is ignored and falls inside the block.
pub fn locate(text: &str) -> Block {
    let mut offset = 0;
    let mut open: Option<(usize, usize)> = None;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed = if line_start == 0 {
            line.trim_start_matches('\u{feff}').trim()
        } else {
            line.trim()
        };

        match open {
            None => {
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed != MARKER {
                    return Block::Absent;
                }
                open = Some((line_start, offset));
            }
            Some((start, inner_start)) => {
                if trimmed == MARKER {
                    return Block::Closed {
                        start,
                        inner_start,
                        inner_end: line_start,
                        end: offset,
                    };
                }
            }
        }
    }

    match open {
        Some(_) => Block::Unterminated,
        None => Block::Absent,
    }
}

/// Text between the markers, or `None` when the document has no usable block.
fn inner(text: &str) -> Option<&str> {
    match locate(text) {
        Block::Closed {
            inner_start,
            inner_end,
            ..
        } => Some(&text[inner_start..inner_end]),
        Block::Absent | Block::Unterminated => None,
    }
}

/// Collect the tags listed under the `tags:` key.
pub fn extract_tags(text: &str) -> Vec<String> {
    let Some(block) = inner(text) else {
        return Vec::new();
    };

    let mut tags = Vec::new();
    let mut collecting = false;
    for line in block.lines() {
        let line = line.trim_start();
        if collecting {
            match line.strip_prefix(BULLET) {
                Some(tag) => {
                    push_tag(&mut tags, tag);
                    continue;
                }
                None => break,
            }
        }
        if let Some(rest) = line.strip_prefix(TAGS_KEY) {
            let rest = rest.trim().trim_start_matches('[').trim_end_matches(']');
            for tag in rest.split(',') {
                push_tag(&mut tags, tag);
            }
            collecting = true;
        }
    }
    tags
}

fn push_tag(tags: &mut Vec<String>, raw: &str) {
    let tag = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if !tag.is_empty() {
        tags.push(tag.to_string());
    }
}

/// Parse the `created:` line.
///
/// Returns `Ok(None)` when there is no such line (or no front matter).
pub fn extract_created(text: &str) -> Result<Option<NaiveDateTime>, FrontMatterError> {
    let Some(block) = inner(text) else {
        return Ok(None);
    };

    for line in block.lines() {
        if let Some(rest) = line.trim_start().strip_prefix(CREATED_KEY) {
            let value = rest.trim();
            return NaiveDateTime::parse_from_str(value, CREATED_FORMAT)
                .map(Some)
                .map_err(|source| FrontMatterError::MalformedCreated {
                    value: value.to_string(),
                    source,
                });
        }
    }
    Ok(None)
}

/// Extract both fields.
pub fn parse(text: &str) -> Result<FrontMatter, FrontMatterError> {
    Ok(FrontMatter {
        tags: extract_tags(text),
        created: extract_created(text)?,
    })
}

/// Remove the front-matter block, markers included.
///
/// Documents without a closed block are returned unchanged.
pub fn strip(text: &str) -> String {
    match locate(text) {
        Block::Closed { start, end, .. } => format!("{}{}", &text[..start], &text[end..]),
        Block::Absent | Block::Unterminated => text.to_string(),
    }
}
