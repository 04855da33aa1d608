//! String-level HTML edits applied to rendered pages.
//!
//! Pages are never parsed into a DOM. Each edit locates its insertion point by
//! scanning the text, so the index arithmetic here is the whole contract:
//!
//! - [`inject_after_first_h1`]: insert a fragment after the first line that
//!   contains `</h1>`.
//! - [`inject_stylesheets`]: insert `<link rel="stylesheet">` elements right
//!   after the opening `<head ...>` tag.
//! - [`rewrite_links`]: retarget same-site `href`s from one extension to
//!   another (`page.md` → `page.html`).

use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

const HEADING_CLOSE: &str = "</h1>";
const HEAD_OPEN: &str = "<head";

/// Hrefs with these prefixes point off-site and are never rewritten.
const EXTERNAL_PREFIXES: &[&str] = &["http://", "https://", "//", "mailto:", "ftp:"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HtmlError {
    #[error("No <head> tag in document")]
    NoHeadTag,
}

/// Insert `fragment` after the first line containing `</h1>`.
///
/// Returns `None` when the page has no such line.
pub fn inject_after_first_h1(html: &str, fragment: &str) -> Option<String> {
    let mut offset = 0;
    for line in html.split_inclusive('\n') {
        offset += line.len();
        if line.contains(HEADING_CLOSE) {
            let mut out = String::with_capacity(html.len() + fragment.len() + 1);
            out.push_str(&html[..offset]);
            if !line.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(fragment);
            out.push_str(&html[offset..]);
            return Some(out);
        }
    }
    None
}

/// Byte offset just past the `>` that closes the opening head tag.
///
/// `<head` only counts when followed by `>`, `/` or whitespace, so
/// `<header>` is never mistaken for it.
pub fn head_insert_position(html: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(found) = html[from..].find(HEAD_OPEN) {
        let start = from + found;
        let after = start + HEAD_OPEN.len();
        match html[after..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_ascii_whitespace() => {
                let close = html[after..].find('>')?;
                return Some(after + close + 1);
            }
            // End of input right after `<head`: unterminated tag
            None => return None,
            Some(_) => from = after,
        }
    }
    None
}

/// Stylesheet link element for `href`.
pub fn stylesheet_link(href: &str) -> String {
    format!(r#"<link rel="stylesheet" href="{}" />"#, escape_attr(href))
}

/// Insert stylesheet links, in order, after the opening head tag.
///
/// An empty `hrefs` slice leaves the page untouched, head tag or not.
pub fn inject_stylesheets<S: AsRef<str>>(html: &str, hrefs: &[S]) -> Result<String, HtmlError> {
    if hrefs.is_empty() {
        return Ok(html.to_string());
    }
    let pos = head_insert_position(html).ok_or(HtmlError::NoHeadTag)?;
    let links: String = hrefs
        .iter()
        .map(|href| stylesheet_link(href.as_ref()))
        .collect();

    let mut out = String::with_capacity(html.len() + links.len());
    out.push_str(&html[..pos]);
    out.push_str(&links);
    out.push_str(&html[pos..]);
    Ok(out)
}

static ANCHOR_HREF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a\s(?:[^>]*?\s)?href="([^"]*)""#).expect("valid regex"));

/// Whether `href` points inside the site (not another host, scheme or fragment).
pub fn is_local_link(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    let lower = href.to_ascii_lowercase();
    !EXTERNAL_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Rewrite a single href, keeping any `#fragment` or `?query` suffix. The
/// extension matches case-insensitively, as source discovery does.
///
/// Returns `None` when the href is left as is.
pub fn rewrite_href(href: &str, from_ext: &str, to_ext: &str) -> Option<String> {
    if !is_local_link(href) {
        return None;
    }
    let split = href.find(['#', '?']).unwrap_or(href.len());
    let (path, suffix) = href.split_at(split);
    let stem_len = path.len().checked_sub(from_ext.len())?;
    if !path.get(stem_len..)?.eq_ignore_ascii_case(from_ext) {
        return None;
    }
    let stem = &path[..stem_len];
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(format!("{stem}{to_ext}{suffix}"))
}

/// Rewrite every anchor `href` that targets a local `from_ext` document.
pub fn rewrite_links(html: &str, from_ext: &str, to_ext: &str) -> String {
    ANCHOR_HREF
        .replace_all(html, |caps: &Captures| {
            let whole = caps.get(0).expect("group 0 always matches");
            let value = caps.get(1).expect("href group is not optional");
            match rewrite_href(value.as_str(), from_ext, to_ext) {
                Some(new_href) => {
                    let start = value.start() - whole.start();
                    let end = value.end() - whole.start();
                    let text = whole.as_str();
                    format!("{}{}{}", &text[..start], new_href, &text[end..])
                }
                None => whole.as_str().to_string(),
            }
        })
        .into_owned()
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}
