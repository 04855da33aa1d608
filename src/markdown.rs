//! Markdown → HTML page transform.
//!
//! A page is produced in a fixed order; later steps rely on earlier ones:
//!
//! 1. Extract tags from the front matter
//! 2. Extract the creation timestamp
//! 3. Strip the front matter block
//! 4. Render the body with [pulldown-cmark](https://docs.rs/pulldown-cmark)
//!    into a complete HTML document (heading ids generated from heading text)
//! 5. Insert the created-at and tag-list fragments after the first `</h1>` line
//!
//! Stylesheet links are injected by the build between step 5 and the final
//! step, [`MarkdownTransform::rewrite_links`], which retargets local `.md`
//! links to the rendered `.html` files.
//!
//! The document shell and both header fragments are [maud](https://maud.lambda.xyz/)
//! templates, so tag values and titles are escaped.

use crate::frontmatter::{self, FrontMatter, FrontMatterError};
use crate::html;
use chrono::NaiveDateTime;
use maud::{Markup, html};
use pulldown_cmark::{CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Rendering settings owned by the transform for the whole run.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Content of `<meta name="generator">`.
    pub generator: String,
    /// `chrono` strftime format for the displayed creation date.
    pub date_format: String,
    /// `<title>` fallback for pages without a level-1 heading.
    pub site_title: String,
    /// Extension of source documents, with the dot.
    pub source_extension: String,
    /// Extension of rendered pages, with the dot.
    pub target_extension: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            generator: concat!("sitepush ", env!("CARGO_PKG_VERSION")).to_string(),
            date_format: "%A, %d-%b-%y %H:%M:%S UTC".to_string(),
            site_title: "Untitled".to_string(),
            source_extension: ".md".to_string(),
            target_extension: ".html".to_string(),
        }
    }
}

/// A page after steps 1–5, before stylesheet injection and link rewriting.
#[derive(Debug, Clone)]
pub struct PageDraft {
    pub html: String,
    pub front_matter: FrontMatter,
}

#[derive(Debug, Clone, Default)]
pub struct MarkdownTransform {
    options: RenderOptions,
}

impl MarkdownTransform {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Steps 1–5 for one document. `path` is only used for log context.
    ///
    /// Fails only when the `created:` line is present but malformed.
    pub fn to_html(&self, path: &str, source: &str) -> Result<PageDraft, FrontMatterError> {
        if frontmatter::locate(source) == frontmatter::Block::Unterminated {
            warn!(path, "front matter is never closed; treating document as having none");
        }

        let tags = frontmatter::extract_tags(source);
        let created = frontmatter::extract_created(source)?;
        if created.is_none() {
            warn!(path, "no created date in front matter");
        }
        let front_matter = FrontMatter { tags, created };

        let body = frontmatter::strip(source);
        let rendered = self.render(&body);
        let html = match html::inject_after_first_h1(&rendered, &self.metadata_header(&front_matter)) {
            Some(with_header) => with_header,
            None => {
                debug!(path, "no level-1 heading; metadata header not inserted");
                rendered
            }
        };

        Ok(PageDraft { html, front_matter })
    }

    /// Final step: point local source-document links at rendered pages.
    pub fn rewrite_links(&self, html: &str) -> String {
        html::rewrite_links(
            html,
            &self.options.source_extension,
            &self.options.target_extension,
        )
    }

    /// Render a markdown body into a complete HTML document.
    pub fn render(&self, body: &str) -> String {
        let mut events: Vec<Event> = Parser::new_ext(body, parser_options()).collect();
        let title = assign_heading_ids(&mut events).unwrap_or_else(|| self.options.site_title.clone());

        let mut body_html = String::new();
        pulldown_cmark::html::push_html(&mut body_html, events.into_iter());

        self.page_shell(&title, &body_html)
    }

    fn page_shell(&self, title: &str, body_html: &str) -> String {
        let head = html! {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                meta name="generator" content=(self.options.generator);
                title { (title) }
            }
        };
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n{}\n<body>\n{}</body>\n</html>\n",
            head.into_string(),
            body_html
        )
    }

    /// The created-at fragment followed by the tag-list fragment.
    pub fn metadata_header(&self, front_matter: &FrontMatter) -> String {
        format!(
            "{}\n{}\n",
            self.created_fragment(front_matter.created).into_string(),
            tags_fragment(&front_matter.tags).into_string()
        )
    }

    fn created_fragment(&self, created: Option<NaiveDateTime>) -> Markup {
        html! {
            p.created-at {
                "Created: "
                @if let Some(ts) = created {
                    time datetime=(ts.format("%Y-%m-%dT%H:%M").to_string()) {
                        (ts.format(&self.options.date_format).to_string())
                    }
                } @else {
                    "unknown"
                }
            }
        }
    }
}

fn tags_fragment(tags: &[String]) -> Markup {
    html! {
        ul.tags {
            @for tag in tags {
                li.tag { (tag) }
            }
        }
    }
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// Give every heading an `id` derived from its text, unique within the page.
///
/// Explicit `{#id}` attributes are kept. Returns the text of the first
/// level-1 heading, used as the page title.
fn assign_heading_ids(events: &mut [Event]) -> Option<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut title = None;

    for i in 0..events.len() {
        let (level, explicit) = match &events[i] {
            Event::Start(Tag::Heading { level, id, .. }) => (*level, id.clone()),
            _ => continue,
        };

        let text = heading_text(&events[i + 1..]);
        if level == HeadingLevel::H1 && title.is_none() {
            title = Some(text.clone());
        }

        let id = match explicit {
            Some(id) => {
                seen.entry(id.to_string()).or_insert(1);
                continue;
            }
            None => unique_slug(&mut seen, slugify(&text)),
        };
        if let Event::Start(Tag::Heading { id: slot, .. }) = &mut events[i] {
            *slot = Some(CowStr::from(id));
        }
    }
    title
}

/// Plain text of a heading, from the events following its start tag.
fn heading_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            _ => {}
        }
    }
    text
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}

fn unique_slug(seen: &mut HashMap<String, usize>, base: String) -> String {
    let count = seen.entry(base.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        return base;
    }
    let candidate = format!("{}-{}", base, *count - 1);
    seen.entry(candidate.clone()).or_insert(1);
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const DOC: &str = "---\ntags:\n  - go\n  - build\ncreated: 2024-01-02 10:00\n---\n# Title\n\nSee [next](next.md) and [site](https://x.com/a.md).\n";

    fn transform() -> MarkdownTransform {
        MarkdownTransform::new(RenderOptions {
            generator: "test-gen".into(),
            ..RenderOptions::default()
        })
    }

    #[test]
    fn render_produces_complete_document() {
        let html = transform().render("# Hello\n\nworld");
        assert!(html.starts_with("<!DOCTYPE html>\n<html lang=\"en\">\n<head>"));
        assert!(html.contains(r#"<meta name="generator" content="test-gen">"#));
        assert!(html.contains("<title>Hello</title>"));
        assert!(html.contains("<p>world</p>"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn render_generates_heading_ids() {
        let html = transform().render("# Getting Started\n\n## Install & Run\n");
        assert!(html.contains(r#"<h1 id="getting-started">Getting Started</h1>"#));
        assert!(html.contains(r#"<h2 id="install-run">"#));
    }

    #[test]
    fn render_heading_ids_are_unique() {
        let html = transform().render("## Notes\n\n## Notes\n\n## Notes\n");
        assert!(html.contains(r#"<h2 id="notes">"#));
        assert!(html.contains(r#"<h2 id="notes-1">"#));
        assert!(html.contains(r#"<h2 id="notes-2">"#));
    }

    #[test]
    fn render_keeps_explicit_heading_id() {
        let html = transform().render("# Intro {#start}\n");
        assert!(html.contains(r#"<h1 id="start">Intro</h1>"#));
    }

    #[test]
    fn render_without_h1_uses_site_title() {
        let html = transform().render("just text");
        assert!(html.contains("<title>Untitled</title>"));
    }

    #[test]
    fn render_tight_blocks() {
        let html = transform().render("para\n# Heading\n- item");
        assert!(html.contains("<h1 id=\"heading\">Heading</h1>"));
        assert!(html.contains("<li>item</li>"));
    }

    #[test]
    fn to_html_strips_front_matter_and_injects_header() {
        let draft = transform().to_html("post.md", DOC).unwrap();
        assert_eq!(draft.front_matter.tags, vec!["go", "build"]);
        assert_eq!(
            draft.front_matter.created,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(10, 0, 0)
        );
        assert!(!draft.html.contains("tags:"));
        assert!(!draft.html.contains("<hr"));

        let h1 = draft.html.find("</h1>").unwrap();
        let created = draft.html.find("created-at").unwrap();
        let tags = draft.html.find(r#"<ul class="tags">"#).unwrap();
        assert!(h1 < created && created < tags);
        assert!(draft.html.contains(r#"<time datetime="2024-01-02T10:00">Tuesday, 02-Jan-24 10:00:00 UTC</time>"#));
        assert!(draft.html.contains(r#"<li class="tag">go</li><li class="tag">build</li>"#));
    }

    #[test]
    fn to_html_without_created_is_not_an_error() {
        let draft = transform().to_html("a.md", "---\ntags:\n  - x\n---\n# T\n").unwrap();
        assert_eq!(draft.front_matter.created, None);
        assert!(draft.html.contains("Created: unknown"));
    }

    #[test]
    fn to_html_malformed_created_is_error() {
        let result = transform().to_html("a.md", "---\ncreated: 2024/01/02\n---\n# T\n");
        assert!(matches!(result, Err(FrontMatterError::MalformedCreated { .. })));
    }

    #[test]
    fn to_html_without_heading_skips_header() {
        let draft = transform().to_html("a.md", "plain paragraph\n").unwrap();
        assert!(!draft.html.contains("created-at"));
    }

    #[test]
    fn tags_are_escaped() {
        let header = transform().metadata_header(&FrontMatter {
            tags: vec!["<b>".into()],
            created: None,
        });
        assert!(header.contains("&lt;b&gt;"));
    }

    #[test]
    fn rewrite_links_uses_configured_extensions() {
        let draft = transform().to_html("post.md", DOC).unwrap();
        let html = transform().rewrite_links(&draft.html);
        assert!(html.contains(r#"href="next.html""#));
        assert!(html.contains(r#"href="https://x.com/a.md""#));
    }

    #[test]
    fn slugify_cases() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  snake_case  "), "snake-case");
        assert_eq!(slugify("???"), "section");
    }
}
