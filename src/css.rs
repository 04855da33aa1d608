//! Stylesheet minification and page-relative stylesheet paths.
//!
//! Minification goes through [lightningcss](https://lightningcss.dev/). It
//! parses strictly: a stylesheet that does not parse is an error rather than
//! being shipped half-minified.
//!
//! Pages reference stylesheets by relative path, so the site works from any
//! host prefix. A page at output key `notes/2024/post.html` lives two
//! directories below the site root and reaches `css/site.css` as
//! `../../css/site.css`.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CssError {
    #[error("CSS minification failed: {0}")]
    Minify(String),
}

/// Minify a stylesheet.
pub fn minify(source: &str) -> Result<String, CssError> {
    let mut stylesheet = StyleSheet::parse(source, ParserOptions::default())
        .map_err(|e| CssError::Minify(e.to_string()))?;
    stylesheet
        .minify(MinifyOptions::default())
        .map_err(|e| CssError::Minify(e.to_string()))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|e| CssError::Minify(e.to_string()))?;
    Ok(result.code)
}

/// `../` repeated once per directory between the site root and the page.
///
/// `page_key` is the page's output key (`a/b/page.html`). With the output
/// root prepended (`build/a/b/page.html`) this is the slash count minus one.
pub fn relative_prefix(page_key: &str) -> String {
    "../".repeat(page_key.matches('/').count())
}

/// Path from the page at `page_key` to the stylesheet at `stylesheet_key`.
pub fn stylesheet_href(page_key: &str, stylesheet_key: &str) -> String {
    format!("{}{}", relative_prefix(page_key), stylesheet_key)
}
