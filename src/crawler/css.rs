//! Stylesheet `url(...)` scanning and rewriting

use crate::crawler::parser::{resolve_reference, Reference, ReferenceTag};
use crate::mapping::{relative_link, PathMapper};
use crate::url::strip_fragment;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;
use url::Url;

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(['"]?)([^'")\s]+)(['"]?)\s*\)"#).expect("CSS url() pattern is valid")
});

/// Collects the `url(...)` references of a stylesheet
///
/// # Arguments
///
/// * `css` - Raw stylesheet bytes
/// * `base_url` - The stylesheet's own URL
pub fn css_references(css: &[u8], base_url: &Url) -> Vec<Reference> {
    let text = String::from_utf8_lossy(css);

    CSS_URL
        .captures_iter(&text)
        .filter_map(|caps| resolve_reference(&caps[2], base_url))
        .map(|url| Reference {
            url: strip_fragment(&url),
            tag: ReferenceTag::Stylesheet,
        })
        .collect()
}

/// Rewrites same-host `url(...)` values to point at their mirrored files
///
/// Returns None when nothing was rewritten or the stylesheet is not valid
/// UTF-8, in which case the original bytes are stored unchanged.
///
/// # Arguments
///
/// * `css` - Raw stylesheet bytes
/// * `base_url` - The stylesheet's own URL
/// * `css_path` - Where the stylesheet is stored, relative to the output root
/// * `mapper` - Path mapper of the crawl
pub fn rewrite_css(
    css: &[u8],
    base_url: &Url,
    css_path: &Path,
    mapper: &PathMapper,
) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(css).ok()?;
    let mut changed = false;

    let rewritten = CSS_URL.replace_all(text, |caps: &Captures| {
        let local = resolve_reference(&caps[2], base_url)
            .filter(|url| !mapper.is_external(url))
            .map(|url| relative_link(css_path, &mapper.map(&url, false)));

        match local {
            Some(link) => {
                changed = true;
                format!("url({}{}{})", &caps[1], link, &caps[3])
            }
            None => caps[0].to_string(),
        }
    });

    if changed {
        Some(rewritten.into_owned().into_bytes())
    } else {
        None
    }
}
