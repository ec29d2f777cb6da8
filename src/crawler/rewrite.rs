//! In-document link rewriting for mirrored pages
//!
//! References to resources the crawl mirrors are replaced by links relative
//! to the page's own mirrored file, and the live URL is kept next to them in
//! a `data-origin-*` attribute. References the crawl does not follow are made
//! absolute so they keep pointing at the live site. Non-fetchable references
//! stay untouched.

use crate::crawler::parser::{origin_attr, resolve_reference, srcset_urls, ReferenceTag};
use crate::mapping::{relative_link, PathMapper};
use crate::url::strip_fragment;
use lol_html::html_content::Element;
use lol_html::{element, HandlerResult, HtmlRewriter, Settings};
use std::cell::Cell;
use std::path::Path;
use url::Url;

/// Where a link of the rewritten page points
enum Target {
    /// A file of the mirror, plus the live URL it was fetched from
    Local(String, Url),
    /// The live site
    Live(Url),
}

/// Rewrites the links of one page
pub struct LinkRewriter<'a> {
    base_url: &'a Url,
    page_path: &'a Path,
    mapper: &'a PathMapper,
    follows: Option<Box<dyn Fn(&Url) -> bool + 'a>>,
}

impl<'a> LinkRewriter<'a> {
    /// Creates a rewriter for a page
    ///
    /// # Arguments
    ///
    /// * `base_url` - The URL relative references are resolved against
    /// * `page_path` - Where the page is stored, relative to the output root
    /// * `mapper` - Path mapper of the crawl
    pub fn new(base_url: &'a Url, page_path: &'a Path, mapper: &'a PathMapper) -> Self {
        Self {
            base_url,
            page_path,
            mapper,
            follows: None,
        }
    }

    /// Restricts local links to the URLs the crawl fetches
    ///
    /// `follows` gets fragment-free start-host URLs; without it every
    /// start-host reference is linked locally.
    pub fn following<F>(mut self, follows: F) -> Self
    where
        F: Fn(&Url) -> bool + 'a,
    {
        self.follows = Some(Box::new(follows));
        self
    }

    /// Rewrites a page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - The rewritten page
    /// * `Ok(None)` - No reference needed rewriting
    /// * `Err(String)` - The rewriter failed on the input
    pub fn rewrite(&self, html: &[u8]) -> Result<Option<Vec<u8>>, String> {
        let mut output = Vec::with_capacity(html.len());
        let changed = Cell::new(false);

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![
                    element!("a[href]", |el| {
                        self.rewrite_attr(el, "href", ReferenceTag::Anchor, &changed)
                    }),
                    element!("link[href]", |el| {
                        self.rewrite_attr(el, "href", ReferenceTag::Link, &changed)
                    }),
                    element!("script[src]", |el| {
                        self.rewrite_attr(el, "src", ReferenceTag::Script, &changed)
                    }),
                    element!("body[background]", |el| {
                        self.rewrite_attr(el, "background", ReferenceTag::Body, &changed)
                    }),
                    element!("img[src]", |el| {
                        self.rewrite_attr(el, "src", ReferenceTag::Image, &changed)
                    }),
                    element!("img[srcset]", |el| self.rewrite_srcset(el, &changed)),
                ],
                ..Settings::default()
            },
            |c: &[u8]| output.extend_from_slice(c),
        );

        rewriter
            .write(html)
            .map_err(|e| format!("HTML rewrite error: {}", e))?;
        rewriter
            .end()
            .map_err(|e| format!("HTML rewrite finalization error: {}", e))?;

        Ok(if changed.get() { Some(output) } else { None })
    }

    fn rewrite_attr(
        &self,
        el: &mut Element,
        attr: &str,
        tag: ReferenceTag,
        changed: &Cell<bool>,
    ) -> HandlerResult {
        let Some(value) = el.get_attribute(attr) else {
            return Ok(());
        };

        match self.target(&value, tag.is_page()) {
            Some(Target::Local(link, origin)) => {
                el.set_attribute(attr, &link)?;
                el.set_attribute(&origin_attr(attr), origin.as_str())?;
                changed.set(true);
            }
            Some(Target::Live(url)) if url.as_str() != value.trim() => {
                el.set_attribute(attr, url.as_str())?;
                changed.set(true);
            }
            _ => {}
        }
        Ok(())
    }

    fn rewrite_srcset(&self, el: &mut Element, changed: &Cell<bool>) -> HandlerResult {
        let Some(srcset) = el.get_attribute("srcset") else {
            return Ok(());
        };

        let mut any_local = false;
        let mut links = Vec::new();
        let mut origins = Vec::new();

        for candidate in srcset.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let value = srcset_urls(candidate).into_iter().next().unwrap_or_default();
            let descriptor = &candidate[value.len()..];

            match self.target(value, false) {
                Some(Target::Local(link, origin)) => {
                    any_local = true;
                    links.push(format!("{}{}", link, descriptor));
                    origins.push(format!("{}{}", origin, descriptor));
                }
                Some(Target::Live(url)) => {
                    links.push(format!("{}{}", url, descriptor));
                    origins.push(format!("{}{}", url, descriptor));
                }
                None => {
                    links.push(candidate.to_string());
                    origins.push(candidate.to_string());
                }
            }
        }

        let rewritten = links.join(", ");
        if rewritten != srcset {
            el.set_attribute("srcset", &rewritten)?;
            changed.set(true);
        }
        if any_local {
            el.set_attribute(&origin_attr("srcset"), &origins.join(", "))?;
        }
        Ok(())
    }

    /// Decides where an attribute value should point in the mirror
    ///
    /// Returns None for values that never name a fetchable resource.
    fn target(&self, value: &str, is_page: bool) -> Option<Target> {
        let url = resolve_reference(value, self.base_url)?;
        if self.mapper.is_external(&url) || !self.is_followed(&url) {
            return Some(Target::Live(url));
        }

        let mapped = self.mapper.map(&url, is_page);
        let mut link = relative_link(self.page_path, &mapped);

        if is_page {
            if let Some(fragment) = url.fragment() {
                link.push('#');
                link.push_str(fragment);
            }
        }
        Some(Target::Local(link, url))
    }

    fn is_followed(&self, url: &Url) -> bool {
        self.follows
            .as_ref()
            .map_or(true, |follows| follows(&strip_fragment(url)))
    }
}
