use sxd_document::{dom, parser};

use crate::scrapable::CrawlingContext;

/// Kind of sitemap document, given by its root element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sitemap {
    Index,
    /// Any root other than `sitemapindex` lists pages
    Urlset,
}

impl<'a> From<dom::Element<'a>> for Sitemap {
    fn from(root: dom::Element<'a>) -> Self {
        match root.name().local_part() {
            "sitemapindex" => Self::Index,
            _ => Self::Urlset,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SitemapError {
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("XML scrape error: {0}")]
    Structure(String),
}

/// Candidate URLs of a sitemap, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapDocument {
    pub kind: Sitemap,
    pub entries: Vec<String>,
}

/// Reads the first child of every top-level node as a candidate URL.
///
/// A single malformed entry rejects the whole document, no partial list is
/// ever returned.
pub fn parse_sitemap(xml: &str) -> Result<SitemapDocument, SitemapError> {
    let package = parser::parse(xml).map_err(|e| SitemapError::Parse(e.to_string()))?;
    let document = package.as_document();

    let root = document
        .root()
        .children()
        .into_iter()
        .find_map(|child| child.element())
        .ok_or_else(|| SitemapError::Parse(String::from("missing root element")))?;

    let kind = Sitemap::from(root);

    let entries = root
        .children()
        .into_iter()
        .filter_map(|child| child.element())
        .enumerate()
        .map(|(i, node)| -> Result<String, SitemapError> {
            let first = node
                .children()
                .into_iter()
                .find_map(|child| child.element())
                .ok_or_else(|| {
                    SitemapError::Structure(format!(
                        "node #{i} <{}> has no child",
                        node.name().local_part()
                    ))
                })?;
            match element_text(first) {
                Some(url) => Ok(url),
                None => Err(SitemapError::Structure(format!(
                    "node #{i} <{}> has no text",
                    first.name().local_part()
                ))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SitemapDocument { kind, entries })
}

/// Text leading the first child element, `None` when there is no text node
fn element_text(element: dom::Element) -> Option<String> {
    let texts = element
        .children()
        .into_iter()
        .take_while(|child| child.element().is_none())
        .filter_map(|child| child.text())
        .map(|text| text.text())
        .collect::<Vec<_>>();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat().trim().to_string())
    }
}

/// Parses a sitemap and keeps the entries that `accept` lets through
pub fn filter_sitemap<F>(
    xml: &str,
    sitemap_url: &str,
    accept: F,
) -> Result<Vec<String>, SitemapError>
where
    F: Fn(&str, &CrawlingContext) -> bool,
{
    let SitemapDocument { kind, entries } = parse_sitemap(xml)?;
    let ctx = CrawlingContext::new(kind, sitemap_url);
    Ok(entries
        .into_iter()
        .filter(|url| accept(url, &ctx))
        .collect())
}
