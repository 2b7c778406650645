// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use scraper::{ElementRef, Html, Selector};

use crate::error::ExtractError;

/// Parallel title and URL sequences of one listing section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSection {
    pub titles: Vec<String>,
    pub urls: Vec<String>,
}

/// The two sections of the listing page, in page order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSections {
    /// The promoted "latest episode" tile(s)
    pub latest: ListingSection,
    /// All other episode tiles
    pub regular: ListingSection,
}

/// Raw fields pulled from an episode page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodePage {
    pub publish_date: Option<String>,
    pub description: Vec<String>,
    pub preface: Vec<String>,
    pub paragraphs: Vec<String>,
    pub image_srcset: Option<String>,
    pub image_caption: Option<String>,
    pub image_credit: Option<String>,
}

/// Site-specific markup extraction
///
/// Implementations only locate raw values; interpreting them (date parsing,
/// transcript layout, srcset selection) is done by the caller.
pub trait MarkupExtractor: Send + Sync {
    fn extract_listing(&self, html: &str) -> ListingSections;

    fn extract_episode(&self, html: &str) -> EpisodePage;
}

/// CSS selectors driving [`SelectorExtractor`]
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    pub latest_link: String,
    pub regular_link: String,
    pub publish_date: String,
    pub description: String,
    pub content_paragraph: String,
    pub image_source: String,
    pub image_caption: String,
    pub image_credit: String,
    /// Leading content paragraphs that precede the transcript
    pub body_skip: usize,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            latest_link: "a.PromoTile__Link".to_string(),
            regular_link: "a.RegularStandardPrismTile__ContentLink".to_string(),
            publish_date: "div.Byline__Meta--publishDate".to_string(),
            description: "p.Article__Headline__Desc".to_string(),
            content_paragraph: "section.Article__Content > div p".to_string(),
            image_source: r#"div[class*="Image__Wrapper"] source"#.to_string(),
            image_caption: "span.RichText".to_string(),
            image_credit: r#"span[class*="Caption__Credit"]"#.to_string(),
            body_skip: 2,
        }
    }
}

/// [`MarkupExtractor`] backed by CSS selectors
pub struct SelectorExtractor {
    latest_link: Selector,
    regular_link: Selector,
    publish_date: Selector,
    description: Selector,
    content_paragraph: Selector,
    image_source: Selector,
    image_caption: Selector,
    image_credit: Selector,
    body_skip: usize,
}

impl SelectorExtractor {
    pub fn new(selectors: &SiteSelectors) -> Result<Self, ExtractError> {
        Ok(Self {
            latest_link: parse_selector(&selectors.latest_link)?,
            regular_link: parse_selector(&selectors.regular_link)?,
            publish_date: parse_selector(&selectors.publish_date)?,
            description: parse_selector(&selectors.description)?,
            content_paragraph: parse_selector(&selectors.content_paragraph)?,
            image_source: parse_selector(&selectors.image_source)?,
            image_caption: parse_selector(&selectors.image_caption)?,
            image_credit: parse_selector(&selectors.image_credit)?,
            body_skip: selectors.body_skip,
        })
    }

    fn section(&self, document: &Html, selector: &Selector) -> ListingSection {
        let mut section = ListingSection::default();
        for link in document.select(selector) {
            section.titles.push(element_text(&link));
            section
                .urls
                .push(link.value().attr("href").unwrap_or_default().to_string());
        }
        section
    }
}

impl MarkupExtractor for SelectorExtractor {
    fn extract_listing(&self, html: &str) -> ListingSections {
        let document = Html::parse_document(html);
        ListingSections {
            latest: self.section(&document, &self.latest_link),
            regular: self.section(&document, &self.regular_link),
        }
    }

    fn extract_episode(&self, html: &str) -> EpisodePage {
        let document = Html::parse_document(html);

        let paragraphs: Vec<String> = document
            .select(&self.content_paragraph)
            .map(|p| element_text(&p))
            .collect();

        EpisodePage {
            publish_date: first_text(&document, &self.publish_date),
            description: document
                .select(&self.description)
                .map(|e| element_text(&e))
                .collect(),
            preface: paragraphs.iter().take(1).cloned().collect(),
            paragraphs: paragraphs.into_iter().skip(self.body_skip).collect(),
            image_srcset: document
                .select(&self.image_source)
                .filter_map(|e| e.value().attr("srcset"))
                .last()
                .map(String::from),
            image_caption: first_text(&document, &self.image_caption),
            image_credit: first_text(&document, &self.image_credit),
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .map(|e| element_text(&e))
        .find(|text| !text.is_empty())
}
