//! ETH course catalog ("Vorlesungsverzeichnis") rules.
//!
//! The search endpoint renders one table row per course. Course numbers sit in
//! a bold cell (`<b>252-0027-00L</b>`) and titles in a bold anchor whose link
//! ends with the language parameter (`...lang=de">Title</a></b>`). Both rules
//! are applied to each row's inner HTML independently, the same way the
//! catalog is read by hand.

use super::{RecordExtractor, SourceUrls};
use crate::error::ExtractError;
use crate::models::{Candidate, CourseId, SemesterCode};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

static COURSE_NUMBER_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<b>\s*(\d{3}-\d{4}-[A-Za-z0-9]{3})\s*</b>").unwrap());

// Title text must directly follow the anchor's `lang=xx"` so other quoted
// attributes in the row (`valign="top"`) cannot start a match.
static COURSE_TITLE_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\blang=\w{2}"\s*>\s*([^<]*?)\s*</a>\s*</b>"#).unwrap());

static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());

/// Regex-based extractor for VVZ search pages.
#[derive(Debug, Default, Clone, Copy)]
pub struct VvzExtractor;

impl VvzExtractor {
    /// Raw rule matches over every innermost table row, in document order.
    fn scan_rows(markup: &str) -> (Vec<String>, Vec<String>) {
        let document = Html::parse_document(markup);
        let mut numbers = Vec::new();
        let mut titles = Vec::new();

        for row in document.select(&ROW) {
            // Rows of nested tables are visited on their own.
            if has_nested_row(row) {
                continue;
            }
            let html = row.inner_html();
            numbers.extend(
                COURSE_NUMBER_RULE
                    .captures_iter(&html)
                    .map(|c| c[1].to_string()),
            );
            titles.extend(
                COURSE_TITLE_RULE
                    .captures_iter(&html)
                    .map(|c| clean_title(&c[1]))
                    .filter(|t| !t.is_empty()),
            );
        }
        (numbers, titles)
    }
}

impl RecordExtractor for VvzExtractor {
    #[instrument(level = "debug", skip_all, fields(bytes = markup.len()))]
    fn extract_listing(&self, markup: &str) -> Result<Vec<Candidate>, ExtractError> {
        let (numbers, titles) = Self::scan_rows(markup);
        debug!(numbers = numbers.len(), titles = titles.len(), "Scanned listing rows");

        let titles: Vec<Option<String>> = if titles.is_empty() {
            vec![None; numbers.len()]
        } else if titles.len() == numbers.len() {
            titles.into_iter().map(Some).collect()
        } else {
            return Err(ExtractError::Mismatch {
                identifiers: numbers.len(),
                titles: titles.len(),
            });
        };

        let candidates = numbers
            .into_iter()
            .zip(titles)
            .filter_map(|(number, title)| match CourseId::parse(&number) {
                Some(identifier) => Some(Candidate { identifier, title }),
                None => {
                    warn!(%number, "Dropping malformed course number");
                    None
                }
            })
            .collect();
        Ok(candidates)
    }

    fn extract_title(&self, markup: &str) -> Result<String, ExtractError> {
        let (_, titles) = Self::scan_rows(markup);
        titles.into_iter().next().ok_or(ExtractError::TitleNotFound)
    }
}

fn has_nested_row(row: ElementRef<'_>) -> bool {
    row.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|e| e.value().name() == "tr")
}

/// Strip inner tags, decode entities and collapse whitespace.
fn clean_title(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let text = fragment.root_element().text().collect::<String>();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Endpoints of the VVZ search, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct VvzUrls {
    base: Url,
    language: String,
}

impl VvzUrls {
    pub fn new(base: Url, language: impl Into<String>) -> Self {
        Self {
            base,
            language: language.into(),
        }
    }

    fn search(&self) -> Result<Url, url::ParseError> {
        self.base.join("sucheLehrangebot.view")
    }
}

impl SourceUrls for VvzUrls {
    fn listing_url(&self, semester: &SemesterCode) -> Result<Url, url::ParseError> {
        let mut url = self.search()?;
        url.query_pairs_mut()
            .append_pair("seite", "0")
            .append_pair("semkez", semester.as_str())
            .append_pair("lang", &self.language);
        Ok(url)
    }

    fn detail_url(
        &self,
        semester: &SemesterCode,
        course: &CourseId,
    ) -> Result<Url, url::ParseError> {
        let mut url = self.search()?;
        url.query_pairs_mut()
            .append_pair("seite", "0")
            .append_pair("semkez", semester.as_str())
            .append_pair("lerneinheitscode", course.as_str())
            .append_pair("lang", &self.language);
        Ok(url)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_listing_pairs_numbers_and_titles() {
        let page = listing_page(&[
            ("252-0001-00L", "Systems Design"),
            ("252-0002-00L", "Databases"),
        ]);
        let candidates = VvzExtractor.extract_listing(&page).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].identifier.as_str(), "252-0001-00L");
        assert_eq!(candidates[0].title.as_deref(), Some("Systems Design"));
        assert_eq!(candidates[1].identifier.as_str(), "252-0002-00L");
        assert_eq!(candidates[1].title.as_deref(), Some("Databases"));
    }

    #[test]
    fn test_listing_mismatch_is_an_error() {
        let mut page = listing_page(&[("252-0001-00L", "Systems Design")]);
        page = page.replace(
            "</table>",
            "<tr><td><b>252-0002-00L</b></td></tr></table>",
        );
        assert_eq!(
            VvzExtractor.extract_listing(&page),
            Err(ExtractError::Mismatch { identifiers: 2, titles: 1 })
        );
    }

    #[test]
    fn test_listing_without_titles_yields_unresolved_candidates() {
        let page = numbers_only_page(&["252-0001-00L", "401-0151-71L"]);
        let candidates = VvzExtractor.extract_listing(&page).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.title.is_none()));
    }

    #[test]
    fn test_listing_ignores_malformed_numbers() {
        let page = concat!(
            "<table><tr><td><b>252-001-00L</b></td></tr>",
            "<tr><td><b>25-0001-00L</b></td></tr></table>",
        );
        assert!(VvzExtractor.extract_listing(page).unwrap().is_empty());
    }

    #[test]
    fn test_whitespace_and_entities_in_title() {
        let page = r#"<table><tr><td><b>
            252-0003-00L
        </b></td><td><b><a href="x?lang=de">
            Algorithms &amp;   Data
            Structures
        </a></b></td></tr></table>"#;
        let candidates = VvzExtractor.extract_listing(page).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identifier.as_str(), "252-0003-00L");
        assert_eq!(candidates[0].title.as_deref(), Some("Algorithms & Data Structures"));
    }

    #[test]
    fn test_attributes_on_cells_do_not_leak_into_title() {
        let page = concat!(
            "<table><tr>\n",
            r#"<td valign="top"><b>252-0027-00L</b></td>"#,
            "\n",
            r#"<td valign="top"><b><a href="/lerneinheit.view?semkez=2025S&amp;lang=de">Databases</a></b></td>"#,
            "\n",
            r#"<td class="cl"><b><a href="/dozent.view?id=7">Prof. Muster</a></b></td>"#,
            "\n</tr></table>",
        );
        let candidates = VvzExtractor.extract_listing(page).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].identifier.as_str(), "252-0027-00L");
        assert_eq!(candidates[0].title.as_deref(), Some("Databases"));
    }

    #[test]
    fn test_title_case_is_preserved() {
        assert_eq!(
            VvzExtractor.extract_title(&detail_page("Einführung in die Programmierung")).unwrap(),
            "Einführung in die Programmierung"
        );
    }

    #[test]
    fn test_missing_title_is_not_found() {
        let page =
            "<html><body><table><tr><td>Keine Lerneinheiten gefunden</td></tr></table></body></html>";
        assert_eq!(VvzExtractor.extract_title(page), Err(ExtractError::TitleNotFound));
    }

    #[test]
    fn test_urls_carry_semester_and_language() {
        let base = Url::parse("https://www.vvz.ethz.ch/Vorlesungsverzeichnis/").unwrap();
        let urls = VvzUrls::new(base, "de");
        let semester: SemesterCode = "2025S".parse().unwrap();

        let listing = urls.listing_url(&semester).unwrap();
        assert_eq!(
            listing.as_str(),
            "https://www.vvz.ethz.ch/Vorlesungsverzeichnis/sucheLehrangebot.view?seite=0&semkez=2025S&lang=de"
        );

        let course = CourseId::parse("252-0002-00L").unwrap();
        let detail = urls.detail_url(&semester, &course).unwrap();
        assert!(detail.as_str().contains("lerneinheitscode=252-0002-00L"));
        assert!(detail.as_str().contains("semkez=2025S"));
    }
}
