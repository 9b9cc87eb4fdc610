//! Catalog sources and the rules that turn their markup into course records.
//!
//! Orchestration only talks to the [`RecordExtractor`] trait, so the pattern
//! rules can be swapped or unit-tested against static markup without network
//! access.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | ETH course catalog (VVZ) | [`vvz`] | Regex over table rows | Listing by semester, detail by course number |

pub mod vvz;

use crate::error::ExtractError;
use crate::models::{Candidate, CourseId, SemesterCode};
use url::Url;

/// Pattern rules for one catalog source.
pub trait RecordExtractor: Send + Sync {
    /// All candidates on a listing page, in page order.
    ///
    /// Fails with [`ExtractError::Mismatch`] when identifiers and titles were
    /// both found but cannot be paired one to one.
    fn extract_listing(&self, markup: &str) -> Result<Vec<Candidate>, ExtractError>;

    /// The course title on a detail page, or [`ExtractError::TitleNotFound`].
    fn extract_title(&self, markup: &str) -> Result<String, ExtractError>;
}

/// Where a catalog source serves its listing and detail pages.
pub trait SourceUrls: Send + Sync {
    fn listing_url(&self, semester: &SemesterCode) -> Result<Url, url::ParseError>;
    fn detail_url(
        &self,
        semester: &SemesterCode,
        course: &CourseId,
    ) -> Result<Url, url::ParseError>;
}
