//! Batched GraphQL payloads and the fixed response locations read from them.
//!
//! Every request is a JSON array of operations. The first is always the
//! `RecordPageView` signal; page fetches append a `GetEmployerReviews` query
//! whose result (index 1) carries `data.employerReviews.numberOfPages`.

use serde_json::{Value, json};

use crate::identifier::ResourceId;

const PAGE_IDENT: &str = "INFOSITE_REVIEWS";

const RECORD_PAGE_VIEW_QUERY: &str = "mutation RecordPageView($employerId: String!, $pageIdent: String!) {\n  recordPageView(\n    pageIdent: $pageIdent\n    metaData: {key: \"employerId\", value: $employerId}\n  ) {\n    totalCount\n    __typename\n  }\n}\n";

const EMPLOYER_REVIEWS_QUERY: &str = "query GetEmployerReviews($applyDefaultCriteria: Boolean, $employerId: Int!, $employmentStatuses: [EmploymentStatusEnum], $enableKeywordSearch: Boolean!, $goc: GOCIdent, $jobTitle: JobTitleIdent, $language: String, $location: LocationIdent, $onlyCurrentEmployees: Boolean, $overallRating: FiveStarRatingEnum, $page: Int!, $preferredTldId: Int, $reviewCategories: [ReviewCategoriesEnum], $sort: ReviewsSortOrderEnum, $textSearch: String, $useRowProfileTldForRatings: Boolean, $worldwideFilter: Boolean) {\n  employerReviews: employerReviewsRG(\n    employerReviewsInput: {applyDefaultCriteria: $applyDefaultCriteria, employer: {id: $employerId}, employmentStatuses: $employmentStatuses, onlyCurrentEmployees: $onlyCurrentEmployees, goc: $goc, jobTitle: $jobTitle, language: $language, location: $location, overallRating: $overallRating, page: {num: $page, size: 10}, preferredTldId: $preferredTldId, reviewCategories: $reviewCategories, sort: $sort, textSearch: $textSearch, useRowProfileTldForRatings: $useRowProfileTldForRatings, worldwideFilter: $worldwideFilter}\n  ) {\n    allReviewsCount\n    currentPage\n    filteredReviewsCount\n    lastReviewDateTime\n    numberOfPages\n    ratedReviewsCount\n    reviews {\n      advice\n      cons\n      pros\n      summary\n      countHelpful\n      countNotHelpful\n      employmentStatus\n      isCurrentJob\n      jobTitle {\n        id\n        text\n        __typename\n      }\n      lengthOfEmployment\n      location {\n        id\n        type\n        name\n        __typename\n      }\n      ratingBusinessOutlook\n      ratingCareerOpportunities\n      ratingCeo\n      ratingCompensationAndBenefits\n      ratingCultureAndValues\n      ratingDiversityAndInclusion\n      ratingOverall\n      ratingRecommendToFriend\n      ratingSeniorLeadership\n      ratingWorkLifeBalance\n      reviewDateTime\n      reviewId\n      __typename\n    }\n    __typename\n  }\n}\n";

/// JSON pointer to the page count in a page response.
pub const PAGE_COUNT_POINTER: &str = "/1/data/employerReviews/numberOfPages";

/// The page count could not be read from a discovery response.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The response body is not JSON.
    #[error("discovery response is not JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    /// The expected field is absent.
    #[error("discovery response has no value at {pointer}")]
    MissingField {
        /// JSON pointer that was looked up.
        pointer: &'static str,
    },

    /// The field is present but not a usable page count.
    #[error("discovery response has invalid page count at {pointer}: {value}")]
    InvalidValue {
        /// JSON pointer that was looked up.
        pointer: &'static str,
        /// The offending value, rendered as JSON.
        value: String,
    },
}

fn record_page_view(resource: ResourceId) -> Value {
    json!({
        "operationName": "RecordPageView",
        "variables": {
            "employerId": resource.to_string(),
            "pageIdent": PAGE_IDENT,
        },
        "query": RECORD_PAGE_VIEW_QUERY,
    })
}

fn employer_reviews(resource: ResourceId, page: u32) -> Value {
    json!({
        "operationName": "GetEmployerReviews",
        "variables": {
            "applyDefaultCriteria": true,
            "employerId": resource.get(),
            "employmentStatuses": [],
            "goc": null,
            "jobTitle": null,
            "location": {
                "countryId": null,
                "stateId": null,
                "metroId": null,
                "cityId": null,
            },
            "onlyCurrentEmployees": false,
            "overallRating": null,
            "page": page,
            "preferredTldId": 0,
            "reviewCategories": [],
            "sort": "RELEVANCE",
            "textSearch": "",
            "worldwideFilter": false,
            "language": "eng",
            "useRowProfileTldForRatings": false,
            "enableKeywordSearch": false,
        },
        "query": EMPLOYER_REVIEWS_QUERY,
    })
}

/// Builds the combined view-signal plus page query batch.
#[must_use]
pub fn page_batch(resource: ResourceId, page: u32) -> Value {
    Value::Array(vec![
        record_page_view(resource),
        employer_reviews(resource, page),
    ])
}

/// Builds the minimal batch used as a credential probe.
#[must_use]
pub fn record_view_batch(resource: ResourceId) -> Value {
    Value::Array(vec![record_page_view(resource)])
}

/// Reads the total page count from a page response.
///
/// # Errors
///
/// Returns [`ParseError`] if the field is absent or not a non-negative
/// integer that fits in `u32`.
pub fn extract_page_count(response: &Value) -> Result<u32, ParseError> {
    let value = response
        .pointer(PAGE_COUNT_POINTER)
        .filter(|value| !value.is_null())
        .ok_or(ParseError::MissingField {
            pointer: PAGE_COUNT_POINTER,
        })?;

    value
        .as_u64()
        .and_then(|count| u32::try_from(count).ok())
        .ok_or_else(|| ParseError::InvalidValue {
            pointer: PAGE_COUNT_POINTER,
            value: value.to_string(),
        })
}

/// Parses a raw body and reads the page count from it.
///
/// # Errors
///
/// Returns [`ParseError::NotJson`] for unparsable bodies, otherwise as
/// [`extract_page_count`].
pub fn parse_page_count(body: &str) -> Result<u32, ParseError> {
    let value: Value = serde_json::from_str(body)?;
    extract_page_count(&value)
}
