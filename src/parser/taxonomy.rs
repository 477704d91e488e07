use super::jsonld::RawRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Post,
    Article,
    Product,
    Service,
}

impl EntityType {
    /// Post and article share one normalized shape, as do product and service.
    pub fn is_article_like(self) -> bool {
        matches!(self, EntityType::Post | EntityType::Article)
    }
}

const POST_TYPES: &[&str] = &[
    "BlogPosting",
    "LiveBlogPosting",
    "SocialMediaPosting",
    "DiscussionForumPosting",
    "NewsArticle",
    "AnalysisNewsArticle",
    "BackgroundNewsArticle",
    "OpinionNewsArticle",
    "ReportageNewsArticle",
    "ReviewNewsArticle",
];

const ARTICLE_TYPES: &[&str] = &[
    "Article",
    "AdvertiserContentArticle",
    "SatiricalArticle",
    "ScholarlyArticle",
    "MedicalScholarlyArticle",
    "TechArticle",
    "APIReference",
    "Report",
];

const PRODUCT_TYPES: &[&str] = &[
    "Product",
    "IndividualProduct",
    "ProductCollection",
    "ProductGroup",
    "ProductModel",
    "SomeProducts",
    "Vehicle",
    "Car",
    "Motorcycle",
    "DietarySupplement",
];

const SERVICE_TYPES: &[&str] = &[
    "Service",
    "BroadcastService",
    "CableOrSatelliteService",
    "FinancialProduct",
    "FoodService",
    "GovernmentService",
    "TaxiService",
    "WebAPI",
];

/// Lookup order; the first bucket containing a literal wins.
const TAXONOMY: &[(EntityType, &[&str])] = &[
    (EntityType::Post, POST_TYPES),
    (EntityType::Article, ARTICLE_TYPES),
    (EntityType::Product, PRODUCT_TYPES),
    (EntityType::Service, SERVICE_TYPES),
];

/// Classify a record by its `@type`. Only string values are considered.
pub fn classify(record: &RawRecord) -> Option<EntityType> {
    let declared = record.get("@type")?.as_str()?;
    TAXONOMY
        .iter()
        .find(|(_, literals)| literals.contains(&declared))
        .map(|(kind, _)| *kind)
}
