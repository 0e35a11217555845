//! Core data models used throughout the feature extractor.
//!
//! These types represent the raw articles read from a source, the structured
//! record the LLM produces for each of them, and the merged unit that is
//! persisted to the result store.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Half-open date range `[start, end_excl)` a pipeline run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end_excl: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end_excl: NaiveDate) -> Result<Self> {
        if start >= end_excl {
            bail!("empty date range: [{}, {})", start, end_excl);
        }
        Ok(Self { start, end_excl })
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end_excl: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")?;
        let end_excl = NaiveDate::parse_from_str(end_excl, "%Y-%m-%d")?;
        Self::new(start, end_excl)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_excl.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start_time() && ts < self.end_time()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end_excl)
    }
}

/// Raw article read from a [`DocumentSource`](crate::source::DocumentSource).
///
/// Owned by the source; the pipeline never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Identity key. Unique across the result store.
    pub url: String,
    /// Ordering and checkpoint key.
    pub download_time: DateTime<Utc>,
    pub publish_time: Option<DateTime<Utc>>,
    pub title: Option<String>,
    /// Raw markup or plain text, depending on the backend.
    pub content: String,
}

/// Closed set of financial event tags the extractor may attach to a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FinancialEvent {
    FutureAdjustments,
    DividendChange,
    ExpectationMisses,
    GuidanceUpdates,
    SentimentAnalysis,
    ProfitOrLoss,
    PerShareEarnings,
    EarningsBeatOrMiss,
    AnalystCount,
    ConsensusEarningsEstimate,
    TotalRevenue,
    RevenueBeatOrMiss,
    RevenueExpectation,
    QuarterlyRevenueExpectation,
    FiscalQuarter,
    LongTermGrowthTarget,
    AnnualRevenueProjection,
    ExecutiveChange,
    ExecutivePosition,
    OutgoingExecutive,
    IncomingExecutive,
    ChangeReason,
    CorporateRestructuring,
    HealthUpdates,
    SectorTags,
    IndustryTags,
    InnovationAnnouncement,
    ProductOrTechImprovement,
    CompetitiveProductAdvantage,
    CorporateAcquisition,
    FinancialReport,
    TargetPriceIncrease,
    BondYieldRelations,
    StockOffering,
    OfferingAmount,
    OfferingType,
    PublicOrPrivateOffering,
    RegulatoryApproval,
    GovernmentOversight,
    StockBuyback,
    TargetPriceAdjustment,
    RevisedPriceTarget,
    OrderModifications,
    OrderProduct,
    PreviousOrderQuantity,
    RevisedOrderQuantity,
    PreviousOrderPrice,
    RevisedOrderPrice,
    BusinessDeal,
    DealCancellationThreat,
    DividendAdjustment,
    CorporateUpdate,
    EfficacyResults,
    AnalystRatingUpdate,
    FutureAnnouncement,
    ClinicalTrialResults,
    EarlyTrialOutcome,
    FinalTrialOutcome,
    TrialPhase,
    ParticipantCount,
    OutcomeEvaluation,
    LegalSettlement,
    PendingLitigation,
    CompleteSettlement,
    ShortSellerReport,
    MergerBlock,
    FutureTargetProjection,
    GovernmentLawsuit,
    IndexMembershipChange,
    DelistingAnnouncement,
    TickerSymbolUpdate,
    ScientificFindings,
    ResearchRelation,
    RegulatoryCircumvention,
    ExportRegulation,
}

/// A trading symbol resolved for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SymbolLookup {
    pub symbol: String,
    pub stock_exchanges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinancialEventWithSymbol {
    pub financial_event: FinancialEvent,
    pub symbol: SymbolLookup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sentiment {
    pub sentiment: String,
    /// Confidence of the sentiment between 0 and 1, where 1 is the most confident.
    pub sentiment_confidence: f64,
    /// Score of the sentiment between -100 and 100, where 100 is the most
    /// positive sentiment and -100 the most negative.
    pub sentiment_score: f64,
    pub chain_of_thought_reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SignificantKeyword {
    pub keyword: String,
    /// Score of the keyword between 0 and 100, where 100 is the most
    /// significant keyword in the text.
    pub keyword_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Pdf,
    Article,
    Video,
    Image,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalLink {
    pub url: String,
    pub link_text: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub metadata: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    pub entity: String,
    pub entity_type: String,
    pub entity_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Relationship {
    pub source_entity: String,
    /// Description of the relationship, one per entry. Example: `["is a
    /// subsidiary of"]`. Use `["is CEO of", "is CFO of"]` rather than
    /// `"is CEO and CFO of"`.
    pub relationship_descriptions: Vec<String>,
    /// Condensed versions of `relationship_descriptions`, dropping "is" and
    /// "of" where possible. Example: `"subsidiary"`.
    pub relationship_descriptions_condensed: Vec<String>,
    pub target_entity: String,
    /// Strength of the relationship between 0 and 1.
    pub relationship_strength: f64,
}

/// Structured output of the enrichment step for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedRecord {
    pub summary: String,
    /// Focus company of the article.
    pub main_company: String,
    pub financial_event_with_symbols: Vec<FinancialEventWithSymbol>,
    pub keywords: Vec<SignificantKeyword>,
    pub sentiments: Vec<Sentiment>,
    /// ISO 639-1 language code.
    pub article_language: String,
    /// Links to external resources, at most one per url.
    pub external_links: Vec<ExternalLink>,
    /// Identified entities in the text.
    pub entities: Vec<Entity>,
    /// Clearly identifiable relationships between previously identified entities.
    pub relationships: Vec<Relationship>,
}

impl ExtractedRecord {
    /// Drop repeated external links, keeping the first occurrence of each url.
    pub fn dedup_links(mut self) -> Self {
        let mut seen = std::collections::HashSet::new();
        self.external_links.retain(|l| seen.insert(l.url.clone()));
        self
    }
}

/// An [`ExtractedRecord`] paired with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub record: ExtractedRecord,
    pub model_name: String,
}

/// The persisted unit: article identity/metadata merged with its extracted fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteableDocument {
    pub url: String,
    pub download_time: DateTime<Utc>,
    pub publish_time: Option<DateTime<Utc>>,
    pub article_title: Option<String>,
    #[serde(flatten)]
    pub record: ExtractedRecord,
    pub model_name: String,
}

impl WriteableDocument {
    pub fn build(doc: &Document, result: EnrichmentResult) -> Self {
        Self {
            url: doc.url.clone(),
            download_time: doc.download_time,
            publish_time: doc.publish_time,
            article_title: doc.title.clone(),
            record: result.record,
            model_name: result.model_name,
        }
    }
}
