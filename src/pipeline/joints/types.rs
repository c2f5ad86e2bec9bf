use std::fmt;

use serde::{Deserialize, Serialize};

/// Score reserved for exact entity/alias title hits. Above any model score.
pub const EXACT_MATCH_SCORE: f32 = 11.0;

/// Upper bound of model-derived scores.
pub const MAX_MODEL_SCORE: f32 = 10.0;

// ═══════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Place,
    Event,
    Concept,
    Technology,
    Organization,
    #[default]
    Unknown,
}

impl EntityType {
    /// Lenient parse of model output; anything unrecognized is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "person" => Self::Person,
            "place" => Self::Place,
            "event" => Self::Event,
            "concept" => Self::Concept,
            "technology" => Self::Technology,
            "organization" | "organisation" => Self::Organization,
            _ => Self::Unknown,
        }
    }
}

/// What kind of fact the user is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Birthdate,
    Birthplace,
    Education,
    Inventor,
    DeathDate,
    DeathCause,
    Language,
    Measurement,
    Cause,
    General,
}

impl AnswerType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "birthdate" => Some(Self::Birthdate),
            "birthplace" => Some(Self::Birthplace),
            "education" => Some(Self::Education),
            "inventor" => Some(Self::Inventor),
            "death_date" => Some(Self::DeathDate),
            "death_cause" => Some(Self::DeathCause),
            "language" => Some(Self::Language),
            "measurement" => Some(Self::Measurement),
            "cause" => Some(Self::Cause),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Birthdate => "birthdate",
            Self::Birthplace => "birthplace",
            Self::Education => "education",
            Self::Inventor => "inventor",
            Self::DeathDate => "death_date",
            Self::DeathCause => "death_cause",
            Self::Language => "language",
            Self::Measurement => "measurement",
            Self::Cause => "cause",
            Self::General => "general",
        };
        f.write_str(label)
    }
}

/// The axis a comparison query is judged on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonDimension {
    CreationDate,
    Age,
    Size,
    Height,
    Speed,
    Quantity,
    Success,
}

impl ComparisonDimension {
    /// `"null"` and unrecognized labels map to `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "creation_date" => Some(Self::CreationDate),
            "age" => Some(Self::Age),
            "size" => Some(Self::Size),
            "height" => Some(Self::Height),
            "speed" => Some(Self::Speed),
            "quantity" => Some(Self::Quantity),
            "success" => Some(Self::Success),
            _ => None,
        }
    }
}

impl fmt::Display for ComparisonDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CreationDate => "creation_date",
            Self::Age => "age",
            Self::Size => "size",
            Self::Height => "height",
            Self::Speed => "speed",
            Self::Quantity => "quantity",
            Self::Success => "success",
        };
        f.write_str(label)
    }
}

/// A named thing the query is about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Canonical retrieval key (article-title form).
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,
    /// Alternate surface forms, used only for matching.
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Entity {
    pub fn new(name: &str, entity_type: EntityType) -> Self {
        Self {
            name: name.to_string(),
            entity_type,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }
}

/// Structured reading of one query. `entities` is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub is_comparison: bool,
    pub entities: Vec<Entity>,
    pub action: String,
    pub answer_type: Option<AnswerType>,
    pub comparison_dimension: Option<ComparisonDimension>,
}

impl EntityInfo {
    /// The degraded reading: the whole query as one entity of unknown type.
    pub fn fallback(query: &str) -> Self {
        Self {
            is_comparison: false,
            entities: vec![Entity::new(query, EntityType::Unknown)],
            action: "information".to_string(),
            answer_type: None,
            comparison_dimension: None,
        }
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    /// Every name and alias, trimmed, non-empty, first occurrence kept.
    pub fn lookup_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entity in &self.entities {
            for candidate in std::iter::once(&entity.name).chain(entity.aliases.iter()) {
                let trimmed = candidate.trim();
                if !trimmed.is_empty() && !names.iter().any(|n| n == trimmed) {
                    names.push(trimmed.to_string());
                }
            }
        }
        names
    }

    /// Comparison logic only engages with at least two named entities.
    pub fn is_multi_entity_comparison(&self) -> bool {
        self.is_comparison
            && self
                .entities
                .iter()
                .filter(|e| !e.name.trim().is_empty())
                .count()
                >= 2
    }
}

// ═══════════════════════════════════════════════════════════
// Articles and chunks
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    pub title: String,
    /// 0..=10 from the model, 11 for exact-match overrides.
    pub score: f32,
}

impl ScoredArticle {
    pub fn new(title: &str, score: f32) -> Self {
        Self {
            title: title.to_string(),
            score,
        }
    }

    pub fn is_exact_match(&self) -> bool {
        self.score >= EXACT_MATCH_SCORE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChunkMetadata {
    pub title: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Set only by the chunk filter's relevance path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_score: Option<f32>,
}

impl Chunk {
    pub fn new(title: &str, text: &str) -> Self {
        Self {
            text: text.to_string(),
            metadata: ChunkMetadata {
                title: title.to_string(),
                extra: serde_json::Map::new(),
            },
            filter_score: None,
        }
    }
}

/// Anything with an article title.
pub trait Titled {
    fn title(&self) -> &str;
}

impl Titled for String {
    fn title(&self) -> &str {
        self
    }
}

impl Titled for &str {
    fn title(&self) -> &str {
        self
    }
}

impl Titled for ScoredArticle {
    fn title(&self) -> &str {
        &self.title
    }
}

impl Titled for Chunk {
    fn title(&self) -> &str {
        &self.metadata.title
    }
}

// ═══════════════════════════════════════════════════════════
// Verdicts
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CoverageResult {
    pub complete: bool,
    pub covered: Vec<String>,
    pub missing: Vec<String>,
    /// At most `MAX_SUGGESTED_SEARCHES` entries.
    pub suggested_searches: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PremiseStatus {
    Supported,
    Unsupported,
    Contradicted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiseVerdict {
    pub status: PremiseStatus,
    pub reason: String,
}

/// An entity extracted as an unresolved placeholder, e.g. "creator of Python".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectReference {
    pub placeholder: String,
    pub relation: String,
    pub anchor: String,
}
