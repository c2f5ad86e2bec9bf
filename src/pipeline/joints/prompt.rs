use super::chunk_filter::FilterMode;
use super::types::{AnswerType, Chunk};

/// Candidate titles shown to the scorer.
pub const MAX_SCORED_TITLES: usize = 20;

/// Chunks shown to the relevance filter.
pub const MAX_FILTER_CHUNKS: usize = 15;

/// Characters of each chunk shown to the relevance filter.
pub const CHUNK_PREVIEW_CHARS: usize = 250;

/// Characters of source text shown to fact refinement.
pub const FACT_SOURCE_CHARS: usize = 2000;

const ENTITY_EXTRACTION_RULES: &str = r#"You are a precise entity extraction system optimized for encyclopedia article matching.

INSTRUCTIONS:
1. Identify ALL distinct entities (people, places, things, events) in the query.
2. For each entity, give the NAME as it would appear as an encyclopedia article title.
3. CHECK FOR COMPARISONS: if the user compares items ("vs", "compare", "difference", "which is"), set "is_comparison": true.
4. EXTRACT ALIASES: alternative names and related article titles the entity might appear under.
5. IDENTIFY ANSWER TYPE: what specific information the user wants (see examples).
6. FOR COMPARISONS: give the comparison_dimension, the aspect being compared.

ANSWER TYPE EXAMPLES (learn the pattern, not just keywords):
- "When was X born?" -> birthdate
- "Where was X born?" -> birthplace
- "What school did X attend?" / "Where did X study?" -> education
- "Who invented X?" / "Who created X?" -> inventor
- "When did X die?" -> death_date
- "How did X die?" -> death_cause
- "What language did X speak or write?" -> language
- "How tall is X?" / "How big is X?" -> measurement
- "What caused X?" / "Why did X happen?" -> cause
- anything else -> general

COMPARISON DIMENSION EXAMPLES:
- "which came first" -> creation_date
- "which is older" -> age
- "which is larger" -> size
- "which is taller" -> height
- "which is faster" -> speed
- "who had more X" -> quantity
- "which was more successful" -> success

EXAMPLES:
Query: "Who created Python?"
Result: {"is_comparison": false, "entities": [{"name": "Python (programming language)", "type": "technology", "aliases": ["Python"]}, {"name": "creator of Python", "type": "person", "aliases": []}], "action": "identify the creator", "answer_type": "inventor"}

Query: "Compare Tesla and Edison patents"
Result: {"is_comparison": true, "entities": [{"name": "Nikola Tesla", "type": "person", "aliases": ["Tesla"]}, {"name": "Thomas Edison", "type": "person", "aliases": ["Edison"]}], "action": "compare patent counts", "answer_type": "general", "comparison_dimension": "quantity"}

TITLE CONVENTIONS:
- Full names for people: "Albert Einstein" not "Einstein".
- Specific names for events: "World War II" not "the war".
- Disambiguate when needed: "Java (programming language)".
- For indirect queries ("who created X"), extract BOTH the thing AND a placeholder for the person, e.g. "creator of X". Do NOT guess who the person is."#;

const ENTITY_OUTPUT_CONTRACT: &str = r#"CRITICAL RULES:
- Return ONLY valid JSON, no Markdown code blocks.
- Do NOT answer the query.
- Do NOT resolve placeholders to specific names that are not in the query.
- Include short aliases that might also be article titles.

Return this exact JSON structure:
{
  "is_comparison": false,
  "entities": [
    {"name": "Exact Article Title", "type": "person|place|event|concept|technology|organization", "aliases": ["Alternative Title"]}
  ],
  "action": "what the user wants to know",
  "answer_type": "birthdate|birthplace|education|inventor|death_date|death_cause|language|measurement|cause|general",
  "comparison_dimension": "null or: creation_date|age|size|height|speed|quantity|success"
}"#;

/// Build the entity extraction prompt.
pub fn build_entity_prompt(query: &str) -> String {
    format!("{ENTITY_EXTRACTION_RULES}\n\nQuery: \"{query}\"\n\n{ENTITY_OUTPUT_CONTRACT}\n")
}

/// Build the query-expansion prompt for terms that retrieved nothing.
pub fn build_expansion_prompt(query: &str, failed_terms: &[String]) -> String {
    let failed = failed_terms
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"The user asked about: "{query}"

We searched for these terms but found NOTHING relevant: [{failed}]

INSTRUCTIONS:
1. Suggest 3 alternative search queries.
2. Focus on broader concepts, related events, or key figures.
3. If the user used a nickname, try the real name.
4. If the user asked a specific question, try the general topic.

Return ONLY a JSON list of strings:
["Alternative 1", "Alternative 2", "Alternative 3"]
"#
    )
}

/// Build the article relevance prompt. Only the first `MAX_SCORED_TITLES` titles are listed.
pub fn build_scoring_prompt(query: &str, entity_names: &[&str], titles: &[&str]) -> String {
    let entities = entity_names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ");

    let listed = titles
        .iter()
        .take(MAX_SCORED_TITLES)
        .enumerate()
        .map(|(i, t)| format!("{}. {t}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"I will give you a list of article titles.

USER'S ORIGINAL QUESTION: "{query}"

Select articles relevant to answering this question.
Entities mentioned: {entities}

RULES:
1. ONLY select titles from the INPUT LIST below.
2. DO NOT output example titles.
3. Output valid JSON only.
4. Prioritize articles that directly answer the question.

INPUT LIST:
{listed}

Rate each article 0-10 where:
- 10 = directly relevant to answering the question
- 7-9 = highly relevant to the entities or topic
- 1-6 = partially relevant or related background
- 0 = not relevant

Return ONLY a JSON array:
[
  {{"title": "Actual Title From List", "score": 10}}
]"#
    )
}

/// Numbered chunk previews, as shown to the relevance filter.
pub fn format_chunk_previews(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .take(MAX_FILTER_CHUNKS)
        .enumerate()
        .map(|(i, c)| {
            let preview: String = c.text.chars().take(CHUNK_PREVIEW_CHARS).collect();
            format!("{}. {preview}...", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the chunk relevance prompt.
pub fn build_chunk_filter_prompt(
    query: &str,
    chunks: &[Chunk],
    mode: FilterMode,
    answer_type: Option<AnswerType>,
) -> String {
    let focus = match mode {
        FilterMode::Factual => "Prefer chunks that state the specific fact asked for.",
        FilterMode::Exploratory => "Prefer chunks that give broad background on the topic.",
    };
    let wanted = match answer_type {
        Some(t) if t != AnswerType::General => format!("\nAnswer type wanted: {t}."),
        _ => String::new(),
    };
    let previews = format_chunk_previews(chunks);

    format!(
        r#"Rate these text chunks 0-10 for how well they answer this query.
Query: {query}
{focus}{wanted}

Chunks:
{previews}

Return ONLY a JSON list of objects:
[{{"id": 1, "score": 10}}]"#
    )
}

/// Build the fact refinement prompt over the first `FACT_SOURCE_CHARS` of `text`.
pub fn build_facts_prompt(query: &str, text: &str) -> String {
    let source: String = text.chars().take(FACT_SOURCE_CHARS).collect();
    format!(
        r#"Extract 3-5 key facts from the text that help answer the query.
Query: {query}
Text: {source}

Return ONLY a JSON list of strings.
"#
    )
}
