pub mod inference; // Backend client boundary (Ollama + mock)
pub mod joints; // Narrow reasoning stages: entities, scoring, coverage, filtering
pub mod retrieval; // Corpus boundary
pub mod orchestrator; // Reference query pipeline
