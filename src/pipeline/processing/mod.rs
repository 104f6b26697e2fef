// Pipeline processing: schema normalization, deduplication, enrichment, validation

pub mod dedupe;
pub mod enrich;
pub mod normalize;
pub mod quality_gate;
