//! Model catalog: family detection, publisher resolution, regional
//! endpoints and streaming cadence tiers.

use crate::provider::Provider;

/// Locations accepted by the cloud backend.
pub const SUPPORTED_LOCATIONS: &[&str] = &[
    "us-central1",
    "us-east1",
    "us-east4",
    "us-west1",
    "us-west2",
    "us-west4",
    "europe-west1",
    "europe-west2",
    "europe-west3",
    "europe-west4",
    "europe-north1",
    "asia-east1",
    "asia-northeast1",
    "asia-northeast3",
    "asia-southeast1",
    "asia-south1",
    "australia-southeast1",
    "northamerica-northeast1",
    "southamerica-east1",
    "global",
];

pub const DEFAULT_LOCATION: &str = "us-central1";

/// Third-party publishers served through the cloud model garden.
pub const MODEL_GARDEN_PUBLISHERS: &[&str] =
    &["meta", "mistral-ai", "mistralai", "anthropic", "cohere", "ai21"];

pub const DEFAULT_PUBLISHER: &str = "google";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    /// Current generative models.
    Generative,
    /// Older models served only by the cloud backend.
    Legacy,
    Unknown,
}

const KNOWN_MODELS: &[(&str, ModelFamily)] = &[
    ("gemini-2.0-flash-exp", ModelFamily::Generative),
    ("gemini-2.0-flash", ModelFamily::Generative),
    ("gemini-2.0-flash-lite", ModelFamily::Generative),
    ("gemini-1.5-pro-latest", ModelFamily::Generative),
    ("gemini-1.5-pro", ModelFamily::Generative),
    ("gemini-1.5-flash-latest", ModelFamily::Generative),
    ("gemini-1.5-flash", ModelFamily::Generative),
    ("gemini-1.5-flash-8b", ModelFamily::Generative),
    ("learnlm-1.5-pro-experimental", ModelFamily::Generative),
    ("gemma-2-9b-it", ModelFamily::Generative),
    ("gemma-2-27b-it", ModelFamily::Generative),
    ("gemini-1.0-pro", ModelFamily::Legacy),
    ("gemini-1.0-pro-latest", ModelFamily::Legacy),
    ("gemini-1-0-pro", ModelFamily::Legacy),
    ("gemini-pro", ModelFamily::Legacy),
    ("gemini-pro-vision", ModelFamily::Legacy),
];

const GENERATIVE_PATTERNS: &[&str] = &["gemini-1.5", "gemini-2", "learnlm", "gemma"];
const LEGACY_PATTERNS: &[&str] = &["gemini-1.0", "gemini-1-0", "gemini-pro"];

/// Classify a model name. Exact catalog entries win; versioned names such
/// as `gemini-1.5-pro-002` fall back to substring patterns, legacy first.
pub fn model_family(model: &str) -> ModelFamily {
    if model.is_empty() {
        return ModelFamily::Unknown;
    }
    if let Some((_, family)) = KNOWN_MODELS.iter().find(|(name, _)| *name == model) {
        return *family;
    }
    if LEGACY_PATTERNS.iter().any(|p| model.contains(p)) {
        return ModelFamily::Legacy;
    }
    if GENERATIVE_PATTERNS.iter().any(|p| model.contains(p)) {
        return ModelFamily::Generative;
    }
    ModelFamily::Unknown
}

pub fn is_generative_model(model: &str) -> bool {
    model_family(model) == ModelFamily::Generative
}

pub fn is_legacy_model(model: &str) -> bool {
    model_family(model) == ModelFamily::Legacy
}

fn garden_publisher(model: &str) -> Option<&'static str> {
    let name = model.strip_prefix("publishers/").unwrap_or(model);
    MODEL_GARDEN_PUBLISHERS
        .iter()
        .copied()
        .find(|publisher| name.starts_with(publisher))
}

pub fn is_model_garden_model(model: &str) -> bool {
    garden_publisher(model).is_some()
}

/// Publisher segment of the cloud model path: `google` unless the model
/// name carries a model-garden publisher, e.g. `publishers/anthropic/...`.
pub fn model_publisher(model: &str) -> &'static str {
    let name = model.strip_prefix("publishers/").unwrap_or(model);
    let first_segment = name.split('/').next().unwrap_or(name);
    MODEL_GARDEN_PUBLISHERS
        .iter()
        .copied()
        .find(|publisher| *publisher == first_segment)
        .unwrap_or(DEFAULT_PUBLISHER)
}

/// Model id with any `publishers/<publisher>/models/` prefix removed.
pub fn bare_model_id(model: &str) -> &str {
    model.rsplit('/').next().unwrap_or(model)
}

pub fn is_supported_location(location: &str) -> bool {
    SUPPORTED_LOCATIONS.contains(&location)
}

/// Validated location, falling back to `us-central1` with a warning.
pub fn resolve_location(location: Option<&str>) -> String {
    match location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(location) if is_supported_location(location) => location.to_string(),
        Some(location) => {
            log::warn!(
                "[ModelCatalog] Invalid location '{}'. Supported locations: {}. Defaulting to '{}'.",
                location,
                SUPPORTED_LOCATIONS.join(", "),
                DEFAULT_LOCATION
            );
            DEFAULT_LOCATION.to_string()
        }
        None => DEFAULT_LOCATION.to_string(),
    }
}

/// API host for a cloud location. `global` has no regional prefix.
pub fn cloud_endpoint_host(location: &str) -> String {
    if location == "global" {
        "aiplatform.googleapis.com".to_string()
    } else {
        format!("{}-aiplatform.googleapis.com", location)
    }
}

/// Delay inserted after each forwarded chunk.
///
/// Direct: 8 ms for flash models, 15 ms otherwise. Cloud: 8 ms by default,
/// 15 ms for generative models, 5 ms for flash models. An explicit override
/// always wins.
pub fn chunk_delay_ms(provider: &Provider, model: &str, override_ms: Option<u64>) -> u64 {
    if let Some(delay) = override_ms {
        return delay;
    }
    let flash = model.contains("flash");
    match provider {
        Provider::Direct => {
            if flash {
                8
            } else {
                15
            }
        }
        Provider::Cloud { .. } => {
            if flash {
                5
            } else if is_generative_model(model) {
                15
            } else {
                8
            }
        }
    }
}
