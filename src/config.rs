use std::collections::BTreeMap;

use anyhow::{Context, Result};

/// Runtime configuration, read once at startup from the environment with
/// sensible local-development defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ollama_url: String,
    pub embed_model: String,
    pub embed_dimension: usize,
    pub embed_batch_size: usize,
    pub qdrant_url: String,
    pub llm_proxy_url: String,
    pub llm_model: String,
    /// Year -> report base name, Arabic editions.
    pub reports_ar: BTreeMap<String, String>,
    /// Year -> report base name, English editions.
    pub reports_en: BTreeMap<String, String>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn default_reports_ar() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("2021".to_string(), "PIF Annual Report 2021-ar".to_string()),
        ("2022".to_string(), "PIF Annual Report 2022-ar".to_string()),
        ("2023".to_string(), "PIF-2023-Annual-Report-AR".to_string()),
    ])
}

fn default_reports_en() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("2021".to_string(), "PIF Annual Report 2021".to_string()),
        ("2022".to_string(), "PIF Annual Report 2022".to_string()),
        ("2023".to_string(), "PIF-2023-Annual-Report-EN".to_string()),
    ])
}

fn report_map(key: &str, default: BTreeMap<String, String>) -> Result<BTreeMap<String, String>> {
    match std::env::var(key) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("{} must be a JSON object of year -> report base name", key)),
        Err(_) => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let embed_dimension = env_or("EMBED_DIMENSION", "1024")
            .parse()
            .context("EMBED_DIMENSION must be a positive integer")?;
        let embed_batch_size = env_or("EMBED_BATCH_SIZE", "8")
            .parse()
            .context("EMBED_BATCH_SIZE must be a positive integer")?;

        Ok(Self {
            ollama_url: env_or("OLLAMA_URL", "http://localhost:11434"),
            embed_model: env_or("EMBED_MODEL", "qwen3-embedding"),
            embed_dimension,
            embed_batch_size,
            qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
            llm_proxy_url: env_or("LLM_PROXY_URL", "http://localhost:4000"),
            llm_model: env_or("LLM_MODEL", "rag-llm"),
            reports_ar: report_map("REPORTS_AR", default_reports_ar())?,
            reports_en: report_map("REPORTS_EN", default_reports_en())?,
        })
    }
}

/// Collection naming is derived from the report base name so that every
/// (language, year) pair maps to its own collection.
pub fn collection_name(report_stem: &str) -> String {
    format!("{}_collection", report_stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name() {
        assert_eq!(
            collection_name("PIF Annual Report 2021"),
            "PIF Annual Report 2021_collection"
        );
    }

    #[test]
    fn test_default_maps_cover_both_languages() {
        let ar = default_reports_ar();
        let en = default_reports_en();
        assert_eq!(ar.len(), en.len());
        for year in ar.keys() {
            assert!(en.contains_key(year));
        }
    }

    #[test]
    fn test_report_map_rejects_malformed_json() {
        std::env::set_var("TEST_REPORTS_BAD", "not json");
        let result = report_map("TEST_REPORTS_BAD", BTreeMap::new());
        std::env::remove_var("TEST_REPORTS_BAD");
        assert!(result.is_err());
    }
}
