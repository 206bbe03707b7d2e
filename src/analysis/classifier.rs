use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::NewRiskFlag;
use crate::taxonomy::{
    resolve, ClearanceStatus, RiskCategory, RiskSeverity, RiskSubCategory,
};

use super::chat::ChatModel;

const MAX_SNIPPET_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = r#"You are a Senior Media Law Attorney specializing in Hollywood production clearances.
Analyze the provided script page for all legal and IP risks.

CONTEXTUAL SENTIMENT ANALYSIS RULES (apply these strictly):

1. PRODUCT/BRAND CONTEXT:
   - Hero/protagonist uses brand naturally in daily life -> LOW severity, status: PERMISSIBLE, subCategory: BRAND_NAME_PRODUCTS
   - Villain uses brand OR brand used as weapon/drug paraphernalia/criminal tool -> HIGH severity, category: PRODUCT_MISUSE, subCategory: PRODUCT_MISUSE
   - Brand shown prominently and positively -> Consider MARKETING_ADDED_VALUE, subCategory: LOGOS_GRAPHICS
   - Brand mocked or defamed -> HIGH severity, category: PRODUCT_MISUSE, subCategory: PRODUCT_MISUSE

2. REAL PEOPLE:
   - Living celebrity mocked or placed in false scenario -> HIGH, category: LIKENESS, subCategory: PARODIES_SPOOFS_IMITATIONS
   - Historical figure referenced neutrally -> LOW, category: REFERENCES, subCategory: REFERENCES
   - Real politician depicted doing illegal acts -> HIGH, category: LIKENESS, subCategory: NAME_AND_LIKENESS_USE

3. MUSIC:
   - Song lyrics quoted (even partial) -> HIGH, category: MUSIC_CHOREOGRAPHY, subCategory: MUSIC
   - Song title mentioned casually -> LOW, category: REFERENCES, subCategory: REFERENCES
   - Specific choreography described -> MEDIUM, category: MUSIC_CHOREOGRAPHY, subCategory: PLAYBACK

4. LOCATIONS:
   - Actual private business named negatively -> HIGH, category: LOCATIONS, subCategory: REAL_LOCALES_ENTITIES_LOGOS
   - Generic "coffee shop" -> skip (no risk)
   - Named landmark used neutrally -> LOW, category: LOCATIONS, subCategory: REAL_LOCALES_ENTITIES_LOGOS

5. NUMBERS:
   - Any 10-digit phone number -> MEDIUM, category: NAMES_NUMBERS, subCategory: TELEPHONE_NUMBERS
   - Website URLs (real) -> MEDIUM, category: NAMES_NUMBERS, subCategory: ADDRESSES_URLS_LICENSE_NUMBERS
   - Actual street addresses -> MEDIUM, category: NAMES_NUMBERS, subCategory: ADDRESSES_URLS_LICENSE_NUMBERS

6. PROPS/WARDROBE:
   - Named designer item used normally -> LOW, category: PROPS_SET_DRESSING, subCategory: BRAND_NAME_PRODUCTS
   - Military uniform used incorrectly -> MEDIUM, category: WARDROBE, subCategory: WARDROBE

STRICT MAPPING RULES:
- You MUST provide a 'subCategory' for every risk.
- Use only the following valid SubCategory values:
  [REAL_LIFE_CHARACTER_PORTRAYALS, REAL_LIFE_INCIDENT_DEPICTIONS, REAL_LOCALES_ENTITIES_LOGOS,
   BEHAVIOR_OF_NOTE, CAMEOS, CROWD_ATMOSPHERE_EXTRAS, NAME_AND_LIKENESS_USE, PARODIES_SPOOFS_IMITATIONS,
   ADDRESSES_URLS_LICENSE_NUMBERS, NAMES_BUSINESS_ORGS, NAMES_CHARACTERS, TELEPHONE_NUMBERS,
   ALCOHOL_USE, ARTWORK, BRAND_NAME_PRODUCTS, LOGOS_GRAPHICS, TOBACCO, TOYS,
   GOVERNMENT_AGENCIES_SEALS, MUSIC, PLAYBACK, PRODUCT_MISUSE, REFERENCES, VEHICLES, WARDROBE]
- If no specific subCategory fits perfectly, you MUST use 'REFERENCES' as the default. Never return null.

RESPONSE FORMAT:
Return a single JSON object, no prose and no markdown fences, of the shape:
{"risks": [{"category": "...", "subCategory": "...", "severity": "HIGH|MEDIUM|LOW",
"status": "...", "entityName": "...", "snippet": "...", "reason": "...", "suggestion": "..."}]}
Return {"risks": []} when the page is clean."#;

#[derive(Debug, Deserialize)]
struct AiPageResponse {
    #[serde(default)]
    risks: Option<Vec<AiRiskItem>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AiRiskItem {
    category: Option<String>,
    sub_category: Option<String>,
    severity: Option<String>,
    status: Option<String>,
    entity_name: Option<String>,
    snippet: Option<String>,
    reason: Option<String>,
    suggestion: Option<String>,
}

/// Per-page risk classification against the chat model.
#[derive(Clone)]
pub struct RiskClassifier {
    chat: Arc<dyn ChatModel>,
}

impl RiskClassifier {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    /// Classifies one page. Blank pages never reach the model. A model or
    /// parse failure is confined to this page: it is logged and yields an
    /// empty set so sibling pages keep going.
    pub async fn classify_page(
        &self,
        script_id: Uuid,
        page_number: i32,
        page_text: &str,
    ) -> Vec<NewRiskFlag> {
        if page_text.trim().is_empty() {
            return Vec::new();
        }

        match self.classify_page_inner(script_id, page_number, page_text).await {
            Ok(flags) => flags,
            Err(err) => {
                warn!(
                    script_id = %script_id,
                    page = page_number,
                    error = %err,
                    "page classification failed; continuing without findings for this page"
                );
                Vec::new()
            }
        }
    }

    async fn classify_page_inner(
        &self,
        script_id: Uuid,
        page_number: i32,
        page_text: &str,
    ) -> Result<Vec<NewRiskFlag>> {
        let user_message = format!("PAGE {page_number}:\n\n{page_text}");
        let raw = self.chat.complete(SYSTEM_PROMPT, &user_message).await?;

        let payload = extract_json(&raw);
        let response: AiPageResponse =
            serde_json::from_str(payload).context("model returned malformed risk payload")?;

        let risks = response.risks.unwrap_or_default();
        debug!(
            script_id = %script_id,
            page = page_number,
            risks = risks.len(),
            "page classified"
        );

        Ok(risks
            .into_iter()
            .map(|item| map_risk_item(item, script_id, page_number))
            .collect())
    }
}

fn map_risk_item(item: AiRiskItem, script_id: Uuid, page_number: i32) -> NewRiskFlag {
    let category = resolve(
        item.category.as_deref(),
        RiskCategory::from_str_exact,
        RiskCategory::Other,
    );
    let sub_category = resolve(
        item.sub_category.as_deref(),
        RiskSubCategory::from_str_exact,
        RiskSubCategory::Unknown,
    );
    let severity = resolve(
        item.severity.as_deref(),
        RiskSeverity::from_str_exact,
        RiskSeverity::Medium,
    );
    let status = resolve(
        item.status.as_deref(),
        ClearanceStatus::from_str_exact,
        ClearanceStatus::Pending,
    );

    NewRiskFlag {
        id: Uuid::new_v4(),
        script_id,
        category: category.as_str().to_string(),
        sub_category: sub_category.as_str().to_string(),
        severity: severity.as_str().to_string(),
        status: status.as_str().to_string(),
        entity_name: Some(
            item.entity_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
        ),
        snippet: item
            .snippet
            .map(|snippet| truncate(&snippet, MAX_SNIPPET_CHARS)),
        reason: item.reason,
        suggestion: item.suggestion,
        page_number,
        // Reviewers opt in to redaction later; fresh findings start exposed.
        is_redacted: false,
    }
}

/// Models occasionally wrap the payload in markdown fences or prose despite
/// instructions; recover the outermost JSON object.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut truncated: String = input.chars().take(max_chars - 3).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;

    use super::*;

    struct CannedModel {
        response: Result<String, String>,
        calls: AtomicUsize,
    }

    impl CannedModel {
        fn ok(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(response.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                response: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(body) => Ok(body.clone()),
                Err(message) => Err(anyhow!(message.clone())),
            }
        }
    }

    fn classifier(model: Arc<CannedModel>) -> RiskClassifier {
        RiskClassifier::new(model)
    }

    #[tokio::test]
    async fn blank_page_short_circuits_without_model_call() {
        let model = CannedModel::ok(r#"{"risks": []}"#);
        let flags = classifier(model.clone())
            .classify_page(Uuid::new_v4(), 1, "   \n\t ")
            .await;

        assert!(flags.is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn maps_a_well_formed_risk_item() {
        let model = CannedModel::ok(
            r#"{"risks": [{"category": "LIKENESS", "subCategory": "NAME_AND_LIKENESS_USE",
                "severity": "HIGH", "status": "PENDING", "entityName": "Senator Blake",
                "snippet": "SENATOR BLAKE pockets the bribe.",
                "reason": "Real politician depicted committing a crime",
                "suggestion": "Rename the character"}]}"#,
        );
        let flags = classifier(model)
            .classify_page(Uuid::new_v4(), 7, "SENATOR BLAKE pockets the bribe.")
            .await;

        assert_eq!(flags.len(), 1);
        let flag = &flags[0];
        assert_eq!(flag.category, "LIKENESS");
        assert_eq!(flag.sub_category, "NAME_AND_LIKENESS_USE");
        assert_eq!(flag.severity, "HIGH");
        assert_eq!(flag.status, "PENDING");
        assert_eq!(flag.entity_name.as_deref(), Some("Senator Blake"));
        assert_eq!(flag.page_number, 7);
        assert!(!flag.is_redacted);
    }

    #[tokio::test]
    async fn unrecognized_and_missing_fields_resolve_to_defaults() {
        let model = CannedModel::ok(
            r#"{"risks": [{"category": "cosmic horror", "subCategory": null,
                "severity": "urgent", "status": "null"}]}"#,
        );
        let flags = classifier(model)
            .classify_page(Uuid::new_v4(), 2, "Some page text")
            .await;

        assert_eq!(flags.len(), 1);
        let flag = &flags[0];
        assert_eq!(flag.category, "OTHER");
        assert_eq!(flag.sub_category, "UNKNOWN");
        assert_eq!(flag.severity, "MEDIUM");
        assert_eq!(flag.status, "PENDING");
        assert_eq!(flag.entity_name.as_deref(), Some("Unknown"));
    }

    #[tokio::test]
    async fn long_snippet_is_truncated_with_marker() {
        let snippet = "x".repeat(600);
        let payload = format!(r#"{{"risks": [{{"severity": "LOW", "snippet": "{snippet}"}}]}}"#);
        let model = CannedModel::ok(&payload);
        let flags = classifier(model)
            .classify_page(Uuid::new_v4(), 3, "page")
            .await;

        let stored = flags[0].snippet.as_deref().unwrap();
        assert_eq!(stored.chars().count(), MAX_SNIPPET_CHARS);
        assert!(stored.ends_with("..."));
    }

    #[tokio::test]
    async fn model_failure_yields_empty_findings() {
        let model = CannedModel::failing("rate limited");
        let flags = classifier(model)
            .classify_page(Uuid::new_v4(), 4, "page text")
            .await;
        assert!(flags.is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_yields_empty_findings() {
        let model = CannedModel::ok("the page looks fine to me");
        let flags = classifier(model)
            .classify_page(Uuid::new_v4(), 5, "page text")
            .await;
        assert!(flags.is_empty());
    }

    #[tokio::test]
    async fn fenced_payload_is_recovered() {
        let model = CannedModel::ok(
            "```json\n{\"risks\": [{\"severity\": \"LOW\", \"entityName\": \"Acme Cola\"}]}\n```",
        );
        let flags = classifier(model)
            .classify_page(Uuid::new_v4(), 6, "page text")
            .await;
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].entity_name.as_deref(), Some("Acme Cola"));
    }
}
