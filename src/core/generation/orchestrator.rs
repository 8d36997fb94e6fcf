//! Generation Orchestrator
//!
//! Every operation runs the same linear sequence:
//!
//! 1. validate the request (no side effects on failure)
//! 2. record the regeneration with the governor, when the call is one
//! 3. consume one credit
//! 4. look up the response cache; a hit is returned as-is (still billed)
//! 5. on a miss: retrieve candidates (expansions only), build the prompt,
//!    call the model, decode, and store the result in the cache
//!
//! Any failure in 4–5 refunds the credit before the error is returned. The
//! governor count from step 2 is never reversed. Cache store failures are
//! logged and do not fail the call.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use super::error::{GenerationError, GenerationResult};
use super::parse::DecodeResponse;
use super::prompts::{normalize_frame, PromptAssembler};
use super::retrieval::{select_candidates, ContentRetriever, RetrievalQuery, RetrievedContent};
use super::temperature::TemperaturePolicy;
use super::types::{
    Generated, GenerationRequest, Movement, MovementRegenerationParams, MovementScaffoldResult, RefinementParams,
    RefinementResult, ScaffoldDraft, ScaffoldParams, ScaffoldResult, SceneExpansion, SceneExpansionParams,
};
use crate::config::GenerationConfig;
use crate::core::cache::{CanonicalParams, ResponseCache};
use crate::core::credits::{CreditLedger, OperationKind};
use crate::core::llm::CompletionClient;
use crate::core::logging::RECONCILIATION_TARGET;
use crate::core::regeneration::{ExpansionGuidance, RegenerationGovernor, RegenerationLimits};
use crate::database::Database;

/// Default number of retrieved candidates per content kind
pub const DEFAULT_RETRIEVAL_LIMIT: usize = 5;

/// Result of [`GenerationOrchestrator::generate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOutput {
    Scaffold(ScaffoldResult),
    SceneExpansion(SceneExpansion),
    Refinement(RefinementResult),
    MovementRegeneration(MovementScaffoldResult),
}

/// Façade over ledger, cache, governor and the model.
pub struct GenerationOrchestrator {
    ledger: CreditLedger,
    cache: ResponseCache,
    governor: RegenerationGovernor,
    assembler: PromptAssembler,
    client: Arc<dyn CompletionClient>,
    retriever: Option<Arc<dyn ContentRetriever>>,
    retrieval_limit: usize,
    max_tokens: Option<u32>,
}

impl GenerationOrchestrator {
    pub fn new(
        ledger: CreditLedger,
        cache: ResponseCache,
        governor: RegenerationGovernor,
        client: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            ledger,
            cache,
            governor,
            assembler: PromptAssembler::default(),
            client,
            retriever: None,
            retrieval_limit: DEFAULT_RETRIEVAL_LIMIT,
            max_tokens: None,
        }
    }

    /// Build every component over one database with configured limits.
    pub fn from_config(db: Database, client: Arc<dyn CompletionClient>, config: &GenerationConfig) -> Self {
        let limits = RegenerationLimits {
            scaffold: config.scaffold_regeneration_limit,
            expansion: config.expansion_regeneration_limit,
        };
        Self::new(
            CreditLedger::new(db.clone()),
            ResponseCache::new(db.clone()),
            RegenerationGovernor::with_limits(db, limits),
            client,
        )
        .with_retrieval_limit(config.retrieval_limit)
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ContentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature_policy(mut self, policy: TemperaturePolicy) -> Self {
        self.assembler = PromptAssembler::new(policy);
        self
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn governor(&self) -> &RegenerationGovernor {
        &self.governor
    }

    // ========================================================================
    // Exposed Operations
    // ========================================================================

    /// Dispatch any request to its operation.
    pub async fn generate(&self, request: GenerationRequest) -> GenerationResult<Generated<GenerationOutput>> {
        Ok(match request {
            GenerationRequest::Scaffold(p) => self.generate_scaffold(p).await?.map(GenerationOutput::Scaffold),
            GenerationRequest::SceneExpansion(p) => self.expand_scene(p).await?.map(GenerationOutput::SceneExpansion),
            GenerationRequest::Refinement(p) => self.refine_content(p).await?.map(GenerationOutput::Refinement),
            GenerationRequest::MovementRegeneration(p) => self
                .regenerate_movement(p)
                .await?
                .map(GenerationOutput::MovementRegeneration),
        })
    }

    /// Generate a scaffold. Without an `adventure_id` this creates a new
    /// adventure with zeroed regeneration counters; with one it is a
    /// scaffold regeneration.
    #[instrument(skip(self, params), fields(user_id = %params.user_id, adventure_id = ?params.adventure_id))]
    pub async fn generate_scaffold(&self, params: ScaffoldParams) -> GenerationResult<Generated<ScaffoldResult>> {
        params.validate().map_err(GenerationError::InvalidRequest)?;

        let regeneration = match &params.adventure_id {
            Some(adventure_id) => Some(self.governor.record_scaffold_regeneration(adventure_id).await?),
            None => None,
        };
        let (adventure_id, new_adventure) = match &params.adventure_id {
            Some(id) => (id.clone(), false),
            None => (uuid::Uuid::new_v4().to_string(), true),
        };

        let request = GenerationRequest::Scaffold(params);
        let generated = self
            .fulfil::<ScaffoldDraft>(
                &request,
                regeneration.map(|u| u.used),
                new_adventure.then_some(adventure_id.as_str()),
            )
            .await?;

        Ok(generated.map(|scaffold| ScaffoldResult {
            adventure_id,
            scaffold,
            regeneration,
        }))
    }

    /// Expand one scene. Re-expansions (`regenerate`) draw on the expansion
    /// budget.
    #[instrument(skip(self, params), fields(user_id = %params.user_id, adventure_id = %params.adventure_id, scene_id = %params.scene.id))]
    pub async fn expand_scene(&self, params: SceneExpansionParams) -> GenerationResult<Generated<SceneExpansion>> {
        params.validate().map_err(GenerationError::InvalidRequest)?;

        let regeneration = if params.regenerate {
            Some(
                self.governor
                    .record_expansion_or_refinement(&params.adventure_id, ExpansionGuidance::LockComponents)
                    .await?,
            )
        } else {
            None
        };

        let adventure_id = params.adventure_id.clone();
        let scene_id = params.scene.id.clone();
        let request = GenerationRequest::SceneExpansion(params);
        let generated = self.fulfil::<String>(&request, regeneration.map(|u| u.used), None).await?;

        Ok(generated.map(|content| SceneExpansion {
            adventure_id,
            scene_id,
            content,
            regeneration,
        }))
    }

    /// Rewrite expanded content. Every refinement draws on the expansion
    /// budget.
    #[instrument(skip(self, params), fields(user_id = %params.user_id, adventure_id = %params.adventure_id, scene_id = %params.scene.id))]
    pub async fn refine_content(&self, params: RefinementParams) -> GenerationResult<Generated<RefinementResult>> {
        params.validate().map_err(GenerationError::InvalidRequest)?;

        let regeneration = self
            .governor
            .record_expansion_or_refinement(&params.adventure_id, ExpansionGuidance::ManualEditing)
            .await?;

        let adventure_id = params.adventure_id.clone();
        let scene_id = params.scene.id.clone();
        let request = GenerationRequest::Refinement(params);
        let generated = self.fulfil::<String>(&request, Some(regeneration.used), None).await?;

        Ok(generated.map(|content| RefinementResult {
            adventure_id,
            scene_id,
            content,
            regeneration,
        }))
    }

    /// Replace one movement of a scaffold. Draws on the scaffold budget.
    #[instrument(skip(self, params), fields(user_id = %params.user_id, adventure_id = %params.adventure_id, movement_id = %params.movement.id))]
    pub async fn regenerate_movement(
        &self,
        params: MovementRegenerationParams,
    ) -> GenerationResult<Generated<MovementScaffoldResult>> {
        params.validate().map_err(GenerationError::InvalidRequest)?;

        let regeneration = self.governor.record_scaffold_regeneration(&params.adventure_id).await?;

        let adventure_id = params.adventure_id.clone();
        let movement_id = params.movement.id.clone();
        let request = GenerationRequest::MovementRegeneration(params);
        let generated = self.fulfil::<Movement>(&request, Some(regeneration.used), None).await?;

        Ok(generated.map(|movement| MovementScaffoldResult {
            adventure_id,
            movement_id,
            movement,
            regeneration,
        }))
    }

    pub async fn get_user_credits(&self, user_id: &str) -> GenerationResult<i64> {
        Ok(self.ledger.get_balance(user_id).await?)
    }

    pub async fn check_credit_sufficiency(&self, user_id: &str, operation: OperationKind) -> GenerationResult<bool> {
        Ok(self.ledger.check_sufficiency(user_id, operation).await?)
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    /// Consume, produce, and refund on failure.
    async fn fulfil<T>(
        &self,
        request: &GenerationRequest,
        slot: Option<u32>,
        new_adventure: Option<&str>,
    ) -> GenerationResult<Generated<T>>
    where
        T: DecodeResponse + Serialize + DeserializeOwned,
    {
        let operation = request.operation();
        let user_id = request.user_id();
        let metadata = serde_json::json!({
            "adventure_id": request.adventure_id().or(new_adventure),
            "regeneration_slot": slot,
        });

        let credits_remaining = self.ledger.consume(user_id, operation, metadata).await?;

        match self.produce::<T>(request, slot, new_adventure).await {
            Ok((output, cache_hit)) => {
                info!(%operation, cache_hit, credits_remaining, "Generation complete");
                Ok(Generated {
                    output,
                    cache_hit,
                    credits_remaining,
                })
            }
            Err(err) => {
                self.refund_after_failure(user_id, operation, &err).await;
                Err(err)
            }
        }
    }

    /// Everything after the credit is consumed.
    async fn produce<T>(
        &self,
        request: &GenerationRequest,
        slot: Option<u32>,
        new_adventure: Option<&str>,
    ) -> GenerationResult<(T, bool)>
    where
        T: DecodeResponse + Serialize + DeserializeOwned,
    {
        if let Some(adventure_id) = new_adventure {
            self.governor.initialize(adventure_id).await?;
        }

        let model = self.client.model();
        let params = self.cache_key(request, &model, slot)?;

        if let Some(entry) = self.cache.lookup(&params).await? {
            let output = serde_json::from_value::<T>(entry.response).map_err(|e| {
                GenerationError::Storage(format!("cached response {} does not decode: {e}", params.hash()))
            })?;
            return Ok((output, true));
        }

        let retrieved = self.retrieve(request).await?;
        let prompt = self.assembler.build_prompt(request, &retrieved);
        let temperature = prompt.temperature;
        debug!(prompt_hash = params.hash(), temperature, candidates = retrieved.len(), "Calling model");

        let response = self.client.complete(prompt.into_request(self.max_tokens)).await?;
        let output = T::decode(&response.content)?;

        let answered_by = if response.model.is_empty() { model.as_str() } else { response.model.as_str() };
        let stored = match serde_json::to_value(&output) {
            Ok(value) => self
                .cache
                .store(&params, &value, response.token_count(), answered_by, temperature)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = stored {
            warn!(prompt_hash = params.hash(), error = %e, "Failed to cache generation result");
        }

        Ok((output, false))
    }

    /// Prompt-relevant parameters plus model and regeneration slot. Caller
    /// and adventure identity are excluded so identical first-time requests
    /// share an entry.
    fn cache_key(&self, request: &GenerationRequest, model: &str, slot: Option<u32>) -> GenerationResult<CanonicalParams> {
        let mut value = serde_json::to_value(request).map_err(|e| GenerationError::InvalidRequest(e.to_string()))?;
        if let Some(map) = value.as_object_mut() {
            map.remove("user_id");
            map.remove("adventure_id");
            map.insert("model".into(), serde_json::Value::String(model.to_string()));
            if let Some(slot) = slot {
                map.insert("regeneration_slot".into(), serde_json::Value::from(slot));
            }
        }
        Ok(CanonicalParams::from_value(value))
    }

    async fn retrieve(&self, request: &GenerationRequest) -> GenerationResult<Vec<RetrievedContent>> {
        let (GenerationRequest::SceneExpansion(params), Some(retriever)) = (request, &self.retriever) else {
            return Ok(Vec::new());
        };
        if self.retrieval_limit == 0 {
            return Ok(Vec::new());
        }

        let query = RetrievalQuery {
            frame: normalize_frame(&params.frame),
            scene_type: params.scene.scene_type,
            text: format!("{} {}", params.scene.title, params.scene.description),
            tier: params.party.tier(),
            limit: self.retrieval_limit,
        };
        let candidates = retriever.retrieve(query.clone()).await?;
        Ok(select_candidates(&query, candidates))
    }

    /// Best-effort refund. A failed refund is logged for reconciliation and
    /// never replaces the original error.
    async fn refund_after_failure(&self, user_id: &str, operation: OperationKind, cause: &GenerationError) {
        let metadata = serde_json::json!({ "reason": cause.to_string() });
        match self.ledger.refund(user_id, operation, metadata).await {
            Ok(balance) => warn!(user_id, %operation, balance, error = %cause, "Generation failed; credit refunded"),
            Err(refund_err) => error!(
                target: RECONCILIATION_TARGET,
                user_id,
                %operation,
                error = %cause,
                refund_error = %refund_err,
                "Refund failed after generation failure"
            ),
        }
    }
}
