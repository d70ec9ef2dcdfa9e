use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use fea_config::{
    ConfigError, MeshLimitPolicy, MeshPrecheck, SimulationConfig, mesh_precheck,
};

pub const SYSTEM_PROMPT: &str = r#"You are an expert finite-element analyst. Your SOLE purpose is to convert a user's natural-language request into a precise JSON configuration for a structural simulation.

You MUST follow these rules:
1.  **JSON ONLY:** You MUST ONLY output the raw JSON text. Do NOT include any other text, explanations, or markdown tags like ```json ... ```.
2.  **SCHEMA:** The JSON MUST conform to the following schema.
3.  **DEFAULTS:** If the user does not provide a value, you MUST infer a reasonable engineering default.
    * Default material: 'Steel' (E=200e9, v=0.3)
    * Default load: 1000.0 N
    * Default mesh: 10 elements along the longest dimension, 4 in others.
    * Default geometry: If only length is given, assume a 10:1 aspect ratio (e.g., L=1.0 -> W=0.1, H=0.1).

---
## JSON SCHEMA
{
  "MODEL_NAME": "Unique_Model_Name",
  "TEST_TYPE": "CantileverBeam",

  "GEOMETRY": {
    "length_m": 1.0,
    "width_m": 0.1,
    "height_m": 0.1
  },
  "MATERIAL": {
    "name": "Steel",
    "youngs_modulus_pa": 200e9,
    "poisson_ratio": 0.3
  },
  "LOADING": {
    "tip_load_n": 1000.0
  },
  "DISCRETIZATION": {
    "elements_length": 10,
    "elements_width": 4,
    "elements_height": 4
  }
}
---
## EXAMPLE
User: "Sim a 1m long steel beam, 10cm high and wide, with a 1kN load at the tip. Use a 20x4x4 mesh."
Assistant:
{
  "MODEL_NAME": "Cantilever_1m_1kN_20x4x4",
  "TEST_TYPE": "CantileverBeam",
  "GEOMETRY": {
    "length_m": 1.0,
    "width_m": 0.1,
    "height_m": 0.1
  },
  "MATERIAL": {
    "name": "Steel",
    "youngs_modulus_pa": 200e9,
    "poisson_ratio": 0.3
  },
  "LOADING": {
    "tip_load_n": 1000.0
  },
  "DISCRETIZATION": {
    "elements_length": 20,
    "elements_width": 4,
    "elements_height": 4
  }
}
---
Now, process the user's request.
"#;

pub fn default_system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// One stateless completion exchange with the hosted model.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

pub trait LanguageModel {
    fn complete(&mut self, request: CompletionRequest<'_>) -> Result<String, String>;
}

/// Best-effort cleanup for models that wrap their output in markdown fences
/// despite the instructions. Only the literal "```json" prefix and "```"
/// suffix are handled; this is not a markdown parser.
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest.trim_start();
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.trim_end();
    }
    cleaned
}

#[derive(Debug, Clone)]
pub struct TranslatedConfig {
    pub config: SimulationConfig,
    pub precheck: MeshPrecheck,
}

#[derive(Debug)]
pub enum TranslationError {
    /// The backend call itself failed (network, quota, credentials).
    Model(String),
    /// The model's output was not valid JSON; `raw` is shown to the user.
    InvalidJson { message: String, raw: String },
    /// Well-formed JSON that failed the schema's range checks.
    Invalid(Vec<String>),
    /// The requested discretization exceeds the node limit.
    MeshLimit(MeshPrecheck),
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::Model(message) => write!(f, "model request failed: {message}"),
            TranslationError::InvalidJson { message, .. } => {
                write!(f, "model did not return valid JSON: {message}")
            }
            TranslationError::Invalid(problems) => {
                write!(f, "generated configuration rejected: {}", problems.join("; "))
            }
            TranslationError::MeshLimit(precheck) => write!(
                f,
                "requested mesh has {} nodes, above the {}-node limit",
                precheck.total_nodes,
                fea_config::NODE_LIMIT
            ),
        }
    }
}

impl Error for TranslationError {}

/// Turns free-form text into a validated `SimulationConfig`.
///
/// Each translation is a single stateless attempt: a failed turn is reported
/// and abandoned, never retried.
pub struct ConfigTranslator<C: LanguageModel> {
    client: C,
    system_prompt: String,
    mesh_limit_policy: MeshLimitPolicy,
}

impl<C: LanguageModel> ConfigTranslator<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            system_prompt: SYSTEM_PROMPT.to_string(),
            mesh_limit_policy: MeshLimitPolicy::Enforce,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_mesh_limit_policy(mut self, policy: MeshLimitPolicy) -> Self {
        self.mesh_limit_policy = policy;
        self
    }

    pub fn into_client(self) -> C {
        self.client
    }

    pub fn translate(&mut self, user_text: &str) -> Result<TranslatedConfig, TranslationError> {
        let raw = self
            .client
            .complete(CompletionRequest {
                system_prompt: &self.system_prompt,
                user_prompt: user_text,
            })
            .map_err(TranslationError::Model)?;

        let cleaned = strip_code_fences(&raw);
        let config = SimulationConfig::from_json_str(cleaned).map_err(|err| match err {
            ConfigError::Parse { message, raw } => TranslationError::InvalidJson { message, raw },
            ConfigError::Invalid(problems) => TranslationError::Invalid(problems),
        })?;

        let precheck = mesh_precheck(&config.discretization);
        if self.mesh_limit_policy == MeshLimitPolicy::Enforce && !precheck.within_limit {
            return Err(TranslationError::MeshLimit(precheck));
        }

        Ok(TranslatedConfig { config, precheck })
    }
}

pub const API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// The credential environment variable was not set. Fatal at startup.
#[derive(Debug)]
pub struct CredentialError {
    var: &'static str,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} environment variable not set", self.var)
    }
}

impl Error for CredentialError {}

/// Hosted text-completion backend reached over HTTP.
///
/// Decoding is requested deterministic (temperature 0) to minimize variance
/// between identical requests.
pub struct GeminiClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Reads the credential from `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self, CredentialError> {
        let api_key =
            std::env::var(API_KEY_VAR).map_err(|_| CredentialError { var: API_KEY_VAR })?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: RequestContent<'a>,
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl LanguageModel for GeminiClient {
    fn complete(&mut self, request: CompletionRequest<'_>) -> Result<String, String> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let body = GenerateContentRequest {
            system_instruction: RequestContent {
                role: None,
                parts: vec![RequestPart {
                    text: request.system_prompt,
                }],
            },
            contents: vec![RequestContent {
                role: Some("user"),
                parts: vec![RequestPart {
                    text: request.user_prompt,
                }],
            }],
            generation_config: GenerationSettings {
                temperature: 0.0,
                top_p: 1.0,
                top_k: 1,
                max_output_tokens: 2048,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|err| format!("request failed: {err}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(format!("backend returned {status}: {detail}"));
        }

        let payload: GenerateContentResponse = response
            .json()
            .map_err(|err| format!("unreadable backend response: {err}"))?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err("backend returned no completion text".to_string());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use fea_config::{MeshLimitPolicy, TestType};

    use super::{
        CompletionRequest, ConfigTranslator, LanguageModel, TranslationError,
        default_system_prompt, strip_code_fences,
    };

    const FIXTURE_PROMPT: &str = "Sim a 1m long steel beam, 10cm high and wide, with a 1kN load at the tip. Use a 20x4x4 mesh.";

    const FIXTURE_JSON: &str = r#"{
  "MODEL_NAME": "Cantilever_1m_1kN_20x4x4",
  "TEST_TYPE": "CantileverBeam",
  "GEOMETRY": {
    "length_m": 1.0,
    "width_m": 0.1,
    "height_m": 0.1
  },
  "MATERIAL": {
    "name": "Steel",
    "youngs_modulus_pa": 200e9,
    "poisson_ratio": 0.3
  },
  "LOADING": {
    "tip_load_n": 1000.0
  },
  "DISCRETIZATION": {
    "elements_length": 20,
    "elements_width": 4,
    "elements_height": 4
  }
}"#;

    #[derive(Debug, Clone)]
    struct RequestLog {
        system_prompt: String,
        user_prompt: String,
    }

    #[derive(Default)]
    struct ScriptedModel {
        responses: BTreeMap<String, String>,
        logs: Vec<RequestLog>,
    }

    impl ScriptedModel {
        fn with_response(mut self, prompt: &str, response: &str) -> Self {
            self.responses
                .insert(prompt.to_string(), response.to_string());
            self
        }
    }

    impl LanguageModel for ScriptedModel {
        fn complete(&mut self, request: CompletionRequest<'_>) -> Result<String, String> {
            self.logs.push(RequestLog {
                system_prompt: request.system_prompt.to_string(),
                user_prompt: request.user_prompt.to_string(),
            });
            self.responses
                .get(request.user_prompt)
                .cloned()
                .ok_or_else(|| {
                    format!("no scripted response for prompt '{}'", request.user_prompt)
                })
        }
    }

    struct FailingModel;

    impl LanguageModel for FailingModel {
        fn complete(&mut self, _request: CompletionRequest<'_>) -> Result<String, String> {
            Err("backend unreachable".to_string())
        }
    }

    #[test]
    fn system_prompt_spells_out_schema_and_defaults() {
        let prompt = default_system_prompt();
        assert!(prompt.contains("JSON ONLY"));
        assert!(prompt.contains("## JSON SCHEMA"));
        assert!(prompt.contains("## EXAMPLE"));
        for key in [
            "MODEL_NAME",
            "TEST_TYPE",
            "GEOMETRY",
            "MATERIAL",
            "LOADING",
            "DISCRETIZATION",
        ] {
            assert!(prompt.contains(key), "system prompt missing {key}");
        }
        assert!(prompt.contains("E=200e9"));
        assert!(prompt.contains("1000.0 N"));
        assert!(prompt.contains("10:1 aspect ratio"));
    }

    #[test]
    fn fixture_prompt_translates_to_literal_example_config() {
        let model = ScriptedModel::default().with_response(FIXTURE_PROMPT, FIXTURE_JSON);
        let mut translator = ConfigTranslator::new(model);

        let translated = translator
            .translate(FIXTURE_PROMPT)
            .expect("fixture should translate");
        let config = &translated.config;

        assert_eq!(config.model_name, "Cantilever_1m_1kN_20x4x4");
        assert_eq!(config.test_type, TestType::CantileverBeam);
        assert_eq!(config.geometry.length_m, 1.0);
        assert_eq!(config.geometry.width_m, 0.1);
        assert_eq!(config.geometry.height_m, 0.1);
        assert_eq!(config.material.name, "Steel");
        assert_eq!(config.material.youngs_modulus_pa, 200e9);
        assert_eq!(config.material.poisson_ratio, 0.3);
        assert_eq!(config.loading.tip_load_n, 1000.0);
        assert_eq!(config.discretization.elements_length, 20);
        assert_eq!(config.discretization.elements_width, 4);
        assert_eq!(config.discretization.elements_height, 4);

        assert_eq!(translated.precheck.total_nodes, 525);
        assert!(translated.precheck.within_limit);

        let model = translator.into_client();
        assert_eq!(model.logs.len(), 1, "exactly one attempt, no retries");
        assert_eq!(model.logs[0].user_prompt, FIXTURE_PROMPT);
        assert!(model.logs[0].system_prompt.contains("## JSON SCHEMA"));
    }

    #[test]
    fn fenced_and_unfenced_responses_yield_the_same_config() {
        let fenced = format!("```json\n{FIXTURE_JSON}\n```");
        let model = ScriptedModel::default()
            .with_response("plain", FIXTURE_JSON)
            .with_response("fenced", &fenced);
        let mut translator = ConfigTranslator::new(model);

        let plain = translator.translate("plain").expect("plain should work");
        let wrapped = translator.translate("fenced").expect("fenced should work");
        assert_eq!(plain.config, wrapped.config);
    }

    #[test]
    fn strips_only_literal_fence_markers() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("{\"a\": 1}\n```"), "{\"a\": 1}");
        // A bare opening fence is not the literal "```json" prefix.
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "```\n{\"a\": 1}");
    }

    #[test]
    fn backend_failure_aborts_the_turn() {
        let mut translator = ConfigTranslator::new(FailingModel);
        let err = translator.translate("anything").expect_err("should fail");
        match err {
            TranslationError::Model(message) => assert!(message.contains("unreachable")),
            other => panic!("expected model error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_output_keeps_the_raw_text_for_display() {
        let model =
            ScriptedModel::default().with_response("beam", "Sure! Here is your simulation:");
        let mut translator = ConfigTranslator::new(model);

        let err = translator.translate("beam").expect_err("should fail");
        match err {
            TranslationError::InvalidJson { raw, .. } => {
                assert_eq!(raw, "Sure! Here is your simulation:");
            }
            other => panic!("expected invalid JSON error, got {other:?}"),
        }
    }

    #[test]
    fn oversized_mesh_is_a_hard_gate_for_the_translator() {
        let oversized = FIXTURE_JSON
            .replace("\"elements_length\": 20", "\"elements_length\": 30")
            .replace("\"elements_width\": 4", "\"elements_width\": 10")
            .replace("\"elements_height\": 4", "\"elements_height\": 10");

        let model = ScriptedModel::default().with_response("big", &oversized);
        let mut translator = ConfigTranslator::new(model);
        let err = translator.translate("big").expect_err("should gate");
        match err {
            TranslationError::MeshLimit(precheck) => {
                assert_eq!(precheck.total_nodes, 3751);
            }
            other => panic!("expected mesh limit error, got {other:?}"),
        }

        let model = ScriptedModel::default().with_response("big", &oversized);
        let mut translator =
            ConfigTranslator::new(model).with_mesh_limit_policy(MeshLimitPolicy::Advisory);
        let translated = translator
            .translate("big")
            .expect("advisory policy should pass the config through");
        assert!(!translated.precheck.within_limit);
    }

    #[test]
    fn validation_problems_surface_from_generated_config() {
        let negative_width = FIXTURE_JSON.replace("\"width_m\": 0.1", "\"width_m\": -0.1");
        let model = ScriptedModel::default().with_response("bad", &negative_width);
        let mut translator = ConfigTranslator::new(model);

        let err = translator.translate("bad").expect_err("should reject");
        match err {
            TranslationError::Invalid(problems) => {
                assert!(problems.iter().any(|p| p.contains("width_m")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
