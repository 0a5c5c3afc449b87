// src/catalog.rs
// Static model catalog: which models exist, who can serve them without a
// user credential, what the system provider calls them, and what file
// input they accept. Pure lookups, no I/O.

const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// One known model and its capability flags.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Servable on the system credential (no user key required).
    pub free_tier: bool,
    pub supports_images: bool,
    pub supports_pdf: bool,
    pub max_file_size_mb: u64,
}

/// Lookup table over the known models. Unknown ids fail closed: no free-tier
/// access, no file support, zero size budget.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self {
            models: built_in_models(),
        }
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn descriptor(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == model_id)
    }

    /// Whether the system credential may serve this model.
    pub fn is_served_without_credential(&self, model_id: &str) -> bool {
        self.descriptor(model_id).map(|m| m.free_tier).unwrap_or(false)
    }

    /// Translate a model id into the name the system provider expects.
    /// Ids without a mapping pass through unchanged.
    pub fn resolve_system_alias<'a>(&self, model_id: &'a str) -> &'a str {
        match model_id {
            "deepseek/deepseek-chat-v3-0324:free" => "deepseek-v3-0324",
            "deepseek/deepseek-r1-0528:free" => "deepseek-r1-0528",
            other => other,
        }
    }

    pub fn supports_file_type(&self, model_id: &str, mime_type: &str) -> bool {
        let Some(desc) = self.descriptor(model_id) else {
            return false;
        };
        if mime_type.starts_with("image/") {
            return desc.supports_images;
        }
        if mime_type == "application/pdf" {
            return desc.supports_pdf;
        }
        false
    }

    pub fn max_file_size_bytes(&self, model_id: &str) -> u64 {
        self.descriptor(model_id)
            .map(|m| m.max_file_size_mb * 1024 * 1024)
            .unwrap_or(0)
    }
}

fn model(
    id: &'static str,
    display_name: &'static str,
    free_tier: bool,
    supports_images: bool,
    supports_pdf: bool,
) -> ModelDescriptor {
    ModelDescriptor {
        id,
        display_name,
        free_tier,
        supports_images,
        supports_pdf,
        max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
    }
}

fn built_in_models() -> Vec<ModelDescriptor> {
    vec![
        // Google
        model("google/gemini-2.0-flash-001", "Gemini 2.0 Flash", false, true, true),
        model("google/gemini-2.0-flash-lite-001", "Gemini 2.0 Flash Lite", false, true, true),
        model("google/gemini-2.5-flash-preview-05-20", "Gemini 2.5 Flash Preview", false, true, true),
        model("google/gemini-2.5-pro-preview", "Gemini 2.5 Pro Preview", false, true, true),
        // OpenAI
        model("openai/gpt-4o-mini", "GPT-4o Mini", false, true, true),
        model("openai/gpt-4o-2024-11-20", "GPT-4o", false, true, true),
        model("openai/gpt-4.1", "GPT-4.1", false, true, true),
        model("openai/gpt-4.1-mini", "GPT-4.1 Mini", false, true, true),
        model("openai/gpt-4.1-nano", "GPT-4.1 Nano", false, true, false),
        model("openai/o3-mini", "o3 Mini", false, false, false),
        model("openai/o4-mini", "o4 Mini", false, true, false),
        // Anthropic
        model("anthropic/claude-opus-4", "Claude Opus 4", false, true, true),
        model("anthropic/claude-sonnet-4", "Claude Sonnet 4", false, true, true),
        model("anthropic/claude-3.7-sonnet", "Claude 3.7 Sonnet", false, true, true),
        model("anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet", false, true, true),
        // Meta
        model("meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B", false, false, false),
        model("meta-llama/llama-4-scout", "Llama 4 Scout", false, true, false),
        model("meta-llama/llama-4-maverick", "Llama 4 Maverick", false, true, false),
        // DeepSeek (shared with the system provider)
        model("deepseek/deepseek-chat-v3-0324:free", "DeepSeek V3 (free)", true, false, false),
        model("deepseek/deepseek-r1-0528:free", "DeepSeek R1 (free)", true, false, false),
        // X.AI
        model("x-ai/grok-3-beta", "Grok 3 Beta", false, false, false),
        model("x-ai/grok-3-mini-beta", "Grok 3 Mini Beta", false, false, false),
        // Mistral
        model("mistralai/mistral-large-2412", "Mistral Large", false, false, false),
        model("mistralai/mistral-small-2412", "Mistral Small", false, false, false),
        model("mistralai/pixtral-large-2412", "Pixtral Large", false, true, true),
        model("mistralai/mistral-7b-instruct", "Mistral 7B", false, false, false),
        // System-provider-exclusive models
        model("deepseek-v3-0324", "DeepSeek V3", true, false, false),
        model("deepseek-r1-0528", "DeepSeek R1", true, false, false),
        model("grok-3-mini-high", "Grok 3 Mini High", true, false, false),
        model("llama-fast-roblox", "Llama Fast", true, false, false),
        model("llama-4-scout-17b-16e-instruct", "Llama 4 Scout 17B", true, true, false),
        model("mistral-small-3.1-24b-instruct-2503", "Mistral Small 3.1 24B", true, false, false),
        model("gpt-4o-mini-2024-07-18", "GPT-4o Mini (2024-07-18)", true, true, false),
        model("gpt-4.1-nano-2025-04-14", "GPT-4.1 Nano (2025-04-14)", true, false, false),
        model("openai-reasoning", "OpenAI Reasoning", true, false, false),
        // Upstream id, spelled the way the system provider registers it
        model("phi-4-multilmodal-instruct", "Phi-4 Multimodal", true, true, false),
        model("qwen2.5-coder-32b-instruct", "Qwen 2.5 Coder 32B", true, false, false),
        model("mistral-large-2411", "Mistral Large 2411", true, false, false),
        model("codestral-2501", "Codestral 2501", true, false, false),
        model("mistral-medium", "Mistral Medium", true, false, false),
        model("open-mixtral-8x22b", "Mixtral 8x22B", true, false, false),
        model("pixtral-large-2411", "Pixtral Large 2411", true, true, false),
    ]
}
