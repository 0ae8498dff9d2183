/// A named provider preset for OpenAI-compatible APIs.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

const fn preset(url: &'static str, needs_api_key: bool) -> ProviderPreset {
    ProviderPreset {
        default_base_url: url,
        needs_api_key,
        extra_headers: &[],
    }
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "ollama" => Some(preset("http://localhost:11434/v1/chat/completions", false)),
        "groq" => Some(preset("https://api.groq.com/openai/v1/chat/completions", true)),
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1/chat/completions",
            needs_api_key: true,
            extra_headers: &[("X-Title", "riddler")],
        }),
        "together" => Some(preset("https://api.together.xyz/v1/chat/completions", true)),
        "mistral" => Some(preset("https://api.mistral.ai/v1/chat/completions", true)),
        "deepseek" => Some(preset("https://api.deepseek.com/v1/chat/completions", true)),
        _ => None,
    }
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["ollama", "groq", "openrouter", "together", "mistral", "deepseek"]
}
