//! Logical model routing table (§4.2's specialization table).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::tool::ToolName;

/// A capability a logical model may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    ToolUse,
    Vision,
    Embedding,
    Rerank,
}

/// The six fixed logical model names the core routes by, distinct from the
/// concrete provider model id configured behind each one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogicalModel {
    ChatLarge,
    ChatLight,
    ChatCode,
    Multimodal,
    Embedding,
    Reranker,
}

impl LogicalModel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChatLarge => "chat-large",
            Self::ChatLight => "chat-light",
            Self::ChatCode => "chat-code",
            Self::Multimodal => "multimodal",
            Self::Embedding => "embedding",
            Self::Reranker => "reranker",
        }
    }

    /// Context-window cap for this logical model, per §4.2's table.
    #[must_use]
    pub const fn default_max_context_tokens(self) -> u32 {
        match self {
            Self::ChatLarge => 128_000,
            Self::ChatLight => 32_000,
            Self::ChatCode => 64_000,
            Self::Multimodal => 128_000,
            Self::Embedding => 8_000,
            Self::Reranker => 32_000,
        }
    }

    /// Tools this model may use before `webSearch` search tools are added.
    #[must_use]
    pub fn base_tools(self) -> HashSet<ToolName> {
        match self {
            Self::ChatLarge | Self::ChatLight => {
                HashSet::from([ToolName::Coder, ToolName::Multimodal])
            }
            Self::ChatCode => HashSet::from([ToolName::Multimodal]),
            Self::Multimodal | Self::Embedding | Self::Reranker => HashSet::new(),
        }
    }
}

/// Static description of one logical model's capabilities and limits.
/// `tools ⊆ registry.names()` is validated by the tool registry at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub logical_name: LogicalModel,
    pub provider: String,
    pub max_context_tokens: u32,
    pub capabilities: HashSet<Capability>,
    pub tools: HashSet<ToolName>,
}

impl ModelSpec {
    #[must_use]
    pub fn defaults_for(logical_name: LogicalModel, provider: impl Into<String>) -> Self {
        let capabilities = match logical_name {
            LogicalModel::ChatLarge | LogicalModel::ChatLight | LogicalModel::ChatCode => {
                HashSet::from([Capability::Chat, Capability::ToolUse])
            }
            LogicalModel::Multimodal => HashSet::from([Capability::Chat, Capability::Vision]),
            LogicalModel::Embedding => HashSet::from([Capability::Embedding]),
            LogicalModel::Reranker => HashSet::from([Capability::Rerank]),
        };

        Self {
            logical_name,
            provider: provider.into(),
            max_context_tokens: logical_name.default_max_context_tokens(),
            capabilities,
            tools: logical_name.base_tools(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_code_excludes_coder_tool() {
        // chat-code's own output is the coder tool's backing adapter; it
        // must not be able to call itself.
        let tools = LogicalModel::ChatCode.base_tools();
        assert!(!tools.contains(&ToolName::Coder));
        assert!(tools.contains(&ToolName::Multimodal));
    }

    #[test]
    fn test_context_caps_match_spec_table() {
        assert_eq!(LogicalModel::ChatLarge.default_max_context_tokens(), 128_000);
        assert_eq!(LogicalModel::ChatLight.default_max_context_tokens(), 32_000);
        assert_eq!(LogicalModel::Embedding.default_max_context_tokens(), 8_000);
    }
}
