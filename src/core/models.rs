use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use uuid::Uuid;

/// Backends a model can be served by. This is a closed set: configuration
/// carrying any other tag is rejected up front instead of failing inside a
/// chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Provider {
    OpenAi,
    Vertex,
    Google,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Vertex, Provider::Google];

    pub fn tag(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Vertex => "vertex",
            Provider::Google => "google",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Vertex => "Vertex AI",
            Provider::Google => "Google",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, UnknownProviderError> {
        match tag.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "vertex" => Ok(Provider::Vertex),
            "google" => Ok(Provider::Google),
            _ => Err(UnknownProviderError {
                tag: tag.to_string(),
            }),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl TryFrom<String> for Provider {
    type Error = UnknownProviderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Provider::from_tag(&value)
    }
}

impl From<Provider> for String {
    fn from(value: Provider) -> Self {
        value.tag().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProviderError {
    pub tag: String,
}

impl fmt::Display for UnknownProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown provider tag '{}' (expected one of: openai, vertex, google)",
            self.tag
        )
    }
}

impl Error for UnknownProviderError {}

/// Whether a model produces text or images. Image models route user input
/// through the image-generation tool instead of the chat endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Text,
    Image,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Text => write!(f, "text"),
            ModelKind::Image => write!(f, "image"),
        }
    }
}

/// A user-configured model entry. The selectable set shown to a user is
/// exactly their configured list; built-in defaults only appear when no
/// custom model exists at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomModel {
    pub uuid: Uuid,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "id")]
    pub model_id: String,
    pub provider: Provider,
    #[serde(rename = "type", default)]
    pub kind: ModelKind,
}

impl CustomModel {
    pub fn new(
        display_name: impl Into<String>,
        model_id: impl Into<String>,
        provider: Provider,
        kind: ModelKind,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            display_name: display_name.into(),
            model_id: model_id.into(),
            provider,
            kind,
        }
    }
}

/// Built-in fallback models, offered only while the user has configured no
/// custom model of their own.
pub fn builtin_models() -> Vec<CustomModel> {
    vec![
        CustomModel {
            uuid: Uuid::nil(),
            display_name: "Default GPT".to_string(),
            model_id: "gpt-4o-mini".to_string(),
            provider: Provider::OpenAi,
            kind: ModelKind::Text,
        },
        CustomModel {
            uuid: Uuid::from_u128(1),
            display_name: "Default Gemini".to_string(),
            model_id: "gemini-2.5-flash-lite".to_string(),
            provider: Provider::Vertex,
            kind: ModelKind::Text,
        },
    ]
}

/// The models a user may select from. Custom models fully replace the
/// built-in defaults; the defaults must not leak into a configured list.
pub fn selectable_models(custom: &[CustomModel]) -> Vec<CustomModel> {
    if custom.is_empty() {
        builtin_models()
    } else {
        custom.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tags_round_trip() {
        for provider in Provider::ALL {
            assert_eq!(Provider::from_tag(provider.tag()).unwrap(), provider);
        }
        assert_eq!(Provider::from_tag("OpenAI").unwrap(), Provider::OpenAi);
    }

    #[test]
    fn unknown_provider_tags_are_rejected() {
        let err = Provider::from_tag("anthropic").unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn custom_model_deserializes_storage_shape() {
        let json = r#"{
            "uuid": "8c5ad6a2-95a5-4c5e-8a3e-1f2c78b4a111",
            "name": "My Custom GPT",
            "id": "gpt-4o",
            "provider": "openai"
        }"#;
        let model: CustomModel = serde_json::from_str(json).unwrap();
        assert_eq!(model.display_name, "My Custom GPT");
        assert_eq!(model.model_id, "gpt-4o");
        assert_eq!(model.provider, Provider::OpenAi);
        assert_eq!(model.kind, ModelKind::Text);
    }

    #[test]
    fn invalid_provider_tag_fails_deserialization() {
        let json = r#"{
            "uuid": "8c5ad6a2-95a5-4c5e-8a3e-1f2c78b4a111",
            "name": "Mystery",
            "id": "mystery-1",
            "provider": "mystery"
        }"#;
        assert!(serde_json::from_str::<CustomModel>(json).is_err());
    }

    #[test]
    fn custom_models_replace_builtins_entirely() {
        let custom = vec![CustomModel::new(
            "My Custom GPT",
            "gpt-4o",
            Provider::OpenAi,
            ModelKind::Text,
        )];
        let selectable = selectable_models(&custom);
        assert_eq!(selectable.len(), 1);
        assert_eq!(selectable[0].display_name, "My Custom GPT");
        assert!(!selectable
            .iter()
            .any(|m| builtin_models().iter().any(|b| b.model_id == m.model_id)));
    }

    #[test]
    fn builtins_appear_only_when_nothing_is_configured() {
        let selectable = selectable_models(&[]);
        assert!(!selectable.is_empty());
        assert!(selectable.iter().any(|m| m.display_name == "Default GPT"));
    }
}
