//! Content blocks carried by prompts, message chunks, and tool calls.
//!
//! The `type` field selects the variant. Unrecognised types decode into
//! [`ContentBlock::Unknown`], which keeps the original object (key order
//! included) and re-encodes it verbatim. Known variants keep fields they do
//! not model in `extra`, so they round-trip too.

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    /// Text body.
    pub text: String,
    /// Opaque annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Fields not modelled above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Base64 image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64 payload.
    pub data: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Optional source URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Opaque annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Fields not modelled above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Base64 audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContent {
    /// Base64 payload.
    pub data: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Opaque annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Fields not modelled above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reference to a resource the agent can fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Opaque annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Fields not modelled above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contents of an embedded resource: text or a base64 blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    /// Resource URI.
    pub uri: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Text body for text resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 body for binary resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    /// Fields not modelled above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resource embedded directly in the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    /// The resource contents.
    pub resource: ResourceContents,
    /// Opaque annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
    /// Fields not modelled above, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content block of a type this engine does not model.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownContent {
    fields: Map<String, Value>,
}

impl UnknownContent {
    /// The original `type` discriminator.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.fields.get("type").and_then(Value::as_str).unwrap_or("")
    }

    /// Every original field, including `type`, in wire order.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// A single piece of content.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    /// `type: "text"`.
    Text(TextContent),
    /// `type: "image"`.
    Image(ImageContent),
    /// `type: "audio"`.
    Audio(AudioContent),
    /// `type: "resource_link"`.
    ResourceLink(ResourceLink),
    /// `type: "resource"`.
    Resource(EmbeddedResource),
    /// Any other `type`.
    Unknown(UnknownContent),
}

impl ContentBlock {
    /// Build a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent {
            text: text.into(),
            annotations: None,
            extra: Map::new(),
        })
    }

    /// The textual payload of this block, if it has one.
    ///
    /// Text blocks yield their text; embedded text resources yield the
    /// resource body.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(&t.text),
            Self::Resource(r) => r.resource.text.as_deref(),
            _ => None,
        }
    }

    /// The wire discriminator for this block.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
            Self::Audio(_) => "audio",
            Self::ResourceLink(_) => "resource_link",
            Self::Resource(_) => "resource",
            Self::Unknown(u) => u.kind(),
        }
    }
}

/// Join the textual parts of a prompt with newlines.
#[must_use]
pub fn prompt_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn tagged<T: Serialize>(kind: &str, inner: &T) -> Result<Value, serde_json::Error> {
    let Value::Object(fields) = serde_json::to_value(inner)? else {
        return Err(<serde_json::Error as serde::ser::Error>::custom(
            "content block must encode as an object",
        ));
    };
    let mut obj = Map::with_capacity(fields.len() + 1);
    obj.insert("type".into(), Value::from(kind));
    obj.extend(fields);
    Ok(Value::Object(obj))
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = match self {
            Self::Text(inner) => tagged("text", inner),
            Self::Image(inner) => tagged("image", inner),
            Self::Audio(inner) => tagged("audio", inner),
            Self::ResourceLink(inner) => tagged("resource_link", inner),
            Self::Resource(inner) => tagged("resource", inner),
            Self::Unknown(inner) => Ok(Value::Object(inner.fields.clone())),
        }
        .map_err(S::Error::custom)?;
        value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let Value::Object(fields) = value else {
            return Err(D::Error::custom("content block must be an object"));
        };
        let Some(kind) = fields.get("type").and_then(Value::as_str).map(str::to_owned) else {
            return Err(D::Error::custom("content block is missing a string `type`"));
        };

        let known = |fields: Map<String, Value>| {
            let mut rest = fields;
            rest.remove("type");
            Value::Object(rest)
        };

        let block = match kind.as_str() {
            "text" => Self::Text(serde_json::from_value(known(fields)).map_err(D::Error::custom)?),
            "image" => {
                Self::Image(serde_json::from_value(known(fields)).map_err(D::Error::custom)?)
            }
            "audio" => {
                Self::Audio(serde_json::from_value(known(fields)).map_err(D::Error::custom)?)
            }
            "resource_link" => Self::ResourceLink(
                serde_json::from_value(known(fields)).map_err(D::Error::custom)?,
            ),
            "resource" => {
                Self::Resource(serde_json::from_value(known(fields)).map_err(D::Error::custom)?)
            }
            _ => Self::Unknown(UnknownContent { fields }),
        };
        Ok(block)
    }
}
