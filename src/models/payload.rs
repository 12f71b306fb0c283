//! Delivery-ready notification payload.

use serde::Serialize;

/// A rich message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    /// RFC 3339 render time
    pub timestamp: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    pub fields: Vec<EmbedField>,
    pub footer: Footer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footer {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// A button that opens a URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Everything handed to the delivery sink for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    /// Mention text, e.g. the tenant's opt-in role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embed: Embed,
    pub buttons: Vec<LinkButton>,
}

impl Embed {
    pub fn field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
