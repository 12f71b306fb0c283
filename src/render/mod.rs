//! Notification rendering.
//!
//! Pure mapping from a release to the payload every subscribed tenant
//! receives. No I/O happens here; the caller supplies the icon and the clock.

use chrono::{DateTime, Utc};

use crate::models::{
    Category, CategoryConfig, Embed, EmbedField, Footer, LinkButton, Payload, Release, Thumbnail,
};

/// Brand colour of every notification.
pub const EMBED_COLOR: u32 = 0x5865F2;

pub const FIELD_RELEASE_DATE: &str = "Release Date";
pub const FIELD_BUILD_NUMBER: &str = "Build Number";

/// Footer branding shared by all notifications.
#[derive(Debug, Clone)]
pub struct Branding {
    pub footer_text: String,
    pub footer_icon_url: Option<String>,
}

/// Builds delivery-ready payloads.
#[derive(Debug, Clone)]
pub struct NotificationRenderer {
    branding: Branding,
}

impl NotificationRenderer {
    pub fn new(branding: Branding) -> Self {
        Self { branding }
    }

    /// Render the tenant-independent part of a notification.
    pub fn render(
        &self,
        release: &Release,
        icon_url: Option<String>,
        rendered_at: DateTime<Utc>,
    ) -> Payload {
        let mut fields = vec![EmbedField {
            name: FIELD_RELEASE_DATE.to_string(),
            value: chat_timestamp(release.release_date),
            inline: false,
        }];

        if release.category.has_build_number() {
            if let Some(build) = &release.build_number {
                fields.push(EmbedField {
                    name: FIELD_BUILD_NUMBER.to_string(),
                    value: build.clone(),
                    inline: false,
                });
            }
        }

        Payload {
            content: None,
            embed: Embed {
                title: "New Release".to_string(),
                description: description(release),
                timestamp: rendered_at.to_rfc3339(),
                color: EMBED_COLOR,
                thumbnail: icon_url.map(|url| Thumbnail { url }),
                fields,
                footer: Footer {
                    text: self.branding.footer_text.clone(),
                    icon_url: self.branding.footer_icon_url.clone(),
                },
            },
            buttons: vec![LinkButton {
                label: "Link".to_string(),
                url: release.link.clone(),
            }],
        }
    }
}

/// Mention text for a tenant's opt-in role.
pub fn ping(config: &CategoryConfig) -> String {
    format!("<@&{}>", config.role)
}

/// Known categories are named by the title; `Other` releases carry their product.
fn description(release: &Release) -> String {
    match release.category {
        Category::Other => format!("{} {}", release.product, release.version),
        _ => release.version.clone(),
    }
}

/// Chat markup that each reader sees in their own timezone.
fn chat_timestamp(at: DateTime<Utc>) -> String {
    format!("<t:{}:f>", at.timestamp())
}
