//! Release model matching the vendor feed entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product line a release belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "iPadOS")]
    IpadOs,
    #[serde(rename = "macOS")]
    MacOs,
    #[serde(rename = "watchOS")]
    WatchOs,
    #[serde(rename = "tvOS")]
    TvOs,
    #[serde(rename = "visionOS")]
    VisionOs,
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 7] = [
        Category::Ios,
        Category::IpadOs,
        Category::MacOs,
        Category::WatchOs,
        Category::TvOs,
        Category::VisionOs,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ios => "iOS",
            Category::IpadOs => "iPadOS",
            Category::MacOs => "macOS",
            Category::WatchOs => "watchOS",
            Category::TvOs => "tvOS",
            Category::VisionOs => "visionOS",
            Category::Other => "Other",
        }
    }

    /// Feed labels outside the known set fall into `Other`.
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or(Category::Other)
    }

    /// Categories whose releases carry a build number.
    pub fn has_build_number(&self) -> bool {
        !matches!(self, Category::Other)
    }

    /// Name of the self-service opt-in role for this category.
    pub fn role_name(&self) -> String {
        match self {
            Category::Other => "Other Apple Releases".to_string(),
            known => format!("{} Releases", known.as_str()),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// A single vendor release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub category: Category,
    /// Product label as published by the vendor, e.g. "iOS" or "Xcode".
    pub product: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    pub release_date: DateTime<Utc>,
    pub link: String,
}

/// Identity of a release: two entries with equal keys are the same release.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseKey {
    pub category: Category,
    pub product: String,
    pub version: String,
    pub build_number: Option<String>,
}

impl Release {
    pub fn key(&self) -> ReleaseKey {
        ReleaseKey {
            category: self.category,
            product: self.product.clone(),
            version: self.version.clone(),
            build_number: self.build_number.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("ios".parse::<Category>().unwrap(), Category::Ios);
        assert_eq!("macOS".parse::<Category>().unwrap(), Category::MacOs);
        assert!("Xcode".parse::<Category>().is_err());
    }

    #[test]
    fn test_unknown_label_maps_to_other() {
        assert_eq!(Category::from_label("Xcode"), Category::Other);
        assert_eq!(Category::from_label("watchOS"), Category::WatchOs);
    }

    #[test]
    fn test_build_number_subset_excludes_other() {
        assert!(Category::Ios.has_build_number());
        assert!(Category::VisionOs.has_build_number());
        assert!(!Category::Other.has_build_number());
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Category::TvOs.role_name(), "tvOS Releases");
        assert_eq!(Category::Other.role_name(), "Other Apple Releases");
    }

    #[test]
    fn test_key_ignores_date_and_link() {
        let a = Release {
            category: Category::Ios,
            product: "iOS".to_string(),
            version: "17.1".to_string(),
            build_number: Some("21B74".to_string()),
            release_date: Utc::now(),
            link: "https://a".to_string(),
        };
        let mut b = a.clone();
        b.link = "https://b".to_string();
        assert_eq!(a.key(), b.key());

        b.build_number = Some("21B80".to_string());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_key_distinguishes_other_products() {
        let xcode = Release {
            category: Category::Other,
            product: "Xcode".to_string(),
            version: "15.1".to_string(),
            build_number: None,
            release_date: Utc::now(),
            link: "https://example.com/xcode".to_string(),
        };
        let safari = Release {
            product: "Safari".to_string(),
            ..xcode.clone()
        };
        assert_ne!(xcode.key(), safari.key());
    }
}
