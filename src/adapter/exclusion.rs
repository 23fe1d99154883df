//! Declarative record exclusion rules
//!
//! Sites pad listings with promotional tiles, low-signal products and
//! category headers. Which of those to drop is site policy, so the rules are
//! configured per site rather than coded into the engine.

use crate::catalog::ProductRecord;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ExclusionRules {
    /// Drop records with fewer reviews than this
    pub min_reviews: Option<u64>,

    /// Drop records with more reviews than this
    pub max_reviews: Option<u64>,

    /// Drop records whose URL does not contain this fragment
    pub url_must_contain: Option<String>,

    /// Drop records whose description is exactly one of these
    pub excluded_descriptions: Vec<String>,

    /// Drop records with an empty description
    pub skip_empty_description: bool,

    /// Drop records whose description equals their category name
    pub skip_category_named: bool,
}

impl ExclusionRules {
    /// Returns why the record is excluded, or None if it passes
    pub fn reason(&self, record: &ProductRecord) -> Option<String> {
        let description = record.description.trim();

        if self.skip_empty_description && description.is_empty() {
            return Some("empty description".to_string());
        }

        if self.excluded_descriptions.iter().any(|d| d == description) {
            return Some(format!("excluded description '{}'", description));
        }

        if self.skip_category_named && description == record.category {
            return Some("description is the category name".to_string());
        }

        if let Some(min) = self.min_reviews {
            if record.reviews < min {
                return Some(format!("{} reviews < minimum {}", record.reviews, min));
            }
        }

        if let Some(max) = self.max_reviews {
            if record.reviews > max {
                return Some(format!("{} reviews > maximum {}", record.reviews, max));
            }
        }

        if let Some(fragment) = &self.url_must_contain {
            if !record.url.contains(fragment.as_str()) {
                return Some(format!("url lacks '{}'", fragment));
            }
        }

        None
    }

    pub fn excludes(&self, record: &ProductRecord) -> bool {
        self.reason(record).is_some()
    }
}
