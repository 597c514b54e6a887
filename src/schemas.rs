//! Artifacts exchanged between the pipeline and the presentation layer

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::deserializers::{de_forgiving_string, de_forgiving_string_list};

/// String-backed enum that keeps unknown labels instead of rejecting them.
///
/// `ALL` lists the canonical variants in prompt order; prompts render their schema from it.
macro_rules! lenient_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(into = "String")]
        pub enum $name {
            $($variant,)+
            /// Label outside the canonical set, kept verbatim
            Other(String),
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &str {
                match self {
                    $($name::$variant => $label,)+
                    $name::Other(s) => s.as_str(),
                }
            }

            /// `A|B|C` rendering used inside prompt schemas
            pub fn schema_choices() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.label())
                    .collect::<Vec<_>>()
                    .join("|")
            }

            pub fn is_canonical(&self) -> bool {
                !matches!(self, $name::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                let wanted = normalize_label(&raw);
                $(
                    if wanted == normalize_label($label) {
                        return $name::$variant;
                    }
                )+
                $name::Other(raw.trim().to_string())
            }
        }

        /// Null, missing and scalar labels are accepted; null becomes the empty `Other`
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                de_forgiving_string(deserializer).map($name::from)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.label().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

lenient_enum!(
    /// Analyst question theme
    Category {
        Growth => "Growth",
        Profitability => "Profitability",
        Competition => "Competition",
        AiStrategy => "AI Strategy",
        CustomerTrends => "Customer Trends",
    }
);

lenient_enum!(
    Difficulty {
        Hard => "Hard",
        VeryHard => "Very Hard",
    }
);

lenient_enum!(
    /// How exposed the drafted answer leaves management
    RiskLevel {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
);

impl Default for Category {
    fn default() -> Self {
        Category::Other(String::new())
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Other(String::new())
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Other(String::new())
    }
}

/// A predicted analyst question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique within the batch it was generated in
    #[serde(default, deserialize_with = "de_forgiving_string")]
    pub id: String,
    #[serde(default, deserialize_with = "de_forgiving_string")]
    pub question: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, deserialize_with = "de_forgiving_string")]
    pub context: String,
    #[serde(
        default,
        deserialize_with = "de_forgiving_string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub data_points: Vec<String>,
}

impl Question {
    /// Ad-hoc question not produced by a generation batch
    pub fn ad_hoc(text: impl Into<String>) -> Self {
        Self {
            id: "custom".to_string(),
            question: text.into(),
            ..Self::default()
        }
    }
}

/// Questions produced atomically by one generation call
pub type QuestionBatch = Vec<Question>;

/// Drafted answer to one question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseDraft {
    #[serde(default, deserialize_with = "de_forgiving_string_list")]
    pub talking_points: Vec<String>,
    #[serde(default, deserialize_with = "de_forgiving_string_list")]
    pub key_metrics: Vec<String>,
    #[serde(default, deserialize_with = "de_forgiving_string")]
    pub response_text: String,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default, deserialize_with = "de_forgiving_string_list")]
    pub follow_up_concerns: Vec<String>,
}

/// Enforce id uniqueness within a batch.
///
/// Blank ids become `q{position}`; repeated ids get a `-{n}` suffix.
pub fn normalize_batch_ids(batch: &mut QuestionBatch) {
    let mut seen = std::collections::HashSet::new();
    for (i, q) in batch.iter_mut().enumerate() {
        let base = if q.id.trim().is_empty() {
            format!("q{}", i + 1)
        } else {
            q.id.trim().to_string()
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        q.id = candidate;
    }
}
