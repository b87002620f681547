use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::Category;

/// Qloo age buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeGroup {
    #[serde(rename = "35_and_younger")]
    ThirtyFiveAndYounger,
    #[serde(rename = "36_to_55")]
    ThirtySixToFiftyFive,
    #[serde(rename = "55_and_older")]
    FiftyFiveAndOlder,
}

impl AgeGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeGroup::ThirtyFiveAndYounger => "35_and_younger",
            AgeGroup::ThirtySixToFiftyFive => "36_to_55",
            AgeGroup::FiftyFiveAndOlder => "55_and_older",
        }
    }

    pub fn from_age(age: u32) -> Self {
        match age {
            0..=35 => AgeGroup::ThirtyFiveAndYounger,
            36..=55 => AgeGroup::ThirtySixToFiftyFive,
            _ => AgeGroup::FiftyFiveAndOlder,
        }
    }

    /// Maps a loosely-specified age ("45", "senior", "36_to_55") to a bucket
    pub fn from_age_text(text: &str) -> Option<Self> {
        let text = text.trim().to_lowercase();
        let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(age) = digits.parse::<u32>() {
            if !text.contains('_') {
                return Some(Self::from_age(age));
            }
        }

        if text.contains("35_and_younger") || text.contains("young") {
            Some(AgeGroup::ThirtyFiveAndYounger)
        } else if text.contains("36_to_55") || text.contains("middle") {
            Some(AgeGroup::ThirtySixToFiftyFive)
        } else if text.contains("55_and_older") || text.contains("senior") {
            Some(AgeGroup::FiftyFiveAndOlder)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    pub fn from_text(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "male" | "boy" | "man" => Some(Gender::Male),
            "female" | "girl" | "woman" => Some(Gender::Female),
            _ => None,
        }
    }
}

/// Demographic signals; absent fields are never sent upstream
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default)]
    pub age_group: Option<AgeGroup>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

/// Weights attached to demographic signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemographicWeights {
    pub age: u32,
    pub gender: u32,
}

impl Default for DemographicWeights {
    fn default() -> Self {
        Self { age: 5, gender: 5 }
    }
}

/// Raw demographics as the extraction service reports them
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDemographics {
    #[serde(default)]
    pub age: Option<Value>,
    #[serde(default, rename = "ageGroup")]
    pub age_group: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

impl RawDemographics {
    pub fn normalize(&self) -> Demographics {
        let age_group = self
            .age_group
            .as_deref()
            .and_then(AgeGroup::from_age_text)
            .or_else(|| match &self.age {
                Some(Value::Number(n)) => n.as_u64().map(|age| AgeGroup::from_age(age as u32)),
                Some(Value::String(s)) => AgeGroup::from_age_text(s),
                _ => None,
            });

        Demographics {
            age_group,
            gender: self.gender.as_deref().and_then(Gender::from_text),
        }
    }
}

/// Structured profile returned by the extraction service.
///
/// Only the fields the pipeline consumes are typed; everything else is kept
/// as-is and echoed back in the run report.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub demographics: RawDemographics,
    #[serde(default)]
    pub interests: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Extraction output: the profile, the interest terms it surfaced, and a
/// per-category query seed
#[derive(Debug, Clone, Default)]
pub struct ExtractedProfile {
    pub profile: Profile,
    pub seed_terms: Vec<String>,
    pub seeds: BTreeMap<Category, Map<String, Value>>,
}
