//! Searchable domain records and the projections stored alongside them.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SearchError};
use crate::types::{DocId, Document, HouseholdId, IndexName, SearchHit, HOUSEHOLD_FIELD};

/// Small projection of a record, rebuilt from the fields an index returns
/// with each hit.
pub trait SearchSubset: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// ID of the record this projection was taken from.
    fn id(&self) -> DocId;
}

/// Decode a hit into `S`. The hit's ID is injected as `id`.
pub fn subset_from_hit<S: SearchSubset>(hit: &SearchHit) -> Result<S> {
    let mut fields = hit.fields.clone();
    fields.insert("id".to_string(), Value::String(hit.id.to_string()));
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| SearchError::Decode(format!("hit {}: {}", hit.id, e)))
}

/// A domain record kept in one search index.
pub trait Searchable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Index the record's projection lives in.
    const INDEX: IndexName;
    /// Event topic prefix; events are published as `{TOPIC}_created` and so on.
    const TOPIC: &'static str;

    type Subset: SearchSubset;

    fn id(&self) -> DocId;

    fn household(&self) -> Option<HouseholdId>;

    /// Projection pushed into the index.
    fn to_document(&self) -> Document;

    fn subset(&self) -> Self::Subset;

    /// Case-insensitive match used when the primary store answers a search
    /// itself: every whitespace-separated term must occur in some text field.
    fn matches(&self, query: &str) -> bool {
        let doc = self.to_document();
        let haystack: Vec<String> = doc
            .fields
            .iter()
            .filter(|(k, _)| k.as_str() != HOUSEHOLD_FIELD)
            .filter_map(|(_, v)| v.as_str())
            .map(str::to_lowercase)
            .collect();
        let mut terms = query.split_whitespace().map(str::to_lowercase).peekable();
        if terms.peek().is_none() {
            return false;
        }
        terms.all(|t| haystack.iter().any(|h| h.contains(&t)))
    }
}

// ── valid ingredients ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidIngredient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub plural_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub warning: String,
    #[serde(default)]
    pub icon_path: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub shopping_suggestions: String,
    #[serde(default)]
    pub storage_instructions: String,
    #[serde(default)]
    pub contains_dairy: bool,
    #[serde(default)]
    pub is_liquid: bool,
    #[serde(default)]
    pub animal_flesh: bool,
    #[serde(default)]
    pub belongs_to_household: Option<HouseholdId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidIngredientSearchSubset {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub description: String,
    pub shopping_suggestions: String,
}

impl SearchSubset for ValidIngredientSearchSubset {
    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }
}

impl Searchable for ValidIngredient {
    const INDEX: IndexName = IndexName::VALID_INGREDIENTS;
    const TOPIC: &'static str = "valid_ingredient";
    type Subset = ValidIngredientSearchSubset;

    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }

    fn household(&self) -> Option<HouseholdId> {
        self.belongs_to_household
    }

    fn to_document(&self) -> Document {
        Document::new(self.id())
            .with("name", self.name.as_str())
            .with("pluralName", self.plural_name.as_str())
            .with("description", self.description.as_str())
            .with("warning", self.warning.as_str())
            .with("iconPath", self.icon_path.as_str())
            .with("shoppingSuggestions", self.shopping_suggestions.as_str())
            .with(HOUSEHOLD_FIELD, self.belongs_to_household)
    }

    fn subset(&self) -> ValidIngredientSearchSubset {
        ValidIngredientSearchSubset {
            id: self.id.clone(),
            name: self.name.clone(),
            plural_name: self.plural_name.clone(),
            description: self.description.clone(),
            shopping_suggestions: self.shopping_suggestions.clone(),
        }
    }
}

// ── valid preparations ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidPreparation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub past_tense: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon_path: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub yields_nothing: bool,
    #[serde(default)]
    pub belongs_to_household: Option<HouseholdId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidPreparationSearchSubset {
    pub id: String,
    pub name: String,
    pub past_tense: String,
    pub description: String,
}

impl SearchSubset for ValidPreparationSearchSubset {
    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }
}

impl Searchable for ValidPreparation {
    const INDEX: IndexName = IndexName::VALID_PREPARATIONS;
    const TOPIC: &'static str = "valid_preparation";
    type Subset = ValidPreparationSearchSubset;

    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }

    fn household(&self) -> Option<HouseholdId> {
        self.belongs_to_household
    }

    fn to_document(&self) -> Document {
        Document::new(self.id())
            .with("name", self.name.as_str())
            .with("pastTense", self.past_tense.as_str())
            .with("description", self.description.as_str())
            .with("iconPath", self.icon_path.as_str())
            .with(HOUSEHOLD_FIELD, self.belongs_to_household)
    }

    fn subset(&self) -> ValidPreparationSearchSubset {
        ValidPreparationSearchSubset {
            id: self.id.clone(),
            name: self.name.clone(),
            past_tense: self.past_tense.clone(),
            description: self.description.clone(),
        }
    }
}

// ── valid instruments ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidInstrument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub plural_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon_path: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub usable_for_storage: bool,
    #[serde(default)]
    pub belongs_to_household: Option<HouseholdId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidInstrumentSearchSubset {
    pub id: String,
    pub name: String,
    pub plural_name: String,
    pub description: String,
}

impl SearchSubset for ValidInstrumentSearchSubset {
    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }
}

impl Searchable for ValidInstrument {
    const INDEX: IndexName = IndexName::VALID_INSTRUMENTS;
    const TOPIC: &'static str = "valid_instrument";
    type Subset = ValidInstrumentSearchSubset;

    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }

    fn household(&self) -> Option<HouseholdId> {
        self.belongs_to_household
    }

    fn to_document(&self) -> Document {
        Document::new(self.id())
            .with("name", self.name.as_str())
            .with("pluralName", self.plural_name.as_str())
            .with("description", self.description.as_str())
            .with("iconPath", self.icon_path.as_str())
            .with(HOUSEHOLD_FIELD, self.belongs_to_household)
    }

    fn subset(&self) -> ValidInstrumentSearchSubset {
        ValidInstrumentSearchSubset {
            id: self.id.clone(),
            name: self.name.clone(),
            plural_name: self.plural_name.clone(),
            description: self.description.clone(),
        }
    }
}

// ── recipes ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub min_estimated_portions: f32,
    #[serde(default)]
    pub created_by_user: String,
    #[serde(default)]
    pub belongs_to_household: Option<HouseholdId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipeSearchSubset {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
}

impl SearchSubset for RecipeSearchSubset {
    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }
}

impl Searchable for Recipe {
    const INDEX: IndexName = IndexName::RECIPES;
    const TOPIC: &'static str = "recipe";
    type Subset = RecipeSearchSubset;

    fn id(&self) -> DocId {
        DocId::new(self.id.clone())
    }

    fn household(&self) -> Option<HouseholdId> {
        self.belongs_to_household
    }

    fn to_document(&self) -> Document {
        Document::new(self.id())
            .with("name", self.name.as_str())
            .with("slug", self.slug.as_str())
            .with("description", self.description.as_str())
            .with("source", self.source.as_str())
            .with(HOUSEHOLD_FIELD, self.belongs_to_household)
    }

    fn subset(&self) -> RecipeSearchSubset {
        RecipeSearchSubset {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::ingredient;
    use super::*;
    use crate::index::mapping::FieldMapping;
    use serde_json::json;

    #[test]
    fn projection_carries_household_and_subset_fields() {
        let mut ing = ingredient("ing-1", "red onion", 7);
        ing.shopping_suggestions = "look for tight skins".into();
        let doc = ing.to_document();
        assert_eq!(doc.id.as_str(), "ing-1");
        assert_eq!(doc.household(), Some(7));
        assert_eq!(doc.fields["shoppingSuggestions"], json!("look for tight skins"));
        FieldMapping::for_index(&ValidIngredient::INDEX)
            .unwrap()
            .check(&doc)
            .unwrap();
    }

    #[test]
    fn projection_without_household_omits_field() {
        let mut ing = ingredient("ing-2", "salt", 1);
        ing.belongs_to_household = None;
        assert!(!ing.to_document().fields.contains_key(HOUSEHOLD_FIELD));
    }

    #[test]
    fn subset_rebuilt_from_hit_fields() {
        let ing = ingredient("ing-3", "leek", 2);
        let doc = ing.to_document();
        let hit = SearchHit {
            id: doc.id.clone(),
            fields: doc.fields,
        };
        let subset: ValidIngredientSearchSubset = subset_from_hit(&hit).unwrap();
        assert_eq!(subset, ing.subset());
        assert_eq!(SearchSubset::id(&subset), DocId::new("ing-3"));
    }

    #[test]
    fn subset_decode_failure_is_reported() {
        let mut fields = crate::types::Fields::new();
        fields.insert("name".into(), json!(12));
        let hit = SearchHit {
            id: DocId::new("r1"),
            fields,
        };
        assert!(matches!(
            subset_from_hit::<RecipeSearchSubset>(&hit),
            Err(SearchError::Decode(_))
        ));
    }

    #[test]
    fn matches_requires_every_term() {
        let ing = ingredient("ing-4", "Red Onion", 1);
        assert!(ing.matches("onion"));
        assert!(ing.matches("red ONION"));
        assert!(!ing.matches("onion garlic"));
        assert!(!ing.matches("   "));
    }

    #[test]
    fn recipe_round_trips_camel_case_json() {
        let raw = json!({
            "id": "r9",
            "name": "gazpacho",
            "source": "grandma",
            "belongsToHousehold": 4,
            "createdAt": "2024-05-01T12:00:00Z"
        });
        let recipe: Recipe = serde_json::from_value(raw).unwrap();
        assert_eq!(recipe.household(), Some(4));
        assert_eq!(recipe.to_document().fields["source"], json!("grandma"));
        assert_eq!(Recipe::TOPIC, "recipe");
    }
}
