use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Result};

use super::table::{LanguageSpec, SynonymTable};

/// A concept scoped to one language: what a surface form resolves to, and
/// what a player is asked to draw.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub concept: String,
    pub language: String,
}

impl Target {
    pub fn new(concept: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            concept: concept.into(),
            language: language.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWord(pub String);

impl fmt::Display for UnknownWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown word '{}'", self.0)
    }
}

impl std::error::Error for UnknownWord {}

/// Read-only lookup from every surface form to its owning concept and
/// language. Built once from a validated [`SynonymTable`].
#[derive(Debug, Clone)]
pub struct SurfaceIndex {
    table: SynonymTable,
    forms: HashMap<String, Target>,
}

impl SurfaceIndex {
    pub fn build(table: SynonymTable) -> Result<Self> {
        table.validate()?;
        let mut forms: HashMap<String, Target> = HashMap::new();
        for concept in &table.concepts {
            for (language, surfaces) in &concept.words {
                for surface in surfaces {
                    let target = Target::new(concept.id.as_str(), language.as_str());
                    if let Some(existing) = forms.get(surface) {
                        if existing != &target {
                            bail!(
                                "surface form '{surface}' maps to both {}/{} and {}/{}",
                                existing.concept,
                                existing.language,
                                target.concept,
                                target.language
                            );
                        }
                        continue;
                    }
                    forms.insert(surface.clone(), target);
                }
            }
        }
        Ok(Self { table, forms })
    }

    pub fn builtin() -> Result<Self> {
        Self::build(SynonymTable::builtin())
    }

    pub fn resolve(&self, surface: &str) -> Result<&Target, UnknownWord> {
        self.forms
            .get(surface)
            .ok_or_else(|| UnknownWord(surface.to_string()))
    }

    pub fn synonyms_of(&self, concept: &str, language: &str) -> &[String] {
        self.table
            .concept(concept)
            .map(|entry| entry.synonyms(language))
            .unwrap_or_default()
    }

    pub fn hint_of(&self, concept: &str) -> Option<&str> {
        self.table.concept(concept).map(|entry| entry.hint.as_str())
    }

    pub fn language(&self, code: &str) -> Option<&LanguageSpec> {
        self.table.language(code)
    }

    pub fn default_language(&self) -> &str {
        &self.table.default_language
    }

    pub fn table(&self) -> &SynonymTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{SurfaceIndex, Target, UnknownWord};
    use crate::words::table::{Concept, LanguageSpec, SynonymTable};

    #[test]
    fn every_synonym_resolves_to_its_concept_and_language() -> anyhow::Result<()> {
        let index = SurfaceIndex::builtin()?;
        for concept in &index.table().concepts {
            for (language, forms) in &concept.words {
                for form in forms {
                    assert_eq!(
                        index.resolve(form),
                        Ok(&Target::new(concept.id.as_str(), language.as_str())),
                        "{form}"
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn unknown_surface_form_is_not_found() -> anyhow::Result<()> {
        let index = SurfaceIndex::builtin()?;
        assert_eq!(
            index.resolve("Spaceship"),
            Err(UnknownWord("Spaceship".to_string()))
        );
        assert_eq!(
            index.resolve("fish").err().map(|err| err.to_string()),
            Some("unknown word 'fish'".to_string())
        );
        Ok(())
    }

    #[test]
    fn synonyms_and_hints_are_looked_up_by_concept() -> anyhow::Result<()> {
        let index = SurfaceIndex::builtin()?;
        assert_eq!(index.synonyms_of("cloud", "en"), ["Cloud", "Clouds"]);
        assert!(index.synonyms_of("cloud", "fr").is_empty());
        assert!(index.synonyms_of("dragon", "en").is_empty());
        assert_eq!(index.hint_of("moon"), Some("某个天体"));
        assert_eq!(index.hint_of("dragon"), None);
        assert_eq!(index.default_language(), "zh");
        Ok(())
    }

    #[test]
    fn cross_concept_collision_is_rejected() {
        let mut languages = IndexMap::new();
        languages.insert(
            "en".to_string(),
            LanguageSpec {
                name: "English".to_string(),
                title_case: true,
            },
        );
        let concept = |id: &str, forms: &[&str]| {
            let mut words = IndexMap::new();
            words.insert(
                "en".to_string(),
                forms.iter().map(|form| (*form).to_string()).collect(),
            );
            Concept {
                id: id.to_string(),
                hint: "something".to_string(),
                words,
            }
        };
        let table = SynonymTable {
            languages,
            default_language: "en".to_string(),
            concepts: vec![
                concept("orange", &["Orange"]),
                concept("colour", &["Orange", "Amber"]),
            ],
        };
        let err = SurfaceIndex::build(table)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("surface form 'Orange'"), "{err}");
    }
}
