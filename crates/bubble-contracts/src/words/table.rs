use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE: &str = "zh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub name: String,
    #[serde(default)]
    pub title_case: bool,
}

/// A curated target meaning with its accepted surface forms per language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub hint: String,
    pub words: IndexMap<String, Vec<String>>,
}

impl Concept {
    pub fn synonyms(&self, language: &str) -> &[String] {
        self.words
            .get(language)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Immutable word table, loaded once at startup.
///
/// The compiled-in table holds the curated concepts of the drawing game; a
/// JSON file of the same shape can replace it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymTable {
    pub languages: IndexMap<String, LanguageSpec>,
    #[serde(default = "default_language_code")]
    pub default_language: String,
    pub concepts: Vec<Concept>,
}

impl SynonymTable {
    pub fn builtin() -> Self {
        default_table()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let table: SynonymTable =
            serde_json::from_str(raw).context("synonym table is not valid JSON")?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("invalid word table {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.languages.contains_key(&self.default_language) {
            bail!(
                "default language '{}' is not declared",
                self.default_language
            );
        }
        let mut ids = HashSet::new();
        for concept in &self.concepts {
            if concept.id.trim().is_empty() {
                bail!("concept with empty id");
            }
            if !ids.insert(concept.id.as_str()) {
                bail!("concept '{}' declared twice", concept.id);
            }
            if concept.hint.trim().is_empty() {
                bail!("concept '{}' has no hint", concept.id);
            }
            for (language, forms) in &concept.words {
                if !self.languages.contains_key(language) {
                    bail!(
                        "concept '{}' uses undeclared language '{language}'",
                        concept.id
                    );
                }
                if forms.iter().any(|form| form.trim().is_empty()) {
                    bail!(
                        "concept '{}' has an empty surface form for '{language}'",
                        concept.id
                    );
                }
            }
        }
        Ok(())
    }

    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.iter().find(|concept| concept.id == id)
    }

    pub fn language(&self, code: &str) -> Option<&LanguageSpec> {
        self.languages.get(code)
    }
}

fn default_language_code() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_table() -> SynonymTable {
    let mut languages = IndexMap::new();
    languages.insert(
        "zh".to_string(),
        LanguageSpec {
            name: "中文".to_string(),
            title_case: false,
        },
    );
    languages.insert(
        "en".to_string(),
        LanguageSpec {
            name: "English".to_string(),
            title_case: true,
        },
    );

    let mut concepts = Vec::new();
    let mut insert = |id: &str, hint: &str, zh: &[&str], en: &[&str]| {
        let mut words = IndexMap::new();
        words.insert(
            "zh".to_string(),
            zh.iter().map(|item| (*item).to_string()).collect(),
        );
        words.insert(
            "en".to_string(),
            en.iter().map(|item| (*item).to_string()).collect(),
        );
        concepts.push(Concept {
            id: id.to_string(),
            hint: hint.to_string(),
            words,
        });
    };

    insert("sun", "某个天体", &["太阳"], &["Sun"]);
    insert("moon", "某个天体", &["月亮", "月球"], &["Moon"]);
    insert("cloud", "某种气象", &["云", "云朵"], &["Cloud", "Clouds"]);
    insert("apple", "某种水果", &["苹果"], &["Apple"]);
    insert(
        "orange",
        "某种水果",
        &["橙子", "橘子", "桔子"],
        &["Orange", "Tangerine", "Mandarin"],
    );
    insert("banana", "某种水果", &["香蕉"], &["Banana"]);
    insert("jellyfish", "某种水生生物", &["水母"], &["Jellyfish"]);
    insert("tree", "某类植物", &["树"], &["Tree"]);
    insert("elephant", "某种大型动物", &["大象"], &["Elephant"]);
    insert("mushroom", "某种生物", &["蘑菇"], &["Mushroom"]);
    insert("peanut", "某种坚果", &["花生"], &["Peanut", "Peanuts"]);
    insert("fish", "某种水生动物", &["鱼"], &["Fish"]);
    insert("car", "某种交通工具", &["汽车"], &["Car"]);

    SynonymTable {
        languages,
        default_language: DEFAULT_LANGUAGE.to_string(),
        concepts,
    }
}

#[cfg(test)]
mod tests {
    use super::{SynonymTable, DEFAULT_LANGUAGE};

    #[test]
    fn builtin_table_is_valid() -> anyhow::Result<()> {
        let table = SynonymTable::builtin();
        table.validate()?;
        assert_eq!(table.default_language, DEFAULT_LANGUAGE);
        assert_eq!(table.concepts.len(), 13);
        let moon = table.concept("moon").map(|concept| concept.synonyms("zh"));
        assert_eq!(
            moon,
            Some(&["月亮".to_string(), "月球".to_string()][..])
        );
        assert!(table.language("en").map(|lang| lang.title_case) == Some(true));
        Ok(())
    }

    #[test]
    fn json_table_round_trips_through_loader() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("words.json");
        std::fs::write(
            &path,
            r#"{
                "languages": {"en": {"name": "English", "title_case": true}},
                "default_language": "en",
                "concepts": [
                    {"id": "kite", "hint": "a toy", "words": {"en": ["Kite", "Kites"]}}
                ]
            }"#,
        )?;
        let table = SynonymTable::load(&path)?;
        assert_eq!(table.default_language, "en");
        assert_eq!(
            table.concept("kite").map(|concept| concept.synonyms("en").len()),
            Some(2)
        );
        assert!(table
            .concept("kite")
            .map(|concept| concept.synonyms("zh").is_empty())
            .unwrap_or(false));
        Ok(())
    }

    #[test]
    fn loader_rejects_undeclared_language() {
        let err = SynonymTable::from_json_str(
            r#"{
                "languages": {"zh": {"name": "中文"}},
                "concepts": [{"id": "kite", "hint": "玩具", "words": {"fr": ["Cerf-volant"]}}]
            }"#,
        )
        .err()
        .map(|err| err.to_string())
        .unwrap_or_default();
        assert!(err.contains("undeclared language 'fr'"), "{err}");
    }

    #[test]
    fn loader_rejects_missing_hint_and_duplicate_ids() {
        let missing_hint = SynonymTable::from_json_str(
            r#"{
                "languages": {"zh": {"name": "中文"}},
                "concepts": [{"id": "kite", "hint": " ", "words": {"zh": ["风筝"]}}]
            }"#,
        );
        assert!(missing_hint.is_err());

        let duplicate = SynonymTable::from_json_str(
            r#"{
                "languages": {"zh": {"name": "中文"}},
                "concepts": [
                    {"id": "kite", "hint": "玩具", "words": {"zh": ["风筝"]}},
                    {"id": "kite", "hint": "玩具", "words": {"zh": ["纸鸢"]}}
                ]
            }"#,
        );
        assert!(duplicate.is_err());
    }
}
