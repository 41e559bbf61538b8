//! Category catalog: the fixed main/subcategory taxonomy items are classified into.
//!
//! The taxonomy comes from a JSON object mapping each main category to its ordered
//! list of subcategories. Label-like main categories are dropped on load and a
//! synthetic catch-all main category for non-product receipt lines is added.
//! [`Catalog::render`] produces the text block embedded into every prompt; it must
//! stay byte-identical between runs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::data::{CatalogError, ResolutionError, ResolvedItem};

/// Taxonomy shipped with the crate.
pub const DEFAULT_TAXONOMY: &str = include_str!("../data/categories_rewe.json");

/// Main categories that are labels rather than product kinds and overlap real categories.
pub const EXCLUDED_MAIN_CATEGORIES: [&str; 3] = ["Vegane Vielfalt", "International", "Regional"];

/// Main category for receipt lines that are not products.
pub const CATCH_ALL_MAIN: &str = "Sonstige Positionen";

pub const CATCH_ALL_SUBCATEGORIES: [&str; 3] =
    ["Pfand & Leergut", "Rabatt & Ermäßigung", "Kategorie nicht erkannt"];

/// Subcategory used when an item cannot be classified.
pub const UNRECOGNIZED_SUBCATEGORY: &str = "Kategorie nicht erkannt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainCategory {
    pub name: String,
    pub subcategories: Vec<String>,
}

/// Immutable, ordered main -> subcategory mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    mains: Vec<MainCategory>,
}

/// Loads the built-in taxonomy.
pub fn load_catalog() -> Result<Catalog, CatalogError> {
    Catalog::from_json_str(DEFAULT_TAXONOMY)
}

/// Where a pipeline gets its catalog from on each run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CatalogSource {
    #[default]
    Builtin,
    File(PathBuf),
    /// An already loaded catalog, handed out as is
    Loaded(Catalog),
}

impl CatalogSource {
    pub fn load(&self) -> Result<Catalog, CatalogError> {
        match self {
            CatalogSource::Builtin => load_catalog(),
            CatalogSource::File(path) => Catalog::from_path(path),
            CatalogSource::Loaded(catalog) => Ok(catalog.clone()),
        }
    }
}

impl From<Catalog> for CatalogSource {
    fn from(catalog: Catalog) -> Self {
        CatalogSource::Loaded(catalog)
    }
}

impl Catalog {
    /// Loads a taxonomy file, applying the same exclusions and catch-all category.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let value: Value = serde_json::from_str(raw)?;
        let object = value.as_object().ok_or(CatalogError::NotAnObject)?;

        let mut mains = Vec::with_capacity(object.len() + 1);
        for (name, subs) in object {
            if EXCLUDED_MAIN_CATEGORIES.contains(&name.as_str()) {
                debug!(category = %name, "Excluding label-like main category");
                continue;
            }
            let subcategories = subs
                .as_array()
                .ok_or_else(|| CatalogError::InvalidSubcategories(name.clone()))?
                .iter()
                .map(|sub| {
                    sub.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| CatalogError::InvalidSubcategories(name.clone()))
                })
                .collect::<Result<Vec<_>, _>>()?;
            mains.push(MainCategory {
                name: name.clone(),
                subcategories,
            });
        }

        let catch_all = MainCategory {
            name: CATCH_ALL_MAIN.to_string(),
            subcategories: CATCH_ALL_SUBCATEGORIES.iter().map(|s| s.to_string()).collect(),
        };
        match mains.iter_mut().find(|main| main.name == CATCH_ALL_MAIN) {
            Some(existing) => *existing = catch_all,
            None => mains.push(catch_all),
        }

        let catalog = Self { mains };
        catalog.check_unique_subcategories()?;
        Ok(catalog)
    }

    fn check_unique_subcategories(&self) -> Result<(), CatalogError> {
        let mut owner: HashMap<&str, &str> = HashMap::new();
        for main in &self.mains {
            for sub in &main.subcategories {
                if let Some(first) = owner.insert(sub.as_str(), main.name.as_str()) {
                    return Err(CatalogError::DuplicateSubcategory {
                        sub: sub.clone(),
                        first: first.to_string(),
                        second: main.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn main_categories(&self) -> &[MainCategory] {
        &self.mains
    }

    pub fn subcategories(&self, main: &str) -> Option<&[String]> {
        self.mains
            .iter()
            .find(|m| m.name == main)
            .map(|m| m.subcategories.as_slice())
    }

    pub fn contains(&self, main: &str, sub: &str) -> bool {
        self.subcategories(main)
            .map(|subs| subs.iter().any(|s| s == sub))
            .unwrap_or(false)
    }

    /// Rejects a resolved item whose category pair is not part of the catalog.
    pub fn validate(&self, item: &ResolvedItem) -> Result<(), ResolutionError> {
        if self.contains(&item.category_main, &item.category_sub) {
            Ok(())
        } else {
            Err(ResolutionError::UnknownCategory {
                main: item.category_main.clone(),
                sub: item.category_sub.clone(),
            })
        }
    }

    /// Category pair for items the model could not classify.
    pub fn fallback(&self) -> (&'static str, &'static str) {
        (CATCH_ALL_MAIN, UNRECOGNIZED_SUBCATEGORY)
    }

    /// Prompt-ready text: one block per main category, blocks separated by a blank line.
    pub fn render(&self) -> String {
        self.mains
            .iter()
            .map(|main| {
                format!(
                    "# Hauptkategorie\n{}\n## Unterkategorien\n{}\n",
                    main.name,
                    main.subcategories.join("\n")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
