//! Identifier translation between the external engine and the host.
//!
//! The external engine addresses entities by free-form string ids while the
//! host uses UUIDs. The table is built once at startup, partitioned by data
//! category, and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Data category an identifier belongs to.
///
/// The same external id may appear in several categories, e.g. a load that
/// receives primary input and also reports participant results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Numeric primary values fed into host participants
    PrimaryInput,
    /// Flexibility requests, options and set-points
    FlexInput,
    /// Node voltages produced by the host's power flow
    GridResult,
    /// Active/reactive power of host participants
    ParticipantResult,
    /// Flexibility bands computed by host energy managers
    FlexOptionResult,
}

impl DataCategory {
    /// Result categories in the order output receivers are resolved.
    pub const RESULTS: [DataCategory; 3] = [
        DataCategory::GridResult,
        DataCategory::ParticipantResult,
        DataCategory::FlexOptionResult,
    ];

    /// Returns string representation used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::PrimaryInput => "primary_input",
            DataCategory::FlexInput => "flex_input",
            DataCategory::GridResult => "grid_result",
            DataCategory::ParticipantResult => "participant_result",
            DataCategory::FlexOptionResult => "flex_option_result",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while building or querying the mapping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("Duplicate external identifier '{identifier}' in category {category}")]
    DuplicateIdentifier {
        category: DataCategory,
        identifier: String,
    },

    #[error("Internal id {id} mapped twice in category {category}")]
    DuplicateInternalId { category: DataCategory, id: Uuid },

    #[error("No mapping for '{identifier}' in category {category}")]
    MissingMapping {
        category: DataCategory,
        identifier: String,
    },
}

/// One row of the static mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub external_id: String,
    pub internal_id: Uuid,
    pub category: DataCategory,
}

impl MappingEntry {
    pub fn new(external_id: impl Into<String>, internal_id: Uuid, category: DataCategory) -> Self {
        Self {
            external_id: external_id.into(),
            internal_id,
            category,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct CategoryTable {
    to_internal: HashMap<String, Uuid>,
    to_external: HashMap<Uuid, String>,
}

/// Immutable bijection between external and internal identifiers, per category.
#[derive(Debug, Clone, Default)]
pub struct EntityMapping {
    tables: HashMap<DataCategory, CategoryTable>,
}

impl EntityMapping {
    /// Builds the mapping from a table of entries.
    ///
    /// # Errors
    ///
    /// - `MappingError::DuplicateIdentifier` - External id repeated within one category
    /// - `MappingError::DuplicateInternalId` - Internal id repeated within one category
    pub fn from_entries<I>(entries: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = MappingEntry>,
    {
        let mut tables: HashMap<DataCategory, CategoryTable> = HashMap::new();

        for entry in entries {
            let table = tables.entry(entry.category).or_default();

            if table.to_internal.contains_key(&entry.external_id) {
                return Err(MappingError::DuplicateIdentifier {
                    category: entry.category,
                    identifier: entry.external_id,
                });
            }
            if table.to_external.contains_key(&entry.internal_id) {
                return Err(MappingError::DuplicateInternalId {
                    category: entry.category,
                    id: entry.internal_id,
                });
            }

            table
                .to_internal
                .insert(entry.external_id.clone(), entry.internal_id);
            table
                .to_external
                .insert(entry.internal_id, entry.external_id);
        }

        Ok(Self { tables })
    }

    /// Looks up the internal id for an external id.
    pub fn internal_id(&self, category: DataCategory, external_id: &str) -> Option<Uuid> {
        self.tables
            .get(&category)
            .and_then(|table| table.to_internal.get(external_id))
            .copied()
    }

    /// Looks up the external id for an internal id.
    pub fn external_id(&self, category: DataCategory, internal_id: &Uuid) -> Option<&str> {
        self.tables
            .get(&category)
            .and_then(|table| table.to_external.get(internal_id))
            .map(String::as_str)
    }

    /// Looks up the internal id, treating absence as an error.
    ///
    /// # Errors
    ///
    /// - `MappingError::MissingMapping` - Identifier unknown in this category
    pub fn require_internal_id(
        &self,
        category: DataCategory,
        external_id: &str,
    ) -> Result<Uuid, MappingError> {
        self.internal_id(category, external_id)
            .ok_or_else(|| MappingError::MissingMapping {
                category,
                identifier: external_id.to_string(),
            })
    }

    /// Resolves an output receiver across all result categories.
    pub fn find_result_id(&self, external_id: &str) -> Option<(DataCategory, Uuid)> {
        DataCategory::RESULTS.iter().find_map(|category| {
            self.internal_id(*category, external_id)
                .map(|id| (*category, id))
        })
    }

    /// Returns the external id of an entity in any category.
    ///
    /// Result categories are searched first, then flexibility inputs.
    pub fn any_external_id(&self, internal_id: &Uuid) -> Option<&str> {
        DataCategory::RESULTS
            .iter()
            .chain(std::iter::once(&DataCategory::FlexInput))
            .find_map(|category| self.external_id(*category, internal_id))
    }

    /// Returns number of identifiers in a category.
    pub fn len(&self, category: DataCategory) -> usize {
        self.tables
            .get(&category)
            .map_or(0, |table| table.to_internal.len())
    }

    /// Returns true when no category holds any identifier.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|table| table.to_internal.is_empty())
    }

    /// Iterates the internal ids of one category.
    pub fn internal_ids(&self, category: DataCategory) -> impl Iterator<Item = &Uuid> {
        self.tables
            .get(&category)
            .into_iter()
            .flat_map(|table| table.to_external.keys())
    }
}
