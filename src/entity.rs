//! Entity declarations and the column translation registry.
//!
//! Entities register their own field list through [`Entity::fields`]. At startup
//! [`EntityRegistry::build`] walks every entity an [`EntitySource`] reports and
//! records, per entity, the columns whose names differ from the field they fill.
//! Entities whose columns all match their fields get no entry at all.

use serde::de::DeserializeOwned;
use std::any::TypeId;
use std::collections::HashMap;

use crate::error::{Error, Result};

/// A field of an entity as seen by serde, with an optional column override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub column: Option<&'static str>,
}

impl Field {
    /// A field whose column name is derived from its name.
    pub const fn new(name: &'static str) -> Self {
        Self { name, column: None }
    }

    /// A field stored under an explicit column name.
    pub const fn with_column(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column: Some(column),
        }
    }

    /// The column this field is read from.
    pub fn column_name(&self) -> String {
        match self.column {
            Some(column) => column.to_string(),
            None => camel_to_underscore(self.name),
        }
    }
}

/// A type whose instances correspond to rows of a table.
///
/// Rows are deserialized through serde, so `fields` must list the names serde
/// expects (after any `rename`/`rename_all`).
///
/// ```ignore
/// #[derive(Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct Order {
///     id: i64,
///     created_at: String,
/// }
///
/// impl Entity for Order {
///     fn fields() -> &'static [Field] {
///         const FIELDS: &[Field] = &[Field::new("id"), Field::new("createdAt")];
///         FIELDS
///     }
/// }
/// ```
pub trait Entity: DeserializeOwned + 'static {
    fn fields() -> &'static [Field];
}

/// Converts a camel case identifier into its lower underscore column name.
///
/// `userName` becomes `user_name`. A leading capital is lower-cased without a
/// separator. Only ASCII capitals split words; other characters pass through.
pub fn camel_to_underscore(name: &str) -> String {
    let mut column = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                column.push('_');
            }
            column.push(ch.to_ascii_lowercase());
        } else {
            column.push(ch);
        }
    }
    column
}

/// Static description of one entity type, produced by an [`EntitySource`].
#[derive(Debug, Clone, Copy)]
pub struct EntityInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub fields: &'static [Field],
}

impl EntityInfo {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            fields: T::fields(),
        }
    }
}

/// Enumerates the entity types known to the application.
pub trait EntitySource {
    fn entities(&self) -> Result<Vec<EntityInfo>>;
}

/// In-process entity list built by explicit registration.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: Vec<EntityInfo>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity. Registering the same type twice keeps the first entry.
    pub fn register<T: Entity>(mut self) -> Self {
        let info = EntityInfo::of::<T>();
        if !self.entities.iter().any(|e| e.type_id == info.type_id) {
            self.entities.push(info);
        }
        self
    }
}

impl EntitySource for EntityCatalog {
    fn entities(&self) -> Result<Vec<EntityInfo>> {
        Ok(self.entities.clone())
    }
}

/// Column name to field name translation table for one entity.
///
/// Keys are stored lower-cased; lookups ignore ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    columns: HashMap<String, &'static str>,
}

impl ColumnMap {
    pub fn field_for(&self, column: &str) -> Option<&'static str> {
        self.columns.get(&column.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.columns.iter().map(|(column, field)| (column.as_str(), *field))
    }

    /// Only columns that differ from their field are recorded, and no two of
    /// those may share a column name.
    fn from_fields(info: &EntityInfo) -> Result<Self> {
        let mut columns = HashMap::new();
        for field in info.fields {
            if field.column.is_some_and(|c| c.trim().is_empty()) {
                return Err(Error::Initialization(format!(
                    "`{}.{}` declares an empty column name",
                    info.type_name, field.name
                )));
            }
            let column = field.column_name();
            if column == field.name {
                continue;
            }
            if let Some(previous) = columns.insert(column.to_ascii_lowercase(), field.name) {
                return Err(Error::Initialization(format!(
                    "`{}` maps column `{}` to both `{}` and `{}`",
                    info.type_name, column, previous, field.name
                )));
            }
        }
        Ok(Self { columns })
    }
}

/// Per-entity column translation tables, built once and read-only afterwards.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: HashMap<TypeId, ColumnMap>,
}

impl EntityRegistry {
    /// Builds the registry from every entity the source reports.
    ///
    /// Any failure aborts the whole build; no partially filled registry escapes.
    pub fn build(source: &dyn EntitySource) -> Result<Self> {
        let infos = source.entities().map_err(|err| match err {
            Error::Initialization(_) => err,
            other => Error::Initialization(other.to_string()),
        })?;

        let mut entities = HashMap::new();
        for info in &infos {
            let columns = ColumnMap::from_fields(info)?;
            if !columns.is_empty() {
                log::debug!(
                    "entity `{}` translates {} column(s)",
                    info.type_name,
                    columns.len()
                );
                entities.insert(info.type_id, columns);
            }
        }
        log::debug!(
            "entity registry built: {} entities scanned, {} with column translations",
            infos.len(),
            entities.len()
        );
        Ok(Self { entities })
    }

    pub fn get<T: 'static>(&self) -> Option<&ColumnMap> {
        self.get_by_type(TypeId::of::<T>())
    }

    pub fn get_by_type(&self, type_id: TypeId) -> Option<&ColumnMap> {
        self.entities.get(&type_id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_underscore_columns() {
        assert_eq!(camel_to_underscore("userName"), "user_name");
        assert_eq!(camel_to_underscore("createdAtUtc"), "created_at_utc");
        assert_eq!(camel_to_underscore("id"), "id");
        assert_eq!(camel_to_underscore("Name"), "name");
    }

    #[test]
    fn derivation_is_idempotent() {
        for name in ["userName", "orderNo", "aBC", "plain"] {
            let once = camel_to_underscore(name);
            assert_eq!(camel_to_underscore(&once), once);
        }
    }

    #[test]
    fn only_ascii_capitals_split_words() {
        assert_eq!(camel_to_underscore("caféÉclair"), "caféÉclair");
        assert_eq!(camel_to_underscore("straßeNr"), "straße_nr");
    }

    #[test]
    fn override_wins_over_derivation() {
        let field = Field::with_column("orderNo", "order_number");
        assert_eq!(field.column_name(), "order_number");
        assert_eq!(Field::new("orderNo").column_name(), "order_no");
    }
}
