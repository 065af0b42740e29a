//! Result shaping.
//!
//! Every query runs through one execution path that produces a [`RowSet`]. The
//! caller picks a [`Shaper`] that turns it into the value it wants.

use indexmap::{IndexMap, IndexSet};
use rusqlite::{types::Value as SqlValue, Connection, Params};
use serde::Deserialize;
use std::hash::Hash;
use std::marker::PhantomData;

use crate::de::RowDeserializer;
use crate::entity::{ColumnMap, Entity};
use crate::error::RowError;
use crate::value::{FromValue, Value};

/// One row as column name to value, in select order.
pub type Row = IndexMap<String, Value>;

/// Raw tabular result: column names and every row's cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Index of a column, ignoring ASCII case.
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
    }

    fn into_first_row(self) -> Option<(Vec<String>, Vec<Value>)> {
        let RowSet { columns, rows } = self;
        rows.into_iter().next().map(|row| (columns, row))
    }
}

/// Runs `sql` and collects the full result before any shaping happens.
pub(crate) fn fetch<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare_cached(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = stmt.query(params)?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for index in 0..width {
            cells.push(Value::from(row.get::<_, SqlValue>(index)?));
        }
        collected.push(cells);
    }

    Ok(RowSet {
        columns,
        rows: collected,
    })
}

/// Converts a raw result set into a specific return shape.
pub trait Shaper {
    type Output;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError>;
}

fn to_row(columns: &[String], cells: Vec<Value>) -> Row {
    columns.iter().cloned().zip(cells).collect()
}

/// Field a column fills: the translated name, else a declared field whose name
/// matches ignoring ASCII case, else the column name itself.
fn field_for<'a, T: Entity>(column: &'a str, translation: Option<&ColumnMap>) -> &'a str {
    translation
        .and_then(|map| map.field_for(column))
        .or_else(|| {
            T::fields()
                .iter()
                .find(|field| field.name.eq_ignore_ascii_case(column))
                .map(|field| field.name)
        })
        .unwrap_or(column)
}

fn to_entity<T: Entity>(
    columns: &[String],
    cells: Vec<Value>,
    translation: Option<&ColumnMap>,
) -> Result<T, RowError> {
    // A later column filling the same field overwrites the earlier value.
    let mut fields = IndexMap::with_capacity(columns.len());
    for (column, value) in columns.iter().zip(cells) {
        fields.insert(field_for::<T>(column, translation), value);
    }
    T::deserialize(RowDeserializer::new(fields)).map_err(|source| RowError::Entity {
        entity: std::any::type_name::<T>(),
        source,
    })
}

fn first_cell(cells: Vec<Value>) -> Value {
    cells.into_iter().next().unwrap_or(Value::Null)
}

/// First row as an entity.
pub struct EntityShaper<'a, T> {
    translation: Option<&'a ColumnMap>,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> EntityShaper<'a, T> {
    pub fn new(translation: Option<&'a ColumnMap>) -> Self {
        Self {
            translation,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Shaper for EntityShaper<'_, T> {
    type Output = Option<T>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        rows.into_first_row()
            .map(|(columns, cells)| to_entity(&columns, cells, self.translation))
            .transpose()
    }
}

/// Every row as an entity.
pub struct EntityListShaper<'a, T> {
    translation: Option<&'a ColumnMap>,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, T: Entity> EntityListShaper<'a, T> {
    pub fn new(translation: Option<&'a ColumnMap>) -> Self {
        Self {
            translation,
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Shaper for EntityListShaper<'_, T> {
    type Output = Vec<T>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        let RowSet { columns, rows } = rows;
        rows.into_iter()
            .map(|cells| to_entity(&columns, cells, self.translation))
            .collect()
    }
}

/// Entities keyed by their first column. Columns are used as field names as-is.
pub struct EntityMapShaper<K, T> {
    _shape: PhantomData<fn() -> (K, T)>,
}

impl<K, T> Default for EntityMapShaper<K, T> {
    fn default() -> Self {
        Self {
            _shape: PhantomData,
        }
    }
}

impl<K: FromValue + Eq + Hash, T: Entity> Shaper for EntityMapShaper<K, T> {
    type Output = IndexMap<K, T>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        let RowSet { columns, rows } = rows;
        let mut map = IndexMap::with_capacity(rows.len());
        for cells in rows {
            let key = K::from_value(cells.first().cloned().unwrap_or(Value::Null))?;
            map.insert(key, to_entity(&columns, cells, None)?);
        }
        Ok(map)
    }
}

/// First row as its raw cells.
pub struct ArrayShaper;

impl Shaper for ArrayShaper {
    type Output = Option<Vec<Value>>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        Ok(rows.rows.into_iter().next())
    }
}

/// Every row as its raw cells.
pub struct ArrayListShaper;

impl Shaper for ArrayListShaper {
    type Output = Vec<Vec<Value>>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        Ok(rows.rows)
    }
}

/// First row as a column map.
pub struct MapShaper;

impl Shaper for MapShaper {
    type Output = Option<Row>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        Ok(rows
            .into_first_row()
            .map(|(columns, cells)| to_row(&columns, cells)))
    }
}

/// Every row as a column map.
pub struct MapListShaper;

impl Shaper for MapListShaper {
    type Output = Vec<Row>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        let RowSet { columns, rows } = rows;
        Ok(rows
            .into_iter()
            .map(|cells| to_row(&columns, cells))
            .collect())
    }
}

/// First column of the first row.
pub struct ScalarShaper<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> Default for ScalarShaper<T> {
    fn default() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T: FromValue> Shaper for ScalarShaper<T> {
    type Output = Option<T>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        rows.rows
            .into_iter()
            .next()
            .map(|cells| T::from_value(first_cell(cells)))
            .transpose()
    }
}

/// First column of every row.
pub struct ColumnListShaper<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> Default for ColumnListShaper<T> {
    fn default() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T: FromValue> Shaper for ColumnListShaper<T> {
    type Output = Vec<T>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        rows.rows
            .into_iter()
            .map(|cells| T::from_value(first_cell(cells)))
            .collect()
    }
}

/// First column of every row, duplicates dropped, first occurrence kept.
pub struct ColumnSetShaper<T> {
    _value: PhantomData<fn() -> T>,
}

impl<T> Default for ColumnSetShaper<T> {
    fn default() -> Self {
        Self {
            _value: PhantomData,
        }
    }
}

impl<T: FromValue + Eq + Hash> Shaper for ColumnSetShaper<T> {
    type Output = IndexSet<T>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        let list = ColumnListShaper::<T>::default().shape(rows)?;
        Ok(list.into_iter().collect())
    }
}

/// Full rows keyed by the value of a named column. A later row with the same
/// key replaces the earlier one in place.
pub struct KeyedShaper<'a, K> {
    column: &'a str,
    _key: PhantomData<fn() -> K>,
}

impl<'a, K> KeyedShaper<'a, K> {
    pub fn new(column: &'a str) -> Self {
        Self {
            column,
            _key: PhantomData,
        }
    }
}

impl<K: FromValue + Eq + Hash> Shaper for KeyedShaper<'_, K> {
    type Output = IndexMap<K, Row>;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        let index = rows
            .position(self.column)
            .ok_or_else(|| RowError::MissingColumn(self.column.to_string()))?;
        let RowSet { columns, rows } = rows;
        let mut map = IndexMap::with_capacity(rows.len());
        for cells in rows {
            let key = K::from_value(cells.get(index).cloned().unwrap_or(Value::Null))?;
            map.insert(key, to_row(&columns, cells));
        }
        Ok(map)
    }
}

/// Row count from a `count(*)` projection; zero when no row comes back.
pub struct CountShaper;

impl Shaper for CountShaper {
    type Output = u64;

    fn shape(self, rows: RowSet) -> Result<Self::Output, RowError> {
        let index = rows.position("count(*)").unwrap_or(0);
        match rows.rows.into_iter().next() {
            Some(cells) => u64::from_value(cells.into_iter().nth(index).unwrap_or(Value::Null)),
            None => Ok(0),
        }
    }
}
