//! Typed persistence for [`Model`] types.
//!
//! A [`ModelAdapter`] reads and writes one model type through its
//! [`FieldMap`], builds parameterized statements for its table, and keeps
//! the table's model cache in step with every successful write.
//!
//! Primary key columns are never changed by `update` or `save`; use
//! [`ModelAdapter::change_primary_key`], which evicts the old cache entry
//! before re-caching under the new key.

use sqlweave_core::statement::{Delete, FromClause, Insert, Select, Update, Where};
use sqlweave_core::{
    CacheConfig, CacheKind, ConditionGroup, Conversion, ConverterRegistry, FieldMap, Model,
    Operand, PrimaryKey, Registry, SqlError, SqlValue, Table, column,
};

use crate::cache::{CacheKey, CompositeKeyFn, ModelCache, cache_for, composite_cache_key};
use crate::database::{Database, Row};
use crate::error::{Result, SqliteError};

/// Insert, update, delete and load for one model type.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use sqlweave_core::{CacheConfig, CacheKind, Column, FieldMap, Model, Registry, SqlType, SqlValue, Table};
/// use sqlweave_sqlite::{Database, ModelAdapter};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Tag {
///     id: i64,
///     label: String,
/// }
///
/// impl Model for Tag {
///     const TABLE: &'static str = "Tag";
///
///     fn fields() -> FieldMap<Self> {
///         FieldMap::new()
///             .column("id", |m: &Self| m.id, |m, v| m.id = v)
///             .column("label", |m: &Self| m.label.clone(), |m, v| m.label = v)
///     }
/// }
///
/// let registry = Registry::default()
///     .with_table(
///         Table::new("Tag")
///             .column(Column::new("id", SqlType::Integer).auto_increment())
///             .column(Column::new("label", SqlType::Text))
///             .cache(CacheConfig::enabled(CacheKind::Lru, 10)),
///     )
///     .unwrap();
/// let db = Database::builder(Arc::new(registry)).open_in_memory().unwrap();
///
/// let mut tags = ModelAdapter::<Tag>::new(db.registry()).unwrap();
/// let mut tag = Tag { id: 0, label: "rust".into() };
/// tags.insert(&db, &mut tag).unwrap();
/// assert_eq!(tag.id, 1);
///
/// let loaded = tags.load(&db, &[SqlValue::Integer(1)]).unwrap();
/// assert_eq!(loaded, Some(tag));
/// ```
pub struct ModelAdapter<T: Model> {
    table: Table,
    fields: FieldMap<T>,
    primary_key: PrimaryKey,
    cache: Option<Box<dyn ModelCache<T>>>,
    composite_key: CompositeKeyFn,
}

impl<T: Model> ModelAdapter<T> {
    /// Binds `T` to its registered table, caching only when the table
    /// declares a cache.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::UnknownTable`] if `T::TABLE` is not registered, or
    /// [`SqlError::UnknownColumn`] if a table column has no field mapping.
    pub fn new(registry: &Registry) -> Result<Self> {
        Self::with_default_cache(registry, None)
    }

    /// Binds `T` to its table in `db`. A table that declares no cache uses
    /// the database configuration's cache settings.
    pub fn for_database(db: &Database) -> Result<Self> {
        Self::with_default_cache(db.registry(), Some(db.config().cache))
    }

    fn with_default_cache(registry: &Registry, default: Option<CacheConfig>) -> Result<Self> {
        let table = registry.require_table(T::TABLE)?.clone();
        let primary_key = registry.primary_key(T::TABLE)?;
        let fields = T::fields();
        if let Some(missing) = table.column_names().into_iter().find(|c| !fields.contains(c)) {
            return Err(SqlError::UnknownColumn {
                table: table.name.clone(),
                column: missing.to_string(),
            }
            .into());
        }

        let cache = table
            .cache
            .or(default)
            .filter(|c| c.enabled)
            .map(|mut config| {
                // Registered tables are validated, so only a database-wide
                // default can reach here with a key these caches cannot index.
                if config.kind != CacheKind::Map && !table.has_integer_key() {
                    tracing::warn!(
                        table = %table.name,
                        kind = ?config.kind,
                        "primary key is not a single integer, using a map cache"
                    );
                    config.kind = CacheKind::Map;
                }
                cache_for::<T>(&config)
            });
        Ok(Self {
            table,
            fields,
            primary_key,
            cache,
            composite_key: composite_cache_key,
        })
    }

    /// Replaces the cache built from the table's configuration.
    pub fn with_cache(mut self, cache: Box<dyn ModelCache<T>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    /// Uses a custom function to turn composite key values into a cache key.
    pub fn with_composite_key(mut self, key_fn: CompositeKeyFn) -> Self {
        self.composite_key = key_fn;
        self
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    pub fn cache_len(&self) -> usize {
        self.cache.as_ref().map_or(0, |c| c.len())
    }

    pub fn clear_cache(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }

    /// The cached model for `key`, without touching the database.
    pub fn cached(&mut self, key: &[SqlValue]) -> Result<Option<T>> {
        let cache_key = self.cache_key(key)?;
        match self.cache.as_mut() {
            Some(cache) => cache.get(&cache_key),
            None => Ok(None),
        }
    }

    /// The cache key for a list of primary key values.
    pub fn cache_key(&self, key: &[SqlValue]) -> Result<CacheKey> {
        match key {
            [single] => CacheKey::from_value(single),
            many => (self.composite_key)(many),
        }
    }

    fn key_columns(&self) -> Vec<&str> {
        self.primary_key.columns()
    }

    /// The column's named converter, if it declares one.
    fn conversion<'a>(&self, name: &str, converters: &'a ConverterRegistry) -> Result<Conversion<'a>> {
        match self.table.column_named(name).and_then(|c| c.converter.as_deref()) {
            Some(converter) => Ok(Conversion::named(converters, converter)?),
            None => Ok(Conversion::new(converters)),
        }
    }

    fn read_values<'a>(
        &self,
        model: &T,
        names: impl IntoIterator<Item = &'a str>,
        converters: &ConverterRegistry,
    ) -> Result<Vec<SqlValue>> {
        names
            .into_iter()
            .map(|name| {
                let conversion = self.conversion(name, converters)?;
                Ok(self.fields.get_with(model, name, conversion)?)
            })
            .collect()
    }

    fn write_field(
        &self,
        model: &mut T,
        name: &str,
        value: &SqlValue,
        converters: &ConverterRegistry,
    ) -> Result<()> {
        let conversion = self.conversion(name, converters)?;
        Ok(self.fields.set_with(model, name, value, conversion)?)
    }

    fn key_values(&self, model: &T, converters: &ConverterRegistry) -> Result<Vec<SqlValue>> {
        self.read_values(model, self.key_columns(), converters)
    }

    fn key_group(&self) -> Result<ConditionGroup> {
        Ok(ConditionGroup::new().extend(
            self.key_columns()
                .into_iter()
                .map(|c| column(c).is(Operand::Param)),
        )?)
    }

    fn check_key_len(&self, key: &[SqlValue]) -> Result<()> {
        let expected = self.key_columns().len();
        if key.len() != expected {
            return Err(SqlError::PlaceholderCount {
                expected,
                actual: key.len(),
            }
            .into());
        }
        Ok(())
    }

    fn store(&mut self, model: &T, converters: &ConverterRegistry) -> Result<()> {
        if self.cache.is_none() {
            return Ok(());
        }
        let key = self.cache_key(&self.key_values(model, converters)?)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.add(key, model.clone())?;
        }
        Ok(())
    }

    fn evict(&mut self, key: &[SqlValue]) -> Result<()> {
        if self.cache.is_none() {
            return Ok(());
        }
        let key = self.cache_key(key)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.remove(&key)?;
        }
        Ok(())
    }

    fn from_row(&self, row: &Row, converters: &ConverterRegistry) -> Result<T> {
        let mut model = T::default();
        for (name, value) in row.columns().iter().zip(row.values()) {
            if self.fields.contains(name) {
                self.write_field(&mut model, name, value, converters)?;
            }
        }
        Ok(model)
    }

    fn write_insert(&self, db: &Database, model: &mut T) -> Result<()> {
        let converters = db.registry().converters();
        let columns: Vec<&str> = self
            .table
            .columns
            .iter()
            .filter(|c| !c.auto_increment)
            .map(|c| c.name.as_str())
            .collect();
        let values = self.read_values(model, columns.iter().copied(), converters)?;

        let mut insert = Insert::into(&self.table.name)
            .columns(columns.iter().copied())
            .values(columns.iter().map(|_| Operand::Param));
        if let Some(action) = self.table.insert_conflict {
            insert = insert.or(action);
        }
        db.execute_with(&insert, &values)?;

        if let PrimaryKey::AutoIncrement(id) = &self.primary_key {
            let rowid = SqlValue::Integer(db.last_insert_rowid());
            self.write_field(model, id, &rowid, converters)?;
        }
        Ok(())
    }

    fn write_update(&self, db: &Database, model: &T) -> Result<bool> {
        let converters = db.registry().converters();
        let keys = self.key_columns();
        let columns: Vec<&str> = self
            .table
            .column_names()
            .into_iter()
            .filter(|c| !keys.contains(c))
            .collect();
        if columns.is_empty() {
            return self.exists(db, model);
        }

        let mut args = self.read_values(model, columns.iter().copied(), converters)?;
        args.extend(self.key_values(model, converters)?);

        let mut update = Update::table(&self.table.name);
        if let Some(action) = self.table.update_conflict {
            update = update.or(action);
        }
        let query = update
            .set(columns.iter().map(|c| column(*c).is(Operand::Param)))?
            .where_(self.key_group()?);
        Ok(db.execute_with(&query, &args)? > 0)
    }

    fn write_save(&self, db: &Database, model: &mut T) -> Result<()> {
        if self.exists(db, model)? {
            self.write_update(db, model)?;
        } else {
            self.write_insert(db, model)?;
        }
        Ok(())
    }

    /// Inserts `model`, assigning its auto-increment id when it has one.
    pub fn insert(&mut self, db: &Database, model: &mut T) -> Result<()> {
        self.write_insert(db, model)?;
        self.store(model, db.registry().converters())
    }

    /// Updates the row with `model`'s primary key. Returns whether a row
    /// changed.
    pub fn update(&mut self, db: &Database, model: &T) -> Result<bool> {
        let changed = self.write_update(db, model)?;
        if changed {
            self.store(model, db.registry().converters())?;
        }
        Ok(changed)
    }

    /// Updates when the row exists, inserts otherwise.
    pub fn save(&mut self, db: &Database, model: &mut T) -> Result<()> {
        self.write_save(db, model)?;
        self.store(model, db.registry().converters())
    }

    /// Deletes the row with `model`'s primary key and evicts it. An
    /// auto-increment id is reset to zero afterwards.
    pub fn delete(&mut self, db: &Database, model: &mut T) -> Result<bool> {
        let converters = db.registry().converters();
        let key = self.key_values(model, converters)?;
        let query = Delete::from(&self.table.name).where_(self.key_group()?);
        let deleted = db.execute_with(&query, &key)? > 0;
        if deleted {
            self.evict(&key)?;
            if let PrimaryKey::AutoIncrement(id) = &self.primary_key {
                self.write_field(model, id, &SqlValue::Integer(0), converters)?;
            }
        }
        Ok(deleted)
    }

    /// Whether a row with `model`'s primary key exists. An auto-increment id
    /// of zero or less never exists.
    pub fn exists(&self, db: &Database, model: &T) -> Result<bool> {
        let key = self.key_values(model, db.registry().converters())?;
        if self.primary_key.is_auto_increment()
            && key.first().and_then(SqlValue::as_integer).is_none_or(|id| id <= 0)
        {
            return Ok(false);
        }
        let query = Select::count().from(&self.table.name).where_(self.key_group()?);
        Ok(db.count(&query, &key)? > 0)
    }

    /// Loads by primary key, serving from the cache when possible.
    pub fn load(&mut self, db: &Database, key: &[SqlValue]) -> Result<Option<T>> {
        self.check_key_len(key)?;
        if let Some(model) = self.cached(key)? {
            return Ok(Some(model));
        }

        let query = Select::all().from(&self.table.name).where_(self.key_group()?);
        let converters = db.registry().converters();
        let Some(row) = db.query(&query, key)?.into_iter().next() else {
            return Ok(None);
        };
        let model = self.from_row(&row, converters)?;
        self.store(&model, converters)?;
        Ok(Some(model))
    }

    /// Runs a select and maps every row, caching the results.
    pub fn query(
        &mut self,
        db: &Database,
        query: &Where<FromClause<Select>>,
        args: &[SqlValue],
    ) -> Result<Vec<T>> {
        let converters = db.registry().converters();
        let mut models = Vec::new();
        for row in db.query(query, args)? {
            let model = self.from_row(&row, converters)?;
            self.store(&model, converters)?;
            models.push(model);
        }
        Ok(models)
    }

    /// Saves every model in one transaction, reporting `(current, total,
    /// model)` after each. The cache is only updated once all saves commit.
    pub fn save_all(
        &mut self,
        db: &mut Database,
        models: &mut [T],
        mut progress: impl FnMut(usize, usize, &T),
    ) -> Result<()> {
        let total = models.len();
        db.transaction(|db| {
            for (i, model) in models.iter_mut().enumerate() {
                self.write_save(db, model)?;
                progress(i + 1, total, model);
            }
            Ok(())
        })?;
        for model in models.iter() {
            self.store(model, db.registry().converters())?;
        }
        Ok(())
    }

    /// Inserts every model in one transaction; see [`save_all`](Self::save_all).
    pub fn insert_all(
        &mut self,
        db: &mut Database,
        models: &mut [T],
        mut progress: impl FnMut(usize, usize, &T),
    ) -> Result<()> {
        let total = models.len();
        db.transaction(|db| {
            for (i, model) in models.iter_mut().enumerate() {
                self.write_insert(db, model)?;
                progress(i + 1, total, model);
            }
            Ok(())
        })?;
        for model in models.iter() {
            self.store(model, db.registry().converters())?;
        }
        Ok(())
    }

    /// Moves a row to a new primary key.
    ///
    /// The old cache entry is evicted before the row is touched, and the
    /// model is re-cached under `new_key` once the update succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::RowNotFound`] if no row has the old key.
    pub fn change_primary_key(
        &mut self,
        db: &Database,
        model: &mut T,
        new_key: &[SqlValue],
    ) -> Result<()> {
        self.check_key_len(new_key)?;
        let converters = db.registry().converters();
        let old_key = self.key_values(model, converters)?;
        self.evict(&old_key)?;

        let query = Update::table(&self.table.name)
            .set(
                self.key_columns()
                    .into_iter()
                    .map(|c| column(c).is(Operand::Param)),
            )?
            .where_(self.key_group()?);
        let mut args = new_key.to_vec();
        args.extend(old_key);
        if db.execute_with(&query, &args)? == 0 {
            return Err(SqliteError::RowNotFound(self.table.name.clone()));
        }

        for (name, value) in self.key_columns().into_iter().zip(new_key) {
            self.write_field(model, name, value, converters)?;
        }
        self.store(model, converters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SimpleMapCache;
    use chrono::NaiveDate;
    use sqlweave_core::{Column, DateConverter, SqlType, TypeConverter};
    use sqlweave_db::DatabaseConfig;
    use std::sync::Arc;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Badge {
        dept: i64,
        code: String,
        holder: Option<String>,
    }

    impl Model for Badge {
        const TABLE: &'static str = "Badge";

        fn fields() -> FieldMap<Self> {
            FieldMap::new()
                .column("dept", |m: &Self| m.dept, |m, v| m.dept = v)
                .column("code", |m: &Self| m.code.clone(), |m, v| m.code = v)
                .column("holder", |m: &Self| m.holder.clone(), |m, v| m.holder = v)
        }
    }

    fn database() -> Database {
        let registry = Registry::default()
            .with_table(
                Table::new("Badge")
                    .column(Column::new("dept", SqlType::Integer).primary_key())
                    .column(Column::new("code", SqlType::Text).primary_key())
                    .column(Column::new("holder", SqlType::Text))
                    .cache(CacheConfig::enabled(CacheKind::Map, 10)),
            )
            .unwrap();
        Database::builder(Arc::new(registry))
            .open_in_memory()
            .unwrap()
    }

    fn badge(dept: i64, code: &str) -> Badge {
        Badge {
            dept,
            code: code.into(),
            holder: None,
        }
    }

    fn key(dept: i64, code: &str) -> Vec<SqlValue> {
        vec![SqlValue::Integer(dept), SqlValue::Text(code.into())]
    }

    #[test]
    fn test_composite_key_save_update_load() {
        let db = database();
        let mut adapter = ModelAdapter::<Badge>::new(db.registry()).unwrap();

        let mut b = badge(1, "a");
        adapter.save(&db, &mut b).unwrap();
        b.holder = Some("Ann".into());
        adapter.save(&db, &mut b).unwrap();

        assert_eq!(db.count("SELECT COUNT(*) FROM `Badge`", &[]).unwrap(), 1);
        adapter.clear_cache();
        assert_eq!(adapter.load(&db, &key(1, "a")).unwrap(), Some(b));
        assert_eq!(adapter.cache_len(), 1);
    }

    #[test]
    fn test_delete_evicts() {
        let db = database();
        let mut adapter = ModelAdapter::<Badge>::new(db.registry()).unwrap();
        let mut b = badge(2, "x");
        adapter.insert(&db, &mut b).unwrap();
        assert!(adapter.cached(&key(2, "x")).unwrap().is_some());

        assert!(adapter.delete(&db, &mut b).unwrap());
        assert_eq!(adapter.cached(&key(2, "x")).unwrap(), None);
        assert_eq!(adapter.load(&db, &key(2, "x")).unwrap(), None);
        assert!(!adapter.delete(&db, &mut b).unwrap());
    }

    #[test]
    fn test_change_primary_key_moves_cache_entry() {
        let db = database();
        let mut adapter = ModelAdapter::<Badge>::new(db.registry()).unwrap();
        let mut b = badge(3, "old");
        adapter.insert(&db, &mut b).unwrap();

        adapter
            .change_primary_key(&db, &mut b, &key(3, "new"))
            .unwrap();
        assert_eq!(b.code, "new");
        assert_eq!(adapter.cached(&key(3, "old")).unwrap(), None);
        assert_eq!(adapter.cached(&key(3, "new")).unwrap(), Some(b.clone()));
        assert_eq!(adapter.cache_len(), 1);

        let mut missing = badge(9, "none");
        assert!(matches!(
            adapter.change_primary_key(&db, &mut missing, &key(9, "other")),
            Err(SqliteError::RowNotFound(_))
        ));
    }

    #[test]
    fn test_save_all_rollback_leaves_cache_untouched() {
        let mut db = database();
        let mut adapter = ModelAdapter::<Badge>::new(db.registry())
            .unwrap()
            .with_cache(Box::new(SimpleMapCache::new()));
        db.execute("CREATE TRIGGER `no_z` BEFORE INSERT ON `Badge` WHEN NEW.`code` = 'z' BEGIN SELECT RAISE(ABORT, 'no z'); END")
            .unwrap();

        let mut models = vec![badge(1, "a"), badge(1, "z")];
        let mut seen = Vec::new();
        let result = adapter.save_all(&mut db, &mut models, |current, total, _| {
            seen.push((current, total));
        });
        assert!(result.is_err());
        assert_eq!(seen, [(1, 2)]);
        assert_eq!(adapter.cache_len(), 0);
        assert_eq!(db.count("SELECT COUNT(*) FROM `Badge`", &[]).unwrap(), 0);
    }

    #[test]
    fn test_database_cache_default() {
        let registry = Registry::default()
            .with_table(
                Table::new("Badge")
                    .column(Column::new("dept", SqlType::Integer).primary_key())
                    .column(Column::new("code", SqlType::Text).primary_key())
                    .column(Column::new("holder", SqlType::Text)),
            )
            .unwrap();
        let mut config = DatabaseConfig::new("badges", 1);
        config.cache = CacheConfig::enabled(CacheKind::Lru, 5);
        let db = Database::builder(Arc::new(registry))
            .config(config)
            .open_in_memory()
            .unwrap();

        // The LRU default cannot index a composite key, so a map is used
        let mut adapter = ModelAdapter::<Badge>::for_database(&db).unwrap();
        adapter.insert(&db, &mut badge(1, "a")).unwrap();
        assert_eq!(adapter.cache_len(), 1);
        assert!(adapter.cached(&key(1, "a")).unwrap().is_some());

        let mut uncached = ModelAdapter::<Badge>::new(db.registry()).unwrap();
        uncached.insert(&db, &mut badge(1, "b")).unwrap();
        assert_eq!(uncached.cache_len(), 0);
    }

    #[test]
    fn test_ordered_cache_on_text_key_is_rejected() {
        let result = Registry::default().with_table(
            Table::new("Tag")
                .column(Column::new("name", SqlType::Text).primary_key())
                .cache(CacheConfig::enabled(CacheKind::Lru, 10)),
        );
        assert!(matches!(result, Err(SqlError::InvalidTable { .. })));
    }

    /// Stores dates as days since 1970-01-01.
    struct EpochDay;

    impl TypeConverter for EpochDay {
        type Model = NaiveDate;

        fn name(&self) -> &'static str {
            "epoch_day"
        }

        fn db_type(&self) -> SqlType {
            SqlType::Integer
        }

        fn to_db(&self, model: &NaiveDate) -> SqlValue {
            SqlValue::Integer(model.signed_duration_since(NaiveDate::default()).num_days())
        }

        fn from_db(&self, value: &SqlValue) -> sqlweave_core::Result<NaiveDate> {
            let days = value
                .as_integer()
                .ok_or_else(|| SqlError::ConversionError(format!("not a day number: {value:?}")))?;
            Ok(NaiveDate::default() + chrono::Duration::days(days))
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Visit {
        id: i64,
        day: NaiveDate,
    }

    impl Model for Visit {
        const TABLE: &'static str = "Visit";

        fn fields() -> FieldMap<Self> {
            FieldMap::new()
                .column("id", |m: &Self| m.id, |m, v| m.id = v)
                .converted("day", |m: &Self| m.day, |m, v| m.day = v)
        }
    }

    #[test]
    fn test_column_converter_wins_over_type_converter() {
        // NaiveDate's type converter stays the text `date` one
        let mut converters = ConverterRegistry::default();
        converters.register(EpochDay).register(DateConverter);
        let registry = Registry::new(converters)
            .with_table(
                Table::new("Visit")
                    .column(Column::new("id", SqlType::Integer).auto_increment())
                    .column(Column::new("day", SqlType::Integer).converter("epoch_day")),
            )
            .unwrap();
        let db = Database::builder(Arc::new(registry))
            .open_in_memory()
            .unwrap();

        let mut adapter = ModelAdapter::<Visit>::new(db.registry()).unwrap();
        let mut visit = Visit {
            id: 0,
            day: NaiveDate::from_ymd_opt(1970, 1, 11).unwrap(),
        };
        adapter.insert(&db, &mut visit).unwrap();
        assert_eq!(db.count("SELECT `day` FROM `Visit`", &[]).unwrap(), 10);

        let loaded = adapter.load(&db, &[SqlValue::Integer(visit.id)]).unwrap();
        assert_eq!(loaded, Some(visit));
    }

    #[test]
    fn test_wrong_key_length() {
        let db = database();
        let mut adapter = ModelAdapter::<Badge>::new(db.registry()).unwrap();
        assert!(matches!(
            adapter.load(&db, &[SqlValue::Integer(1)]),
            Err(SqliteError::Query(SqlError::PlaceholderCount { expected: 2, actual: 1 }))
        ));
    }
}
