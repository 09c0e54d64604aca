//! Secondary index manager
//!
//! Translates entity writes into index-key mutations and answers equality,
//! range, and full-text lookups from the `idx:` keyspace. Every maintenance
//! operation exists in a direct (auto-commit) form and a transaction-enrolled
//! form; both run through the [`KvAccess`] seam so uniqueness probes inside a
//! transaction read through that transaction's own view.
//!
//! Index maintenance is a read-modify-write over the *previous* entity row:
//! callers must update indexes before overwriting the row itself.

use crate::core::common::lock_utils::LockResultExt;
use crate::core::common::PolystoreError;
use crate::core::entity::{codec, Entity, Value};
use crate::core::index::catalog::{IndexDef, IndexKind};
use crate::core::index::fulltext;
use crate::core::keys;
use crate::core::storage::{DirectAccess, KvAccess, KvStore, KvTransaction};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Joins member renderings of a composite value. The ASCII unit separator
/// cannot appear in rendered scalars, keeping the concatenation unambiguous.
pub const COMPOSITE_SEPARATOR: char = '\u{1f}';

/// Diagnostic summary of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub kind: IndexKind,
    pub unique: bool,
    pub entry_count: usize,
}

/// Manager for all secondary indexes of a store.
#[derive(Debug)]
pub struct SecondaryIndexManager {
    db: Arc<KvStore>,
    catalog: Mutex<HashMap<(String, String), IndexDef>>,
}

impl SecondaryIndexManager {
    /// Create a manager, loading the durable catalog.
    ///
    /// # Errors
    ///
    /// Fails when catalog records cannot be read or parsed.
    pub fn new(db: Arc<KvStore>) -> Result<Self, PolystoreError> {
        let mut catalog = HashMap::new();
        for (_, value) in db.scan_prefix_collect(keys::IDX_CATALOG_PREFIX)? {
            let def: IndexDef = serde_json::from_slice(&value)?;
            catalog.insert((def.table.clone(), def.column.clone()), def);
        }
        Ok(Self { db, catalog: Mutex::new(catalog) })
    }

    // --- catalog operations ---

    /// Create an index and backfill it from existing rows. Creating an index
    /// identical to an existing one is a no-op; a conflicting definition
    /// under the same name is an error.
    pub fn create_index(&self, def: IndexDef) -> Result<(), PolystoreError> {
        {
            let mut catalog = self.catalog.lock().or_poisoned("index catalog")?;
            let key = (def.table.clone(), def.column.clone());
            if let Some(existing) = catalog.get(&key) {
                if *existing == def {
                    return Ok(());
                }
                return Err(PolystoreError::Index(format!(
                    "index {}:{} already exists with a different definition",
                    def.table, def.column
                )));
            }
            let record = serde_json::to_vec(&def)?;
            self.db.put(&keys::index_catalog(&def.table, &def.column), record)?;
            catalog.insert(key, def.clone());
        }
        debug!("created index {}:{} ({:?})", def.table, def.column, def.kind);
        self.rebuild(&def.table, &def.column)
    }

    /// Drop an index: remove the catalog record and every entry. Dropping an
    /// unknown index is a no-op.
    pub fn drop_index(&self, table: &str, column: &str) -> Result<(), PolystoreError> {
        {
            let mut catalog = self.catalog.lock().or_poisoned("index catalog")?;
            if catalog.remove(&(table.to_string(), column.to_string())).is_none() {
                return Ok(());
            }
        }
        self.db.del(&keys::index_catalog(table, column))?;
        self.delete_all_entries(table, column)
    }

    /// The definitions currently registered for a table.
    pub fn defs_for_table(&self, table: &str) -> Result<Vec<IndexDef>, PolystoreError> {
        let catalog = self.catalog.lock().or_poisoned("index catalog")?;
        let mut defs: Vec<_> =
            catalog.values().filter(|d| d.table == table).cloned().collect();
        defs.sort_by(|a, b| a.column.cmp(&b.column));
        Ok(defs)
    }

    fn def(&self, table: &str, column: &str) -> Result<Option<IndexDef>, PolystoreError> {
        let catalog = self.catalog.lock().or_poisoned("index catalog")?;
        Ok(catalog.get(&(table.to_string(), column.to_string())).cloned())
    }

    // --- maintenance ---

    /// Maintain index entries for a put of `entity`, auto-commit mode.
    /// Call before overwriting the entity row.
    pub fn put(&self, table: &str, entity: &Entity) -> Result<(), PolystoreError> {
        let mut access = DirectAccess::new(&self.db);
        self.put_with(table, entity, &mut access)
    }

    /// Maintain index entries for a put of `entity` inside a transaction.
    pub fn put_tx(
        &self,
        table: &str,
        entity: &Entity,
        txn: &mut KvTransaction,
    ) -> Result<(), PolystoreError> {
        self.put_with(table, entity, txn)
    }

    /// Remove all index entries of `pk`, auto-commit mode. Call before
    /// deleting the entity row.
    pub fn erase(&self, table: &str, pk: &str) -> Result<(), PolystoreError> {
        let mut access = DirectAccess::new(&self.db);
        self.erase_with(table, pk, &mut access)
    }

    /// Remove all index entries of `pk` inside a transaction.
    pub fn erase_tx(
        &self,
        table: &str,
        pk: &str,
        txn: &mut KvTransaction,
    ) -> Result<(), PolystoreError> {
        self.erase_with(table, pk, txn)
    }

    fn put_with(
        &self,
        table: &str,
        entity: &Entity,
        access: &mut dyn KvAccess,
    ) -> Result<(), PolystoreError> {
        let defs = self.defs_for_table(table)?;
        if defs.is_empty() {
            return Ok(());
        }

        let row_key = keys::relational(table, entity.pk());
        let old_entity = match access.read(&row_key)? {
            Some(bytes) => Some(codec::deserialize(entity.pk(), &bytes)?),
            None => None,
        };

        // Probe uniqueness for every definition before mutating anything, so
        // a violation leaves no partial index state behind.
        let mut planned: Vec<(&IndexDef, Vec<(String, Vec<u8>)>)> = Vec::new();
        for def in &defs {
            let new_entries = entries_for(def, entity);
            if def.unique {
                for (value, _) in &new_entries {
                    let prefix =
                        keys::secondary_index_value_prefix(&def.table, &def.column, value);
                    for key in access.scan_keys(&prefix)? {
                        if keys::extract_primary_key(&key) != entity.pk() {
                            return Err(PolystoreError::UniqueViolation(format!(
                                "value '{value}' already indexed for {}:{}",
                                def.table, def.column
                            )));
                        }
                    }
                }
            }
            planned.push((def, new_entries));
        }

        for (def, new_entries) in planned {
            if let Some(old) = &old_entity {
                for (value, _) in entries_for(def, old) {
                    access.delete(&keys::secondary_index(
                        &def.table,
                        &def.column,
                        &value,
                        entity.pk(),
                    ))?;
                }
            }
            for (value, stored) in new_entries {
                access.write(
                    &keys::secondary_index(&def.table, &def.column, &value, entity.pk()),
                    stored,
                )?;
            }
        }
        Ok(())
    }

    fn erase_with(
        &self,
        table: &str,
        pk: &str,
        access: &mut dyn KvAccess,
    ) -> Result<(), PolystoreError> {
        let defs = self.defs_for_table(table)?;
        if defs.is_empty() {
            return Ok(());
        }
        let row_key = keys::relational(table, pk);
        let Some(bytes) = access.read(&row_key)? else {
            return Ok(());
        };
        let old = codec::deserialize(pk, &bytes)?;
        for def in &defs {
            for (value, _) in entries_for(def, &old) {
                access.delete(&keys::secondary_index(&def.table, &def.column, &value, pk))?;
            }
        }
        Ok(())
    }

    // --- lookups ---

    /// PKs whose indexed value equals `value`, in index-key (= PK) order.
    /// An unindexed column yields an empty result.
    pub fn scan_keys_equal(
        &self,
        table: &str,
        column: &str,
        value: &str,
    ) -> Result<Vec<String>, PolystoreError> {
        let prefix = keys::secondary_index_value_prefix(table, column, value);
        let mut pks = Vec::new();
        self.db.scan_prefix(&prefix, |key, _| {
            pks.push(keys::extract_primary_key(key).to_string());
            true
        })?;
        Ok(pks)
    }

    /// PKs whose rendered value starts with `value_prefix`. This is the
    /// equality-over-leading-columns lookup for composite indexes: pass the
    /// leading members joined with [`COMPOSITE_SEPARATOR`].
    pub fn scan_keys_value_prefix(
        &self,
        table: &str,
        column: &str,
        value_prefix: &str,
    ) -> Result<Vec<String>, PolystoreError> {
        let prefix = format!(
            "{}{value_prefix}",
            keys::secondary_index_column_prefix(table, column)
        );
        let mut pks = Vec::new();
        self.db.scan_prefix(&prefix, |key, _| {
            pks.push(keys::extract_primary_key(key).to_string());
            true
        })?;
        Ok(pks)
    }

    /// PKs whose value lies between the bounds, lexicographically. `None`
    /// bounds are open ends; inclusivity per flag. An inverted interval
    /// yields an empty result.
    pub fn scan_keys_range(
        &self,
        table: &str,
        column: &str,
        lo: Option<&str>,
        hi: Option<&str>,
        include_lo: bool,
        include_hi: bool,
    ) -> Result<Vec<String>, PolystoreError> {
        let column_prefix = keys::secondary_index_column_prefix(table, column);
        let mut pks = Vec::new();
        self.db.scan_prefix(&column_prefix, |key, _| {
            let rest = &key[column_prefix.len()..];
            // rest is `<value>:<pk>`; the value itself may contain ':'.
            let Some(split) = rest.rfind(keys::SEPARATOR) else {
                return true;
            };
            let (value, pk) = (&rest[..split], &rest[split + 1..]);

            let lo_ok = match lo {
                None => true,
                Some(lo) => {
                    if include_lo {
                        value >= lo
                    } else {
                        value > lo
                    }
                }
            };
            let hi_ok = match hi {
                None => true,
                Some(hi) => {
                    if include_hi {
                        value <= hi
                    } else {
                        value < hi
                    }
                }
            };
            if lo_ok && hi_ok {
                pks.push(pk.to_string());
            }
            true
        })?;
        Ok(pks)
    }

    /// BM25-scored full-text lookup. Results are (pk, score), descending by
    /// score, ties broken by PK ascending, truncated to `limit`. Querying a
    /// column without a full-text index yields an empty result.
    pub fn fulltext_search(
        &self,
        table: &str,
        column: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, PolystoreError> {
        let Some(def) = self.def(table, column)? else {
            return Ok(Vec::new());
        };
        let Some(options) = def.fulltext.as_ref() else {
            return Ok(Vec::new());
        };

        let mut terms = fulltext::tokenize(query, options);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // Gather posting lists for every query term.
        let mut term_postings: Vec<Vec<(String, u32)>> = Vec::with_capacity(terms.len());
        let mut doc_lens: HashMap<String, u32> = HashMap::new();
        for term in &terms {
            let prefix = keys::secondary_index_value_prefix(table, column, term);
            let mut postings = Vec::new();
            self.db.scan_prefix(&prefix, |key, value| {
                if let Some((tf, doc_len)) = fulltext::decode_posting(value) {
                    let pk = keys::extract_primary_key(key).to_string();
                    doc_lens.insert(pk.clone(), doc_len);
                    postings.push((pk, tf));
                }
                true
            })?;
            term_postings.push(postings);
        }

        let n_docs = self.db.count_prefix(&keys::relational(table, ""))?;
        let avg_doc_len = if doc_lens.is_empty() {
            1.0
        } else {
            doc_lens.values().map(|l| f64::from(*l)).sum::<f64>() / doc_lens.len() as f64
        };

        let mut scores: HashMap<String, f64> = HashMap::new();
        for postings in &term_postings {
            let doc_freq = postings.len();
            for (pk, tf) in postings {
                let doc_len = doc_lens.get(pk).copied().unwrap_or(0);
                *scores.entry(pk.clone()).or_insert(0.0) +=
                    fulltext::bm25_score(*tf, doc_len, avg_doc_len, n_docs, doc_freq);
            }
        }

        let mut results: Vec<(String, f64)> = scores.into_iter().collect();
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(limit);
        Ok(results)
    }

    // --- diagnostics and repair ---

    /// Kind, uniqueness, and live entry count of an index.
    pub fn stats(&self, table: &str, column: &str) -> Result<IndexStats, PolystoreError> {
        let def = self.def(table, column)?.ok_or_else(|| {
            PolystoreError::NotFound(format!("no index on {table}:{column}"))
        })?;
        let entry_count =
            self.db.count_prefix(&keys::secondary_index_column_prefix(table, column))?;
        Ok(IndexStats { kind: def.kind, unique: def.unique, entry_count })
    }

    /// Drop and regenerate every entry of one index from the table's rows.
    pub fn rebuild(&self, table: &str, column: &str) -> Result<(), PolystoreError> {
        let def = self.def(table, column)?.ok_or_else(|| {
            PolystoreError::NotFound(format!("no index on {table}:{column}"))
        })?;
        self.delete_all_entries(table, column)?;

        let row_prefix = keys::relational(table, "");
        let rows = self.db.scan_prefix_collect(&row_prefix)?;
        let mut batch = self.db.new_batch();
        for (key, bytes) in rows {
            let pk = &key[row_prefix.len()..];
            let entity = codec::deserialize(pk, &bytes)?;
            for (value, stored) in entries_for(&def, &entity) {
                batch.put(keys::secondary_index(table, column, &value, pk), stored);
            }
        }
        if !batch.is_empty() {
            self.db.apply_batch(batch)?;
        }
        debug!("rebuilt index {table}:{column}");
        Ok(())
    }

    /// Rebuild every index registered for a table.
    pub fn reindex_table(&self, table: &str) -> Result<(), PolystoreError> {
        for def in self.defs_for_table(table)? {
            self.rebuild(table, &def.column)?;
        }
        Ok(())
    }

    fn delete_all_entries(&self, table: &str, column: &str) -> Result<(), PolystoreError> {
        let prefix = keys::secondary_index_column_prefix(table, column);
        let mut batch = self.db.new_batch();
        self.db.scan_prefix(&prefix, |key, _| {
            batch.delete(key);
            true
        })?;
        if !batch.is_empty() {
            self.db.apply_batch(batch)?;
        }
        Ok(())
    }
}

/// Render a scalar for use inside an index key. Vectors and nulls are not
/// indexable and yield no entry.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Double(d) => Some(d.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::FloatVec(_) => None,
    }
}

/// The (value, stored payload) pairs an entity contributes to one index.
fn entries_for(def: &IndexDef, entity: &Entity) -> Vec<(String, Vec<u8>)> {
    match def.kind {
        IndexKind::Regular | IndexKind::Range | IndexKind::Sparse => entity
            .get(&def.column)
            .and_then(render_value)
            .map(|v| vec![(v, Vec::new())])
            .unwrap_or_default(),
        IndexKind::Composite => {
            let mut parts = Vec::with_capacity(def.columns.len());
            for member in &def.columns {
                match entity.get(member).and_then(render_value) {
                    Some(v) => parts.push(v),
                    // Partial tuples are not indexed.
                    None => return Vec::new(),
                }
            }
            vec![(parts.join(&COMPOSITE_SEPARATOR.to_string()), Vec::new())]
        }
        IndexKind::FullText => {
            let Some(options) = def.fulltext.as_ref() else {
                return Vec::new();
            };
            let Some(text) = entity.get_str(&def.column) else {
                return Vec::new();
            };
            let tokens = fulltext::tokenize(text, options);
            let doc_len = tokens.len() as u32;
            fulltext::term_frequencies(&tokens)
                .into_iter()
                .map(|(term, tf)| (term, fulltext::encode_posting(tf, doc_len)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::catalog::FullTextOptions;
    use crate::core::storage::IsolationLevel;

    fn setup() -> (Arc<KvStore>, SecondaryIndexManager) {
        let db = Arc::new(KvStore::in_memory());
        let manager = SecondaryIndexManager::new(Arc::clone(&db)).unwrap();
        (db, manager)
    }

    fn write_row(db: &KvStore, table: &str, entity: &Entity) {
        db.put(&keys::relational(table, entity.pk()), codec::serialize(entity)).unwrap();
    }

    #[test]
    fn test_put_and_equal_scan() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();

        let alice = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
        manager.put("users", &alice).unwrap();
        write_row(&db, "users", &alice);

        assert_eq!(manager.scan_keys_equal("users", "name", "Alice").unwrap(), vec!["alice"]);
        assert!(manager.scan_keys_equal("users", "name", "Bob").unwrap().is_empty());
    }

    #[test]
    fn test_update_removes_stale_entries() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();

        let v1 = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
        manager.put("users", &v1).unwrap();
        write_row(&db, "users", &v1);

        let v2 = Entity::new("alice").with_field("name", Value::Str("Alicia".into()));
        manager.put("users", &v2).unwrap();
        write_row(&db, "users", &v2);

        assert!(manager.scan_keys_equal("users", "name", "Alice").unwrap().is_empty());
        assert_eq!(manager.scan_keys_equal("users", "name", "Alicia").unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_erase_cascades() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();

        let alice = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
        manager.put("users", &alice).unwrap();
        write_row(&db, "users", &alice);

        manager.erase("users", "alice").unwrap();
        db.del(&keys::relational("users", "alice")).unwrap();

        assert!(manager.scan_keys_equal("users", "name", "Alice").unwrap().is_empty());
    }

    #[test]
    fn test_unique_violation() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "email", true)).unwrap();

        let u1 = Entity::new("u1").with_field("email", Value::Str("x@y".into()));
        manager.put("users", &u1).unwrap();
        write_row(&db, "users", &u1);

        let u2 = Entity::new("u2").with_field("email", Value::Str("x@y".into()));
        let err = manager.put("users", &u2).unwrap_err();
        assert!(matches!(err, PolystoreError::UniqueViolation(_)));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_unique_allows_self_update() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "email", true)).unwrap();

        let u1 = Entity::new("u1").with_field("email", Value::Str("x@y".into()));
        manager.put("users", &u1).unwrap();
        write_row(&db, "users", &u1);

        // Re-putting the same pk with the same value is not a violation.
        manager.put("users", &u1).unwrap();
    }

    #[test]
    fn test_unique_probe_sees_transaction_writes() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "email", true)).unwrap();

        let mut txn = db.begin_transaction(IsolationLevel::Snapshot).unwrap();
        let u1 = Entity::new("u1").with_field("email", Value::Str("x@y".into()));
        manager.put_tx("users", &u1, &mut txn).unwrap();
        txn.put(&keys::relational("users", "u1"), codec::serialize(&u1)).unwrap();

        // The second insert conflicts with the first one's uncommitted entry.
        let u2 = Entity::new("u2").with_field("email", Value::Str("x@y".into()));
        let err = manager.put_tx("users", &u2, &mut txn).unwrap_err();
        assert!(matches!(err, PolystoreError::UniqueViolation(_)));

        txn.rollback();
        assert!(manager.scan_keys_equal("users", "email", "x@y").unwrap().is_empty());
    }

    #[test]
    fn test_sparse_skips_null_and_absent() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::sparse("users", "nickname")).unwrap();

        let a = Entity::new("a").with_field("nickname", Value::Str("Ace".into()));
        let b = Entity::new("b").with_field("nickname", Value::Null);
        let c = Entity::new("c");
        for e in [&a, &b, &c] {
            manager.put("users", e).unwrap();
            write_row(&db, "users", e);
        }

        let stats = manager.stats("users", "nickname").unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(manager.scan_keys_equal("users", "nickname", "Ace").unwrap(), vec!["a"]);
    }

    #[test]
    fn test_range_scan_bounds() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::range("items", "code")).unwrap();

        for code in ["a", "b", "c", "d"] {
            let item = Entity::new(format!("i_{code}"))
                .with_field("code", Value::Str(code.to_string()));
            manager.put("items", &item).unwrap();
            write_row(&db, "items", &item);
        }

        assert_eq!(
            manager.scan_keys_range("items", "code", Some("b"), Some("c"), true, true).unwrap(),
            vec!["i_b", "i_c"]
        );
        assert_eq!(
            manager.scan_keys_range("items", "code", Some("b"), Some("c"), false, false).unwrap(),
            Vec::<String>::new()
        );
        assert_eq!(
            manager.scan_keys_range("items", "code", Some("b"), None, false, true).unwrap(),
            vec!["i_c", "i_d"]
        );
        // Inverted interval is empty.
        assert!(manager
            .scan_keys_range("items", "code", Some("d"), Some("a"), true, true)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_composite_index_and_prefix_lookup() {
        let (db, manager) = setup();
        manager
            .create_index(IndexDef::composite(
                "users",
                "city_age",
                vec!["city".into(), "age".into()],
            ))
            .unwrap();

        let a = Entity::new("a")
            .with_field("city", Value::Str("Berlin".into()))
            .with_field("age", Value::Int(30));
        let b = Entity::new("b")
            .with_field("city", Value::Str("Berlin".into()))
            .with_field("age", Value::Int(40));
        let c = Entity::new("c").with_field("city", Value::Str("Hamburg".into()));
        for e in [&a, &b, &c] {
            manager.put("users", e).unwrap();
            write_row(&db, "users", e);
        }

        // c lacks `age`: partial tuples are not indexed.
        assert_eq!(manager.stats("users", "city_age").unwrap().entry_count, 2);

        let full = format!("Berlin{COMPOSITE_SEPARATOR}30");
        assert_eq!(manager.scan_keys_equal("users", "city_age", &full).unwrap(), vec!["a"]);

        // Equality over the leading column only.
        let prefix = format!("Berlin{COMPOSITE_SEPARATOR}");
        assert_eq!(
            manager.scan_keys_value_prefix("users", "city_age", &prefix).unwrap(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn test_fulltext_search_scores_and_orders() {
        let (db, manager) = setup();
        manager
            .create_index(IndexDef::fulltext("posts", "body", FullTextOptions::default()))
            .unwrap();

        let p1 = Entity::new("p1")
            .with_field("body", Value::Str("Rust databases are fast databases".into()));
        let p2 = Entity::new("p2")
            .with_field("body", Value::Str("A slow interpreted database".into()));
        let p3 = Entity::new("p3").with_field("body", Value::Str("Nothing relevant here".into()));
        for e in [&p1, &p2, &p3] {
            manager.put("posts", e).unwrap();
            write_row(&db, "posts", e);
        }

        let results = manager.fulltext_search("posts", "body", "database", 10).unwrap();
        let pks: Vec<_> = results.iter().map(|(pk, _)| pk.as_str()).collect();
        assert_eq!(pks.len(), 2);
        assert!(pks.contains(&"p1") && pks.contains(&"p2"));
        // p1 mentions the term twice in a comparable-length doc.
        assert_eq!(results[0].0, "p1");
        assert!(results[0].1 > results[1].1);

        let limited = manager.fulltext_search("posts", "body", "database", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_fulltext_missing_index_is_empty() {
        let (_db, manager) = setup();
        assert!(manager.fulltext_search("posts", "body", "anything", 5).unwrap().is_empty());
    }

    #[test]
    fn test_create_index_idempotent_and_conflicting() {
        let (_db, manager) = setup();
        let def = IndexDef::regular("users", "name", false);
        manager.create_index(def.clone()).unwrap();
        manager.create_index(def).unwrap(); // no-op

        let conflicting = IndexDef::regular("users", "name", true);
        assert!(manager.create_index(conflicting).is_err());
    }

    #[test]
    fn test_create_index_backfills_existing_rows() {
        let (db, manager) = setup();
        let alice = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
        write_row(&db, "users", &alice);

        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();
        assert_eq!(manager.scan_keys_equal("users", "name", "Alice").unwrap(), vec!["alice"]);
    }

    #[test]
    fn test_drop_index_removes_entries() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();
        let alice = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
        manager.put("users", &alice).unwrap();
        write_row(&db, "users", &alice);

        manager.drop_index("users", "name").unwrap();
        assert_eq!(db.count_prefix("idx:users:name:").unwrap(), 0);
        assert!(manager.stats("users", "name").is_err());
    }

    #[test]
    fn test_rebuild_repairs_divergence() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();
        let alice = Entity::new("alice").with_field("name", Value::Str("Alice".into()));
        manager.put("users", &alice).unwrap();
        write_row(&db, "users", &alice);

        // Corrupt the index by hand.
        db.put("idx:users:name:Ghost:phantom", Vec::new()).unwrap();
        db.del("idx:users:name:Alice:alice").unwrap();

        manager.rebuild("users", "name").unwrap();
        assert_eq!(manager.scan_keys_equal("users", "name", "Alice").unwrap(), vec!["alice"]);
        assert!(manager.scan_keys_equal("users", "name", "Ghost").unwrap().is_empty());
    }

    #[test]
    fn test_catalog_survives_reload() {
        let (db, manager) = setup();
        manager.create_index(IndexDef::regular("users", "name", false)).unwrap();
        drop(manager);

        let reloaded = SecondaryIndexManager::new(Arc::clone(&db)).unwrap();
        assert_eq!(reloaded.stats("users", "name").unwrap().kind, IndexKind::Regular);
    }

    #[test]
    fn test_unindexed_table_put_is_noop() {
        let (_db, manager) = setup();
        let e = Entity::new("x").with_field("f", Value::Int(1));
        manager.put("plain", &e).unwrap();
        assert!(manager.scan_keys_equal("plain", "f", "1").unwrap().is_empty());
    }
}
