//! Per-character metadata and the interning pool.
//!
//! Every character in a block carries a [`CharacterMetadata`]: the set of
//! active inline style tags plus the set of entity keys attached to it. A
//! document holds only a handful of distinct style/entity combinations, so
//! metadata values are never constructed directly — they are minted by a
//! [`MetadataPool`], which canonicalizes the requested configuration and
//! hands out one shared [`Arc`] per distinct combination.
//!
//! Pool identity doubles as a cheap equality check: two characters with
//! equal metadata hold pointer-equal `Arc`s.
//!
//! The pool is append-only. Readers may run concurrently; insertion is a
//! check-then-set and must stay single-writer, which the inner lock
//! enforces.

use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::Tendril;

/// An inline style tag, e.g. `"BOLD"`.
pub type StyleTag = Tendril;

/// A key into the entity store.
pub type EntityKey = Tendril;

/// A set of inline style tags, kept sorted so that comparisons and hashes
/// see one canonical form.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct StyleSet(SmallVec<[StyleTag; 1]>);

impl StyleSet {
  pub fn new() -> Self {
    Self(SmallVec::new())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn contains(&self, tag: &str) -> bool {
    self.0.binary_search_by(|candidate| candidate.as_str().cmp(tag)).is_ok()
  }

  /// Copy with `tag` added. Adding a present tag is a no-op.
  #[must_use]
  pub fn with(&self, tag: impl Into<StyleTag>) -> Self {
    let tag = tag.into();
    let mut tags = self.0.clone();
    if let Err(at) = tags.binary_search(&tag) {
      tags.insert(at, tag);
    }
    Self(tags)
  }

  /// Copy with `tag` removed. Removing an absent tag is a no-op.
  #[must_use]
  pub fn without(&self, tag: &str) -> Self {
    let mut tags = self.0.clone();
    if let Ok(at) = tags.binary_search_by(|candidate| candidate.as_str().cmp(tag)) {
      tags.remove(at);
    }
    Self(tags)
  }

  pub fn iter(&self) -> impl Iterator<Item = &StyleTag> {
    self.0.iter()
  }
}

impl<S: Into<StyleTag>> FromIterator<S> for StyleSet {
  fn from_iter<I: IntoIterator<Item = S>>(tags: I) -> Self {
    let mut tags: SmallVec<[StyleTag; 1]> = tags.into_iter().map(Into::into).collect();
    tags.sort();
    tags.dedup();
    Self(tags)
  }
}

/// Entity keys attached to a character, in insertion order.
///
/// Equality is set-based: two sets holding the same keys compare equal no
/// matter the order they were added in. Iteration stays in insertion order
/// so scans over a character list are deterministic.
#[derive(Debug, Default, Clone, Eq)]
pub struct EntitySet(SmallVec<[EntityKey; 1]>);

impl EntitySet {
  pub fn new() -> Self {
    Self(SmallVec::new())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.0.iter().any(|candidate| candidate.as_str() == key)
  }

  /// Copy with `key` appended. Adding a present key is a no-op.
  #[must_use]
  pub fn with(&self, key: impl Into<EntityKey>) -> Self {
    let key = key.into();
    if self.contains(key.as_str()) {
      return self.clone();
    }
    let mut keys = self.0.clone();
    keys.push(key);
    Self(keys)
  }

  /// Copy with `key` removed. Removing an absent key is a no-op.
  #[must_use]
  pub fn without(&self, key: &str) -> Self {
    Self(
      self
        .0
        .iter()
        .filter(|candidate| candidate.as_str() != key)
        .cloned()
        .collect(),
    )
  }

  /// Whether the two sets share at least one key.
  pub fn intersects(&self, other: &EntitySet) -> bool {
    self.0.iter().any(|key| other.contains(key.as_str()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &EntityKey> {
    self.0.iter()
  }
}

impl PartialEq for EntitySet {
  fn eq(&self, other: &Self) -> bool {
    self.0.len() == other.0.len() && self.0.iter().all(|key| other.contains(key.as_str()))
  }
}

impl<K: Into<EntityKey>> FromIterator<K> for EntitySet {
  fn from_iter<I: IntoIterator<Item = K>>(keys: I) -> Self {
    let mut set = Self::new();
    for key in keys {
      let key = key.into();
      if !set.contains(key.as_str()) {
        set.0.push(key);
      }
    }
    set
  }
}

/// Immutable style/entity metadata for one character.
///
/// Values are only ever constructed by [`MetadataPool::create`]; callers
/// hold them behind shared [`Arc`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterMetadata {
  style:  StyleSet,
  entity: EntitySet,
}

static EMPTY: Lazy<Arc<CharacterMetadata>> = Lazy::new(|| {
  Arc::new(CharacterMetadata {
    style:  StyleSet::new(),
    entity: EntitySet::new(),
  })
});

impl CharacterMetadata {
  /// The shared empty-style/empty-entity singleton.
  pub fn empty() -> Arc<CharacterMetadata> {
    Arc::clone(&EMPTY)
  }

  pub fn style(&self) -> &StyleSet {
    &self.style
  }

  pub fn entity(&self) -> &EntitySet {
    &self.entity
  }

  pub fn has_style(&self, tag: &str) -> bool {
    self.style.contains(tag)
  }

  pub fn has_entity(&self, key: &str) -> bool {
    self.entity.contains(key)
  }

  pub fn is_empty(&self) -> bool {
    self.style.is_empty() && self.entity.is_empty()
  }
}

/// Partial configuration accepted by [`MetadataPool::create`]. Absent
/// fields default to the empty set.
#[derive(Debug, Default, Clone)]
pub struct CharacterConfig {
  pub style:  Option<StyleSet>,
  pub entity: Option<EntitySet>,
}

impl CharacterConfig {
  pub fn styled(style: StyleSet) -> Self {
    Self {
      style:  Some(style),
      entity: None,
    }
  }

  pub fn entities(entity: EntitySet) -> Self {
    Self {
      style:  None,
      entity: Some(entity),
    }
  }
}

// Canonical form of a configuration: both sets sorted. Entity insertion
// order is presentation-only, so configs differing only in that order must
// land on the same pool entry.
#[derive(Debug, PartialEq, Eq, Hash)]
struct PoolKey {
  style:  SmallVec<[StyleTag; 1]>,
  entity: SmallVec<[EntityKey; 1]>,
}

impl PoolKey {
  fn of(style: &StyleSet, entity: &EntitySet) -> Self {
    let mut entity_keys: SmallVec<[EntityKey; 1]> = entity.iter().cloned().collect();
    entity_keys.sort();
    Self {
      style:  style.iter().cloned().collect(),
      entity: entity_keys,
    }
  }
}

/// Cache of [`CharacterMetadata`] values, one shared instance per distinct
/// style/entity combination.
///
/// The pool grows monotonically for its whole lifetime; entries are never
/// evicted. Structurally equal configurations always resolve to the same
/// `Arc`, so `Arc::ptr_eq` on two pooled values implies content equality.
#[derive(Debug, Default)]
pub struct MetadataPool {
  entries: RwLock<HashMap<PoolKey, Arc<CharacterMetadata>>>,
}

impl MetadataPool {
  pub fn new() -> Self {
    Self::default()
  }

  /// The process-wide default pool.
  pub fn global() -> &'static MetadataPool {
    static POOL: Lazy<MetadataPool> = Lazy::new(MetadataPool::new);
    &POOL
  }

  /// Number of distinct non-empty combinations interned so far. The EMPTY
  /// singleton lives outside the table and is not counted.
  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }

  /// Mint (or reuse) the metadata value for `config`.
  ///
  /// The fully-default configuration short-circuits to the EMPTY singleton
  /// without touching the lock.
  pub fn create(&self, config: CharacterConfig) -> Arc<CharacterMetadata> {
    let style = config.style.unwrap_or_default();
    let entity = config.entity.unwrap_or_default();

    if style.is_empty() && entity.is_empty() {
      return CharacterMetadata::empty();
    }

    let key = PoolKey::of(&style, &entity);
    if let Some(existing) = self.entries.read().get(&key) {
      return Arc::clone(existing);
    }

    let mut entries = self.entries.write();
    let entry = entries
      .entry(key)
      .or_insert_with(|| Arc::new(CharacterMetadata { style, entity }));
    Arc::clone(entry)
  }

  /// `meta` plus one style tag.
  pub fn apply_style(
    &self,
    meta: &CharacterMetadata,
    tag: impl Into<StyleTag>,
  ) -> Arc<CharacterMetadata> {
    self.create(CharacterConfig {
      style:  Some(meta.style.with(tag)),
      entity: Some(meta.entity.clone()),
    })
  }

  /// `meta` minus one style tag. Removing an absent tag is a no-op.
  pub fn remove_style(&self, meta: &CharacterMetadata, tag: &str) -> Arc<CharacterMetadata> {
    self.create(CharacterConfig {
      style:  Some(meta.style.without(tag)),
      entity: Some(meta.entity.clone()),
    })
  }

  /// `meta` plus one entity key.
  pub fn add_entity(
    &self,
    meta: &CharacterMetadata,
    key: impl Into<EntityKey>,
  ) -> Arc<CharacterMetadata> {
    self.create(CharacterConfig {
      style:  Some(meta.style.clone()),
      entity: Some(meta.entity.with(key)),
    })
  }

  /// `meta` minus one entity key. Removing an absent key is a no-op.
  pub fn remove_entity(&self, meta: &CharacterMetadata, key: &str) -> Arc<CharacterMetadata> {
    self.create(CharacterConfig {
      style:  Some(meta.style.clone()),
      entity: Some(meta.entity.without(key)),
    })
  }
}
