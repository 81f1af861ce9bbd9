//! Document snapshots: block map, entity store, and selections.
//!
//! A [`ContentState`] is an immutable snapshot of a whole document. Edit
//! transactions never mutate one in place — they produce a new snapshot
//! whose untouched blocks are the same [`Arc`]s as the old one, so
//! publishing a snapshot to concurrent readers needs no locking.

use std::sync::Arc;

use folio_core::character::EntityKey;
use hashbrown::HashMap;
use thiserror::Error;

use crate::{
  Tendril,
  block::{
    Block,
    BlockKey,
    BlockMap,
    DataMap,
  },
  selection::SelectionState,
};

pub type Result<T> = std::result::Result<T, ContentError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentError {
  #[error("character list length {chars_len} does not match text length {text_len}")]
  CharListLengthMismatch { text_len: usize, chars_len: usize },
  #[error("a content state needs at least one block")]
  EmptyDocument,
  #[error("duplicate block key `{key}`")]
  DuplicateBlockKey { key: BlockKey },
}

/// How an entity tolerates edits at its boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
  /// Freely editable; survives being bisected.
  Mutable,
  /// Must be removed wholesale when an edit bisects it.
  Immutable,
  /// Editable strictly inside the reference, rigid at the boundary
  /// characters.
  MutableInterior,
}

impl Mutability {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Mutable => "MUTABLE",
      Self::Immutable => "IMMUTABLE",
      Self::MutableInterior => "MUTABLE_INTERIOR",
    }
  }

  /// Whether references may be left in place when an edit boundary lands
  /// inside them.
  pub fn survives_bisection(self) -> bool {
    matches!(self, Self::Mutable | Self::MutableInterior)
  }
}

/// An out-of-band reference (link, mention, ...) attached to a contiguous
/// run of characters.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
  pub kind:       Tendril,
  pub mutability: Mutability,
  pub data:       DataMap,
}

impl Entity {
  pub fn new(kind: impl Into<Tendril>, mutability: Mutability) -> Self {
    Self {
      kind: kind.into(),
      mutability,
      data: DataMap::new(),
    }
  }

  #[must_use]
  pub fn with_data(mut self, data: DataMap) -> Self {
    self.data = data;
    self
  }
}

/// Entity store, keyed by the entity keys character metadata points at.
pub type EntityMap = HashMap<EntityKey, Arc<Entity>>;

/// An immutable snapshot of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentState {
  blocks:           BlockMap,
  entities:         EntityMap,
  selection_before: SelectionState,
  selection_after:  SelectionState,
}

impl ContentState {
  /// Build a snapshot from blocks in reading order. Both selections start
  /// collapsed at the beginning of the first block.
  pub fn from_blocks(blocks: impl IntoIterator<Item = Block>, entities: EntityMap) -> Result<Self> {
    let mut map = BlockMap::new();
    for block in blocks {
      let key = block.key().clone();
      if map.insert(key.clone(), Arc::new(block)).is_some() {
        return Err(ContentError::DuplicateBlockKey { key });
      }
    }

    let first = map.keys().next().cloned().ok_or(ContentError::EmptyDocument)?;
    let caret = SelectionState::collapsed(first, 0);

    Ok(Self {
      blocks: map,
      entities,
      selection_before: caret.clone(),
      selection_after: caret,
    })
  }

  pub fn blocks(&self) -> &BlockMap {
    &self.blocks
  }

  pub fn block(&self, key: &BlockKey) -> Option<&Arc<Block>> {
    self.blocks.get(key)
  }

  pub fn first_block(&self) -> Option<&Arc<Block>> {
    self.blocks.values().next()
  }

  pub fn last_block(&self) -> Option<&Arc<Block>> {
    self.blocks.values().last()
  }

  /// The block preceding `key` in reading order.
  pub fn block_before(&self, key: &BlockKey) -> Option<&Arc<Block>> {
    let at = self.blocks.get_index_of(key)?;
    let (_, block) = self.blocks.get_index(at.checked_sub(1)?)?;
    Some(block)
  }

  /// The block following `key` in reading order.
  pub fn block_after(&self, key: &BlockKey) -> Option<&Arc<Block>> {
    let at = self.blocks.get_index_of(key)?;
    let (_, block) = self.blocks.get_index(at + 1)?;
    Some(block)
  }

  pub fn entities(&self) -> &EntityMap {
    &self.entities
  }

  pub fn entity(&self, key: &str) -> Option<&Arc<Entity>> {
    self.entities.get(key)
  }

  pub fn selection_before(&self) -> &SelectionState {
    &self.selection_before
  }

  pub fn selection_after(&self) -> &SelectionState {
    &self.selection_after
  }

  /// Full document text with `separator` between blocks.
  pub fn plain_text(&self, separator: &str) -> String {
    let mut out = String::new();
    for (index, block) in self.blocks.values().enumerate() {
      if index > 0 {
        out.push_str(separator);
      }
      out.push_str(block.text());
    }
    out
  }

  /// Same snapshot with a different post-edit selection.
  #[must_use]
  pub fn with_selection_after(&self, selection: SelectionState) -> Self {
    Self {
      selection_after: selection,
      ..self.clone()
    }
  }

  /// New snapshot with `updated` blocks merged over the current map.
  pub(crate) fn merge_blocks(
    &self,
    updated: impl IntoIterator<Item = (BlockKey, Arc<Block>)>,
    selection_after: SelectionState,
  ) -> Self {
    let mut blocks = self.blocks.clone();
    for (key, block) in updated {
      blocks.insert(key, block);
    }
    Self {
      blocks,
      entities: self.entities.clone(),
      selection_before: self.selection_before.clone(),
      selection_after,
    }
  }

  /// New snapshot with a rebuilt block map and both selections replaced.
  pub(crate) fn replace_blocks(
    &self,
    blocks: BlockMap,
    selection_before: SelectionState,
    selection_after: SelectionState,
  ) -> Self {
    Self {
      blocks,
      entities: self.entities.clone(),
      selection_before,
      selection_after,
    }
  }
}
