//! Edit transactions over [`ContentState`] snapshots.
//!
//! Both operations here are pure: they take a snapshot plus a selection
//! and return a fresh snapshot, sharing every untouched block with the
//! input. A failed transaction returns an error and leaves the caller's
//! snapshot exactly as it was — there is no partial application.
//!
//! # Removing entities at selection edges
//!
//! [`remove_entities_at_edges`] strips entity references that an imminent
//! edit would bisect. A reference straddles an edge when the characters on
//! both sides of the offset carry the same entity key; unless the entity
//! tolerates bisection ([`survives_bisection`]), the key is removed from
//! the whole contiguous run of characters referencing it.
//!
//! [`survives_bisection`]: crate::content::Mutability::survives_bisection
//!
//! # Splitting a block
//!
//! [`split_block`] divides the caret's block in two at the caret offset.
//! The upper half keeps the original key; the lower half gets a freshly
//! minted key and an empty data payload. Splitting a header or code block
//! at its very start or end demotes the empty half to plain text, and
//! tree-capable blocks get their parent and sibling links repaired.
//!
//! # Failure classes
//!
//! Every [`TransactionError`] variant is a contract violation: continuing
//! would corrupt document invariants, so the operation fails outright.
//! Absent-data conditions (no character on one side of an edge, a sibling
//! or parent key not present in the map) are normal states at document
//! boundaries and are handled by branching, never by failure.

use std::sync::Arc;

use folio_core::{
  character::{
    CharacterMetadata,
    EntityKey,
    MetadataPool,
  },
  ranges::scan_ranges,
};
use thiserror::Error;

use crate::{
  block::{
    Block,
    BlockKey,
    BlockMap,
    BlockType,
    CharList,
    DataMap,
    KeyGenerator,
    TreeLinks,
  },
  content::ContentState,
  selection::SelectionState,
};

pub type Result<T> = std::result::Result<T, TransactionError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
  #[error("block `{key}` is not in the document")]
  BlockNotFound { key: BlockKey },
  #[error("selection must be collapsed to split a block")]
  SelectionNotCollapsed,
  #[error("offset {offset} is out of bounds for a block of length {len}")]
  OffsetOutOfBounds { offset: usize, len: usize },
  #[error("block `{key}` has children and cannot be split")]
  BlockHasChildren { key: BlockKey },
  #[error("entity `{key}` is not in the entity map")]
  UnknownEntity { key: EntityKey },
  #[error("no run of characters referencing `{key}` contains offset {offset}")]
  RemovalRangeNotFound { key: EntityKey, offset: usize },
}

/// Strip entity references that the selection's edges would bisect.
///
/// Only entities whose mutability rejects bisection are touched. The
/// operation is idempotent, and when neither edge changes its block the
/// input block map is reused as-is with only `selection_after` replaced.
pub fn remove_entities_at_edges(
  pool: &MetadataPool,
  content: &ContentState,
  selection: &SelectionState,
) -> Result<ContentState> {
  let mut updated: Vec<(BlockKey, Arc<Block>)> = Vec::new();

  let start_key = selection.start_key();
  let start_block = content
    .block(start_key)
    .ok_or_else(|| TransactionError::BlockNotFound {
      key: start_key.clone(),
    })?;

  let updated_start = remove_for_block(pool, content, start_block, selection.start_offset())?;
  if let Some(block) = &updated_start {
    updated.push((start_key.clone(), Arc::clone(block)));
  }

  // The end edge must see the start edge's work when both land in the same
  // block.
  let end_key = selection.end_key();
  let end_block = if end_key == start_key {
    match &updated_start {
      Some(block) => Arc::clone(block),
      None => Arc::clone(start_block),
    }
  } else {
    Arc::clone(
      content
        .block(end_key)
        .ok_or_else(|| TransactionError::BlockNotFound {
          key: end_key.clone(),
        })?,
    )
  };

  if let Some(block) = remove_for_block(pool, content, &end_block, selection.end_offset())? {
    updated.push((end_key.clone(), block));
  }

  if updated.is_empty() {
    return Ok(content.with_selection_after(selection.clone()));
  }

  tracing::trace!(
    changed = updated.len(),
    "removed entity references at selection edges"
  );
  Ok(content.merge_blocks(updated, selection.clone()))
}

/// Remove bisected entity references around `offset` in one block.
/// Returns the updated block, or `None` when nothing changed.
fn remove_for_block(
  pool: &MetadataPool,
  content: &ContentState,
  block: &Arc<Block>,
  offset: usize,
) -> Result<Option<Arc<Block>>> {
  let chars = block.chars();

  // Both neighbors must exist for a reference to straddle the offset; at
  // block boundaries there is nothing to bisect.
  let Some(after) = chars.get(offset) else {
    return Ok(None);
  };
  let Some(before) = offset.checked_sub(1).and_then(|at| chars.get(at)) else {
    return Ok(None);
  };

  let mut working: Option<CharList> = None;

  for key in after.entity().iter() {
    if !before.has_entity(key.as_str()) {
      continue;
    }

    let entity = content
      .entity(key.as_str())
      .ok_or_else(|| TransactionError::UnknownEntity { key: key.clone() })?;
    if entity.mutability.survives_bisection() {
      continue;
    }

    let list = working.get_or_insert_with(|| chars.to_vec());
    let (start, end) = removal_range(list, key, offset)?;
    tracing::trace!(%key, start, end, "clipping entity reference at edit boundary");
    for meta in &mut list[start..end] {
      *meta = pool.remove_entity(meta.as_ref(), key.as_str());
    }
  }

  Ok(working.map(|list| Arc::new(block.with_char_list(list))))
}

/// The maximal run of characters referencing `key` that contains `offset`.
fn removal_range(
  chars: &[Arc<CharacterMetadata>],
  key: &EntityKey,
  offset: usize,
) -> Result<(usize, usize)> {
  let mut found = None;
  scan_ranges(
    chars,
    |a, b| a.entity().intersects(b.entity()),
    |meta| meta.has_entity(key.as_str()),
    |start, end| {
      if start <= offset && offset <= end {
        found = Some((start, end));
      }
    },
  );

  found.ok_or_else(|| TransactionError::RemovalRangeNotFound {
    key: key.clone(),
    offset,
  })
}

/// Split the caret's block in two at the caret offset.
///
/// The selection must be collapsed, and a tree-capable block must have no
/// children. The new below-block starts with an empty data payload; its
/// character metadata is shared with the original, never copied by value.
pub fn split_block(
  content: &ContentState,
  selection: &SelectionState,
  keys: &impl KeyGenerator,
) -> Result<ContentState> {
  if !selection.is_collapsed() {
    return Err(TransactionError::SelectionNotCollapsed);
  }

  let key = &selection.anchor_key;
  let offset = selection.anchor_offset;
  let block = content
    .block(key)
    .ok_or_else(|| TransactionError::BlockNotFound { key: key.clone() })?;

  if offset > block.len() {
    return Err(TransactionError::OffsetOutOfBounds {
      offset,
      len: block.len(),
    });
  }

  if let Some(tree) = block.tree() {
    if !tree.children.is_empty() {
      return Err(TransactionError::BlockHasChildren { key: key.clone() });
    }
  }

  let key_below = keys.generate();
  debug_assert!(
    content.block(&key_below).is_none(),
    "key generator returned a key already present in the document"
  );

  let (above_kind, below_kind) = split_kinds(block.kind(), offset);
  let ((text_above, chars_above), (text_below, chars_below)) = block.split_at(offset);

  let above = block.with_content(above_kind, text_above, chars_above);
  let below_tree = block.tree().map(|tree| TreeLinks {
    parent:       tree.parent.clone(),
    children:     Vec::new(),
    prev_sibling: Some(key.clone()),
    next_sibling: tree.next_sibling.clone(),
  });
  let below = Block::from_parts(
    key_below.clone(),
    below_kind,
    text_below,
    chars_below,
    // The opaque payload stays with the upper half.
    DataMap::new(),
    below_tree,
  );

  let mut blocks = BlockMap::with_capacity(content.blocks().len() + 1);
  for (existing_key, existing) in content.blocks() {
    if existing_key == key {
      blocks.insert(key.clone(), Arc::new(above.clone()));
      blocks.insert(key_below.clone(), Arc::new(below.clone()));
    } else {
      blocks.insert(existing_key.clone(), Arc::clone(existing));
    }
  }

  if block.is_tree_capable() {
    repair_links(&mut blocks, block, key, &key_below);
  }

  tracing::debug!(%key, %key_below, offset, "split block");

  Ok(content.replace_blocks(
    blocks,
    selection.clone(),
    SelectionState::collapsed(key_below, 0),
  ))
}

fn split_kinds(kind: BlockType, offset: usize) -> (BlockType, BlockType) {
  if !kind.resets_on_empty_split() {
    return (kind, kind);
  }
  // Enter at the very start of a header or code block leaves a plain
  // block above; any other offset starts the block below as plain text.
  if offset == 0 {
    (BlockType::Unstyled, kind)
  } else {
    (kind, BlockType::Unstyled)
  }
}

/// Apply `update` to the block at `key`, if both the key and the block
/// exist.
fn transform_block(
  blocks: &mut BlockMap,
  key: Option<&BlockKey>,
  update: impl FnOnce(&Block) -> Block,
) {
  let Some(key) = key else {
    return;
  };
  let Some(existing) = blocks.get(key) else {
    return;
  };
  let updated = update(existing);
  blocks.insert(key.clone(), Arc::new(updated));
}

fn repair_links(blocks: &mut BlockMap, original: &Block, key: &BlockKey, key_below: &BlockKey) {
  let Some(tree) = original.tree() else {
    return;
  };

  // The parent gains the new key right after the original.
  transform_block(blocks, tree.parent.as_ref(), |parent| {
    parent.with_tree_links(|links| {
      let at = links
        .children
        .iter()
        .position(|child| child == key)
        .map(|at| at + 1)
        .unwrap_or(links.children.len());
      links.children.insert(at, key_below.clone());
    })
  });

  // The original's former next sibling now follows the new block.
  transform_block(blocks, tree.next_sibling.as_ref(), |next| {
    next.with_tree_links(|links| {
      links.prev_sibling = Some(key_below.clone());
    })
  });

  // The new block slots in directly after the original.
  transform_block(blocks, Some(key), |above| {
    above.with_tree_links(|links| {
      links.next_sibling = Some(key_below.clone());
    })
  });
}
