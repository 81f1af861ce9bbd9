//! Blocks, the structural units of a document.
//!
//! A [`Block`] holds one unit of structure (a paragraph, a header, a code
//! block, ...) as plain text plus a metadata list with exactly one entry
//! per character. Blocks never point at each other directly: tree
//! relations are stored as [`BlockKey`]s resolved through the owning
//! [`BlockMap`], so snapshots can share unmodified blocks freely and no
//! ownership cycles can form.
//!
//! # Offsets
//!
//! All offsets in this crate are char offsets, not byte offsets. The
//! parallel-length invariant `chars.len() == text.chars().count()` is
//! checked at construction and preserved by every derived copy.

use std::{
  fmt,
  str::FromStr,
  sync::{
    Arc,
    atomic::{
      AtomicU64,
      Ordering,
    },
  },
};

use folio_core::{
  character::{
    CharacterMetadata,
    EntitySet,
  },
  ranges::scan_ranges,
};
use indexmap::IndexMap;
use thiserror::Error;

use crate::{
  Tendril,
  content::ContentError,
};

/// Unique key of a block within a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(Tendril);

impl BlockKey {
  pub fn new(key: impl Into<Tendril>) -> Self {
    Self(key.into())
  }

  /// Mint a key from the process-wide counter.
  pub fn fresh() -> Self {
    static NEXT_KEY: AtomicU64 = AtomicU64::new(1);
    let id = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
    Self(format!("{id:x}").into())
  }

  pub fn as_str(&self) -> &str {
    self.0.as_str()
  }
}

impl fmt::Display for BlockKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<&str> for BlockKey {
  fn from(key: &str) -> Self {
    Self::new(key)
  }
}

/// Source of fresh block keys, injected into transactions that create
/// blocks.
///
/// Generated keys must not collide with any key already in the document;
/// uniqueness is the generator's contract, not the transaction's.
pub trait KeyGenerator {
  fn generate(&self) -> BlockKey;
}

/// Default generator backed by the process-wide counter.
#[derive(Debug, Default, Clone, Copy)]
pub struct FreshKeys;

impl KeyGenerator for FreshKeys {
  fn generate(&self) -> BlockKey {
    BlockKey::fresh()
  }
}

/// The structural kind of a block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
  #[default]
  Unstyled,
  Paragraph,
  HeaderOne,
  HeaderTwo,
  HeaderThree,
  HeaderFour,
  HeaderFive,
  HeaderSix,
  Blockquote,
  UnorderedListItem,
  OrderedListItem,
  CodeBlock,
  Atomic,
}

impl BlockType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Unstyled => "unstyled",
      Self::Paragraph => "paragraph",
      Self::HeaderOne => "header-one",
      Self::HeaderTwo => "header-two",
      Self::HeaderThree => "header-three",
      Self::HeaderFour => "header-four",
      Self::HeaderFive => "header-five",
      Self::HeaderSix => "header-six",
      Self::Blockquote => "blockquote",
      Self::UnorderedListItem => "unordered-list-item",
      Self::OrderedListItem => "ordered-list-item",
      Self::CodeBlock => "code-block",
      Self::Atomic => "atomic",
    }
  }

  /// Whether an empty half produced by splitting a block of this kind is
  /// demoted to [`BlockType::Unstyled`].
  pub fn resets_on_empty_split(self) -> bool {
    matches!(
      self,
      Self::HeaderOne
        | Self::HeaderTwo
        | Self::HeaderThree
        | Self::HeaderFour
        | Self::HeaderFive
        | Self::HeaderSix
        | Self::CodeBlock
    )
  }
}

impl fmt::Display for BlockType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown block type `{0}`")]
pub struct UnknownBlockType(pub String);

impl FromStr for BlockType {
  type Err = UnknownBlockType;

  fn from_str(name: &str) -> Result<Self, Self::Err> {
    match name {
      "unstyled" => Ok(Self::Unstyled),
      "paragraph" => Ok(Self::Paragraph),
      "header-one" => Ok(Self::HeaderOne),
      "header-two" => Ok(Self::HeaderTwo),
      "header-three" => Ok(Self::HeaderThree),
      "header-four" => Ok(Self::HeaderFour),
      "header-five" => Ok(Self::HeaderFive),
      "header-six" => Ok(Self::HeaderSix),
      "blockquote" => Ok(Self::Blockquote),
      "unordered-list-item" => Ok(Self::UnorderedListItem),
      "ordered-list-item" => Ok(Self::OrderedListItem),
      "code-block" => Ok(Self::CodeBlock),
      "atomic" => Ok(Self::Atomic),
      _ => Err(UnknownBlockType(name.to_owned())),
    }
  }
}

/// Tree relations of a tree-capable block. Every link is a back-reference
/// resolved through the block map, never an owning pointer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeLinks {
  pub parent:       Option<BlockKey>,
  pub children:     Vec<BlockKey>,
  pub prev_sibling: Option<BlockKey>,
  pub next_sibling: Option<BlockKey>,
}

/// Per-character metadata, parallel to the block text.
pub type CharList = Vec<Arc<CharacterMetadata>>;

/// Opaque per-block (and per-entity) payload.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

/// Ordered key -> block mapping; iteration order is the document's reading
/// order.
pub type BlockMap = IndexMap<BlockKey, Arc<Block>>;

/// One structural unit of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
  key:   BlockKey,
  kind:  BlockType,
  text:  String,
  chars: CharList,
  data:  DataMap,
  tree:  Option<TreeLinks>,
}

impl Block {
  /// Build a block, checking the text/metadata parallel-length invariant.
  pub fn new(
    key: BlockKey,
    kind: BlockType,
    text: impl Into<String>,
    chars: CharList,
  ) -> Result<Self, ContentError> {
    let text = text.into();
    let text_len = text.chars().count();
    if chars.len() != text_len {
      return Err(ContentError::CharListLengthMismatch {
        text_len,
        chars_len: chars.len(),
      });
    }
    Ok(Self {
      key,
      kind,
      text,
      chars,
      data: DataMap::new(),
      tree: None,
    })
  }

  /// Build a block whose characters all carry the empty metadata.
  pub fn plain(key: BlockKey, kind: BlockType, text: impl Into<String>) -> Self {
    let text = text.into();
    let chars = text.chars().map(|_| CharacterMetadata::empty()).collect();
    Self {
      key,
      kind,
      text,
      chars,
      data: DataMap::new(),
      tree: None,
    }
  }

  #[must_use]
  pub fn with_data(mut self, data: DataMap) -> Self {
    self.data = data;
    self
  }

  /// Mark the block tree-capable, with the given links.
  #[must_use]
  pub fn with_tree(mut self, tree: TreeLinks) -> Self {
    self.tree = Some(tree);
    self
  }

  pub fn key(&self) -> &BlockKey {
    &self.key
  }

  pub fn kind(&self) -> BlockType {
    self.kind
  }

  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn chars(&self) -> &[Arc<CharacterMetadata>] {
    &self.chars
  }

  pub fn data(&self) -> &DataMap {
    &self.data
  }

  pub fn tree(&self) -> Option<&TreeLinks> {
    self.tree.as_ref()
  }

  pub fn is_tree_capable(&self) -> bool {
    self.tree.is_some()
  }

  /// Length in chars.
  pub fn len(&self) -> usize {
    self.chars.len()
  }

  pub fn is_empty(&self) -> bool {
    self.chars.is_empty()
  }

  pub fn char_at(&self, offset: usize) -> Option<&Arc<CharacterMetadata>> {
    self.chars.get(offset)
  }

  /// Entity keys attached to the character at `offset`.
  pub fn entities_at(&self, offset: usize) -> Option<&EntitySet> {
    self.chars.get(offset).map(|meta| meta.entity())
  }

  /// Report maximal runs of characters with equal style sets that pass
  /// `filter`.
  pub fn find_style_ranges(
    &self,
    mut filter: impl FnMut(&CharacterMetadata) -> bool,
    mut on_range: impl FnMut(usize, usize),
  ) {
    scan_ranges(
      &self.chars,
      |a, b| a.style() == b.style(),
      |meta| filter(meta.as_ref()),
      |start, end| on_range(start, end),
    );
  }

  /// Report maximal runs of characters with equal entity sets that pass
  /// `filter`.
  pub fn find_entity_ranges(
    &self,
    mut filter: impl FnMut(&CharacterMetadata) -> bool,
    mut on_range: impl FnMut(usize, usize),
  ) {
    scan_ranges(
      &self.chars,
      |a, b| a.entity() == b.entity(),
      |meta| filter(meta.as_ref()),
      |start, end| on_range(start, end),
    );
  }

  /// Split text and metadata at a char offset. Metadata entries are shared
  /// with the original, not copied.
  pub(crate) fn split_at(&self, offset: usize) -> ((String, CharList), (String, CharList)) {
    let at = self
      .text
      .char_indices()
      .nth(offset)
      .map(|(at, _)| at)
      .unwrap_or(self.text.len());
    let (head, tail) = self.text.split_at(at);
    (
      (head.to_owned(), self.chars[..offset].to_vec()),
      (tail.to_owned(), self.chars[offset..].to_vec()),
    )
  }

  /// Copy keeping key, data and tree links, with replaced content.
  pub(crate) fn with_content(&self, kind: BlockType, text: String, chars: CharList) -> Block {
    debug_assert_eq!(chars.len(), text.chars().count());
    Block {
      key: self.key.clone(),
      kind,
      text,
      chars,
      data: self.data.clone(),
      tree: self.tree.clone(),
    }
  }

  /// Copy with a replacement metadata list of identical length.
  pub(crate) fn with_char_list(&self, chars: CharList) -> Block {
    debug_assert_eq!(chars.len(), self.chars.len());
    Block {
      chars,
      ..self.clone()
    }
  }

  /// Copy with tree links updated in place. Flat blocks are returned
  /// untouched.
  pub(crate) fn with_tree_links(&self, update: impl FnOnce(&mut TreeLinks)) -> Block {
    let mut copy = self.clone();
    if let Some(tree) = copy.tree.as_mut() {
      update(tree);
    }
    copy
  }

  pub(crate) fn from_parts(
    key: BlockKey,
    kind: BlockType,
    text: String,
    chars: CharList,
    data: DataMap,
    tree: Option<TreeLinks>,
  ) -> Self {
    debug_assert_eq!(chars.len(), text.chars().count());
    Self {
      key,
      kind,
      text,
      chars,
      data,
      tree,
    }
  }
}
