use smartstring::{LazyCompact, SmartString};

pub mod character;
pub mod ranges;

pub type Tendril = SmartString<LazyCompact>;
