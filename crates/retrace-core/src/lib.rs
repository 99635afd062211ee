pub mod a11y;
mod element;
pub mod generator;
pub mod matcher;
pub mod naming;
mod selector;
pub mod storage;
mod validation;
mod workflow;

pub use a11y::{AccessibilityNode, Bounds};
pub use element::*;
pub use generator::{GeneratorConfig, SelectorGenerator};
pub use matcher::{ElementMatch, ElementMatcher, MatcherConfig};
pub use naming::{NamerConfig, StepNamer};
pub use selector::*;
pub use storage::{StorageError, load_workflow, save_workflow};
pub use validation::*;
pub use workflow::*;
