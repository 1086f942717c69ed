use core::fmt;

use heapless::{String, Vec};
use thiserror_no_std::Error;

use crate::Word;

pub const NAME_CAP: usize = 32;
pub const LABEL_CAP: usize = 128;
pub const TERMINATOR: char = ':';
/// Emitted in place of a jump target that is not known yet.
pub const UNRESOLVED: Word = -1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label table is full")]
    TableFull,
    #[error("label name is too long")]
    NameTooLong,
    #[error("label `{0}` is already defined elsewhere")]
    Duplicate(std::string::String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub name: String<NAME_CAP>,
    /// Bytecode offset, `None` while only referenced.
    pub offset: Option<usize>,
    /// Line of the first jump that named this label.
    pub first_reference: Option<u32>,
}

/// Maps label names to bytecode offsets across assembler passes.
///
/// Entries are never removed; the second pass finds every offset the
/// first pass recorded, which is what makes forward jumps resolve.
#[derive(Clone, Debug, Default)]
pub struct LabelTable {
    labels: Vec<Label, LABEL_CAP>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self { labels: Vec::new() }
    }

    /// A word ending in `:` defines a label.
    pub fn is_label_syntax(token: &str) -> bool {
        token.len() > 1 && token.ends_with(TERMINATOR)
    }

    /// The name part of a label definition.
    pub fn label_name(token: &str) -> &str {
        token.strip_suffix(TERMINATOR).unwrap_or(token)
    }

    pub fn find(&self, name: &str) -> Option<&Label> {
        self.labels.iter().find(|label| label.name.as_str() == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Label> {
        self.labels
            .iter_mut()
            .find(|label| label.name.as_str() == name)
    }

    fn insert(&mut self, label: Label) -> Result<&mut Label, LabelError> {
        self.labels.push(label).map_err(|_| LabelError::TableFull)?;
        self.labels.last_mut().ok_or(LabelError::TableFull)
    }

    fn name(name: &str) -> Result<String<NAME_CAP>, LabelError> {
        String::try_from(name).map_err(|_| LabelError::NameTooLong)
    }

    /// Binds `name` to `offset`. Binding the same offset again is allowed
    /// since every pass re-defines every label.
    pub fn define(&mut self, name: &str, offset: usize) -> Result<(), LabelError> {
        match self.find_mut(name) {
            Some(label) => match label.offset {
                Some(existing) if existing != offset => Err(LabelError::Duplicate(name.into())),
                _ => {
                    label.offset = Some(offset);
                    Ok(())
                }
            },
            None => {
                let name = Self::name(name)?;
                self.insert(Label {
                    name,
                    offset: Some(offset),
                    first_reference: None,
                })?;
                Ok(())
            }
        }
    }

    /// Looks up a jump target. An unknown name is recorded so it can be
    /// reported if it never gets defined.
    pub fn reference(&mut self, name: &str, line: u32) -> Result<Option<usize>, LabelError> {
        match self.find_mut(name) {
            Some(label) => {
                label.first_reference.get_or_insert(line);
                Ok(label.offset)
            }
            None => {
                let name = Self::name(name)?;
                self.insert(Label {
                    name,
                    offset: None,
                    first_reference: Some(line),
                })?;
                Ok(None)
            }
        }
    }

    /// Labels that were jumped to but never defined.
    pub fn unresolved(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter().filter(|label| label.offset.is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl fmt::Display for LabelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in self.labels.iter() {
            match label.offset {
                Some(offset) => writeln!(f, "{:<width$} {offset}", label.name, width = NAME_CAP)?,
                None => writeln!(f, "{:<width$} ?", label.name, width = NAME_CAP)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_syntax() {
        assert!(LabelTable::is_label_syntax("loop:"));
        assert!(!LabelTable::is_label_syntax(":"));
        assert!(!LabelTable::is_label_syntax("loop"));
        assert_eq!(LabelTable::label_name("loop:"), "loop");
    }

    #[test]
    fn forward_reference_then_define() {
        let mut labels = LabelTable::new();
        assert_eq!(labels.reference("end", 3), Ok(None));
        assert_eq!(labels.unresolved().count(), 1);
        labels.define("end", 12).unwrap();
        assert_eq!(labels.reference("end", 9), Ok(Some(12)));
        assert_eq!(labels.unresolved().count(), 0);
        assert_eq!(labels.find("end").unwrap().first_reference, Some(3));
    }

    #[test]
    fn redefinition() {
        let mut labels = LabelTable::new();
        labels.define("a", 4).unwrap();
        assert_eq!(labels.define("a", 4), Ok(()));
        assert_eq!(
            labels.define("a", 5),
            Err(LabelError::Duplicate("a".into()))
        );
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn names_are_case_sensitive() {
        let mut labels = LabelTable::new();
        labels.define("Loop", 0).unwrap();
        assert!(labels.find("loop").is_none());
    }

    #[test]
    fn capacity_limits() {
        let mut labels = LabelTable::new();
        for i in 0..LABEL_CAP {
            labels.define(&format!("l{i}"), i).unwrap();
        }
        assert_eq!(labels.define("extra", 0), Err(LabelError::TableFull));
        assert_eq!(labels.reference("extra", 1), Err(LabelError::TableFull));

        let mut labels = LabelTable::new();
        let long = "x".repeat(NAME_CAP + 1);
        assert_eq!(labels.define(&long, 0), Err(LabelError::NameTooLong));
        assert!(labels.define(&"y".repeat(NAME_CAP), 0).is_ok());
    }

    #[test]
    fn dump_lists_every_label() {
        let mut labels = LabelTable::new();
        labels.define("start", 0).unwrap();
        labels.reference("missing", 2).unwrap();
        let dump = labels.to_string();
        assert!(dump.lines().next().unwrap().starts_with("start"));
        assert!(dump.lines().next().unwrap().ends_with(" 0"));
        assert!(dump.lines().nth(1).unwrap().ends_with(" ?"));
    }
}
