//! Menu options as advertised by an IVR tree.

use serde::{Deserialize, Serialize};

/// A single advertised IVR choice: "press 1 for sales".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuOption {
    /// One of '0'..='9', '*', '#'.
    pub digit: char,
    /// Lowercased, trimmed option text.
    pub label: String,
}

impl MenuOption {
    pub fn new(digit: char, label: impl Into<String>) -> Self {
        Self {
            digit,
            label: label.into().trim().to_lowercase(),
        }
    }
}

/// An ordered, deduplicated set of menu options, keyed by `(digit, label)`.
///
/// Insertion order is significant: it drives the "first-wins" merge rule used
/// when reconciling partial menu fragments (§8 round-trip law: `A ∪ B` with
/// order of first appearance).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSet(Vec<MenuOption>);

impl MenuSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_options(options: impl IntoIterator<Item = MenuOption>) -> Self {
        let mut set = Self::new();
        for opt in options {
            set.insert(opt);
        }
        set
    }

    /// Insert an option if no option with the same (digit, label) already exists.
    /// First occurrence wins, preserving insertion order.
    pub fn insert(&mut self, option: MenuOption) {
        if !self
            .0
            .iter()
            .any(|o| o.digit == option.digit && o.label == option.label)
        {
            self.0.push(option);
        }
    }

    /// Merge `other` into `self`, first-wins, order-of-first-appearance.
    pub fn merge(&mut self, other: &MenuSet) {
        for opt in &other.0 {
            self.insert(opt.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MenuOption> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains_digit(&self, digit: char) -> bool {
        self.0.iter().any(|o| o.digit == digit)
    }

    pub fn find_by_digit(&self, digit: char) -> Option<&MenuOption> {
        self.0.iter().find(|o| o.digit == digit)
    }

    pub fn as_slice(&self) -> &[MenuOption] {
        &self.0
    }

    /// Semantic equality used for loop detection fallback: same digit/label
    /// pairs, order-independent.
    pub fn same_options_as(&self, other: &MenuSet) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0.iter().all(|opt| other.0.contains(opt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_first_wins_order_of_first_appearance() {
        let mut a = MenuSet::from_options([MenuOption::new('1', "Sales")]);
        let b = MenuSet::from_options([
            MenuOption::new('1', "sales again"),
            MenuOption::new('2', "support"),
        ]);
        a.merge(&b);
        let labels: Vec<_> = a.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["sales", "support"]);
    }

    #[test]
    fn duplicate_insert_is_ignored() {
        let mut set = MenuSet::new();
        set.insert(MenuOption::new('1', "sales"));
        set.insert(MenuOption::new('1', "sales"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn same_options_as_is_order_independent() {
        let a = MenuSet::from_options([MenuOption::new('1', "sales"), MenuOption::new('2', "support")]);
        let b = MenuSet::from_options([MenuOption::new('2', "support"), MenuOption::new('1', "sales")]);
        assert!(a.same_options_as(&b));
    }

    #[test]
    fn label_is_lowercased_and_trimmed() {
        let opt = MenuOption::new('1', "  Sales  ");
        assert_eq!(opt.label, "sales");
    }
}
