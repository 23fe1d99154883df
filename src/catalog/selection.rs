use crate::catalog::{FacetDimension, FacetValue};
use std::fmt;

/// A facet value chosen for one dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFacet {
    pub dimension: String,
    pub param: String,
    pub value: String,
    pub label: String,
}

/// Accumulated facet choices along one traversal branch
///
/// A selection is never mutated once handed to a branch. `extended` returns a
/// new selection so sibling branches never observe each other's choices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetSelection {
    choices: Vec<SelectedFacet>,
}

impl FacetSelection {
    /// The empty selection (the whole category)
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns a copy of this selection with `value` chosen for `dimension`
    ///
    /// If the dimension already has a value the selection is returned unchanged;
    /// a branch only ever adds dimensions it has not yet narrowed by.
    pub fn extended(&self, dimension: &FacetDimension, value: &FacetValue) -> Self {
        let mut next = self.clone();
        if next.contains(&dimension.label) {
            tracing::warn!(
                "Ignoring second value '{}' for already selected dimension {}",
                value.label,
                dimension.label
            );
            return next;
        }
        next.choices.push(SelectedFacet {
            dimension: dimension.label.clone(),
            param: value.param.clone(),
            value: value.value.clone(),
            label: value.label.clone(),
        });
        next
    }

    pub fn contains(&self, dimension: &str) -> bool {
        self.choices.iter().any(|c| c.dimension == dimension)
    }

    pub fn get(&self, dimension: &str) -> Option<&SelectedFacet> {
        self.choices.iter().find(|c| c.dimension == dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedFacet> {
        self.choices.iter()
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }

    /// True if every choice of `parent` is also present, unchanged, in `self`
    pub fn extends(&self, parent: &FacetSelection) -> bool {
        parent.len() <= self.len()
            && parent
                .choices
                .iter()
                .zip(self.choices.iter())
                .all(|(a, b)| a == b)
    }

    /// Query parameters in selection order
    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.choices
            .iter()
            .map(|c| (c.param.as_str(), c.value.as_str()))
    }
}

impl fmt::Display for FacetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.choices.is_empty() {
            return write!(f, "(all)");
        }
        for (i, choice) in self.choices.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", choice.dimension, choice.label)?;
        }
        Ok(())
    }
}
