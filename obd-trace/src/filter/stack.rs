//! Ordered filter list
//!
//! Position is precedence: index 0 is the top of the list and wins wherever
//! its intervals overlap a lower filter's. Reordering moves entries in the
//! list; there is no separate priority field to drift out of sync.

use super::definition::FilterDefinition;
use crate::types::FilterError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterStack {
    filters: Vec<FilterDefinition>,
}

impl FilterStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the bottom (lowest precedence)
    pub fn push(&mut self, filter: FilterDefinition) -> Result<(), FilterError> {
        self.ensure_unique(filter.name(), None)?;
        log::debug!("Added filter '{}' at position {}", filter.name(), self.filters.len());
        self.filters.push(filter);
        Ok(())
    }

    /// Insert at `index` (clamped to the list length)
    pub fn insert(&mut self, index: usize, filter: FilterDefinition) -> Result<(), FilterError> {
        self.ensure_unique(filter.name(), None)?;
        let index = index.min(self.filters.len());
        self.filters.insert(index, filter);
        Ok(())
    }

    /// Replace the filter called `name`, keeping its position
    pub fn replace(&mut self, name: &str, filter: FilterDefinition) -> Result<(), FilterError> {
        let index = self.index_of(name)?;
        self.ensure_unique(filter.name(), Some(index))?;
        self.filters[index] = filter;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<FilterDefinition, FilterError> {
        let index = self.index_of(name)?;
        Ok(self.filters.remove(index))
    }

    /// Swap with the filter above; returns false when already at the top
    pub fn move_up(&mut self, name: &str) -> Result<bool, FilterError> {
        let index = self.index_of(name)?;
        if index == 0 {
            return Ok(false);
        }
        self.filters.swap(index, index - 1);
        Ok(true)
    }

    /// Swap with the filter below; returns false when already at the bottom
    pub fn move_down(&mut self, name: &str) -> Result<bool, FilterError> {
        let index = self.index_of(name)?;
        if index + 1 >= self.filters.len() {
            return Ok(false);
        }
        self.filters.swap(index, index + 1);
        Ok(true)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), FilterError> {
        let index = self.index_of(name)?;
        self.filters[index].set_enabled(enabled);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FilterDefinition> {
        self.filters.iter().find(|f| f.name() == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.filters.iter().position(|f| f.name() == name)
    }

    /// Top (highest precedence) first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &FilterDefinition> {
        self.filters.iter()
    }

    /// Enabled filters, top first
    pub fn active(&self) -> impl DoubleEndedIterator<Item = &FilterDefinition> {
        self.filters.iter().filter(|f| f.is_enabled())
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(FilterDefinition::name).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn index_of(&self, name: &str) -> Result<usize, FilterError> {
        self.position(name)
            .ok_or_else(|| FilterError::NotFound(name.to_string()))
    }

    fn ensure_unique(&self, name: &str, ignore: Option<usize>) -> Result<(), FilterError> {
        match self.position(name) {
            Some(index) if Some(index) != ignore => Err(FilterError::DuplicateName(name.to_string())),
            _ => Ok(()),
        }
    }
}
