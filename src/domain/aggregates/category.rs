//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::CatalogError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: &str, parent_id: Option<Uuid>) -> Result<Self, CatalogError> {
        let name = name.trim();
        if name.is_empty() { return Err(CatalogError::MissingCategoryName); }
        let now = Utc::now();
        Ok(Self { id: Uuid::now_v7(), name: name.to_string(), parent_id, created_at: now, updated_at: now })
    }

    pub fn is_top_level(&self) -> bool { self.parent_id.is_none() }
}

/// How an update touches the parent link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentChange { Keep, Clear, Set(Uuid) }

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    /// Absent keeps the parent, an empty string detaches, an id re-parents.
    pub parent_category: Option<String>,
}

impl CategoryPatch {
    pub fn parent_change(&self) -> Result<ParentChange, CatalogError> {
        match self.parent_category.as_deref().map(str::trim) {
            None => Ok(ParentChange::Keep),
            Some("") => Ok(ParentChange::Clear),
            Some(raw) => raw.parse::<Uuid>().map(ParentChange::Set).map_err(|_| CatalogError::InvalidParentId),
        }
    }

    pub fn apply(&self, current: &Category, parent: ParentChange) -> Result<Category, CatalogError> {
        let mut next = current.clone();
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) { next.name = name.to_string(); }
        match parent {
            ParentChange::Keep => {}
            ParentChange::Clear => next.parent_id = None,
            ParentChange::Set(id) if id == current.id => return Err(CatalogError::SelfParent),
            ParentChange::Set(id) => next.parent_id = Some(id),
        }
        next.updated_at = Utc::now();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_name() {
        assert_eq!(Category::create("  ", None), Err(CatalogError::MissingCategoryName));
        assert!(Category::create("Shoes", None).unwrap().is_top_level());
    }

    #[test]
    fn test_patch_parent_semantics() {
        let parent = Category::create("Men", None).unwrap();
        let child = Category::create("Shirts", Some(parent.id)).unwrap();

        let keep = CategoryPatch { name: Some("Tees".into()), parent_category: None };
        let kept = keep.apply(&child, keep.parent_change().unwrap()).unwrap();
        assert_eq!(kept.parent_id, Some(parent.id));
        assert_eq!(kept.name, "Tees");

        let clear = CategoryPatch { name: None, parent_category: Some(String::new()) };
        assert_eq!(clear.apply(&child, clear.parent_change().unwrap()).unwrap().parent_id, None);

        let own = CategoryPatch { name: None, parent_category: Some(child.id.to_string()) };
        assert_eq!(own.apply(&child, own.parent_change().unwrap()), Err(CatalogError::SelfParent));
    }
}
