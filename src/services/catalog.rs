//! Products, categories and reviews.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::auth::Claims;
use crate::domain::aggregates::{
    AuthError, CatalogError, Category, CategoryPatch, ParentChange, Product, ProductInput, ProductPatch, Review,
};
use crate::error::{AppError, Result};
use crate::store::{AccountStore, CatalogStore, Store};

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(min = 1, message = "Comment is required"))]
    pub comment: String,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn list_products(&self) -> Result<Vec<Product>> { Ok(self.store.list_products().await?) }

    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        Ok(self.store.get_product(id).await?.ok_or(CatalogError::ProductNotFound)?)
    }

    /// Products filed under the category directly or as one of their subcategories.
    pub async fn products_by_category(&self, category_id: Uuid) -> Result<Vec<Product>> {
        let products = self.store.products_in_category(category_id).await?;
        if products.is_empty() {
            return Err(CatalogError::EmptyCategory.into());
        }
        Ok(products)
    }

    /// The category must be top-level and every subcategory must hang directly under it.
    async fn check_placement(&self, category_id: Uuid, subcategory_ids: &[Uuid]) -> Result<()> {
        match self.store.get_category(category_id).await? {
            Some(category) if category.is_top_level() => {}
            _ => return Err(CatalogError::InvalidCategory.into()),
        }
        for id in subcategory_ids {
            let sub = self.store.get_category(*id).await?;
            if sub.and_then(|s| s.parent_id) != Some(category_id) {
                return Err(CatalogError::InvalidSubcategories.into());
            }
        }
        Ok(())
    }

    pub async fn create_product(&self, input: ProductInput) -> Result<Product> {
        input.check_required()?;
        self.check_placement(input.category.unwrap_or_default(), input.subcategories.as_deref().unwrap_or_default()).await?;
        let product = input.into_product(Utc::now())?;
        self.store.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, code = %product.product_code, "Product created");
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product> {
        let current = self.get_product(id).await?;
        if patch.category.is_some() || patch.subcategories.is_some() {
            let category = patch.category.unwrap_or(current.category_id);
            let subcategories = patch.subcategories.as_deref().unwrap_or(&current.subcategory_ids[..]);
            self.check_placement(category, subcategories).await?;
        }
        let counters = patch.counters();
        let next = patch.apply(&current, Utc::now())?;
        Ok(self.store.update_product(&next, counters).await?.ok_or(CatalogError::ProductNotFound)?)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_product(id).await? {
            return Err(CatalogError::ProductNotFound.into());
        }
        tracing::info!(product_id = %id, "Product deleted");
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> { Ok(self.store.list_categories().await?) }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        Ok(self.store.get_category(id).await?.ok_or(CatalogError::CategoryNotFound)?)
    }

    async fn ensure_parent(&self, change: ParentChange) -> Result<()> {
        if let ParentChange::Set(parent) = change {
            if self.store.get_category(parent).await?.is_none() {
                return Err(CatalogError::ParentNotFound.into());
            }
        }
        Ok(())
    }

    pub async fn create_category(&self, input: CategoryPatch) -> Result<Category> {
        let change = input.parent_change()?;
        let category = Category::create(input.name.as_deref().unwrap_or_default(), None)?;
        self.ensure_parent(change).await?;
        let category = match change {
            ParentChange::Set(parent) => Category { parent_id: Some(parent), ..category },
            ParentChange::Keep | ParentChange::Clear => category,
        };
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    pub async fn update_category(&self, id: Uuid, patch: CategoryPatch) -> Result<Category> {
        let current = self.get_category(id).await?;
        let change = patch.parent_change()?;
        let next = patch.apply(&current, change)?;
        self.ensure_parent(change).await?;
        if !self.store.update_category(&next).await? {
            return Err(CatalogError::CategoryNotFound.into());
        }
        Ok(next)
    }

    /// Refused while subcategories or products still point at the category.
    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        self.get_category(id).await?;
        let subcategories = self.store.count_subcategories(id).await?;
        if subcategories > 0 {
            return Err(CatalogError::HasSubcategories(subcategories as usize).into());
        }
        let products = self.store.products_in_category(id).await?.len();
        if products > 0 {
            return Err(CatalogError::HasProducts(products).into());
        }
        self.store.delete_category(id).await?;
        Ok(())
    }

    /// Stores the review and refreshes the product's mean rating.
    pub async fn add_review(&self, caller: &Claims, product_id: Uuid, request: ReviewRequest) -> Result<Review> {
        request.validate()?;
        let comment = request.comment.trim();
        if comment.is_empty() {
            return Err(AppError::Validation("Comment is required".to_string()));
        }
        let account = self.store.get_account(caller.sub).await?.ok_or(AuthError::AccountNotFound)?;
        self.get_product(product_id).await?;

        let review = Review {
            id: Uuid::now_v7(),
            product_id,
            user_id: account.id,
            username: account.username,
            rating: request.rating,
            comment: comment.to_string(),
            created_at: Utc::now(),
        };
        let rating = self.store.insert_review(&review).await?;
        tracing::info!(product_id = %product_id, rating, "Review added");
        Ok(review)
    }

    pub async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        self.get_product(product_id).await?;
        Ok(self.store.list_reviews(product_id).await?)
    }
}
