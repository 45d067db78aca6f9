//! In-process store. One `tokio::sync::Mutex` guards all state, so every
//! multi-step write is atomic with respect to other requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::hash_map::{Entry, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::activity;

#[derive(Default)]
struct State {
    products: HashMap<Uuid, Product>,
    categories: HashMap<Uuid, Category>,
    reviews: Vec<Review>,
    cart: Vec<CartLine>,
    /// Keyed by code.
    discounts: HashMap<String, DiscountCode>,
    orders: HashMap<Uuid, Order>,
    activities: Vec<Activity>,
    accounts: HashMap<Uuid, Account>,
    campaigns: HashMap<Uuid, Campaign>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn newest_first<T, F: Fn(&T) -> (DateTime<Utc>, Uuid)>(mut items: Vec<T>, key: F) -> Vec<T> {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let s = self.state.lock().await;
        Ok(newest_first(s.products.values().cloned().collect(), |p| (p.created_at, p.id)))
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn products_in_category(&self, category_id: Uuid) -> StoreResult<Vec<Product>> {
        let s = self.state.lock().await;
        let found = s.products.values().filter(|p| p.belongs_to(category_id)).cloned().collect();
        Ok(newest_first(found, |p| (p.created_at, p.id)))
    }

    async fn insert_product(&self, product: &Product) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        if s.products.values().any(|p| p.product_code == product.product_code) {
            return Err(Conflict::DuplicateProductCode(product.product_code.clone()).into());
        }
        s.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product, counters: CounterWrites) -> StoreResult<Option<Product>> {
        let mut s = self.state.lock().await;
        if s.products.values().any(|p| p.id != product.id && p.product_code == product.product_code) {
            return Err(Conflict::DuplicateProductCode(product.product_code.clone()).into());
        }
        let Some(slot) = s.products.get_mut(&product.id) else { return Ok(None) };
        let mut next = product.clone();
        if !counters.stock { next.stock = slot.stock; }
        if !counters.sizes { next.sizes = slot.sizes.clone(); }
        if !counters.rating { next.rating = slot.rating; }
        *slot = next.clone();
        Ok(Some(next))
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        let mut s = self.state.lock().await;
        if s.products.remove(&id).is_none() { return Ok(false); }
        s.cart.retain(|l| l.product_id != id);
        s.reviews.retain(|r| r.product_id != id);
        Ok(true)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let s = self.state.lock().await;
        let mut all: Vec<Category> = s.categories.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        Ok(self.state.lock().await.categories.get(&id).cloned())
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        self.state.lock().await.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<bool> {
        let mut s = self.state.lock().await;
        match s.categories.get_mut(&category.id) {
            Some(slot) => { *slot = category.clone(); Ok(true) }
            None => Ok(false),
        }
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.lock().await.categories.remove(&id).is_some())
    }

    async fn count_subcategories(&self, id: Uuid) -> StoreResult<i64> {
        let s = self.state.lock().await;
        Ok(s.categories.values().filter(|c| c.parent_id == Some(id)).count() as i64)
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<f64> {
        let mut s = self.state.lock().await;
        if s.reviews.iter().any(|r| r.product_id == review.product_id && r.user_id == review.user_id) {
            return Err(Conflict::AlreadyReviewed.into());
        }
        s.reviews.push(review.clone());
        let ratings: Vec<f64> = s.reviews.iter().filter(|r| r.product_id == review.product_id).map(|r| f64::from(r.rating)).collect();
        let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
        if let Some(product) = s.products.get_mut(&review.product_id) { product.rating = mean; }
        Ok(mean)
    }

    async fn list_reviews(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let s = self.state.lock().await;
        let found = s.reviews.iter().filter(|r| r.product_id == product_id).cloned().collect();
        Ok(newest_first(found, |r| (r.created_at, r.id)))
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart(&self, owner: &CartOwner) -> StoreResult<Vec<CartLine>> {
        let s = self.state.lock().await;
        let lines = s.cart.iter().filter(|l| l.owned_by(owner)).cloned().collect();
        Ok(newest_first(lines, |l| (l.created_at, l.id)))
    }

    async fn add_to_cart(&self, owner: &CartOwner, key: &CartKey) -> StoreResult<CartLine> {
        let mut s = self.state.lock().await;
        if let Some(line) = s.cart.iter_mut().find(|l| l.matches(owner, key)) {
            line.quantity += 1;
            line.updated_at = Utc::now();
            return Ok(line.clone());
        }
        let line = CartLine::new(owner, key);
        s.cart.push(line.clone());
        Ok(line)
    }

    async fn remove_from_cart(&self, owner: &CartOwner, key: &CartKey) -> StoreResult<bool> {
        let mut s = self.state.lock().await;
        let Some(pos) = s.cart.iter().position(|l| l.matches(owner, key)) else { return Ok(false) };
        if s.cart[pos].quantity > 1 {
            s.cart[pos].quantity -= 1;
            s.cart[pos].updated_at = Utc::now();
        } else {
            s.cart.remove(pos);
        }
        Ok(true)
    }

    async fn clear_cart(&self, owner: &CartOwner) -> StoreResult<u64> {
        let mut s = self.state.lock().await;
        let before = s.cart.len();
        s.cart.retain(|l| !l.owned_by(owner));
        Ok((before - s.cart.len()) as u64)
    }
}

#[async_trait]
impl DiscountStore for MemoryStore {
    async fn issue_discount(&self, code: &DiscountCode) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        if s.discounts.values().any(|d| d.email == code.email) {
            return Err(Conflict::AlreadySubscribed.into());
        }
        s.discounts.insert(code.code.as_str().to_string(), code.clone());
        Ok(())
    }

    async fn find_discount(&self, code: &str, email: &str) -> StoreResult<Option<DiscountCode>> {
        let s = self.state.lock().await;
        Ok(s.discounts.get(code).filter(|d| d.email == email).cloned())
    }

    async fn purge_expired_discounts(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut s = self.state.lock().await;
        let before = s.discounts.len();
        s.discounts.retain(|_, d| !d.is_expired(now));
        Ok((before - s.discounts.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, draft: &OrderDraft) -> StoreResult<Order> {
        let mut guard = self.state.lock().await;
        let s = &mut *guard;
        let now = Utc::now();

        if let Some(claim) = &draft.claim {
            let redeemable = s.discounts.get(claim.code.as_str())
                .is_some_and(|d| d.email == claim.email && !d.is_used && !d.is_expired(now));
            if !redeemable { return Err(Conflict::DiscountUnavailable.into()); }
        }

        // Stage every decrement on copies so a rejected line leaves stock untouched.
        let mut staged: HashMap<Uuid, Product> = HashMap::new();
        for line in &draft.order.products {
            let product = match staged.entry(line.product_id) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let current = s.products.get(&line.product_id).ok_or(Conflict::InsufficientStock(line.product_id))?;
                    slot.insert(current.clone())
                }
            };
            if !product.adjust_stock(line.bucket(), -line.quantity) {
                return Err(Conflict::InsufficientStock(line.product_id).into());
            }
        }

        if let Some(claim) = &draft.claim {
            if let Some(code) = s.discounts.get_mut(claim.code.as_str()) { code.is_used = true; }
        }
        for (id, mut product) in staged {
            product.updated_at = now;
            s.products.insert(id, product);
        }
        s.orders.insert(draft.order.id, draft.order.clone());
        if let Some(owner) = &draft.owner {
            s.cart.retain(|l| !l.owned_by(owner));
        }
        Ok(draft.order.clone())
    }

    async fn orders_for(&self, owner: &CartOwner) -> StoreResult<Vec<Order>> {
        let s = self.state.lock().await;
        let found = s.orders.values()
            .filter(|o| match owner {
                CartOwner::User(id) => o.user_id == Some(*id),
                CartOwner::Guest(g) => o.guest_id.as_deref() == Some(g.as_str()),
            })
            .cloned()
            .collect();
        Ok(newest_first(found, |o| (o.created_at, o.id)))
    }

    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        let s = self.state.lock().await;
        Ok(newest_first(s.orders.values().cloned().collect(), |o| (o.created_at, o.id)))
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>> {
        let mut s = self.state.lock().await;
        Ok(s.orders.get_mut(&id).map(|o| {
            o.status = status;
            o.updated_at = Utc::now();
            o.clone()
        }))
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let mut guard = self.state.lock().await;
        let s = &mut *guard;
        let Some(order) = s.orders.remove(&id) else { return Ok(None) };
        for line in &order.products {
            // Products deleted since the order was placed have nothing to restock.
            if let Some(product) = s.products.get_mut(&line.product_id) {
                product.adjust_stock(line.bucket(), line.quantity);
            }
        }
        Ok(Some(order))
    }
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn insert_activity(&self, a: &Activity) -> StoreResult<()> {
        self.state.lock().await.activities.push(a.clone());
        Ok(())
    }

    async fn set_activity_meta(&self, id: Uuid, meta: &ActivityMeta) -> StoreResult<bool> {
        let mut s = self.state.lock().await;
        match s.activities.iter_mut().find(|a| a.id == id) {
            Some(a) => { a.meta = meta.clone(); Ok(true) }
            None => Ok(false),
        }
    }

    async fn list_activities(&self, filter: &EventFilter) -> StoreResult<Vec<Activity>> {
        let s = self.state.lock().await;
        let matching = s.activities.iter().filter(|a| filter.matches(a)).cloned().collect();
        Ok(newest_first(matching, |a| (a.created_at, a.id))
            .into_iter()
            .skip(filter.skip() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    async fn activity_summary(&self) -> StoreResult<ActivitySummary> {
        Ok(activity::summarize(&self.state.lock().await.activities))
    }

    async fn monthly_stats(&self, since: DateTime<Utc>) -> StoreResult<MonthlyStats> {
        Ok(activity::monthly(&self.state.lock().await.activities, since))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let mut s = self.state.lock().await;
        if s.accounts.values().any(|a| a.email == account.email) {
            return Err(Conflict::DuplicateEmail.into());
        }
        s.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let s = self.state.lock().await;
        Ok(s.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn save_account(&self, account: &Account) -> StoreResult<bool> {
        let mut s = self.state.lock().await;
        match s.accounts.get_mut(&account.id) {
            Some(slot) => { *slot = account.clone(); Ok(true) }
            None => Ok(false),
        }
    }

    async fn account_emails(&self) -> StoreResult<Vec<String>> {
        let s = self.state.lock().await;
        Ok(s.accounts.values().map(|a| a.email.clone()).collect())
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn insert_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        self.state.lock().await.campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        let s = self.state.lock().await;
        Ok(newest_first(s.campaigns.values().cloned().collect(), |c| (c.created_at, c.id)))
    }

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        Ok(self.state.lock().await.campaigns.get(&id).cloned())
    }

    async fn mark_campaign_sent(&self, id: Uuid, sent_at: DateTime<Utc>, recipients: i32) -> StoreResult<Option<Campaign>> {
        let mut s = self.state.lock().await;
        Ok(s.campaigns.get_mut(&id).filter(|c| c.sent_at.is_none()).map(|c| {
            c.sent_at = Some(sent_at);
            c.recipient_count = recipients;
            c.clone()
        }))
    }

    async fn clear_campaign_sent(&self, id: Uuid) -> StoreResult<()> {
        if let Some(c) = self.state.lock().await.campaigns.get_mut(&id) {
            c.sent_at = None;
            c.recipient_count = 0;
        }
        Ok(())
    }

    async fn delete_campaign(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.lock().await.campaigns.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{DiscountClaim, OrderLine, PaymentStatus, SizeStock};
    use crate::domain::value_objects::{DiscountCodeValue, Email, HexColor, Size};
    use rust_decimal::Decimal;

    fn product(stock: i32, sizes: Vec<SizeStock>) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::now_v7(), name: "Tee".into(), description: String::new(),
            base_price: Decimal::new(20, 0), discounted_price: Decimal::new(15, 0),
            stock, sizes, warranty: String::new(), images: vec!["t.webp".into()],
            category_id: Uuid::now_v7(), subcategory_ids: vec![], brand_name: "BZ".into(),
            product_code: Uuid::now_v7().to_string(), rating: 4.0, bg_color: HexColor::default(),
            shipping: Decimal::ZERO, payment_methods: vec!["cod".into()],
            is_new_arrival: false, is_best_seller: false, created_at: now, updated_at: now,
        }
    }

    fn draft(lines: Vec<OrderLine>, claim: Option<DiscountClaim>, owner: Option<CartOwner>) -> OrderDraft {
        let now = Utc::now();
        OrderDraft {
            order: Order {
                id: Uuid::now_v7(), user_id: None, guest_id: owner.as_ref().and_then(|o| o.guest_id()).map(str::to_string),
                full_name: "A".into(), order_email: "a@x.com".into(), phone_number: "+923001234567".into(),
                shipping_address: "Lahore".into(), products: lines,
                total_amount: Decimal::ZERO, original_amount: Decimal::ZERO, shipping_amount: Decimal::ZERO,
                discount_applied: claim.is_some(), discount_code: None,
                status: OrderStatus::Pending, payment_status: PaymentStatus::Completed,
                created_at: now, updated_at: now,
            },
            claim, owner,
        }
    }

    fn line(product_id: Uuid, quantity: i32, size: Option<Size>) -> OrderLine {
        OrderLine { product_id, quantity, selected_image: "t.webp".into(), selected_size: size }
    }

    #[tokio::test]
    async fn test_rejected_line_leaves_earlier_lines_untouched() {
        let store = MemoryStore::new();
        let a = product(5, vec![]);
        let b = product(0, vec![SizeStock { size: Size::M, stock: 1 }]);
        store.insert_product(&a).await.unwrap();
        store.insert_product(&b).await.unwrap();

        let err = store.place_order(&draft(vec![line(a.id, 2, None), line(b.id, 2, Some(Size::M))], None, None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(Conflict::InsufficientStock(id)) if id == b.id));
        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock, 5);
        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_product_lines_share_one_counter() {
        let store = MemoryStore::new();
        let a = product(3, vec![]);
        store.insert_product(&a).await.unwrap();
        let err = store.place_order(&draft(vec![line(a.id, 2, None), line(a.id, 2, None)], None, None)).await;
        assert!(err.is_err());
        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_claim_is_single_use_and_cart_cleared() {
        let store = MemoryStore::new();
        let a = product(10, vec![]);
        store.insert_product(&a).await.unwrap();
        let code = DiscountCode::issue(&Email::parse("a@x.com").unwrap(), Utc::now());
        store.issue_discount(&code).await.unwrap();
        let owner = CartOwner::Guest("g-1".into());
        store.add_to_cart(&owner, &CartKey { product_id: a.id, selected_image: "t.webp".into(), selected_size: None }).await.unwrap();

        let claim = DiscountClaim { code: DiscountCodeValue::parse(code.code.as_str()).unwrap(), email: "a@x.com".into() };
        store.place_order(&draft(vec![line(a.id, 1, None)], Some(claim.clone()), Some(owner.clone()))).await.unwrap();
        assert!(store.cart(&owner).await.unwrap().is_empty());

        let again = store.place_order(&draft(vec![line(a.id, 1, None)], Some(claim), None)).await.unwrap_err();
        assert!(matches!(again, StoreError::Conflict(Conflict::DiscountUnavailable)));
        assert_eq!(store.get_product(a.id).await.unwrap().unwrap().stock, 9);
    }

    #[tokio::test]
    async fn test_cart_merge_and_remove() {
        let store = MemoryStore::new();
        let owner = CartOwner::Guest("g-1".into());
        let key = CartKey { product_id: Uuid::now_v7(), selected_image: "t.webp".into(), selected_size: Some(Size::S) };
        store.add_to_cart(&owner, &key).await.unwrap();
        assert_eq!(store.add_to_cart(&owner, &key).await.unwrap().quantity, 2);
        assert!(store.remove_from_cart(&owner, &key).await.unwrap());
        assert!(store.remove_from_cart(&owner, &key).await.unwrap());
        assert!(!store.remove_from_cart(&owner, &key).await.unwrap());
        assert!(store.cart(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_campaign_sent_mark_is_compare_and_set() {
        let store = MemoryStore::new();
        let c = Campaign::create("Hi", "<p>x</p>").unwrap();
        store.insert_campaign(&c).await.unwrap();
        assert!(store.mark_campaign_sent(c.id, Utc::now(), 3).await.unwrap().is_some());
        assert!(store.mark_campaign_sent(c.id, Utc::now(), 3).await.unwrap().is_none());
    }
}
