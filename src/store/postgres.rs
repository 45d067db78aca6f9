//! PostgreSQL store on `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::*;
use crate::domain::aggregates::activity::{DayStats, EventCount, SUMMARY_TYPE_LIMIT};
use crate::domain::aggregates::{OrderLine, PaymentStatus, Role, SizeStock};
use crate::domain::value_objects::{DiscountCodeValue, HexColor, Size};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn with_sizes(&self, rows: Vec<ProductRow>) -> StoreResult<Vec<Product>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let sizes = sqlx::query_as::<_, SizeRow>("SELECT product_id, size, stock FROM product_sizes WHERE product_id = ANY($1)")
            .bind(&ids).fetch_all(&self.pool).await?;
        let mut by_product: HashMap<Uuid, Vec<SizeStock>> = HashMap::new();
        for s in sizes {
            let size = s.size.parse::<Size>().map_err(|e| StoreError::Corrupt(e.to_string()))?;
            by_product.entry(s.product_id).or_default().push(SizeStock { size, stock: s.stock });
        }
        rows.into_iter().map(|row| {
            let mut sizes = by_product.remove(&row.id).unwrap_or_default();
            sizes.sort_by_key(|s| s.size);
            row.into_product(sizes)
        }).collect()
    }

    async fn with_items(&self, rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id, product_id, quantity, selected_image, selected_size FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position")
            .bind(&ids).fetch_all(&self.pool).await?;
        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for item in items {
            let order_id = item.order_id;
            by_order.entry(order_id).or_default().push(item.into_line()?);
        }
        rows.into_iter().map(|row| {
            let lines = by_order.remove(&row.id).unwrap_or_default();
            row.into_order(lines)
        }).collect()
    }
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation() && db.constraint() == Some(constraint))
}

fn corrupt(what: &str, value: &str) -> StoreError { StoreError::Corrupt(format!("{what}: {value}")) }

#[derive(FromRow)]
struct ProductRow {
    id: Uuid, name: String, description: String, base_price: Decimal, discounted_price: Decimal,
    stock: i32, warranty: String, images: Vec<String>, category_id: Uuid, subcategory_ids: Vec<Uuid>,
    brand_name: String, product_code: String, rating: f64, bg_color: String, shipping: Decimal,
    payment_methods: Vec<String>, is_new_arrival: bool, is_best_seller: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, sizes: Vec<SizeStock>) -> StoreResult<Product> {
        let bg_color = HexColor::parse(&self.bg_color).map_err(|_| corrupt("bg_color", &self.bg_color))?;
        Ok(Product {
            id: self.id, name: self.name, description: self.description,
            base_price: self.base_price, discounted_price: self.discounted_price,
            stock: self.stock, sizes, warranty: self.warranty, images: self.images,
            category_id: self.category_id, subcategory_ids: self.subcategory_ids,
            brand_name: self.brand_name, product_code: self.product_code, rating: self.rating,
            bg_color, shipping: self.shipping, payment_methods: self.payment_methods,
            is_new_arrival: self.is_new_arrival, is_best_seller: self.is_best_seller,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SizeRow { product_id: Uuid, size: String, stock: i32 }

#[derive(FromRow)]
struct CategoryRow { id: Uuid, name: String, parent_id: Option<Uuid>, created_at: DateTime<Utc>, updated_at: DateTime<Utc> }

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Self { id: r.id, name: r.name, parent_id: r.parent_id, created_at: r.created_at, updated_at: r.updated_at }
    }
}

#[derive(FromRow)]
struct ReviewRow { id: Uuid, product_id: Uuid, user_id: Uuid, username: String, rating: i16, comment: String, created_at: DateTime<Utc> }

impl ReviewRow {
    fn into_review(self) -> StoreResult<Review> {
        let rating = u8::try_from(self.rating).map_err(|_| corrupt("rating", &self.rating.to_string()))?;
        Ok(Review { id: self.id, product_id: self.product_id, user_id: self.user_id, username: self.username, rating, comment: self.comment, created_at: self.created_at })
    }
}

#[derive(FromRow)]
struct CartRow {
    id: Uuid, user_id: Option<Uuid>, guest_id: Option<String>, product_id: Uuid, selected_image: String,
    size_key: String, quantity: i32, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl CartRow {
    fn into_line(self) -> StoreResult<CartLine> {
        let selected_size = match self.size_key.as_str() {
            "" => None,
            raw => Some(raw.parse::<Size>().map_err(|_| corrupt("size", raw))?),
        };
        Ok(CartLine {
            id: self.id, user_id: self.user_id, guest_id: self.guest_id, product_id: self.product_id,
            selected_image: self.selected_image, selected_size, quantity: self.quantity,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

fn size_key(key: &CartKey) -> &'static str { key.selected_size.map_or("", |s| s.as_str()) }

#[derive(FromRow)]
struct DiscountRow { id: Uuid, email: String, code: String, is_used: bool, created_at: DateTime<Utc>, expires_at: DateTime<Utc> }

impl DiscountRow {
    fn into_code(self) -> StoreResult<DiscountCode> {
        let code = DiscountCodeValue::parse(&self.code).map_err(|_| corrupt("discount code", &self.code))?;
        Ok(DiscountCode { id: self.id, email: self.email, code, is_used: self.is_used, created_at: self.created_at, expires_at: self.expires_at })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid, user_id: Option<Uuid>, guest_id: Option<String>, full_name: String, order_email: String,
    phone_number: String, shipping_address: String, total_amount: Decimal, original_amount: Decimal,
    shipping_amount: Decimal, discount_applied: bool, discount_code: Option<String>, status: String,
    payment_status: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, products: Vec<OrderLine>) -> StoreResult<Order> {
        let status: OrderStatus = self.status.parse().map_err(|_| corrupt("order status", &self.status))?;
        let payment_status: PaymentStatus = self.payment_status.parse().map_err(|_| corrupt("payment status", &self.payment_status))?;
        Ok(Order {
            id: self.id, user_id: self.user_id, guest_id: self.guest_id, full_name: self.full_name,
            order_email: self.order_email, phone_number: self.phone_number, shipping_address: self.shipping_address,
            products, total_amount: self.total_amount, original_amount: self.original_amount,
            shipping_amount: self.shipping_amount, discount_applied: self.discount_applied,
            discount_code: self.discount_code, status, payment_status,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderItemRow { order_id: Uuid, product_id: Uuid, quantity: i32, selected_image: String, selected_size: Option<String> }

impl OrderItemRow {
    fn into_line(self) -> StoreResult<OrderLine> {
        let selected_size = match self.selected_size.as_deref() {
            Some(raw) => Some(raw.parse::<Size>().map_err(|_| corrupt("size", raw))?),
            None => None,
        };
        Ok(OrderLine { product_id: self.product_id, quantity: self.quantity, selected_image: self.selected_image, selected_size })
    }
}

#[derive(FromRow)]
struct ActivityRow {
    id: Uuid, user_id: Option<Uuid>, guest_id: Option<String>, user_display: Option<String>,
    session_id: Option<String>, event_type: String, url: Option<String>, element: Option<String>,
    data: Json<Value>, duration_ms: Option<i64>, meta: Json<ActivityMeta>, created_at: DateTime<Utc>,
}

impl From<ActivityRow> for Activity {
    fn from(r: ActivityRow) -> Self {
        Self {
            id: r.id, user_id: r.user_id, guest_id: r.guest_id, user_display: r.user_display,
            session_id: r.session_id, event_type: r.event_type, url: r.url, element: r.element,
            data: r.data.0, duration_ms: r.duration_ms, meta: r.meta.0, created_at: r.created_at,
        }
    }
}

#[derive(FromRow)]
struct AccountRow {
    id: Uuid, username: String, email: String, password_hash: String, role: String,
    otp: Option<String>, otp_expires_at: Option<DateTime<Utc>>, verified: bool,
    created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> StoreResult<Account> {
        let role: Role = self.role.parse().map_err(|_| corrupt("role", &self.role))?;
        Ok(Account {
            id: self.id, username: self.username, email: self.email, password_hash: self.password_hash,
            role, otp: self.otp, otp_expires_at: self.otp_expires_at, verified: self.verified,
            created_at: self.created_at, updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CampaignRow { id: Uuid, subject: String, body: String, created_at: DateTime<Utc>, sent_at: Option<DateTime<Utc>>, recipient_count: i32 }

impl From<CampaignRow> for Campaign {
    fn from(r: CampaignRow) -> Self {
        Self { id: r.id, subject: r.subject, body: r.body, created_at: r.created_at, sent_at: r.sent_at, recipient_count: r.recipient_count }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, base_price, discounted_price, stock, warranty, images, category_id, subcategory_ids, brand_name, product_code, rating, bg_color, shipping, payment_methods, is_new_arrival, is_best_seller, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, guest_id, full_name, order_email, phone_number, shipping_address, total_amount, original_amount, shipping_amount, discount_applied, discount_code, status, payment_status, created_at, updated_at";
const CART_COLUMNS: &str = "id, user_id, guest_id, product_id, selected_image, size_key, quantity, created_at, updated_at";
const ACTIVITY_COLUMNS: &str = "id, user_id, guest_id, user_display, session_id, event_type, url, element, data, duration_ms, meta, created_at";
const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, role, otp, otp_expires_at, verified, created_at, updated_at";

async fn write_sizes(tx: &mut Transaction<'_, Postgres>, product: &Product) -> StoreResult<()> {
    sqlx::query("DELETE FROM product_sizes WHERE product_id = $1").bind(product.id).execute(&mut **tx).await?;
    for s in &product.sizes {
        sqlx::query("INSERT INTO product_sizes (product_id, size, stock) VALUES ($1, $2, $3)")
            .bind(product.id).bind(s.size.as_str()).bind(s.stock)
            .execute(&mut **tx).await?;
    }
    Ok(())
}

/// Signed stock change on the line's bucket; a decrement only applies while enough stock remains.
async fn shift_stock(tx: &mut Transaction<'_, Postgres>, line: &OrderLine, delta: i32) -> StoreResult<u64> {
    let result = match line.selected_size {
        Some(size) => sqlx::query("UPDATE product_sizes SET stock = stock + $3 WHERE product_id = $1 AND size = $2 AND stock + $3 >= 0")
            .bind(line.product_id).bind(size.as_str()).bind(delta)
            .execute(&mut **tx).await?,
        None => sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 AND stock + $2 >= 0")
            .bind(line.product_id).bind(delta)
            .execute(&mut **tx).await?,
    };
    Ok(result.rows_affected())
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC"))
            .fetch_all(&self.pool).await?;
        self.with_sizes(rows).await
    }

    async fn get_product(&self, id: Uuid) -> StoreResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.with_sizes(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn products_in_category(&self, category_id: Uuid) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE category_id = $1 OR $1 = ANY(subcategory_ids) ORDER BY created_at DESC"))
            .bind(category_id).fetch_all(&self.pool).await?;
        self.with_sizes(rows).await
    }

    async fn insert_product(&self, p: &Product) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"))
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.base_price).bind(p.discounted_price)
            .bind(p.stock).bind(&p.warranty).bind(&p.images).bind(p.category_id).bind(&p.subcategory_ids)
            .bind(&p.brand_name).bind(&p.product_code).bind(p.rating).bind(p.bg_color.as_str()).bind(p.shipping)
            .bind(&p.payment_methods).bind(p.is_new_arrival).bind(p.is_best_seller).bind(p.created_at).bind(p.updated_at)
            .execute(&mut *tx).await;
        if let Err(e) = inserted {
            if is_unique_violation(&e, "products_product_code_key") {
                return Err(Conflict::DuplicateProductCode(p.product_code.clone()).into());
            }
            return Err(e.into());
        }
        write_sizes(&mut tx, p).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_product(&self, p: &Product, counters: CounterWrites) -> StoreResult<Option<Product>> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE products SET name = $2, description = $3, base_price = $4, discounted_price = $5, \
             stock = CASE WHEN $20 THEN $6 ELSE stock END, warranty = $7, images = $8, category_id = $9, \
             subcategory_ids = $10, brand_name = $11, product_code = $12, rating = CASE WHEN $21 THEN $13 ELSE rating END, \
             bg_color = $14, shipping = $15, payment_methods = $16, is_new_arrival = $17, is_best_seller = $18, updated_at = $19 \
             WHERE id = $1")
            .bind(p.id).bind(&p.name).bind(&p.description).bind(p.base_price).bind(p.discounted_price)
            .bind(p.stock).bind(&p.warranty).bind(&p.images).bind(p.category_id).bind(&p.subcategory_ids)
            .bind(&p.brand_name).bind(&p.product_code).bind(p.rating).bind(p.bg_color.as_str()).bind(p.shipping)
            .bind(&p.payment_methods).bind(p.is_new_arrival).bind(p.is_best_seller).bind(p.updated_at)
            .bind(counters.stock).bind(counters.rating)
            .execute(&mut *tx).await;
        let affected = match updated {
            Ok(r) => r.rows_affected(),
            Err(e) if is_unique_violation(&e, "products_product_code_key") => {
                return Err(Conflict::DuplicateProductCode(p.product_code.clone()).into());
            }
            Err(e) => return Err(e.into()),
        };
        if affected == 0 { return Ok(None); }
        if counters.sizes {
            write_sizes(&mut tx, p).await?;
        }
        tx.commit().await?;
        self.get_product(p.id).await
    }

    async fn delete_product(&self, id: Uuid) -> StoreResult<bool> {
        // cart_lines, reviews and product_sizes cascade.
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>("SELECT id, name, parent_id, created_at, updated_at FROM categories ORDER BY name")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn get_category(&self, id: Uuid) -> StoreResult<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT id, name, parent_id, created_at, updated_at FROM categories WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn insert_category(&self, c: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, parent_id, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(c.id).bind(&c.name).bind(c.parent_id).bind(c.created_at).bind(c.updated_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_category(&self, c: &Category) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE categories SET name = $2, parent_id = $3, updated_at = $4 WHERE id = $1")
            .bind(c.id).bind(&c.name).bind(c.parent_id).bind(c.updated_at)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_category(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_subcategories(&self, id: Uuid) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories WHERE parent_id = $1").bind(id).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn insert_review(&self, r: &Review) -> StoreResult<f64> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query("INSERT INTO reviews (id, product_id, user_id, username, rating, comment, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(r.id).bind(r.product_id).bind(r.user_id).bind(&r.username).bind(i16::from(r.rating)).bind(&r.comment).bind(r.created_at)
            .execute(&mut *tx).await;
        match inserted {
            Err(e) if is_unique_violation(&e, "reviews_product_id_user_id_key") => return Err(Conflict::AlreadyReviewed.into()),
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        let (mean,): (f64,) = sqlx::query_as(
            "UPDATE products SET rating = (SELECT AVG(rating)::float8 FROM reviews WHERE product_id = $1), updated_at = NOW() WHERE id = $1 RETURNING rating")
            .bind(r.product_id).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(mean)
    }

    async fn list_reviews(&self, product_id: Uuid) -> StoreResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT id, product_id, user_id, username, rating, comment, created_at FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(ReviewRow::into_review).collect()
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart(&self, owner: &CartOwner) -> StoreResult<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartRow>(&format!("SELECT {CART_COLUMNS} FROM cart_lines WHERE owner_key = $1 ORDER BY created_at DESC"))
            .bind(owner.key()).fetch_all(&self.pool).await?;
        rows.into_iter().map(CartRow::into_line).collect()
    }

    async fn add_to_cart(&self, owner: &CartOwner, key: &CartKey) -> StoreResult<CartLine> {
        let row = sqlx::query_as::<_, CartRow>(&format!(
            "INSERT INTO cart_lines (id, owner_key, user_id, guest_id, product_id, selected_image, size_key, quantity) VALUES ($1, $2, $3, $4, $5, $6, $7, 1) \
             ON CONFLICT (owner_key, product_id, selected_image, size_key) DO UPDATE SET quantity = cart_lines.quantity + 1, updated_at = NOW() \
             RETURNING {CART_COLUMNS}"))
            .bind(Uuid::now_v7()).bind(owner.key()).bind(owner.user_id()).bind(owner.guest_id())
            .bind(key.product_id).bind(&key.selected_image).bind(size_key(key))
            .fetch_one(&self.pool).await?;
        row.into_line()
    }

    async fn remove_from_cart(&self, owner: &CartOwner, key: &CartKey) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let quantity: Option<(i32,)> = sqlx::query_as(
            "SELECT quantity FROM cart_lines WHERE owner_key = $1 AND product_id = $2 AND selected_image = $3 AND size_key = $4 FOR UPDATE")
            .bind(owner.key()).bind(key.product_id).bind(&key.selected_image).bind(size_key(key))
            .fetch_optional(&mut *tx).await?;
        let Some((quantity,)) = quantity else { return Ok(false) };
        let sql = if quantity > 1 {
            "UPDATE cart_lines SET quantity = quantity - 1, updated_at = NOW() WHERE owner_key = $1 AND product_id = $2 AND selected_image = $3 AND size_key = $4"
        } else {
            "DELETE FROM cart_lines WHERE owner_key = $1 AND product_id = $2 AND selected_image = $3 AND size_key = $4"
        };
        sqlx::query(sql).bind(owner.key()).bind(key.product_id).bind(&key.selected_image).bind(size_key(key))
            .execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn clear_cart(&self, owner: &CartOwner) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE owner_key = $1").bind(owner.key()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DiscountStore for PgStore {
    async fn issue_discount(&self, d: &DiscountCode) -> StoreResult<()> {
        let inserted = sqlx::query("INSERT INTO discount_codes (id, email, code, is_used, created_at, expires_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(d.id).bind(&d.email).bind(d.code.as_str()).bind(d.is_used).bind(d.created_at).bind(d.expires_at)
            .execute(&self.pool).await;
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e, "discount_codes_email_key") => Err(Conflict::AlreadySubscribed.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_discount(&self, code: &str, email: &str) -> StoreResult<Option<DiscountCode>> {
        let row = sqlx::query_as::<_, DiscountRow>("SELECT id, email, code, is_used, created_at, expires_at FROM discount_codes WHERE code = $1 AND email = $2")
            .bind(code).bind(email).fetch_optional(&self.pool).await?;
        row.map(DiscountRow::into_code).transpose()
    }

    async fn purge_expired_discounts(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM discount_codes WHERE expires_at < $1").bind(now).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, draft: &OrderDraft) -> StoreResult<Order> {
        let o = &draft.order;
        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        if let Some(claim) = &draft.claim {
            let claimed = sqlx::query("UPDATE discount_codes SET is_used = TRUE WHERE code = $1 AND email = $2 AND NOT is_used AND expires_at > NOW()")
                .bind(claim.code.as_str()).bind(&claim.email)
                .execute(&mut *tx).await?;
            if claimed.rows_affected() == 0 { return Err(Conflict::DiscountUnavailable.into()); }
        }

        for line in &o.products {
            if shift_stock(&mut tx, line, -line.quantity).await? == 0 {
                return Err(Conflict::InsufficientStock(line.product_id).into());
            }
        }

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"))
            .bind(o.id).bind(o.user_id).bind(&o.guest_id).bind(&o.full_name).bind(&o.order_email)
            .bind(&o.phone_number).bind(&o.shipping_address).bind(o.total_amount).bind(o.original_amount)
            .bind(o.shipping_amount).bind(o.discount_applied).bind(&o.discount_code)
            .bind(o.status.as_str()).bind(o.payment_status.as_str()).bind(o.created_at).bind(o.updated_at)
            .execute(&mut *tx).await?;
        for (position, line) in o.products.iter().enumerate() {
            sqlx::query("INSERT INTO order_items (order_id, position, product_id, quantity, selected_image, selected_size) VALUES ($1, $2, $3, $4, $5, $6)")
                .bind(o.id).bind(position as i32).bind(line.product_id).bind(line.quantity)
                .bind(&line.selected_image).bind(line.selected_size.map(|s| s.as_str()))
                .execute(&mut *tx).await?;
        }

        if let Some(owner) = &draft.owner {
            sqlx::query("DELETE FROM cart_lines WHERE owner_key = $1").bind(owner.key()).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(o.clone())
    }

    async fn orders_for(&self, owner: &CartOwner) -> StoreResult<Vec<Order>> {
        let rows = match owner {
            CartOwner::User(id) => sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"))
                .bind(*id).fetch_all(&self.pool).await?,
            CartOwner::Guest(guest) => sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE guest_id = $1 ORDER BY created_at DESC"))
                .bind(guest).fetch_all(&self.pool).await?,
        };
        self.with_items(rows).await
    }

    async fn list_orders(&self) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"))
            .fetch_all(&self.pool).await?;
        self.with_items(rows).await
    }

    async fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus) -> StoreResult<Option<Order>> {
        let updated = sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id).bind(status.as_str()).execute(&self.pool).await?;
        if updated.rows_affected() == 0 { return Ok(None); }
        self.get_order(id).await
    }

    async fn delete_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let Some(order) = self.get_order(id).await? else { return Ok(None) };
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&mut *tx).await?;
        if deleted.rows_affected() == 0 { return Ok(None); }
        for line in &order.products {
            // A product deleted since then simply has nothing to restock.
            shift_stock(&mut tx, line, line.quantity).await?;
        }
        tx.commit().await?;
        Ok(Some(order))
    }
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn insert_activity(&self, a: &Activity) -> StoreResult<()> {
        sqlx::query(&format!("INSERT INTO activities ({ACTIVITY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"))
            .bind(a.id).bind(a.user_id).bind(&a.guest_id).bind(&a.user_display).bind(&a.session_id)
            .bind(&a.event_type).bind(&a.url).bind(&a.element).bind(Json(&a.data)).bind(a.duration_ms)
            .bind(Json(&a.meta)).bind(a.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn set_activity_meta(&self, id: Uuid, meta: &ActivityMeta) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE activities SET meta = $2 WHERE id = $1").bind(id).bind(Json(meta)).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_activities(&self, f: &EventFilter) -> StoreResult<Vec<Activity>> {
        let rows = sqlx::query_as::<_, ActivityRow>(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM activities \
             WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR event_type = $2) \
               AND ($3::timestamptz IS NULL OR created_at >= $3) AND ($4::timestamptz IS NULL OR created_at <= $4) \
             ORDER BY created_at DESC LIMIT $5 OFFSET $6"))
            .bind(f.user_id).bind(&f.event_type).bind(f.start).bind(f.end).bind(f.limit()).bind(f.skip())
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Activity::from).collect())
    }

    async fn activity_summary(&self) -> StoreResult<ActivitySummary> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT event_type, COUNT(*) FROM activities GROUP BY event_type ORDER BY COUNT(*) DESC, event_type LIMIT $1")
            .bind(SUMMARY_TYPE_LIMIT as i64).fetch_all(&self.pool).await?;
        let (unique_users,): (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT user_id) FROM activities WHERE user_id IS NOT NULL")
            .fetch_one(&self.pool).await?;
        let (avg, samples): (Option<f64>, i64) = sqlx::query_as(
            "SELECT AVG(duration_ms)::float8, COUNT(duration_ms) FROM activities WHERE event_type = 'session_end' AND duration_ms IS NOT NULL")
            .fetch_one(&self.pool).await?;
        Ok(ActivitySummary {
            counts_by_type: counts.into_iter().map(|(event_type, count)| EventCount { event_type, count }).collect(),
            unique_users,
            avg_session_duration_ms: avg.unwrap_or(0.0),
            session_samples: samples,
        })
    }

    async fn monthly_stats(&self, since: DateTime<Utc>) -> StoreResult<MonthlyStats> {
        let rows: Vec<(String, i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT to_char(created_at AT TIME ZONE 'UTC', 'YYYY-MM-DD') AS day, \
                    COUNT(*) FILTER (WHERE event_type = 'page_view'), \
                    COUNT(*) FILTER (WHERE event_type = 'add_to_cart'), \
                    COUNT(*) FILTER (WHERE event_type = 'order_placed'), \
                    COUNT(DISTINCT session_id) FILTER (WHERE event_type = 'page_view') \
             FROM activities WHERE created_at >= $1 GROUP BY day")
            .bind(since).fetch_all(&self.pool).await?;
        let by_day: BTreeMap<String, DayStats> = rows.into_iter()
            .map(|(day, page_view, add_to_cart, order_placed, visitors)| (day, DayStats { page_view, add_to_cart, order_placed, visitors }))
            .collect();
        Ok(MonthlyStats::from_days(by_day))
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, a: &Account) -> StoreResult<()> {
        let inserted = sqlx::query(&format!("INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"))
            .bind(a.id).bind(&a.username).bind(&a.email).bind(&a.password_hash).bind(a.role.as_str())
            .bind(&a.otp).bind(a.otp_expires_at).bind(a.verified).bind(a.created_at).bind(a.updated_at)
            .execute(&self.pool).await;
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e, "accounts_email_key") => Err(Conflict::DuplicateEmail.into()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"))
            .bind(email).fetch_optional(&self.pool).await?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn save_account(&self, a: &Account) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE accounts SET username = $2, password_hash = $3, role = $4, otp = $5, otp_expires_at = $6, verified = $7, updated_at = $8 WHERE id = $1")
            .bind(a.id).bind(&a.username).bind(&a.password_hash).bind(a.role.as_str())
            .bind(&a.otp).bind(a.otp_expires_at).bind(a.verified).bind(a.updated_at)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn account_emails(&self) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT email FROM accounts ORDER BY created_at").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }
}

#[async_trait]
impl CampaignStore for PgStore {
    async fn insert_campaign(&self, c: &Campaign) -> StoreResult<()> {
        sqlx::query("INSERT INTO campaigns (id, subject, body, created_at, sent_at, recipient_count) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id).bind(&c.subject).bind(&c.body).bind(c.created_at).bind(c.sent_at).bind(c.recipient_count)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn list_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        let rows = sqlx::query_as::<_, CampaignRow>("SELECT id, subject, body, created_at, sent_at, recipient_count FROM campaigns ORDER BY created_at DESC")
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    async fn get_campaign(&self, id: Uuid) -> StoreResult<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>("SELECT id, subject, body, created_at, sent_at, recipient_count FROM campaigns WHERE id = $1")
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Campaign::from))
    }

    async fn mark_campaign_sent(&self, id: Uuid, sent_at: DateTime<Utc>, recipients: i32) -> StoreResult<Option<Campaign>> {
        let row = sqlx::query_as::<_, CampaignRow>(
            "UPDATE campaigns SET sent_at = $2, recipient_count = $3 WHERE id = $1 AND sent_at IS NULL \
             RETURNING id, subject, body, created_at, sent_at, recipient_count")
            .bind(id).bind(sent_at).bind(recipients).fetch_optional(&self.pool).await?;
        Ok(row.map(Campaign::from))
    }

    async fn clear_campaign_sent(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE campaigns SET sent_at = NULL, recipient_count = 0 WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_campaign(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
