use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity, ImageGallery},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("Price must not be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255, message = "Product name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    #[schema(value_type = String, example = "14999.00")]
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock: i32,
    #[validate(length(min = 1, max = 100, message = "Category is required"))]
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    /// Gallery; defaults to the primary image
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    #[validate(custom = "validate_non_negative")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, message = "Stock must not be negative"))]
    pub stock: Option<i32>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub stock: i32,
    pub category: String,
    pub image_url: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            stock: model.stock,
            category: model.category,
            image_url: model.image_url,
            images: model.images.into_inner(),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    /// Exact category name, e.g. `Electronics`
    pub category: Option<String>,
}

fn gallery_or_primary(images: Option<Vec<String>>, image_url: &str) -> ImageGallery {
    match images {
        Some(images) if !images.is_empty() => ImageGallery(images),
        _ if image_url.is_empty() => ImageGallery::default(),
        _ => ImageGallery(vec![image_url.to_string()]),
    }
}

/// Product catalog
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    pub async fn list_products(
        &self,
        filter: ProductFilter,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let mut query = ProductEntity::find();
        if let Some(category) = filter.category.filter(|c| !c.trim().is_empty()) {
            query = query.filter(product::Column::Category.eq(category.trim()));
        }

        let products = query
            .order_by_asc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Name)
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(products.into_iter().map(ProductResponse::from).collect())
    }

    async fn find_model(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    pub async fn get_product(&self, id: Uuid) -> Result<ProductResponse, ServiceError> {
        self.find_model(id).await.map(ProductResponse::from)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;
        let now = Utc::now();
        let images = gallery_or_primary(request.images, &request.image_url);

        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            price: Set(request.price),
            stock: Set(request.stock),
            category: Set(request.category.trim().to_string()),
            image_url: Set(request.image_url),
            images: Set(images),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(ServiceError::db_error)?;

        info!(product_id = %model.id, "product created");
        self.event_sender
            .send_or_log(Event::ProductCreated(model.id))
            .await;
        Ok(model.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;
        let existing = self.find_model(id).await?;
        let mut active = existing.into_active_model();

        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(stock) = request.stock {
            active.stock = Set(stock);
        }
        if let Some(category) = request.category {
            active.category = Set(category.trim().to_string());
        }
        if let Some(image_url) = request.image_url {
            active.image_url = Set(image_url);
        }
        if let Some(images) = request.images {
            active.images = Set(ImageGallery(images));
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(updated.id))
            .await;
        Ok(updated.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = ProductEntity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }

        info!(product_id = %id, "product deleted");
        self.event_sender.send_or_log(Event::ProductDeleted(id)).await;
        Ok(())
    }

    /// Inserts the sample catalog when the product table is empty.
    /// Returns how many products were inserted.
    pub async fn seed_demo_catalog(&self) -> Result<usize, ServiceError> {
        let existing = ProductEntity::find()
            .count(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        if existing > 0 {
            info!(existing, "catalog already populated, skipping demo seed");
            return Ok(0);
        }

        let samples = demo_catalog();
        let inserted = samples.len();
        for sample in samples {
            self.create_product(sample).await?;
        }
        info!(inserted, "seeded demo catalog");
        Ok(inserted)
    }
}

fn demo_product(
    name: &str,
    description: &str,
    price: Decimal,
    stock: i32,
    category: &str,
    image_url: &str,
) -> CreateProductRequest {
    CreateProductRequest {
        name: name.to_string(),
        description: description.to_string(),
        price,
        stock,
        category: category.to_string(),
        image_url: image_url.to_string(),
        images: None,
    }
}

/// Sample products served in demo mode.
pub fn demo_catalog() -> Vec<CreateProductRequest> {
    vec![
        demo_product(
            "Premium Wireless Headphones",
            "High-fidelity audio with active noise cancellation and 30-hour battery life.",
            dec!(14999),
            25,
            "Electronics",
            "https://images.unsplash.com/photo-1505740420928-5e560c06d30e?w=800&q=80",
        ),
        demo_product(
            "Designer Leather Jacket",
            "Genuine leather jacket with a timeless design and modern slim fit.",
            dec!(8999),
            15,
            "Fashion",
            "https://images.unsplash.com/photo-1551028919-ac7f2ca8f2fe?w=800&q=80",
        ),
        demo_product(
            "Smart Fitness Tracker",
            "Track your health metrics, sleep patterns, and workouts with precision.",
            dec!(3499),
            50,
            "Electronics",
            "https://images.unsplash.com/photo-1523275335684-37898b6baf30?w=800&q=80",
        ),
        demo_product(
            "Modern Coffee Table",
            "Minimalist oak wood design suitable for any modern living room.",
            dec!(5499),
            10,
            "Home",
            "https://images.unsplash.com/photo-1532372320572-cda25653a26d?w=800&q=80",
        ),
    ]
}
