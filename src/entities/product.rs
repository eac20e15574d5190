use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Query;
use sea_orm::{ConnectionTrait, FromJsonQueryResult, FromQueryResult, Statement};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

/// Ordered gallery image URLs, stored as a JSON array column.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct ImageGallery(pub Vec<String>);

impl ImageGallery {
    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ImageGallery {
    fn from(images: Vec<String>) -> Self {
        ImageGallery(images)
    }
}

/// Product entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    /// Units on hand; guarded updates keep it non-negative.
    pub stock: i32,
    pub category: String,
    /// Primary image
    pub image_url: String,
    #[sea_orm(column_type = "Json")]
    pub images: ImageGallery,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, FromQueryResult)]
struct GalleryRow {
    id: Uuid,
    image_url: String,
    images: Option<String>,
}

/// Decides the canonical gallery for a stored `images` value.
///
/// Returns `None` when the stored value is already a JSON array of strings.
/// Strings holding a serialized array are unpacked; anything else falls back
/// to the primary image.
pub fn normalize_gallery(raw: Option<&str>, image_url: &str) -> Option<Vec<String>> {
    let fallback = || {
        if image_url.trim().is_empty() {
            Vec::new()
        } else {
            vec![image_url.to_string()]
        }
    };

    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Some(fallback());
    };

    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Array(items)) if items.iter().all(JsonValue::is_string) => None,
        Ok(JsonValue::String(inner)) => {
            Some(serde_json::from_str::<Vec<String>>(&inner).unwrap_or_else(|_| fallback()))
        }
        _ => Some(fallback()),
    }
}

/// Rewrites legacy gallery values into JSON arrays.
///
/// Returns the number of rows rewritten. Safe to run repeatedly.
pub async fn backfill_legacy_galleries<C: ConnectionTrait>(conn: &C) -> Result<u64, DbErr> {
    let backend = conn.get_database_backend();
    let rows = GalleryRow::find_by_statement(Statement::from_string(
        backend,
        "SELECT id, image_url, CAST(images AS TEXT) AS images FROM products".to_owned(),
    ))
    .all(conn)
    .await?;

    let mut rewritten = 0;
    for row in rows {
        let Some(gallery) = normalize_gallery(row.images.as_deref(), &row.image_url) else {
            continue;
        };
        debug!(product_id = %row.id, images = gallery.len(), "Rewriting legacy gallery");

        let update = Query::update()
            .table(Entity)
            .value(Column::Images, JsonValue::from(gallery))
            .and_where(Column::Id.eq(row.id))
            .to_owned();
        conn.execute(backend.build(&update)).await?;
        rewritten += 1;
    }

    if rewritten > 0 {
        info!(rewritten, "Normalized legacy product galleries");
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_arrays_are_left_alone() {
        assert_eq!(normalize_gallery(Some(r#"["a.jpg","b.jpg"]"#), "a.jpg"), None);
        assert_eq!(normalize_gallery(Some("[]"), "a.jpg"), None);
    }

    #[test]
    fn serialized_string_arrays_are_unpacked() {
        assert_eq!(
            normalize_gallery(Some(r#""[\"a.jpg\",\"b.jpg\"]""#), "x.jpg"),
            Some(vec!["a.jpg".to_string(), "b.jpg".to_string()])
        );
    }

    #[test]
    fn unparsable_values_fall_back_to_primary_image() {
        assert_eq!(
            normalize_gallery(Some("a.jpg, b.jpg"), "main.jpg"),
            Some(vec!["main.jpg".to_string()])
        );
        assert_eq!(
            normalize_gallery(Some(r#""not json""#), "main.jpg"),
            Some(vec!["main.jpg".to_string()])
        );
        assert_eq!(
            normalize_gallery(Some("[1,2]"), "main.jpg"),
            Some(vec!["main.jpg".to_string()])
        );
        assert_eq!(normalize_gallery(None, ""), Some(vec![]));
    }
}
