use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AppError;

/// The catalog carries exactly two recipe categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipeCategory {
    #[serde(rename = "パン")]
    Bread,
    #[serde(rename = "洋菓子")]
    Pastry,
}

impl RecipeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeCategory::Bread => "パン",
            RecipeCategory::Pastry => "洋菓子",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, AppError> {
        match s {
            "パン" => Ok(RecipeCategory::Bread),
            "洋菓子" => Ok(RecipeCategory::Pastry),
            other => Err(AppError::Validation(format!(
                "Invalid category '{}': must be 'パン' or '洋菓子'",
                other
            ))),
        }
    }
}

impl fmt::Display for RecipeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn as_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: RecipeCategory,
    pub difficulty: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbRecipe {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub instructions: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<DbRecipe> for Recipe {
    fn from(row: DbRecipe) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category: RecipeCategory::from_str(&row.category)
                .expect("recipe category is constrained by the schema"),
            difficulty: row.difficulty,
            prep_time: row.prep_time,
            cook_time: row.cook_time,
            servings: row.servings,
            video_url: row.video_url,
            image_url: row.image_url,
            instructions: row.instructions,
            created_at: as_utc(row.created_at),
            updated_at: as_utc(row.updated_at),
        }
    }
}

/// Listing projection: a recipe plus how many ingredient links it owns.
#[derive(Serialize, Deserialize, Clone)]
pub struct RecipeSummary {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub ingredient_count: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbRecipeSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub difficulty: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub instructions: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub ingredient_count: i64,
}

impl From<DbRecipeSummary> for RecipeSummary {
    fn from(row: DbRecipeSummary) -> Self {
        Self {
            recipe: Recipe::from(DbRecipe {
                id: row.id,
                title: row.title,
                description: row.description,
                category: row.category,
                difficulty: row.difficulty,
                prep_time: row.prep_time,
                cook_time: row.cook_time,
                servings: row.servings,
                video_url: row.video_url,
                image_url: row.image_url,
                instructions: row.instructions,
                created_at: row.created_at,
                updated_at: row.updated_at,
            }),
            ingredient_count: row.ingredient_count,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Clone)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub price_per_unit: f64,
    pub image_url: Option<String>,
}

/// One row of a recipe's resolved ingredient list: link quantity/unit
/// joined with the ingredient it points at.
#[derive(sqlx::FromRow, Serialize, Deserialize, Clone)]
pub struct RecipeIngredientDetail {
    pub quantity: f64,
    pub unit: String,
    pub id: i64,
    pub name: String,
    pub price_per_unit: f64,
    pub ingredient_unit: String,
    pub category: String,
    pub image_url: Option<String>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub total_amount: f64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbOrder {
    pub id: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub total_amount: f64,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<DbOrder> for Order {
    fn from(row: DbOrder) -> Self {
        Self {
            id: row.id,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            total_amount: row.total_amount,
            notes: row.notes,
            created_at: as_utc(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Clone)]
pub struct OrderItemDetail {
    pub id: i64,
    pub order_id: i64,
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit_price: f64,
    pub subtotal: f64,
    pub ingredient_name: String,
    pub ingredient_unit: String,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct RecipeIngredientInput {
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
}

pub struct RecipeInput {
    pub title: String,
    pub category: RecipeCategory,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub instructions: Option<String>,
    pub ingredients: Vec<RecipeIngredientInput>,
}

/// Partial update: `None` fields keep their stored value. A supplied
/// ingredients array replaces the whole link set.
#[derive(Default)]
pub struct RecipePatch {
    pub title: Option<String>,
    pub category: Option<RecipeCategory>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub video_url: Option<String>,
    pub image_url: Option<String>,
    pub instructions: Option<String>,
    pub ingredients: Option<Vec<RecipeIngredientInput>>,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct OrderItemInput {
    pub ingredient_id: i64,
    pub quantity: f64,
}

pub struct OrderInput {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<OrderItemInput>,
}
