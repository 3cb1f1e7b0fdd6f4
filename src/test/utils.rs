use crate::auth::{NewUser, Role};
use crate::db::{create_recipe, create_user};
use crate::error::AppError;
use crate::init_rocket;
use crate::models::{RecipeCategory, RecipeIngredientInput, RecipeInput};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();
pub static STANDARD_PASSWORD: &str = "password123";

// Percent-encoded category values for query strings.
pub static BREAD_QUERY: &str = "%E3%83%91%E3%83%B3";
pub static PASTRY_QUERY: &str = "%E6%B4%8B%E8%8F%93%E5%AD%90";

pub struct TestUser {
    pub username: String,
    pub role: Role,
    pub password: String,
}

pub struct TestIngredient {
    pub name: String,
    pub category: String,
    pub unit: String,
    pub price_per_unit: f64,
}

pub struct TestRecipe {
    pub title: String,
    pub category: RecipeCategory,
    pub prep_time: Option<i64>,
    pub ingredients: Vec<(String, f64, String)>,
}

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
    ingredients: Vec<TestIngredient>,
    recipes: Vec<TestRecipe>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customer(mut self, username: &str) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            role: Role::Customer,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub fn admin(mut self, username: &str) -> Self {
        self.users.push(TestUser {
            username: username.to_string(),
            role: Role::Admin,
            password: STANDARD_PASSWORD.to_string(),
        });
        self
    }

    pub fn ingredient(mut self, name: &str, price_per_unit: f64) -> Self {
        self.ingredients.push(TestIngredient {
            name: name.to_string(),
            category: "テスト材料".to_string(),
            unit: "袋".to_string(),
            price_per_unit,
        });
        self
    }

    /// Recipe with a fixed prep_time of 20 minutes so partial-update
    /// tests can assert field retention. Ingredients are referenced by
    /// the name given to `ingredient`.
    pub fn recipe(
        mut self,
        title: &str,
        category: RecipeCategory,
        ingredients: &[(&str, f64)],
    ) -> Self {
        self.recipes.push(TestRecipe {
            title: title.to_string(),
            category,
            prep_time: Some(20),
            ingredients: ingredients
                .iter()
                .map(|(name, quantity)| (name.to_string(), *quantity, "g".to_string()))
                .collect(),
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        // An in-memory SQLite database exists per connection, so the
        // pool is capped at a single connection.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut user_id_map: HashMap<String, i64> = HashMap::new();
        let mut ingredient_id_map: HashMap<String, i64> = HashMap::new();
        let mut recipe_id_map: HashMap<String, i64> = HashMap::new();

        for user in &self.users {
            let user_id = create_user(
                &pool,
                &NewUser {
                    username: user.username.clone(),
                    password: user.password.clone(),
                    business_name: format!("{} Bakery", user.username),
                    business_type: "bakery".to_string(),
                    owner_name: user.username.clone(),
                    email: format!("{}@example.com", user.username),
                    phone: None,
                    address: None,
                    role: user.role.clone(),
                },
            )
            .await?;

            user_id_map.insert(user.username.clone(), user_id);
        }

        for ingredient in &self.ingredients {
            let res = sqlx::query(
                "INSERT INTO ingredients (name, category, unit, price_per_unit)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&ingredient.name)
            .bind(&ingredient.category)
            .bind(&ingredient.unit)
            .bind(ingredient.price_per_unit)
            .execute(&pool)
            .await?;

            ingredient_id_map.insert(ingredient.name.clone(), res.last_insert_rowid());
        }

        for recipe in &self.recipes {
            let ingredients = recipe
                .ingredients
                .iter()
                .map(|(name, quantity, unit)| RecipeIngredientInput {
                    ingredient_id: ingredient_id_map[name],
                    quantity: *quantity,
                    unit: unit.clone(),
                })
                .collect();

            let recipe_id = create_recipe(
                &pool,
                &RecipeInput {
                    title: recipe.title.clone(),
                    category: recipe.category,
                    description: None,
                    difficulty: None,
                    prep_time: recipe.prep_time,
                    cook_time: None,
                    servings: None,
                    video_url: None,
                    image_url: None,
                    instructions: None,
                    ingredients,
                },
            )
            .await?;

            recipe_id_map.insert(recipe.title.clone(), recipe_id);
        }

        Ok(TestDb {
            pool,
            user_id_map,
            ingredient_id_map,
            recipe_id_map,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    pub user_id_map: HashMap<String, i64>,
    pub ingredient_id_map: HashMap<String, i64>,
    pub recipe_id_map: HashMap<String, i64>,
}

impl TestDb {
    pub fn user_id(&self, username: &str) -> Option<i64> {
        self.user_id_map.get(username).copied()
    }

    pub fn ingredient_id(&self, name: &str) -> Option<i64> {
        self.ingredient_id_map.get(name).copied()
    }

    pub fn recipe_id(&self, title: &str) -> Option<i64> {
        self.recipe_id_map.get(title).copied()
    }

    pub async fn recipe_ingredient_count(&self, recipe_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = ?",
        )
        .bind(recipe_id)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn recipe_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn order_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
    }

    pub async fn order_item_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM order_items")
            .fetch_one(&self.pool)
            .await
    }
}

pub async fn create_standard_test_db() -> TestDb {
    TestDbBuilder::new()
        .admin("admin_user")
        .customer("customer_user")
        .ingredient("テスト強力粉", 200.0)
        .ingredient("テストバター", 450.0)
        .recipe("テスト食パン", RecipeCategory::Bread, &[("テスト強力粉", 300.0)])
        .build()
        .await
        .expect("Failed to build test DB")
}

pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
    let client = Client::tracked(init_rocket(test_db.pool.clone()).await)
        .await
        .expect("valid rocket instance");

    (client, test_db)
}

pub async fn login_test_user(client: &Client, username: &str, password: &str) {
    let response = client
        .post("/api/auth/login")
        .header(ContentType::JSON)
        .body(
            json!({
                "username": username,
                "password": password
            })
            .to_string(),
        )
        .dispatch()
        .await;

    assert_eq!(response.status(), Status::Ok, "login failed for {}", username);
}
