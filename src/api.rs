use chrono::Utc;
use rocket::State;
use rocket::http::{Cookie, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use validator::Validate;

use crate::auth::{NewUser, Permission, Role, TlsState, User, UserSession};
use crate::db::{
    authenticate_user, create_order, create_recipe, create_user, create_user_session,
    delete_recipe, get_ingredient, get_order, get_order_items, get_recipe,
    get_recipe_ingredients, get_users_by_role, invalidate_session, list_ingredients,
    list_orders, list_recipes, update_recipe,
};
use crate::error::AppError;
use crate::models::{
    Ingredient, Order, OrderInput, OrderItemDetail, OrderItemInput, Recipe, RecipeCategory,
    RecipeIngredientDetail, RecipeIngredientInput, RecipeInput, RecipePatch, RecipeSummary,
};
use crate::validation::{AppErrorExt, JsonValidateExt, ValidationResponse};

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub username: String,
    pub business_name: String,
    pub business_type: String,
    pub owner_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            business_name: user.business_name,
            business_type: user.business_type,
            owner_name: user.owner_name,
            email: user.email,
            phone: user.phone,
            address: user.address,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// =====================================
// Recipes
// =====================================

#[derive(Serialize, Deserialize)]
pub struct RecipesResponse {
    pub recipes: Vec<RecipeSummary>,
}

#[get("/recipes?<category>")]
pub async fn api_list_recipes(
    category: Option<String>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RecipesResponse>, AppError> {
    let recipes = list_recipes(db, category.as_deref()).await?;

    Ok(Json(RecipesResponse { recipes }))
}

#[derive(Serialize, Deserialize)]
pub struct RecipeDetailResponse {
    pub recipe: Recipe,
    pub ingredients: Vec<RecipeIngredientDetail>,
}

#[get("/recipes/<id>")]
pub async fn api_get_recipe(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RecipeDetailResponse>, AppError> {
    let recipe = get_recipe(db, id).await?;
    let ingredients = get_recipe_ingredients(db, id).await?;

    Ok(Json(RecipeDetailResponse {
        recipe,
        ingredients,
    }))
}

#[derive(Deserialize)]
pub struct CreateRecipeRequest {
    title: Option<String>,
    category: Option<String>,
    description: Option<String>,
    difficulty: Option<String>,
    prep_time: Option<i64>,
    cook_time: Option<i64>,
    servings: Option<i64>,
    video_url: Option<String>,
    image_url: Option<String>,
    instructions: Option<String>,
    #[serde(default)]
    ingredients: Vec<RecipeIngredientInput>,
}

impl CreateRecipeRequest {
    fn into_input(self) -> Result<RecipeInput, AppError> {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Recipe title is required".to_string()))?;

        let category = self
            .category
            .ok_or_else(|| AppError::Validation("Recipe category is required".to_string()))?;
        let category = RecipeCategory::from_str(&category)?;

        Ok(RecipeInput {
            title,
            category,
            description: self.description,
            difficulty: self.difficulty,
            prep_time: self.prep_time,
            cook_time: self.cook_time,
            servings: self.servings,
            video_url: self.video_url,
            image_url: self.image_url,
            instructions: self.instructions,
            ingredients: self.ingredients,
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct CreateRecipeResponse {
    pub message: String,
    pub recipe_id: i64,
}

#[post("/recipes", data = "<recipe>")]
pub async fn api_create_recipe(
    recipe: Json<CreateRecipeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<CreateRecipeResponse>>, AppError> {
    user.require_permission(Permission::ManageRecipes)?;

    let input = recipe.into_inner().into_input()?;
    let recipe_id = create_recipe(db, &input).await?;

    Ok(Custom(
        Status::Created,
        Json(CreateRecipeResponse {
            message: "Recipe created successfully".to_string(),
            recipe_id,
        }),
    ))
}

#[derive(Deserialize)]
pub struct UpdateRecipeRequest {
    title: Option<String>,
    category: Option<String>,
    description: Option<String>,
    difficulty: Option<String>,
    prep_time: Option<i64>,
    cook_time: Option<i64>,
    servings: Option<i64>,
    video_url: Option<String>,
    image_url: Option<String>,
    instructions: Option<String>,
    ingredients: Option<Vec<RecipeIngredientInput>>,
}

#[put("/recipes/<id>", data = "<recipe>")]
pub async fn api_update_recipe(
    id: i64,
    recipe: Json<UpdateRecipeRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageRecipes)?;

    let request = recipe.into_inner();
    let category = request
        .category
        .as_deref()
        .map(RecipeCategory::from_str)
        .transpose()?;

    let patch = RecipePatch {
        title: request.title,
        category,
        description: request.description,
        difficulty: request.difficulty,
        prep_time: request.prep_time,
        cook_time: request.cook_time,
        servings: request.servings,
        video_url: request.video_url,
        image_url: request.image_url,
        instructions: request.instructions,
        ingredients: request.ingredients,
    };

    update_recipe(db, id, &patch).await?;

    Ok(Json(MessageResponse {
        message: "Recipe updated successfully".to_string(),
    }))
}

#[delete("/recipes/<id>")]
pub async fn api_delete_recipe(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageRecipes)?;

    delete_recipe(db, id).await?;

    Ok(Json(MessageResponse {
        message: "Recipe deleted successfully".to_string(),
    }))
}

// =====================================
// Ingredients
// =====================================

#[derive(Serialize, Deserialize)]
pub struct IngredientsResponse {
    pub ingredients: Vec<Ingredient>,
}

#[get("/ingredients?<category>")]
pub async fn api_list_ingredients(
    category: Option<String>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<IngredientsResponse>, AppError> {
    let ingredients = list_ingredients(db, category.as_deref()).await?;

    Ok(Json(IngredientsResponse { ingredients }))
}

#[derive(Serialize, Deserialize)]
pub struct IngredientResponse {
    pub ingredient: Ingredient,
}

#[get("/ingredients/<id>")]
pub async fn api_get_ingredient(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<IngredientResponse>, AppError> {
    let ingredient = get_ingredient(db, id).await?;

    Ok(Json(IngredientResponse { ingredient }))
}

// =====================================
// Orders
// =====================================

#[derive(Deserialize, Validate)]
pub struct CreateOrderRequest {
    customer_name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    customer_email: Option<String>,
    customer_phone: Option<String>,
    items: Option<Vec<OrderItemInput>>,
    notes: Option<String>,
}

impl CreateOrderRequest {
    fn into_input(self) -> Result<OrderInput, AppError> {
        let customer_name = self
            .customer_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Missing required fields".to_string()))?;

        let customer_email = self
            .customer_email
            .filter(|email| !email.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Missing required fields".to_string()))?;

        let items = self.items.unwrap_or_default();
        if items.is_empty() {
            return Err(AppError::Validation(
                "Order must contain at least one item".to_string(),
            ));
        }

        Ok(OrderInput {
            customer_name,
            customer_email,
            customer_phone: self.customer_phone,
            notes: self.notes,
            items,
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct OrderCreatedResponse {
    pub message: String,
    pub order_id: i64,
    pub total_amount: f64,
}

#[post("/orders", data = "<order>")]
pub async fn api_create_order(
    order: Json<CreateOrderRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<OrderCreatedResponse>>, Custom<Json<ValidationResponse>>> {
    let validated = order.validate_custom()?;
    let input = validated.into_input().validate_custom()?;

    let (order_id, total_amount) = create_order(db, &input).await.validate_custom()?;

    Ok(Custom(
        Status::Created,
        Json(OrderCreatedResponse {
            message: "Order created successfully".to_string(),
            order_id,
            total_amount,
        }),
    ))
}

#[derive(Serialize, Deserialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

#[get("/orders")]
pub async fn api_list_orders(db: &State<Pool<Sqlite>>) -> Result<Json<OrdersResponse>, AppError> {
    let orders = list_orders(db).await?;

    Ok(Json(OrdersResponse { orders }))
}

#[derive(Serialize, Deserialize)]
pub struct OrderDetailResponse {
    pub order: Order,
    pub items: Vec<OrderItemDetail>,
}

#[get("/orders/<id>")]
pub async fn api_get_order(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    let order = get_order(db, id).await?;
    let items = get_order_items(db, id).await?;

    Ok(Json(OrderDetailResponse { order, items }))
}

// =====================================
// Auth
// =====================================

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserData,
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &rocket::http::CookieJar<'_>,
    tls: TlsState,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<LoginResponse>, Custom<Json<ValidationResponse>>> {
    let validated = login.validate_custom()?;

    match authenticate_user(db, &validated.username, &validated.password)
        .await
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::days(UserSession::LIFETIME_DAYS);

            create_user_session(db, user.id, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .path("/")
                .same_site(SameSite::Lax)
                .http_only(true)
                .secure(tls.0)
                .max_age(rocket::time::Duration::days(UserSession::LIFETIME_DAYS));
            cookies.add_private(cookie);

            Ok(Json(LoginResponse {
                user: UserData::from(user),
            }))
        }
        None => Err(Custom(
            Status::Unauthorized,
            Json(ValidationResponse::with_error(
                "credentials",
                "Invalid username or password",
            )),
        )),
    }
}

#[post("/auth/logout")]
pub async fn api_logout(
    cookies: &rocket::http::CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
) -> Json<MessageResponse> {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        let _ = invalidate_session(db, &token).await;
    }

    // The cookie is cleared even when no session row existed.
    cookies.remove_private(Cookie::build("session_token"));

    Json(MessageResponse {
        message: "Logged out".to_string(),
    })
}

#[get("/auth/me")]
pub async fn api_me(user: User) -> Result<Json<UserData>, AppError> {
    user.require_permission(Permission::ViewOwnProfile)?;

    Ok(Json(UserData::from(user)))
}

#[get("/auth/me", rank = 2)]
pub async fn api_me_unauthorized() -> AppError {
    AppError::Authentication("No active session".to_string())
}

#[derive(Deserialize, Validate, Clone)]
pub struct RegisterRequest {
    username: Option<String>,
    password: Option<String>,
    business_name: Option<String>,
    business_type: Option<String>,
    owner_name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
}

impl RegisterRequest {
    fn into_new_user(self) -> Result<NewUser, Custom<Json<ValidationResponse>>> {
        let mut missing: HashMap<String, Vec<String>> = HashMap::new();
        let mut require = |field: &str, value: Option<String>| -> String {
            match value {
                Some(v) if !v.trim().is_empty() => v,
                _ => {
                    missing.insert(
                        field.to_string(),
                        vec!["This field is required".to_string()],
                    );
                    String::new()
                }
            }
        };

        let username = require("username", self.username);
        let password = require("password", self.password);
        let business_name = require("business_name", self.business_name);
        let business_type = require("business_type", self.business_type);
        let owner_name = require("owner_name", self.owner_name);
        let email = require("email", self.email);

        if !missing.is_empty() {
            return Err(Custom(
                Status::BadRequest,
                Json(ValidationResponse::new(missing)),
            ));
        }

        Ok(NewUser {
            username,
            password,
            business_name,
            business_type,
            owner_name,
            email,
            phone: self.phone,
            address: self.address,
            // Self-registration never grants elevated roles.
            role: Role::Customer,
        })
    }
}

#[derive(Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: i64,
}

#[post("/auth/register", data = "<registration>")]
pub async fn api_register(
    registration: Json<RegisterRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<RegisterResponse>>, Custom<Json<ValidationResponse>>> {
    let validated = registration.validate_custom()?;

    let new_user = validated.into_new_user()?;
    let user_id = create_user(db, &new_user).await.validate_custom()?;

    Ok(Custom(
        Status::Created,
        Json(RegisterResponse {
            message: "Account registered successfully".to_string(),
            user_id,
        }),
    ))
}

// =====================================
// Admin
// =====================================

#[derive(Serialize, Deserialize)]
pub struct CustomersResponse {
    pub customers: Vec<UserData>,
}

#[get("/admin/customers")]
pub async fn api_admin_customers(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CustomersResponse>, AppError> {
    user.require_permission(Permission::ViewCustomers)?;

    let customers = get_users_by_role(db, &Role::Customer).await?;

    Ok(Json(CustomersResponse {
        customers: customers.into_iter().map(UserData::from).collect(),
    }))
}

#[get("/admin/orders")]
pub async fn api_admin_orders(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OrdersResponse>, AppError> {
    user.require_permission(Permission::ViewOrders)?;

    let orders = list_orders(db).await?;

    Ok(Json(OrdersResponse { orders }))
}

#[get("/admin/orders/<id>")]
pub async fn api_admin_order_detail(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OrderDetailResponse>, AppError> {
    user.require_permission(Permission::ViewOrders)?;

    let order = get_order(db, id).await?;
    let items = get_order_items(db, id).await?;

    Ok(Json(OrderDetailResponse { order, items }))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
