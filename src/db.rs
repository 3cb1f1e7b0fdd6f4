use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::{DbUser, DbUserSession, NewUser, Role, User, UserSession};
use crate::error::AppError;
use crate::models::{
    DbOrder, DbRecipe, DbRecipeSummary, Ingredient, Order, OrderInput, OrderItemDetail, Recipe,
    RecipeIngredientDetail, RecipeIngredientInput, RecipeInput, RecipePatch, RecipeSummary,
};
use crate::pricing;

// Projection used everywhere a user row leaves this module; the
// password column never does.
const USER_COLUMNS: &str =
    "id, username, role, business_name, business_type, owner_name, email, phone, address, created_at";

#[instrument]
pub async fn list_recipes(
    pool: &Pool<Sqlite>,
    category: Option<&str>,
) -> Result<Vec<RecipeSummary>, AppError> {
    info!("Listing recipes");

    let rows = match category {
        Some(category) => {
            sqlx::query_as::<_, DbRecipeSummary>(
                "SELECT r.*,
                    (SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = r.id) AS ingredient_count
                 FROM recipes r
                 WHERE r.category = ?",
            )
            .bind(category)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbRecipeSummary>(
                "SELECT r.*,
                    (SELECT COUNT(*) FROM recipe_ingredients WHERE recipe_id = r.id) AS ingredient_count
                 FROM recipes r",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(RecipeSummary::from).collect())
}

#[instrument]
pub async fn get_recipe(pool: &Pool<Sqlite>, id: i64) -> Result<Recipe, AppError> {
    info!("Fetching recipe by ID");

    let row = sqlx::query_as::<_, DbRecipe>("SELECT * FROM recipes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(recipe) => Ok(Recipe::from(recipe)),
        _ => Err(AppError::NotFound(format!(
            "Recipe with id {} not found",
            id
        ))),
    }
}

#[instrument]
pub async fn get_recipe_ingredients(
    pool: &Pool<Sqlite>,
    recipe_id: i64,
) -> Result<Vec<RecipeIngredientDetail>, AppError> {
    info!("Fetching recipe ingredient list");

    let rows = sqlx::query_as::<_, RecipeIngredientDetail>(
        "SELECT
            ri.quantity,
            ri.unit,
            i.id,
            i.name,
            i.price_per_unit,
            i.unit AS ingredient_unit,
            i.category,
            i.image_url
         FROM recipe_ingredients ri
         JOIN ingredients i ON ri.ingredient_id = i.id
         WHERE ri.recipe_id = ?",
    )
    .bind(recipe_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip(pool, input))]
pub async fn create_recipe(pool: &Pool<Sqlite>, input: &RecipeInput) -> Result<i64, AppError> {
    info!("Creating recipe");

    let mut tx = pool.begin().await?;

    let res = sqlx::query(
        "INSERT INTO recipes
            (title, description, category, difficulty, prep_time, cook_time,
             servings, video_url, image_url, instructions)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.category.as_str())
    .bind(&input.difficulty)
    .bind(input.prep_time)
    .bind(input.cook_time)
    .bind(input.servings)
    .bind(&input.video_url)
    .bind(&input.image_url)
    .bind(&input.instructions)
    .execute(&mut *tx)
    .await?;

    let recipe_id = res.last_insert_rowid();

    insert_recipe_ingredients(&mut tx, recipe_id, &input.ingredients).await?;

    tx.commit().await?;

    Ok(recipe_id)
}

#[instrument(skip(pool, patch))]
pub async fn update_recipe(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: &RecipePatch,
) -> Result<(), AppError> {
    info!("Updating recipe");

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, DbRecipe>("SELECT * FROM recipes WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Recipe with id {} not found", id)))?;

    // Unsupplied fields keep their stored value.
    let title = patch.title.clone().unwrap_or(existing.title);
    let description = patch.description.clone().or(existing.description);
    let category = patch
        .category
        .map(|c| c.as_str().to_string())
        .unwrap_or(existing.category);
    let difficulty = patch.difficulty.clone().or(existing.difficulty);
    let prep_time = patch.prep_time.or(existing.prep_time);
    let cook_time = patch.cook_time.or(existing.cook_time);
    let servings = patch.servings.or(existing.servings);
    let video_url = patch.video_url.clone().or(existing.video_url);
    let image_url = patch.image_url.clone().or(existing.image_url);
    let instructions = patch.instructions.clone().or(existing.instructions);

    let now = Utc::now().naive_utc();
    sqlx::query(
        "UPDATE recipes
         SET title = ?, description = ?, category = ?, difficulty = ?,
             prep_time = ?, cook_time = ?, servings = ?, video_url = ?,
             image_url = ?, instructions = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&title)
    .bind(&description)
    .bind(&category)
    .bind(&difficulty)
    .bind(prep_time)
    .bind(cook_time)
    .bind(servings)
    .bind(&video_url)
    .bind(&image_url)
    .bind(&instructions)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    // A supplied ingredient list replaces the whole set.
    if let Some(items) = &patch.ingredients {
        sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_recipe_ingredients(&mut tx, id, items).await?;
    }

    tx.commit().await?;

    Ok(())
}

async fn insert_recipe_ingredients(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    recipe_id: i64,
    items: &[RecipeIngredientInput],
) -> Result<(), AppError> {
    for item in items {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, quantity, unit)
             VALUES (?, ?, ?, ?)",
        )
        .bind(recipe_id)
        .bind(item.ingredient_id)
        .bind(item.quantity)
        .bind(&item.unit)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[instrument]
pub async fn delete_recipe(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting recipe");

    // recipe_ingredients rows go with it via ON DELETE CASCADE
    let res = sqlx::query("DELETE FROM recipes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Recipe with id {} not found",
            id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn list_ingredients(
    pool: &Pool<Sqlite>,
    category: Option<&str>,
) -> Result<Vec<Ingredient>, AppError> {
    info!("Listing ingredients");

    let rows = match category {
        Some(category) => {
            sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE category = ?")
                .bind(category)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients")
                .fetch_all(pool)
                .await?
        }
    };

    Ok(rows)
}

#[instrument]
pub async fn get_ingredient(pool: &Pool<Sqlite>, id: i64) -> Result<Ingredient, AppError> {
    info!("Fetching ingredient by ID");

    let row = sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(ingredient) => Ok(ingredient),
        _ => Err(AppError::NotFound(format!(
            "Ingredient with id {} not found",
            id
        ))),
    }
}

#[instrument(skip(pool, order))]
pub async fn create_order(pool: &Pool<Sqlite>, order: &OrderInput) -> Result<(i64, f64), AppError> {
    info!("Creating order");

    let mut tx = pool.begin().await?;

    // Price every line once inside the transaction; the same figures
    // feed the order total and the persisted item snapshots. An unknown
    // ingredient aborts the whole order.
    let mut lines = Vec::with_capacity(order.items.len());
    for item in &order.items {
        let price =
            sqlx::query_scalar::<_, f64>("SELECT price_per_unit FROM ingredients WHERE id = ?")
                .bind(item.ingredient_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Ingredient {} not found", item.ingredient_id))
                })?;

        lines.push(pricing::price_line(item.ingredient_id, price, item.quantity));
    }

    let total_amount = pricing::order_total(&lines);

    let res = sqlx::query(
        "INSERT INTO orders (customer_name, customer_email, customer_phone, total_amount, notes)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&order.customer_name)
    .bind(&order.customer_email)
    .bind(&order.customer_phone)
    .bind(total_amount)
    .bind(&order.notes)
    .execute(&mut *tx)
    .await?;

    let order_id = res.last_insert_rowid();

    for line in &lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, ingredient_id, quantity, unit_price, subtotal)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(line.ingredient_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.subtotal)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((order_id, total_amount))
}

#[instrument]
pub async fn list_orders(pool: &Pool<Sqlite>) -> Result<Vec<Order>, AppError> {
    info!("Listing orders");

    let rows =
        sqlx::query_as::<_, DbOrder>("SELECT * FROM orders ORDER BY created_at DESC, id DESC")
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

#[instrument]
pub async fn get_order(pool: &Pool<Sqlite>, id: i64) -> Result<Order, AppError> {
    info!("Fetching order by ID");

    let row = sqlx::query_as::<_, DbOrder>("SELECT * FROM orders WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(order) => Ok(Order::from(order)),
        _ => Err(AppError::NotFound(format!("Order with id {} not found", id))),
    }
}

#[instrument]
pub async fn get_order_items(
    pool: &Pool<Sqlite>,
    order_id: i64,
) -> Result<Vec<OrderItemDetail>, AppError> {
    info!("Fetching order items");

    let rows = sqlx::query_as::<_, OrderItemDetail>(
        "SELECT
            oi.id,
            oi.order_id,
            oi.ingredient_id,
            oi.quantity,
            oi.unit_price,
            oi.subtotal,
            i.name AS ingredient_name,
            i.unit AS ingredient_unit
         FROM order_items oi
         JOIN ingredients i ON oi.ingredient_id = i.id
         WHERE oi.order_id = ?",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument(skip_all, fields(username = %user.username, role = %user.role.as_str()))]
pub async fn create_user(pool: &Pool<Sqlite>, user: &NewUser) -> Result<i64, AppError> {
    info!("Creating new user");

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE username = ?")
        .bind(&user.username)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Username '{}' already exists",
            user.username
        )));
    }

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
        .bind(&user.email)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "Email '{}' is already registered",
            user.email
        )));
    }

    let hashed_password = bcrypt::hash(&user.password, bcrypt::DEFAULT_COST)?;

    let res = sqlx::query(
        "INSERT INTO users
            (username, password, business_name, business_type, owner_name,
             email, phone, address, role)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.username)
    .bind(&hashed_password)
    .bind(&user.business_name)
    .bind(&user.business_type)
    .bind(&user.owner_name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.address)
    .bind(user.role.as_str())
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all, fields(username = %username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");

    #[derive(sqlx::FromRow)]
    struct AuthRow {
        id: i64,
        password: String,
    }

    let row = sqlx::query_as::<_, AuthRow>("SELECT id, password FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            // Verify the password using bcrypt; a malformed stored hash
            // counts as a failed login.
            match bcrypt::verify(password, &row.password) {
                Ok(true) => Ok(Some(get_user(pool, row.id).await?)),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");

    let row =
        sqlx::query_as::<_, DbUser>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Looking up user by username");

    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

#[instrument]
pub async fn get_users_by_role(pool: &Pool<Sqlite>, role: &Role) -> Result<Vec<User>, AppError> {
    info!(role = %role, "Getting users by role");

    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY created_at DESC, id DESC",
        USER_COLUMNS
    ))
    .bind(role.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
