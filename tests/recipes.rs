//! Persistence behaviour of recipe composition, memberships and follows.
//! These need a Postgres server: `DATABASE_URL=... cargo test -- --ignored`.

use foodgram_sdk::{
    actions,
    composition::Membership,
    error::ErrorKind,
    pagination::PageQuery,
    schema::{Id, IngredientAmount, NewUser, RecipeFilter, RecipePatch, RecipePayload},
};
use sqlx::PgPool;

async fn user(pool: &PgPool, username: &str) -> Id {
    actions::register_user(
        NewUser {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            first_name: None,
            last_name: None,
            password: String::from("correct horse"),
        },
        pool,
    )
    .await
    .unwrap()
    .id
}

async fn ingredient(pool: &PgPool, name: &str, unit: &str) -> Id {
    let (id,): (Id,) =
        sqlx::query_as("INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING id")
            .bind(name)
            .bind(unit)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

async fn tag(pool: &PgPool, slug: &str) -> Id {
    let (id,): (Id,) =
        sqlx::query_as("INSERT INTO tags (name, color, slug) VALUES ($1, '#00ff00', $1) RETURNING id")
            .bind(slug)
            .fetch_one(pool)
            .await
            .unwrap();
    id
}

fn draft(lines: Vec<IngredientAmount>, tags: Vec<Id>) -> RecipePayload {
    RecipePayload {
        ingredients: lines,
        tags,
        image: String::new(),
        name: String::from("Soup"),
        text: String::from("Boil everything."),
        cooking_time: 30,
    }
}

fn amount(id: Id, amount: i32) -> IngredientAmount {
    IngredientAmount { id, amount }
}

async fn row_count(pool: &PgPool, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

async fn line_count(pool: &PgPool) -> i64 {
    row_count(pool, "recipe_ingredients").await
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn create_stores_every_line(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let water = ingredient(&pool, "Water", "ml").await;
    let dinner = tag(&pool, "dinner").await;

    let recipe_id = actions::create_recipe(
        author,
        &draft(vec![amount(salt, 5), amount(water, 500)], vec![dinner]),
        String::from("/media/recipes/soup.png"),
        &pool,
    )
    .await
    .unwrap();

    let lines = actions::list_recipe_lines(recipe_id, &pool).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!((lines[0].id, lines[0].amount), (salt, 5));
    assert_eq!((lines[1].id, lines[1].amount), (water, 500));

    let tags = actions::list_recipe_tags(recipe_id, &pool).await.unwrap();
    assert_eq!(tags.len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_ingredient_persists_nothing(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let dinner = tag(&pool, "dinner").await;

    let err = actions::create_recipe(
        author,
        &draft(vec![amount(salt, 1), amount(salt, 3)], vec![dinner]),
        String::from("/media/recipes/soup.png"),
        &pool,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(line_count(&pool).await, 0);
    assert_eq!(row_count(&pool, "recipes").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn unknown_tag_persists_nothing(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let salt = ingredient(&pool, "Salt", "g").await;

    let err = actions::create_recipe(
        author,
        &draft(vec![amount(salt, 1)], vec![9999]),
        String::from("/media/recipes/soup.png"),
        &pool,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().starts_with("tags:"));
    assert_eq!(line_count(&pool).await, 0);
    assert_eq!(row_count(&pool, "recipes").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_line_insert_rolls_back_recipe_and_tags(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let dinner = tag(&pool, "dinner").await;

    // Lines are inserted last, after the recipe row and its tags.
    sqlx::query(
        "
        CREATE FUNCTION refuse_recipe_lines() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'recipe lines are refused';
        END;
        $$ LANGUAGE plpgsql
    ",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "
        CREATE TRIGGER refuse_recipe_lines BEFORE INSERT ON recipe_ingredients
        FOR EACH ROW EXECUTE FUNCTION refuse_recipe_lines()
    ",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = actions::create_recipe(
        author,
        &draft(vec![amount(salt, 1)], vec![dinner]),
        String::from("/media/recipes/soup.png"),
        &pool,
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(row_count(&pool, "recipes").await, 0);
    assert_eq!(row_count(&pool, "recipe_tags").await, 0);
    assert_eq!(line_count(&pool).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn update_swaps_ingredient_lines(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let a = ingredient(&pool, "Apple", "pcs").await;
    let b = ingredient(&pool, "Butter", "g").await;
    let dinner = tag(&pool, "dinner").await;
    let dessert = tag(&pool, "dessert").await;

    let recipe_id = actions::create_recipe(
        author,
        &draft(vec![amount(a, 2), amount(b, 1)], vec![dinner]),
        String::from("/media/recipes/pie.png"),
        &pool,
    )
    .await
    .unwrap();

    let patch = RecipePatch {
        ingredients: Some(vec![amount(a, 5)]),
        tags: Some(vec![dessert]),
        cooking_time: Some(45),
        ..Default::default()
    };
    actions::update_recipe(recipe_id, &patch, None, &pool)
        .await
        .unwrap();

    let lines = actions::list_recipe_lines(recipe_id, &pool).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!((lines[0].id, lines[0].amount), (a, 5));

    let tags = actions::list_recipe_tags(recipe_id, &pool).await.unwrap();
    assert_eq!(tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![dessert]);

    let recipe = actions::get_recipe(recipe_id, &pool).await.unwrap();
    assert_eq!(recipe.cooking_time, 45);
    assert_eq!(recipe.name, "Soup");
    assert_eq!(recipe.image, "/media/recipes/pie.png");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn listed_recipes_keep_their_own_lines_and_tags(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let sugar = ingredient(&pool, "Sugar", "g").await;
    let dinner = tag(&pool, "dinner").await;
    let dessert = tag(&pool, "dessert").await;

    let soup = actions::create_recipe(
        anna,
        &draft(vec![amount(salt, 5)], vec![dinner]),
        String::from("/media/recipes/soup.png"),
        &pool,
    )
    .await
    .unwrap();
    let cake = actions::create_recipe(
        bob,
        &draft(vec![amount(sugar, 200), amount(salt, 1)], vec![dessert]),
        String::from("/media/recipes/cake.png"),
        &pool,
    )
    .await
    .unwrap();

    actions::add_membership(Membership::ShoppingCart, anna, cake, &pool)
        .await
        .unwrap();

    let page = actions::fetch_recipes(&RecipeFilter::default(), Some(anna), PageQuery::new(1, 10), &pool)
        .await
        .unwrap();
    assert_eq!(page.count, 2);

    let listed_cake = &page.results[0];
    assert_eq!(listed_cake.id, cake);
    assert_eq!(listed_cake.author.id, bob);
    assert_eq!(listed_cake.tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![dessert]);
    assert_eq!(
        listed_cake.ingredients.iter().map(|l| (l.id, l.amount)).collect::<Vec<_>>(),
        vec![(salt, 1), (sugar, 200)]
    );
    assert!(listed_cake.is_in_shopping_cart);

    let listed_soup = &page.results[1];
    assert_eq!(listed_soup.id, soup);
    assert_eq!(listed_soup.author.id, anna);
    assert_eq!(listed_soup.tags.iter().map(|t| t.id).collect::<Vec<_>>(), vec![dinner]);
    assert_eq!(listed_soup.ingredients.len(), 1);
    assert!(!listed_soup.is_in_shopping_cart);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn shopping_list_sums_across_recipes(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let buyer = user(&pool, "bob").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let dinner = tag(&pool, "dinner").await;

    for grams in [10, 15] {
        let recipe_id = actions::create_recipe(
            author,
            &draft(vec![amount(salt, grams)], vec![dinner]),
            String::from("/media/recipes/x.png"),
            &pool,
        )
        .await
        .unwrap();

        actions::add_membership(Membership::ShoppingCart, buyer, recipe_id, &pool)
            .await
            .unwrap();
    }

    let list = actions::download_shopping_list(buyer, &pool).await.unwrap();
    assert_eq!(list, "Salt - 25 g.\n");

    assert_eq!(actions::download_shopping_list(author, &pool).await.unwrap(), "");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn favorite_toggle(pool: PgPool) {
    let author = user(&pool, "anna").await;
    let fan = user(&pool, "bob").await;
    let salt = ingredient(&pool, "Salt", "g").await;
    let dinner = tag(&pool, "dinner").await;

    let recipe_id = actions::create_recipe(
        author,
        &draft(vec![amount(salt, 1)], vec![dinner]),
        String::from("/media/recipes/x.png"),
        &pool,
    )
    .await
    .unwrap();

    let err = actions::remove_membership(Membership::Favorite, fan, recipe_id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let short = actions::add_membership(Membership::Favorite, fan, recipe_id, &pool)
        .await
        .unwrap();
    assert_eq!(short.id, recipe_id);

    let err = actions::add_membership(Membership::Favorite, fan, recipe_id, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    actions::remove_membership(Membership::Favorite, fan, recipe_id, &pool)
        .await
        .unwrap();
    actions::add_membership(Membership::Favorite, fan, recipe_id, &pool)
        .await
        .unwrap();

    let detail = actions::get_recipe_detail(recipe_id, Some(fan), &pool)
        .await
        .unwrap();
    assert!(detail.is_favorited);
    assert!(!detail.is_in_shopping_cart);

    let err = actions::add_membership(Membership::Favorite, fan, 9999, &pool)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn follows(pool: PgPool) {
    let anna = user(&pool, "anna").await;
    let bob = user(&pool, "bob").await;

    let err = actions::subscribe(anna, anna, None, &pool).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let subscription = actions::subscribe(anna, bob, Some(3), &pool).await.unwrap();
    assert_eq!(subscription.id, bob);
    assert!(subscription.is_subscribed);
    assert_eq!(subscription.recipes_count, 0);

    let err = actions::subscribe(anna, bob, None, &pool).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = actions::subscribe(anna, anna, None, &pool).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    actions::unsubscribe(anna, bob, &pool).await.unwrap();
    let err = actions::unsubscribe(anna, bob, &pool).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = actions::subscribe(anna, 9999, None, &pool).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
