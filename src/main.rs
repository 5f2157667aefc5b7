use foodgram_sdk::{routes, Config, State};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::load().map_err(|e| {
        log::error!("{e}");
        e
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("Database migrations applied");

    let bind = config.bind;
    let state = State::new(pool, config);

    log::info!("Listening on {bind}");
    warp::serve(routes(state)).run(bind).await;

    Ok(())
}
