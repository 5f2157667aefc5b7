use std::{convert::Infallible, sync::Arc};

use sqlx::{Pool, Postgres};
use warp::Filter;

use crate::{images::ImageStore, Config};

pub struct State {
    pub pool: Pool<Postgres>,
    pub config: Config,
    pub images: ImageStore,
}

impl State {
    pub fn new(pool: Pool<Postgres>, config: Config) -> Arc<Self> {
        let images = ImageStore::new(config.media_root.clone(), config.media_url.clone());

        Arc::new(Self {
            pool,
            config,
            images,
        })
    }
}

pub fn with_state(
    state: Arc<State>,
) -> impl Filter<Extract = (Arc<State>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}
