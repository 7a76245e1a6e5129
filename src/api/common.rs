use rocket::{Route, State};
use sqlx::{Pool, Sqlite};

use crate::db::{exercise_categories, get_location, get_trainer, list_locations, list_trainers};
use crate::models::{CategoryCount, Location, TrainerProfile};
use crate::validation::{ApiResponse, ApiResult, PageParams, Paginated};

pub fn routes() -> Vec<Route> {
    routes![
        api_list_trainers,
        api_get_trainer,
        api_exercise_categories,
        api_list_locations,
        api_get_location
    ]
}

#[get("/trainers?<search>&<paging..>")]
pub async fn api_list_trainers(
    search: Option<&str>,
    paging: PageParams,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<Paginated<TrainerProfile>> {
    let page = paging.resolve()?;
    let search = search.filter(|s| !s.trim().is_empty());

    let (trainers, total) = list_trainers(db, search, page).await?;

    Ok(ApiResponse::ok(Paginated::new(trainers, page, total)))
}

#[get("/trainers/<id>")]
pub async fn api_get_trainer(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<TrainerProfile> {
    Ok(ApiResponse::ok(get_trainer(db, id).await?))
}

#[get("/exercises/categories")]
pub async fn api_exercise_categories(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<CategoryCount>> {
    Ok(ApiResponse::ok(exercise_categories(db).await?))
}

#[get("/locations")]
pub async fn api_list_locations(db: &State<Pool<Sqlite>>) -> ApiResult<Vec<Location>> {
    Ok(ApiResponse::ok(list_locations(db).await?))
}

#[get("/locations/<id>")]
pub async fn api_get_location(id: i64, db: &State<Pool<Sqlite>>) -> ApiResult<Location> {
    Ok(ApiResponse::ok(get_location(db, id).await?))
}
