pub mod billing;
pub mod users;

use axum::{Router, middleware};

use crate::adapters::http::{app_state::AppState, middleware::internal_api_key_auth};

pub fn router(app_state: AppState) -> Router<AppState> {
    Router::new().nest("/billing", billing::router()).nest(
        "/users",
        users::router().layer(middleware::from_fn_with_state(
            app_state,
            internal_api_key_auth,
        )),
    )
}
