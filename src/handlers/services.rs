use crate::{catalog::CatalogService, error::AppError, handlers::AppState};
use axum::{extract::State, Json};

/// List every service the discovery engine has cataloged so far.
pub async fn list_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<CatalogService>>, AppError> {
    let mut services = state.catalog.list_services().await?;
    services.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    Ok(Json(services))
}
