use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::admin::AdminState;
use crate::error::ProxyError;
use crate::manager::{CatalogueView, InstanceView, ItemView, ScopeView};
use crate::proxy::ProxyMetadata;

type ApiResult<T> = Result<T, ProxyError>;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub proxy: ProxyMetadata,
    pub instances: usize,
    pub routes: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateInstance {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateScope {
    pub name: String,
}

/// Body for attaching a plugin or a rule.
#[derive(Debug, Deserialize)]
pub struct CreateItem {
    pub name: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlugin {
    pub enabled: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        proxy: state.proxy.metadata().clone(),
        instances: state.proxy.manager().instances().len(),
        routes: state.proxy.router().len(),
    })
}

pub async fn get_catalog(State(state): State<AdminState>) -> Json<CatalogueView> {
    Json(state.proxy.manager().catalogue())
}

pub async fn list_instances(State(state): State<AdminState>) -> Json<Vec<InstanceView>> {
    let instances = state.proxy.manager().instances();
    Json(instances.iter().map(|i| InstanceView::from(i.as_ref())).collect())
}

pub async fn create_instance(
    State(state): State<AdminState>,
    Json(body): Json<CreateInstance>,
) -> ApiResult<(StatusCode, Json<InstanceView>)> {
    let instance = state
        .proxy
        .manager()
        .create_instance(&body.name, &body.description)?;
    Ok((StatusCode::CREATED, Json(InstanceView::from(instance.as_ref()))))
}

pub async fn get_instance(
    State(state): State<AdminState>,
    Path(instance): Path<String>,
) -> ApiResult<Json<InstanceView>> {
    let instance = state.proxy.manager().instance(&instance)?;
    Ok(Json(InstanceView::from(instance.as_ref())))
}

pub async fn delete_instance(
    State(state): State<AdminState>,
    Path(instance): Path<String>,
) -> ApiResult<StatusCode> {
    state.proxy.manager().remove_instance(&instance)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_scopes(
    State(state): State<AdminState>,
    Path(instance): Path<String>,
) -> ApiResult<Json<Vec<ScopeView>>> {
    let scopes = state.proxy.manager().instance(&instance)?.scopes();
    Ok(Json(scopes.iter().map(|s| ScopeView::from(s.as_ref())).collect()))
}

pub async fn create_scope(
    State(state): State<AdminState>,
    Path(instance): Path<String>,
    Json(body): Json<CreateScope>,
) -> ApiResult<(StatusCode, Json<ScopeView>)> {
    let scope = state
        .proxy
        .manager()
        .instance(&instance)?
        .create_scope(&body.name)?;
    Ok((StatusCode::CREATED, Json(ScopeView::from(scope.as_ref()))))
}

pub async fn get_scope(
    State(state): State<AdminState>,
    Path((instance, scope)): Path<(String, String)>,
) -> ApiResult<Json<ScopeView>> {
    let scope = state.proxy.manager().scope(&instance, &scope)?;
    Ok(Json(ScopeView::from(scope.as_ref())))
}

pub async fn delete_scope(
    State(state): State<AdminState>,
    Path((instance, scope)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    state
        .proxy
        .manager()
        .instance(&instance)?
        .remove_scope(&scope)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_plugins(
    State(state): State<AdminState>,
    Path((instance, scope)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ItemView>>> {
    let plugins = state.proxy.manager().scope(&instance, &scope)?.plugins();
    Ok(Json(plugins.iter().map(|p| ItemView::from(p.as_ref())).collect()))
}

pub async fn create_plugin(
    State(state): State<AdminState>,
    Path((instance, scope)): Path<(String, String)>,
    Json(body): Json<CreateItem>,
) -> ApiResult<(StatusCode, Json<ItemView>)> {
    let plugin = state
        .proxy
        .manager()
        .scope(&instance, &scope)?
        .add_plugin(&body.name, body.config, body.metadata)?;
    if let Some(enabled) = body.enabled {
        plugin.set_enabled(enabled);
    }
    Ok((StatusCode::CREATED, Json(ItemView::from(plugin.as_ref()))))
}

pub async fn get_plugin(
    State(state): State<AdminState>,
    Path((instance, scope, plugin)): Path<(String, String, String)>,
) -> ApiResult<Json<ItemView>> {
    let plugin = state
        .proxy
        .manager()
        .scope(&instance, &scope)?
        .plugin(&plugin)?;
    Ok(Json(ItemView::from(plugin.as_ref())))
}

pub async fn update_plugin(
    State(state): State<AdminState>,
    Path((instance, scope, plugin)): Path<(String, String, String)>,
    Json(body): Json<UpdatePlugin>,
) -> ApiResult<Json<ItemView>> {
    let plugin = state
        .proxy
        .manager()
        .scope(&instance, &scope)?
        .set_plugin_enabled(&plugin, body.enabled)?;
    Ok(Json(ItemView::from(plugin.as_ref())))
}

pub async fn delete_plugin(
    State(state): State<AdminState>,
    Path((instance, scope, plugin)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    state
        .proxy
        .manager()
        .scope(&instance, &scope)?
        .remove_plugin(&plugin)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_rules(
    State(state): State<AdminState>,
    Path((instance, scope)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ItemView>>> {
    let rules = state.proxy.manager().scope(&instance, &scope)?.rules();
    Ok(Json(rules.iter().map(|r| ItemView::from(r.as_ref())).collect()))
}

pub async fn create_rule(
    State(state): State<AdminState>,
    Path((instance, scope)): Path<(String, String)>,
    Json(body): Json<CreateItem>,
) -> ApiResult<(StatusCode, Json<ItemView>)> {
    let rule = state
        .proxy
        .manager()
        .scope(&instance, &scope)?
        .add_rule(&body.name, body.config, body.metadata)?;
    Ok((StatusCode::CREATED, Json(ItemView::from(rule.as_ref()))))
}

pub async fn get_rule(
    State(state): State<AdminState>,
    Path((instance, scope, rule)): Path<(String, String, String)>,
) -> ApiResult<Json<ItemView>> {
    let rule = state.proxy.manager().scope(&instance, &scope)?.rule(&rule)?;
    Ok(Json(ItemView::from(rule.as_ref())))
}

pub async fn delete_rule(
    State(state): State<AdminState>,
    Path((instance, scope, rule)): Path<(String, String, String)>,
) -> ApiResult<StatusCode> {
    state
        .proxy
        .manager()
        .scope(&instance, &scope)?
        .remove_rule(&rule)?;
    Ok(StatusCode::NO_CONTENT)
}
