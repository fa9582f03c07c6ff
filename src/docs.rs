use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{assignment, authz, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::access::check_menu,
		routes::access::check_resource,
		routes::access::my_menu,
		routes::assignments::run_assignment,
		routes::assignments::load_report,
		routes::assignments::get_cursor,
		routes::assignments::reset_cursor,
		routes::rbac::list_roles,
		routes::rbac::create_role,
		routes::rbac::get_role,
		routes::rbac::delete_role,
		routes::rbac::list_resources,
		routes::rbac::upsert_resource,
		routes::rbac::list_role_resources,
		routes::rbac::put_role_resource,
		routes::rbac::delete_role_resource,
		routes::rbac::toggle_column,
		routes::rbac::list_menus,
		routes::rbac::put_menu,
		routes::rbac::delete_menu
	),
	components(
		schemas(
			routes::health::HealthResponse,
			routes::access::MenuAccessRequest,
			routes::access::ResourceAccessRequest,
			authz::Action,
			authz::RoleCategory,
			authz::DecisionReason,
			authz::MenuDecision,
			authz::ResourceAccess,
			assignment::AssignmentPolicy,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::Resource,
			models::rbac::ResourceUpsertRequest,
			models::rbac::ResourcePermission,
			models::rbac::ResourcePermissionUpsertRequest,
			models::rbac::ColumnToggleRequest,
			models::rbac::MenuPermission,
			models::rbac::MenuPermissionUpsertRequest,
			models::work::PoolFilter,
			models::work::RunAssignmentRequest,
			models::work::RunReport,
			models::work::SkippedItem,
			models::work::SkipReason,
			models::work::CommittedAssignment,
			models::work::LoadReport,
			models::work::RotationCursor
		)
	),
	tags(
		(name = "Health", description = "Liveness and database check"),
		(name = "Access", description = "Menu and resource access decisions"),
		(name = "Assignments", description = "Work item assignment runs and rotation cursors"),
		(name = "RBAC", description = "Permission administration")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: &utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	// Served as plain JSON so Swagger UI fetches exactly what was built above
	let doc_json = Arc::new(serde_json::to_value(doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else {
		return;
	};

	let components = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()));
	let Some(components) = components.as_object_mut() else {
		return;
	};

	let schemes = components
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()));
	if let Some(schemes) = schemes.as_object_mut() {
		schemes.insert(
			"bearerAuth".to_string(),
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			}),
		);
	}
}

fn ensure_global_security(doc: &mut Value) {
	if let Some(root) = doc.as_object_mut() {
		root.entry("security")
			.or_insert_with(|| json!([{ "bearerAuth": [] }]));
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	// Swagger's Try-it-out should call the backend with the scheme it actually serves
	let tls_enabled = std::env::var("TLS_CERT_PATH").is_ok() && std::env::var("TLS_KEY_PATH").is_ok();
	let scheme = if tls_enabled { "https" } else { "http" };
	let server_url = format!("{}://localhost:{}", scheme, port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn document_lists_every_route_with_bearer_auth() {
		let doc = serde_json::to_value(build_openapi(8000).unwrap()).unwrap();

		let paths = doc["paths"].as_object().unwrap();
		for path in [
			"/api/health",
			"/access/menu",
			"/assignments/run",
			"/assignments/cursors/{pool_key}/reset",
			"/rbac/roles/{code}/resources/{resource}/columns/toggle",
			"/rbac/menus/{menu_id}",
		] {
			assert!(paths.contains_key(path), "missing {path}");
		}

		assert_eq!(doc["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
		assert_eq!(doc["servers"][0]["url"], "http://localhost:8000");
	}
}
