// API documentation: an OpenAPI description and a Swagger UI page reading it

use crate::core::routes::{USER_ACTIVE, USER_CREATE, USER_INDEX, USER_SHOW, USER_UPDATE};
use axum::{response::Html, Json};
use serde_json::{json, Value};

const SWAGGER_UI_VERSION: &str = "5.17.14";

/// OpenAPI 3 description of the `/api/v1` surface
///
/// GET /swagger
pub async fn openapi_handler() -> Json<Value> {
    Json(openapi_document())
}

/// Swagger UI loading the description from `/swagger`
///
/// GET /docs
pub async fn docs_handler() -> Html<String> {
    Html(format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>routeguard API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui.css">
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@{version}/swagger-ui-bundle.js"></script>
  <script>
    window.ui = SwaggerUIBundle({{ url: "/swagger", dom_id: "#swagger-ui" }});
  </script>
</body>
</html>"##,
        version = SWAGGER_UI_VERSION
    ))
}

fn guarded_operation(route: &str, summary: &str, mut operation: Value) -> Value {
    operation["summary"] = json!(summary);
    operation["operationId"] = json!(route);
    operation["tags"] = json!(["user"]);
    operation["security"] = json!([{ "appKey": [], "bearer": [] }]);
    operation["description"] = json!(format!(
        "Requires a grant for route `{}`. Missing or expired tokens get 401, a missing grant gets 403.",
        route
    ));
    operation
}

fn envelope(data: Value) -> Value {
    json!({
        "type": "object",
        "properties": {
            "status": { "type": "boolean" },
            "message": { "type": "string" },
            "data": data
        }
    })
}

fn json_response(description: &str, schema: Value) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": schema } }
    })
}

fn error_responses(codes: &[&str]) -> Value {
    let mut responses = serde_json::Map::new();
    for code in codes {
        responses.insert(
            code.to_string(),
            json!({ "$ref": format!("#/components/responses/Error{}", code) }),
        );
    }
    Value::Object(responses)
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
        base.extend(extra);
    }
    base
}

fn id_parameter() -> Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int32", "minimum": 0 }
    })
}

pub fn openapi_document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "routeguard",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "User management with per-route access grants. Every /api/v1 request carries the application key in X-Credentials."
        },
        "paths": {
            "/api/v1/login": login_path(),
            "/api/v1/user": users_path(),
            "/api/v1/user/{id}": user_path()
        },
        "components": {
            "securitySchemes": {
                "appKey": { "type": "apiKey", "in": "header", "name": "X-Credentials" },
                "bearer": { "type": "http", "scheme": "bearer" }
            },
            "schemas": schemas(),
            "responses": error_components()
        }
    })
}

fn login_path() -> Value {
    let token = json!({
        "allOf": [
            { "$ref": "#/components/schemas/UserDetails" },
            { "type": "object", "properties": { "token": { "type": "string" } } }
        ]
    });

    json!({
        "post": {
            "summary": "Exchange email and password for a bearer token",
            "operationId": "login",
            "tags": ["auth"],
            "security": [{ "appKey": [] }],
            "requestBody": request_body("LoginRequest"),
            "responses": merge(
                json!({ "201": json_response("User authenticated", envelope(token)) }),
                error_responses(&["401", "422", "429"]),
            )
        }
    })
}

fn users_path() -> Value {
    let list = json!({ "type": "array", "items": { "$ref": "#/components/schemas/User" } });

    json!({
        "get": guarded_operation(USER_INDEX, "List users", json!({
            "parameters": [
                { "name": "fullname", "in": "query", "schema": { "type": "string" }, "description": "Case-insensitive substring" },
                { "name": "email", "in": "query", "schema": { "type": "string" }, "description": "Case-insensitive substring" },
                { "name": "active", "in": "query", "schema": { "type": "boolean" } }
            ],
            "responses": merge(
                json!({ "200": json_response("Records found", envelope(list)) }),
                error_responses(&["401", "403", "422"]),
            )
        })),
        "post": guarded_operation(USER_CREATE, "Create a user with its access grants", json!({
            "requestBody": request_body("CreateUserRequest"),
            "responses": merge(
                json!({ "201": json_response("Record created", envelope(json!({ "type": "integer" }))) }),
                error_responses(&["401", "403", "409", "422", "503"]),
            )
        }))
    })
}

fn user_path() -> Value {
    let details = json!({ "$ref": "#/components/schemas/UserDetails" });

    json!({
        "parameters": [id_parameter()],
        "get": guarded_operation(USER_SHOW, "Show a user and its grants", json!({
            "responses": merge(
                json!({ "200": json_response("Record found", envelope(details)) }),
                error_responses(&["401", "403", "404"]),
            )
        })),
        "put": guarded_operation(USER_UPDATE, "Update a user; a present access list replaces its grants", json!({
            "requestBody": request_body("UpdateUserRequest"),
            "responses": merge(
                json!({ "204": { "description": "Updated" } }),
                error_responses(&["401", "403", "404", "409", "422", "503"]),
            )
        })),
        "patch": guarded_operation(USER_ACTIVE, "Toggle the active flag; deactivation signs the user out", json!({
            "responses": merge(
                json!({ "204": { "description": "Toggled" } }),
                error_responses(&["401", "403", "404", "503"]),
            )
        }))
    })
}

fn request_body(schema: &str) -> Value {
    json!({
        "required": true,
        "content": {
            "application/json": { "schema": { "$ref": format!("#/components/schemas/{}", schema) } }
        }
    })
}

fn schemas() -> Value {
    json!({
        "LoginRequest": {
            "type": "object",
            "required": ["email", "password"],
            "properties": {
                "email": { "type": "string", "format": "email" },
                "password": { "type": "string" }
            }
        },
        "CreateUserRequest": {
            "type": "object",
            "required": ["fullname", "email", "password", "access"],
            "properties": {
                "fullname": { "type": "string", "maxLength": 255 },
                "email": { "type": "string", "format": "email", "maxLength": 254 },
                "password": { "type": "string" },
                "access": { "type": "array", "minItems": 1, "uniqueItems": true, "items": { "type": "string", "maxLength": 100 } }
            }
        },
        "UpdateUserRequest": {
            "type": "object",
            "properties": {
                "fullname": { "type": "string", "maxLength": 255 },
                "email": { "type": "string", "format": "email", "maxLength": 254 },
                "password": { "type": "string" },
                "access": { "type": "array", "minItems": 1, "uniqueItems": true, "items": { "type": "string", "maxLength": 100 } }
            }
        },
        "User": {
            "type": "object",
            "properties": {
                "id": { "type": "integer" },
                "fullname": { "type": "string" },
                "email": { "type": "string" },
                "active": { "type": "boolean" },
                "created_by": { "type": "string" },
                "created_at": { "type": "integer" },
                "updated_by": { "type": "string", "nullable": true },
                "updated_at": { "type": "integer", "nullable": true }
            }
        },
        "Grant": {
            "type": "object",
            "properties": {
                "route": { "type": "string" },
                "created_by": { "type": "string" },
                "created_at": { "type": "integer" },
                "updated_by": { "type": "string", "nullable": true },
                "updated_at": { "type": "integer", "nullable": true }
            }
        },
        "UserDetails": {
            "allOf": [
                { "$ref": "#/components/schemas/User" },
                {
                    "type": "object",
                    "properties": { "access": { "type": "array", "items": { "$ref": "#/components/schemas/Grant" } } }
                }
            ]
        },
        "Error": {
            "type": "object",
            "properties": {
                "status": { "type": "boolean", "enum": [false] },
                "code": { "type": "string" },
                "message": { "type": "string" },
                "data": { "nullable": true }
            }
        }
    })
}

fn error_components() -> Value {
    let error = |description: &str| {
        json_response(description, json!({ "$ref": "#/components/schemas/Error" }))
    };

    json!({
        "Error401": error("Missing app key, missing or invalid token, or wrong login"),
        "Error403": error("No grant for this route"),
        "Error404": error("User not found"),
        "Error409": error("Email already registered or concurrent modification"),
        "Error422": error("Validation failure"),
        "Error429": error("Too many failed logins from this address"),
        "Error503": error("Store temporarily unavailable")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::routes::PROTECTED_ROUTES;

    #[test]
    fn test_every_protected_route_is_documented() {
        let doc = openapi_document();
        let documented: Vec<&str> = doc["paths"]
            .as_object()
            .unwrap()
            .values()
            .flat_map(|item| item.as_object().unwrap().values())
            .filter_map(|op| op.get("operationId").and_then(Value::as_str))
            .collect();

        for route in PROTECTED_ROUTES {
            assert!(documented.contains(&route), "{} missing from docs", route);
        }
        assert!(documented.contains(&"login"));
    }

    #[test]
    fn test_error_references_resolve() {
        let doc = openapi_document();
        let responses = doc["components"]["responses"].as_object().unwrap();

        let rendered = doc.to_string();
        for code in ["401", "403", "404", "409", "422", "429", "503"] {
            let name = format!("Error{}", code);
            if rendered.contains(&format!("#/components/responses/{}", name)) {
                assert!(responses.contains_key(&name), "{} is not defined", name);
            }
        }
    }

    #[tokio::test]
    async fn test_ui_points_at_description() {
        let Html(page) = docs_handler().await;
        assert!(page.contains(r#"url: "/swagger""#));
    }
}
