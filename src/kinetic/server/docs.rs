// SPDX-License-Identifier: MIT

//! OpenAPI document and a Swagger UI page that renders it

use axum::response::Html;
use axum::Json;
use schemars::gen::SchemaSettings;
use serde_json::{json, Value};

use super::error::ErrorDetail;
use super::handlers::GenerateResponse;
use crate::kinetic::demo::ChatState;

const DOCS_PAGE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>kinetic-deploy API</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js" crossorigin></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/openapi.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;

pub async fn docs() -> Html<&'static str> {
    Html(DOCS_PAGE)
}

pub async fn openapi() -> Json<Value> {
    Json(openapi_document())
}

/// OpenAPI 3 description of the public routes
pub fn openapi_document() -> Value {
    let mut generator = SchemaSettings::openapi3().into_generator();
    let request = generator.subschema_for::<ChatState>();
    let response = generator.subschema_for::<GenerateResponse>();
    let error = generator.subschema_for::<ErrorDetail>();
    let schemas = generator.take_definitions();

    let error_response = |description: &str| {
        json!({
            "description": description,
            "content": {"application/json": {"schema": error}}
        })
    };

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "kinetic-deploy",
            "version": env!("CARGO_PKG_VERSION")
        },
        "paths": {
            "/generate": {
                "post": {
                    "summary": "Invoke the graph once",
                    "security": [{"ApiKey": []}],
                    "parameters": [{
                        "name": "X-Thread-Id",
                        "in": "header",
                        "required": false,
                        "schema": {"type": "string"},
                        "description": "Conversation thread; a new one is created when absent"
                    }],
                    "requestBody": {
                        "required": true,
                        "content": {"application/json": {"schema": request}}
                    },
                    "responses": {
                        "200": {
                            "description": "Final graph state",
                            "content": {"application/json": {"schema": response}}
                        },
                        "401": error_response("Missing or invalid API key"),
                        "422": error_response("Malformed request body"),
                        "500": error_response("Stores unavailable or invocation failed")
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Liveness check",
                    "responses": {"200": {"description": "Server is up"}}
                }
            }
        },
        "components": {
            "schemas": schemas,
            "securitySchemes": {
                "ApiKey": {"type": "apiKey", "in": "header", "name": "X-API-Key"}
            }
        }
    })
}
