//! axum integration

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tenantry_core::Error;
use tracing::{debug, Instrument};

use crate::context::TenantContextInitializer;

/// Error wrapper rendering [`Error`] as a JSON HTTP response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::TenantNotFound(_) | Error::NotFoundProperty(_) => StatusCode::NOT_FOUND,
            Error::TenantNotAuthorized(_) => StatusCode::UNAUTHORIZED,
            Error::TenantForbidden(_) => StatusCode::FORBIDDEN,
            Error::TenantRequired(_)
            | Error::InvalidTenant(_)
            | Error::InvalidPropertyValue { .. } => StatusCode::BAD_REQUEST,
            Error::UnsupportedOperation(_) => StatusCode::NOT_IMPLEMENTED,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "message": self.0.to_string(),
                "code": status.as_u16(),
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Resolve the tenant of each request and store its [`TenantContext`] in the
/// request extensions. The downstream handler runs inside the context's span.
///
/// [`TenantContext`]: crate::context::TenantContext
pub async fn tenant_context_middleware(
    State(initializer): State<Arc<TenantContextInitializer>>,
    mut req: Request,
    next: Next,
) -> Response {
    let context = match initializer.load(Some(&req)).await {
        Ok(context) => context,
        Err(e) => {
            debug!("Rejecting request to {}: {}", req.uri().path(), e);
            return ApiError(e).into_response();
        }
    };

    let span = context.span().clone();
    req.extensions_mut().insert(context);

    next.run(req).instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockTenantManagerClient, TenantManagerClientError};
    use crate::config::MultitenancyConfig;
    use crate::context::TenantContext;
    use crate::loader::TenantContextLoader;
    use crate::resolver::TenantIdResolver;
    use crate::service::{RetryPolicy, TenantManagerService};
    use axum::{body::Body, routing::get, Extension, Router};
    use http_body_util::BodyExt;
    use tenantry_core::limits::ResourceLimitsConfigurationService;
    use tenantry_core::tenant::{Tenant, TenantStatus};
    use tower::ServiceExt;

    fn app(config: MultitenancyConfig) -> Router {
        let mut client = MockTenantManagerClient::new();
        client.expect_get_tenant().returning(|id| {
            if id.as_str() == "ghost" {
                return Err(TenantManagerClientError::NotFound(id.to_string()));
            }
            Ok(Tenant {
                tenant_id: id.clone(),
                organization_id: None,
                created_by: Some("alice".to_string()),
                created_on: None,
                status: TenantStatus::Ready,
                resources: Vec::new(),
            })
        });

        let loader = TenantContextLoader::new(
            &config,
            TenantManagerService::new(Some(Arc::new(client)), RetryPolicy::default()),
            Arc::new(ResourceLimitsConfigurationService::default()),
        );
        let initializer = Arc::new(TenantContextInitializer::new(
            &config,
            TenantIdResolver::new(&config).unwrap(),
            Arc::new(loader),
        ));

        Router::new()
            .route(
                "/t/{tenant}/whoami",
                get(|Extension(ctx): Extension<TenantContext>| async move {
                    ctx.tenant_id().to_string()
                }),
            )
            .route(
                "/whoami",
                get(|Extension(ctx): Extension<TenantContext>| async move {
                    ctx.tenant_id().to_string()
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                initializer,
                tenant_context_middleware,
            ))
    }

    fn enabled() -> MultitenancyConfig {
        MultitenancyConfig {
            enabled: true,
            ..Default::default()
        }
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_context_inserted_for_tenant_path() {
        let response = app(enabled())
            .oneshot(Request::builder().uri("/t/acme/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "acme");
    }

    #[tokio::test]
    async fn test_default_tenant_without_tenant_id() {
        let response = app(enabled())
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "_");
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_404() {
        let response = app(enabled())
            .oneshot(Request::builder().uri("/t/ghost/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"]["code"], 404);
    }

    #[tokio::test]
    async fn test_missing_required_tenant_is_400() {
        let config = MultitenancyConfig {
            require_tenant: true,
            ..enabled()
        };
        let response = app(config)
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError(Error::TenantNotAuthorized("t".to_string())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError(Error::TenantForbidden("t".to_string())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError(Error::UnsupportedOperation("x".to_string())).status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(ApiError(Error::Timeout(10)).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ApiError(Error::Storage("db".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
