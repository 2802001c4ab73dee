//! Integration tests for the HTTP tenant manager client using wiremock

use std::time::Duration;
use tenantry_core::tenant::{
    NewTenantRequest, TenantId, TenantResource, TenantStatus, UpdateTenantRequest,
};
use tenantry_core::Error;
use tenantry_multitenancy::client::OidcClientCredentials;
use tenantry_multitenancy::{
    HttpTenantManagerClient, RetryPolicy, TenantManagerClient, TenantManagerClientError,
    TenantManagerService,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string_contains, header, method, path},
};

fn tenant_json(id: &str) -> serde_json::Value {
    serde_json::json!({
        "tenantId": id,
        "organizationId": "org-7",
        "createdBy": "alice",
        "createdOn": "2024-05-01T10:00:00Z",
        "status": "READY",
        "resources": [{"type": "MAX_TOTAL_SCHEMAS_COUNT", "limit": 25}]
    })
}

#[tokio::test]
async fn test_get_tenant_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_json("acme")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpTenantManagerClient::new(mock_server.uri(), None, None).unwrap();
    let tenant = client
        .get_tenant(&TenantId::from_string("acme").unwrap())
        .await
        .unwrap();

    assert_eq!(tenant.tenant_id.as_str(), "acme");
    assert_eq!(tenant.organization_id.as_deref(), Some("org-7"));
    assert_eq!(tenant.created_by.as_deref(), Some("alice"));
    assert!(tenant.created_on.is_some());
    assert_eq!(tenant.resources[0].limit, 25);
}

#[tokio::test]
async fn test_tenant_id_cannot_reach_another_tenant_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_json("acme")))
        .expect(0)
        .mount(&mock_server)
        .await;

    let client = HttpTenantManagerClient::new(mock_server.uri(), None, None).unwrap();

    for raw in ["ghost/../acme", "acme#evil", "acme?x=1", "acme/"] {
        // Deserialization skips the parser checks, as a tenant ID read from storage would
        let tenant_id: TenantId = serde_json::from_value(serde_json::json!(raw)).unwrap();
        let result = client.get_tenant(&tenant_id).await;
        assert!(
            matches!(result, Err(TenantManagerClientError::NotFound(_))),
            "{raw:?} resolved to {result:?}"
        );
    }
}

#[tokio::test]
async fn test_get_tenant_rejects_mismatched_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/ghost"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_json("acme")))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpTenantManagerClient::new(mock_server.uri(), None, None).unwrap();
    let result = client
        .get_tenant(&TenantId::from_string("ghost").unwrap())
        .await;

    assert!(matches!(result, Err(TenantManagerClientError::NotFound(id)) if id == "ghost"));
}

#[tokio::test]
async fn test_status_codes_map_to_client_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/locked"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/anon"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let client = HttpTenantManagerClient::new(mock_server.uri(), None, None).unwrap();
    let get = |id: &'static str| {
        let client = &client;
        async move { client.get_tenant(&TenantId::from_string(id).unwrap()).await }
    };

    assert!(matches!(get("ghost").await, Err(TenantManagerClientError::NotFound(_))));
    assert!(matches!(get("locked").await, Err(TenantManagerClientError::Forbidden(_))));
    assert!(matches!(get("anon").await, Err(TenantManagerClientError::NotAuthorized(_))));
    assert!(matches!(
        get("broken").await,
        Err(TenantManagerClientError::Transport(msg)) if msg.contains("500")
    ));
}

#[tokio::test]
async fn test_create_and_update_tenant() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/tenants"))
        .and(body_json(serde_json::json!({
            "tenantId": "acme",
            "createdBy": "alice",
            "resources": [{"type": "MAX_TOTAL_SCHEMAS_COUNT", "limit": 25}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(tenant_json("acme")))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/tenants/acme"))
        .and(body_json(serde_json::json!({"status": "DELETED"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpTenantManagerClient::new(mock_server.uri(), None, None).unwrap();
    let created = client
        .create_tenant(NewTenantRequest {
            tenant_id: TenantId::from_string("acme").unwrap(),
            organization_id: None,
            created_by: Some("alice".to_string()),
            resources: vec![TenantResource {
                resource_type: "MAX_TOTAL_SCHEMAS_COUNT".to_string(),
                limit: 25,
            }],
        })
        .await
        .unwrap();
    assert_eq!(created.status, TenantStatus::Ready);

    client
        .update_tenant(
            &TenantId::from_string("acme").unwrap(),
            UpdateTenantRequest {
                status: Some(TenantStatus::Deleted),
                resources: None,
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_client_credentials_token_is_cached() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=registry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-1",
            "expires_in": 300
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/acme"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tenant_json("acme")))
        .expect(2)
        .mount(&mock_server)
        .await;

    let credentials = OidcClientCredentials {
        token_url: format!("{}/oauth/token", mock_server.uri()),
        client_id: "registry".to_string(),
        client_secret: "s3cret".to_string(),
        expiration_reduction: Duration::from_secs(10),
    };
    let client =
        HttpTenantManagerClient::new(mock_server.uri(), Some(credentials), None).unwrap();

    let tenant_id = TenantId::from_string("acme").unwrap();
    client.get_tenant(&tenant_id).await.unwrap();
    client.get_tenant(&tenant_id).await.unwrap();
}

#[tokio::test]
async fn test_token_endpoint_rejection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let credentials = OidcClientCredentials {
        token_url: format!("{}/oauth/token", mock_server.uri()),
        client_id: "registry".to_string(),
        client_secret: "wrong".to_string(),
        expiration_reduction: Duration::ZERO,
    };
    let client =
        HttpTenantManagerClient::new(mock_server.uri(), Some(credentials), None).unwrap();

    let result = client
        .get_tenant(&TenantId::from_string("acme").unwrap())
        .await;
    assert!(matches!(result, Err(TenantManagerClientError::NotAuthorized(_))));
}

#[tokio::test]
async fn test_service_retries_server_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/tenants/acme"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = HttpTenantManagerClient::new(mock_server.uri(), None, None).unwrap();
    let service = TenantManagerService::new(
        Some(std::sync::Arc::new(client)),
        RetryPolicy {
            max_retries: 2,
            delay: Duration::ZERO,
            jitter: Duration::ZERO,
            timeout: Duration::from_secs(5),
        },
    );

    let err = service
        .get_tenant(&TenantId::from_string("acme").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}
