use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use bizhub_auth::{Company, CompanyUser, Hs256JwtValidator, JwtClaims, OwnerAccount, PrincipalKind, default_catalog};
use bizhub_core::{CompanyId, OwnerId, SystemClock, UserId};
use bizhub_infra::{InMemoryRbacStore, RbacServices};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryRbacStore>,
    owner_id: OwnerId,
    company_id: CompanyId,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let store = Arc::new(InMemoryRbacStore::new());
        store.seed_catalog(default_catalog()).unwrap();

        let owner_id = OwnerId::new();
        store
            .insert_owner(OwnerAccount {
                id: owner_id,
                email: "owner@example.com".to_string(),
                is_active: true,
            })
            .unwrap();
        let company_id = CompanyId::new();
        store
            .insert_company(Company {
                id: company_id,
                owner_id,
                name: "Acme".to_string(),
                is_active: true,
                is_frozen: false,
            })
            .unwrap();

        // Same router as prod, bound to an ephemeral port.
        let services = RbacServices::new(
            store.clone(),
            Arc::new(Hs256JwtValidator::new(JWT_SECRET)),
            Arc::new(SystemClock),
        );
        let app = bizhub_api::app::build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            owner_id,
            company_id,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn rbac(&self, path: &str) -> String {
        self.url(&format!("/companies/{}/rbac{}", self.company_id, path))
    }

    fn owner_token(&self) -> String {
        mint_jwt(PrincipalKind::Owner, *self.owner_id.as_uuid(), None)
    }

    fn add_user(&self) -> (UserId, String) {
        let user_id = UserId::new();
        self.store
            .insert_user(CompanyUser {
                id: user_id,
                company_id: self.company_id,
                email: format!("{user_id}@example.com"),
                assigned_role_id: None,
                role_assigned_at: None,
                role_assigned_by: None,
                is_active: true,
            })
            .unwrap();
        let token = mint_jwt(PrincipalKind::CompanyUser, *user_id.as_uuid(), Some(self.company_id));
        (user_id, token)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(kind: PrincipalKind, sub: Uuid, company_id: Option<CompanyId>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        kind,
        company_id,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn permission_id(client: &reqwest::Client, srv: &TestServer, token: &str, key: &str) -> String {
    let (module, permission) = key.split_once('.').unwrap();
    let groups: Value = client
        .get(srv.rbac("/permissions"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    groups
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|g| g["modules"].as_array().unwrap().iter())
        .filter(|m| m["module"]["module_key"] == module)
        .flat_map(|m| m["permissions"].as_array().unwrap().iter())
        .find(|p| p["permission_key"] == permission)
        .map(|p| p["id"].as_str().unwrap().to_string())
        .unwrap_or_else(|| panic!("{key} not in catalog"))
}

async fn create_role(client: &reqwest::Client, srv: &TestServer, token: &str, key: &str, permission_ids: Vec<String>) -> Value {
    let res = client
        .post(srv.rbac("/roles"))
        .bearer_auth(token)
        .json(&json!({
            "role_key": key,
            "role_name": key.to_uppercase(),
            "permission_ids": permission_ids,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_a_principal() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/me")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "unauthorized");

    let res = client.get(srv.rbac("/roles")).bearer_auth("garbage").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "invalid_credential");
}

#[tokio::test]
async fn owner_sees_wildcard_permissions() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url("/me/permissions"))
        .bearer_auth(srv.owner_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["is_owner"], true);
    assert_eq!(body["permissions"], json!(["*.*"]));
}

#[tokio::test]
async fn denial_names_the_missing_permission() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, token) = srv.add_user();

    let res = client.get(srv.rbac("/roles")).bearer_auth(&token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "permission_denied");
    assert_eq!(body["required_permission"]["module"], "roles");
    assert_eq!(body["required_permission"]["permission"], "view_roles");
}

#[tokio::test]
async fn role_lifecycle_grants_and_revokes_access() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = srv.owner_token();
    let (user_id, user_token) = srv.add_user();

    let view_roles = permission_id(&client, &srv, &owner, "roles.view_roles").await;
    let role = create_role(&client, &srv, &owner, "auditor", vec![view_roles]).await;
    assert_eq!(role["permission_count"], 1);
    let role_id = role["id"].as_str().unwrap().to_string();

    let res = client
        .put(srv.rbac(&format!("/users/{user_id}/role")))
        .bearer_auth(&owner)
        .json(&json!({ "role_id": role_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.rbac("/roles")).bearer_auth(&user_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let roles: Value = res.json().await.unwrap();
    assert_eq!(roles[0]["user_count"], 1);

    // Role in use: deletion is refused with the holder count.
    let res = client
        .delete(srv.rbac(&format!("/roles/{role_id}")))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "role_in_use");

    let res = client
        .delete(srv.rbac(&format!("/users/{user_id}/role")))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(srv.rbac("/roles")).bearer_auth(&user_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.rbac(&format!("/roles/{role_id}")))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .get(srv.rbac("/audit?action=ROLE_DELETED"))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = res.json().await.unwrap();
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn duplicate_role_key_conflicts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = srv.owner_token();

    create_role(&client, &srv, &owner, "manager", vec![]).await;
    let res = client
        .post(srv.rbac("/roles"))
        .bearer_auth(&owner)
        .json(&json!({ "role_key": "manager", "role_name": "Manager" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "duplicate_role_key");
}

#[tokio::test]
async fn frozen_company_blocks_users_but_not_owner() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = srv.owner_token();
    let (_, user_token) = srv.add_user();
    srv.store.set_company_frozen(srv.company_id, true).unwrap();

    let res = client.get(srv.rbac("/roles")).bearer_auth(&user_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "company_frozen");

    let res = client.get(srv.rbac("/roles")).bearer_auth(&owner).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn override_grants_temporary_access() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let owner = srv.owner_token();
    let (user_id, user_token) = srv.add_user();
    let view_audit = permission_id(&client, &srv, &owner, "roles.view_audit_log").await;

    let res = client
        .post(srv.rbac(&format!("/users/{user_id}/overrides")))
        .bearer_auth(&owner)
        .json(&json!({
            "permission_id": view_audit,
            "expires_at": Utc::now() + ChronoDuration::hours(1),
            "reason": "quarterly review",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client.get(srv.rbac("/audit")).bearer_auth(&user_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.rbac(&format!("/users/{user_id}/overrides/{view_audit}")))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["revoked"], true);

    let res = client.get(srv.rbac("/audit")).bearer_auth(&user_token).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn purge_is_owner_only() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, user_token) = srv.add_user();

    let res = client
        .post(srv.rbac("/overrides/purge"))
        .bearer_auth(&user_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "owner_required");

    let res = client
        .post(srv.rbac("/overrides/purge"))
        .bearer_auth(srv.owner_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
