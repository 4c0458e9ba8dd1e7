#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use aula_api_rust::app::{app, AppState};
use aula_api_rust::auth::{generate_jwt, Claims};
use aula_api_rust::config::AppConfig;
use aula_api_rust::database::MemoryStore;
use aula_api_rust::types::InactivePolicy;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";

/// The full router over a fresh in-memory store
pub struct TestApp {
    pub store: MemoryStore,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_policy(InactivePolicy::Permit)
    }

    pub fn with_policy(policy: InactivePolicy) -> Self {
        let mut config = AppConfig::development();
        config.security.jwt_secret = SECRET.to_string();
        config.api.enable_request_logging = false;
        config.audit.inactive_policy = policy;

        let store = MemoryStore::new();
        let router = app(AppState::new(Arc::new(store.clone()), config));
        Self { store, router }
    }

    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<TestResponse> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await.context("router failed")?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body: {:?}", bytes))?
        };
        Ok(TestResponse { status, body })
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<TestResponse> {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> Result<TestResponse> {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Option<Value>) -> Result<TestResponse> {
        self.send(Method::PUT, uri, Some(token), body).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Result<TestResponse> {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    /// POST a create and return the new id, failing on anything but 201
    pub async fn create(&self, entity: &str, token: &str, body: Value) -> Result<i64> {
        let res = self.post(&format!("/api/{}/create", entity), token, body).await?;
        anyhow::ensure!(res.status == StatusCode::CREATED, "create failed: {} {}", res.status, res.body);
        res.body["data"]["id"].as_i64().context("create response without id")
    }

    /// The audit trail of a kind, as the API reports it
    pub async fn audit(&self, entity: &str, token: &str) -> Result<Vec<Value>> {
        let res = self.get(&format!("/api/{}/all-audit", entity), Some(token)).await?;
        anyhow::ensure!(res.status == StatusCode::OK, "audit failed: {} {}", res.status, res.body);
        res.body["data"].as_array().cloned().context("audit data is not an array")
    }
}

pub fn token(usuario: &str, rol: &str) -> String {
    generate_jwt(&Claims::new(usuario, rol, 1).expect("valid expiry"), SECRET).expect("failed to sign test token")
}

pub fn admin(usuario: &str) -> String {
    token(usuario, "administrador")
}
