mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

use aula_api_rust::database::entity::SECTION;
use common::{admin, TestApp};

fn section(aula: &str) -> Value {
    json!({ "aula": aula, "grado": 5, "nombre": "5A", "periodo": 2024 })
}

#[tokio::test]
async fn create_update_delete_leaves_a_complete_trail() -> Result<()> {
    let app = TestApp::new();
    let admin1 = admin("admin1");
    let admin2 = admin("admin2");

    let id = app.create("seccion", &admin1, section("A1")).await?;

    let res = app.put(&format!("/api/seccion/update/{}", id), &admin2, Some(section("B2"))).await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["data"]["rows_affected"], 1);

    let res = app.delete(&format!("/api/seccion/delete/{}", id), &admin2).await?;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["data"]["rows_affected"], 1);

    let trail = app.audit("seccion", &admin1).await?;
    assert_eq!(trail.len(), 3);

    let insert = &trail[0];
    assert_eq!(insert["operacion"], "INSERT");
    assert_eq!(insert["id_seccion"], id);
    assert_eq!(insert["aula_anterior"], Value::Null);
    assert_eq!(insert["aula_nuevo"], "A1");
    assert_eq!(insert["periodo_nuevo"], 2024);
    assert_eq!(insert["estado_anterior"], Value::Null);
    assert_eq!(insert["estado_nuevo"], true);
    assert_eq!(insert["usuario_modificador"], "admin1");

    let update = &trail[1];
    assert_eq!(update["operacion"], "UPDATE");
    assert_eq!(update["aula_anterior"], "A1");
    assert_eq!(update["aula_nuevo"], "B2");
    assert_eq!(update["nombre_anterior"], "5A");
    assert_eq!(update["nombre_nuevo"], "5A");
    assert_eq!(update["usuario_modificador"], "admin2");

    let delete = &trail[2];
    assert_eq!(delete["operacion"], "DELETE");
    assert_eq!(delete["aula_anterior"], "B2");
    assert_eq!(delete["aula_nuevo"], "B2");
    assert_eq!(delete["estado_anterior"], true);
    assert_eq!(delete["estado_nuevo"], false);
    assert_eq!(delete["usuario_modificador"], "admin2");

    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    assert!(trail.iter().all(|row| row["fecha_modificacion"] == today.as_str()));
    Ok(())
}

#[tokio::test]
async fn soft_deleted_sections_leave_the_public_list_only() -> Result<()> {
    let app = TestApp::new();
    let admin1 = admin("admin1");

    let kept = app.create("seccion", &admin1, section("A1")).await?;
    let removed = app.create("seccion", &admin1, section("A2")).await?;
    app.delete(&format!("/api/seccion/delete/{}", removed), &admin1).await?;

    let active = app.get("/api/seccion/all", None).await?;
    let active = active.body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id_seccion"], kept);

    let all = app.get("/api/seccion/all-adm", Some(&admin1)).await?;
    let all = all.body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(all.len(), 2);
    let gone = all.iter().find(|r| r["id_seccion"] == removed).cloned().unwrap_or_default();
    assert_eq!(gone["estado"], false);
    assert_eq!(gone["aula"], "A2");

    // The row is still physically there
    assert_eq!(app.store.row_count(&SECTION).await, 2);
    Ok(())
}

#[tokio::test]
async fn show_returns_one_record_or_404() -> Result<()> {
    let app = TestApp::new();
    let id = app.create("seccion", &admin("admin1"), section("A1")).await?;

    let res = app.get(&format!("/api/seccion/show/{}", id), None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["aula"], "A1");
    assert_eq!(res.body["data"]["estado"], true);

    let res = app.get("/api/seccion/show/999", None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["code"], "NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn soft_deleted_records_are_hidden_from_anonymous_show() -> Result<()> {
    let app = TestApp::new();
    let admin1 = admin("admin1");
    let id = app.create("seccion", &admin1, section("A1")).await?;
    app.delete(&format!("/api/seccion/delete/{}", id), &admin1).await?;

    let res = app.get(&format!("/api/seccion/show/{}", id), None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", res.body);
    assert_eq!(res.body["code"], "NOT_FOUND");

    let res = app.get("/api/seccion/all-adm", None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    // Restoring makes it publicly visible again
    app.put(&format!("/api/seccion/restore/{}", id), &admin1, None).await?;
    let res = app.get(&format!("/api/seccion/show/{}", id), None).await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["data"]["estado"], true);
    Ok(())
}

#[tokio::test]
async fn deleting_twice_is_audited_twice() -> Result<()> {
    let app = TestApp::new();
    let admin1 = admin("admin1");
    let id = app.create("seccion", &admin1, section("A1")).await?;

    for _ in 0..2 {
        let res = app.delete(&format!("/api/seccion/delete/{}", id), &admin1).await?;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["data"]["rows_affected"], 1);
    }

    let trail = app.audit("seccion", &admin1).await?;
    let deletes: Vec<&Value> = trail.iter().filter(|r| r["operacion"] == "DELETE").collect();
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes[1]["estado_anterior"], false);
    assert_eq!(deletes[1]["estado_nuevo"], false);
    Ok(())
}

#[tokio::test]
async fn missing_ids_are_404_and_write_no_audit() -> Result<()> {
    let app = TestApp::new();
    let admin1 = admin("admin1");

    let res = app.put("/api/seccion/update/77", &admin1, Some(section("B2"))).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.delete("/api/seccion/delete/77", &admin1).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    let res = app.put("/api/seccion/restore/77", &admin1, None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);

    assert!(app.audit("seccion", &admin1).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_audit_write_rolls_back_the_mutation() -> Result<()> {
    let app = TestApp::new();
    let admin1 = admin("admin1");
    let id = app.create("seccion", &admin1, section("A1")).await?;

    app.store.fail_audit_writes(true);
    let res = app.put(&format!("/api/seccion/update/{}", id), &admin1, Some(section("B2"))).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body["success"], false);

    let res = app.post("/api/seccion/create", &admin1, section("C3")).await?;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    app.store.fail_audit_writes(false);

    let res = app.get(&format!("/api/seccion/show/{}", id), None).await?;
    assert_eq!(res.body["data"]["aula"], "A1");
    assert_eq!(app.store.row_count(&SECTION).await, 1);
    assert_eq!(app.audit("seccion", &admin1).await?.len(), 1);
    Ok(())
}
