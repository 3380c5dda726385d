use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use intermax::authz::can_view_project;

mod common;

#[tokio::test]
async fn can_view_project_follows_membership() -> Result<()> {
    let t = common::setup().await?;
    let owner = t.register("Owner", "owner@example.com").await?;
    t.set_role(owner.id, "PROJECT_MANAGER").await?;
    let member = t.register("Member", "member@example.com").await?;
    let outsider = t.register("Outsider", "outsider@example.com").await?;

    let (_, project) = t
        .request(
            "POST",
            "/api/projects",
            Some(&owner.token),
            Some(json!({ "name": "Bridge", "memberIds": [member.id] })),
        )
        .await?;
    let project_id: Uuid = project["id"].as_str().unwrap().parse()?;

    assert!(can_view_project(&t.pool, owner.id, project_id).await?);
    assert!(can_view_project(&t.pool, member.id, project_id).await?);
    assert!(!can_view_project(&t.pool, outsider.id, project_id).await?);
    assert!(!can_view_project(&t.pool, Uuid::new_v4(), project_id).await?);
    assert!(!can_view_project(&t.pool, owner.id, Uuid::new_v4()).await?);

    Ok(())
}

#[tokio::test]
async fn hidden_projects_are_not_found_and_visible_ones_forbidden() -> Result<()> {
    let t = common::setup().await?;
    let owner = t.register("Owner", "owner@example.com").await?;
    t.set_role(owner.id, "PROJECT_MANAGER").await?;
    let member = t.register("Member", "member@example.com").await?;
    let outsider = t.register("Outsider", "outsider@example.com").await?;

    let (_, project) = t
        .request("POST", "/api/projects", Some(&owner.token), Some(json!({ "name": "Bridge" })))
        .await?;
    let id = project["id"].as_str().unwrap().to_string();
    let uri = format!("/api/projects/{}", id);

    let (status, _) = t.request("GET", &uri, Some(&outsider.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t
        .request("GET", &format!("/api/projects/{}", Uuid::new_v4()), Some(&outsider.token), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "absent and hidden look the same");

    let (status, body) = t
        .request("POST", &format!("{}/members", uri), Some(&owner.token), Some(json!({ "userId": member.id })))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["memberIds"], json!([member.id]));

    let (status, _) = t
        .request("POST", &format!("{}/members", uri), Some(&owner.token), Some(json!({ "userId": Uuid::new_v4() })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "unknown user");

    let (status, _) = t.request("GET", &uri, Some(&member.token), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.request("PATCH", &uri, Some(&member.token), Some(json!({ "name": "Renamed" }))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "members may view but not edit");

    let (status, _) = t
        .request("POST", &format!("{}/members", uri), Some(&outsider.token), Some(json!({ "userId": outsider.id })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .request("DELETE", &format!("{}/members/{}", uri, member.id), Some(&owner.token), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.request("GET", &uri, Some(&member.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "removed members lose access");

    Ok(())
}

#[tokio::test]
async fn task_assignment_needs_assign_tasks_and_grants_visibility() -> Result<()> {
    let t = common::setup().await?;
    let owner = t.register("Owner", "owner@example.com").await?;
    t.set_role(owner.id, "PROJECT_MANAGER").await?;
    let member = t.register("Member", "member@example.com").await?;
    let worker = t.register("Worker", "worker@example.com").await?;

    let (_, project) = t
        .request("POST", "/api/projects", Some(&owner.token), Some(json!({ "name": "Tower", "memberIds": [member.id] })))
        .await?;
    let tasks_uri = format!("/api/projects/{}/tasks", project["id"].as_str().unwrap());

    let (status, _) = t
        .request("POST", &tasks_uri, Some(&member.token), Some(json!({ "title": "Dig", "assigneeId": worker.id })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "members cannot assign");

    let (status, first) = t
        .request("POST", &tasks_uri, Some(&member.token), Some(json!({ "title": "Survey" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", first);
    assert_eq!(first["status"], "todo");

    let (status, _) = t
        .request("POST", &tasks_uri, Some(&owner.token), Some(json!({ "title": "Pour", "dependsOn": [Uuid::new_v4()] })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "dependencies must belong to the project");

    let (status, _) = t
        .request("POST", &tasks_uri, Some(&owner.token), Some(json!({ "title": "Pour", "assigneeId": Uuid::new_v4() })))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "assignee must exist");

    let (status, second) = t
        .request(
            "POST",
            &tasks_uri,
            Some(&owner.token),
            Some(json!({ "title": "Pour", "assigneeId": worker.id, "dependsOn": [first["id"]] })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{}", second);
    assert_eq!(second["dependsOn"], json!([first["id"]]));

    let (status, tasks) = t.request("GET", &tasks_uri, Some(&worker.token), None).await?;
    assert_eq!(status, StatusCode::OK, "assignees can see the project");
    assert_eq!(tasks.as_array().map(Vec::len), Some(2));

    let task_uri = format!("{}/{}", tasks_uri, first["id"].as_str().unwrap());
    let (status, _) = t
        .request("PATCH", &task_uri, Some(&member.token), Some(json!({ "assigneeId": member.id })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = t
        .request("PATCH", &task_uri, Some(&member.token), Some(json!({ "status": "in_progress" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "in_progress");

    let (status, _) = t
        .request("PATCH", &task_uri, Some(&member.token), Some(json!({ "status": "someday" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn deleted_projects_disappear() -> Result<()> {
    let t = common::setup().await?;
    let admin = t.admin().await?;

    let (_, project) = t
        .request("POST", "/api/projects", Some(&admin.token), Some(json!({ "name": "Temp" })))
        .await?;
    let uri = format!("/api/projects/{}", project["id"].as_str().unwrap());

    let (status, _) = t.request("DELETE", &uri, Some(&admin.token), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.request("GET", &uri, Some(&admin.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
